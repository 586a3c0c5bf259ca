//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::lexer::{Keyword, Lexer, Token};
use super::{ParseError, ParseResult};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Object number and generation number
pub type ObjectId = (u32, u16);

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode as a PDF text string (UTF-16BE, UTF-8 or PDFDocEncoding)
    pub fn to_text(&self) -> String {
        super::encoding::decode_text_string(&self.0)
    }
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// PDF Dictionary object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub HashMap<PdfName, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(&PdfName(key.to_string()))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(PdfName(key.into()), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(&PdfName(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, PdfName, PdfObject> {
        self.0.iter()
    }

    /// Value of `/Type`, if it is a name
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|obj| obj.as_integer())
    }

    pub fn get_name(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|obj| obj.as_name()).map(|n| n.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|obj| obj.as_bool())
    }
}

/// PDF Stream object: its dictionary and the raw (still encoded) data
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Get the decoded stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.dict, &self.data)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(u32, u16),
}

impl PdfObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to reals
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionaries, and the dictionary of a stream
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(num, gen) => Some((*num, *gen)),
            _ => None,
        }
    }
}

/// Resolves an indirect `/Length` while a stream is being parsed.
pub trait LengthResolver {
    fn resolve_length(&self, id: ObjectId) -> Option<i64>;
}

/// Recursive-descent parser producing [`PdfObject`]s from a byte slice.
#[derive(Clone, Copy)]
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    max_depth: usize,
    lenient: bool,
    length_resolver: Option<&'a dyn LengthResolver>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            max_depth: super::stack_safe::MAX_NESTING_DEPTH,
            lenient: true,
            length_resolver: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_length_resolver(mut self, resolver: &'a dyn LengthResolver) -> Self {
        self.length_resolver = Some(resolver);
        self
    }

    pub fn lexer(&self) -> &Lexer<'a> {
        &self.lexer
    }

    /// Parse one object starting at `pos`.
    pub fn parse_object(&self, pos: usize) -> ParseResult<(PdfObject, usize)> {
        let (token, next) = self.lexer.next_token(pos)?;
        self.parse_from_token(token, pos, next, 0)
    }

    /// Parse `N G obj <object> endobj` starting at `pos`.
    pub fn parse_indirect_object(&self, pos: usize) -> ParseResult<(ObjectId, PdfObject, usize)> {
        let start = self.lexer.token_start(pos);
        let (id, after_header) = self.parse_object_header(start)?;
        let (object, after_object) = self.parse_object(after_header)?;

        match self.lexer.next_token(after_object) {
            Ok((Token::Keyword(Keyword::EndObj), end)) => Ok((id, object, end)),
            _ if !self.lenient => Err(ParseError::syntax(
                self.lexer.token_start(after_object),
                format!("Expected 'endobj' after object {} {}", id.0, id.1),
            )),
            _ => {
                debug!(obj = id.0, gen = id.1, "object without endobj");
                Ok((id, object, after_object))
            }
        }
    }

    /// Parse the `N G obj` prefix of an object definition.
    pub fn parse_object_header(&self, pos: usize) -> ParseResult<(ObjectId, usize)> {
        let bad_header = |at: usize| ParseError::syntax(at, "Expected 'N G obj' object header");
        let (num, p1) = match self.lexer.next_token(pos)? {
            (Token::Integer(n), p) => (n, p),
            _ => return Err(bad_header(pos)),
        };
        let (gen, p2) = match self.lexer.next_token(p1)? {
            (Token::Integer(g), p) => (g, p),
            _ => return Err(bad_header(pos)),
        };
        let after = match self.lexer.next_token(p2)? {
            (Token::Keyword(Keyword::Obj), p) => p,
            _ => return Err(bad_header(pos)),
        };
        let num = u32::try_from(num).map_err(|_| bad_header(pos))?;
        let gen = u16::try_from(gen).map_err(|_| bad_header(pos))?;
        Ok(((num, gen), after))
    }

    fn parse_from_token(
        &self,
        token: Token,
        start: usize,
        next: usize,
        depth: usize,
    ) -> ParseResult<(PdfObject, usize)> {
        match token {
            Token::Null => Ok((PdfObject::Null, next)),
            Token::Boolean(b) => Ok((PdfObject::Boolean(b), next)),
            Token::Real(r) => Ok((PdfObject::Real(r), next)),
            Token::String(s) => Ok((PdfObject::String(PdfString(s)), next)),
            Token::Name(n) => Ok((PdfObject::Name(PdfName(n)), next)),
            Token::Integer(i) => Ok(self.integer_or_reference(i, next)),
            Token::ArrayStart => self.parse_array(start, next, depth + 1),
            Token::DictStart => self.parse_dictionary_or_stream(start, next, depth + 1),
            Token::Eof => Err(ParseError::syntax(start, "Unexpected end of file")),
            other => Err(ParseError::syntax(
                self.lexer.token_start(start),
                format!("Unexpected token {other:?}, expected a PDF object"),
            )),
        }
    }

    /// `N G R` becomes a reference; anything else leaves the integer alone.
    fn integer_or_reference(&self, value: i64, next: usize) -> (PdfObject, usize) {
        let as_reference = || -> Option<(PdfObject, usize)> {
            let num = u32::try_from(value).ok()?;
            let (gen, p1) = match self.lexer.next_token(next).ok()? {
                (Token::Integer(g), p) => (u16::try_from(g).ok()?, p),
                _ => return None,
            };
            match self.lexer.next_token(p1).ok()? {
                (Token::Keyword(Keyword::R), p2) => Some((PdfObject::Reference(num, gen), p2)),
                _ => None,
            }
        };
        as_reference().unwrap_or((PdfObject::Integer(value), next))
    }

    fn check_depth(&self, start: usize, depth: usize) -> ParseResult<()> {
        if depth > self.max_depth {
            return Err(ParseError::StructureTooDeep {
                position: start,
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn parse_array(&self, start: usize, mut cursor: usize, depth: usize) -> ParseResult<(PdfObject, usize)> {
        self.check_depth(start, depth)?;
        let mut elements = Vec::new();

        loop {
            let token_pos = cursor;
            let (token, next) = self.lexer.next_token(cursor)?;
            match token {
                Token::ArrayEnd => return Ok((PdfObject::Array(PdfArray(elements)), next)),
                Token::Eof => return Err(ParseError::syntax(start, "Unterminated array")),
                token => {
                    let (obj, after) = self.parse_from_token(token, token_pos, next, depth)?;
                    elements.push(obj);
                    cursor = after;
                }
            }
        }
    }

    fn parse_dictionary_or_stream(
        &self,
        start: usize,
        cursor: usize,
        depth: usize,
    ) -> ParseResult<(PdfObject, usize)> {
        self.check_depth(start, depth)?;
        let (dict, after_dict) = self.parse_dictionary_inner(start, cursor, depth)?;

        match self.lexer.next_token(after_dict) {
            Ok((Token::Keyword(Keyword::Stream), after_keyword)) => {
                let (data, end) = self.parse_stream_data(&dict, after_keyword)?;
                Ok((PdfObject::Stream(PdfStream { dict, data }), end))
            }
            _ => Ok((PdfObject::Dictionary(dict), after_dict)),
        }
    }

    fn parse_dictionary_inner(
        &self,
        start: usize,
        mut cursor: usize,
        depth: usize,
    ) -> ParseResult<(PdfDictionary, usize)> {
        let mut dict = PdfDictionary::new();

        loop {
            let (token, next) = self.lexer.next_token(cursor)?;
            let key = match token {
                Token::DictEnd => return Ok((dict, next)),
                Token::Name(key) => key,
                Token::Eof => return Err(ParseError::syntax(start, "Unterminated dictionary")),
                other => {
                    return Err(ParseError::syntax(
                        self.lexer.token_start(cursor),
                        format!("Expected dictionary key, found {other:?}"),
                    ))
                }
            };

            let value_pos = next;
            let (value_token, value_next) = self.lexer.next_token(value_pos)?;
            if value_token == Token::DictEnd {
                // `/Key >>` with no value: the key is dropped
                return Ok((dict, value_next));
            }
            let (value, after) = self.parse_from_token(value_token, value_pos, value_next, depth)?;

            // A null value is equivalent to the entry being absent
            if !value.is_null() {
                dict.insert(key, value);
            }
            cursor = after;
        }
    }

    /// Read stream bytes following the `stream` keyword.
    fn parse_stream_data(&self, dict: &PdfDictionary, after_keyword: usize) -> ParseResult<(Vec<u8>, usize)> {
        let data = self.lexer.data();

        // The keyword is followed by CRLF or LF; a lone CR is tolerated
        let data_start = self.lexer.skip_eol(after_keyword);

        let declared = match dict.get("Length") {
            Some(PdfObject::Integer(len)) => Some(*len),
            Some(PdfObject::Reference(num, gen)) => self
                .length_resolver
                .and_then(|resolver| resolver.resolve_length((*num, *gen))),
            _ => None,
        };

        if let Some(length) = declared.and_then(|l| usize::try_from(l).ok()) {
            if let Some(data_end) = data_start.checked_add(length).filter(|&end| end <= data.len()) {
                if let Ok((Token::Keyword(Keyword::EndStream), end)) = self.lexer.next_token(data_end) {
                    return Ok((data[data_start..data_end].to_vec(), end));
                }
            } else if !self.lenient {
                return Err(ParseError::OutOfBounds {
                    offset: data_start as u64,
                    length,
                    size: data.len() as u64,
                });
            }
        }

        if !self.lenient {
            return Err(ParseError::syntax(
                data_start,
                "Stream /Length does not lead to 'endstream'",
            ));
        }

        let keyword_pos = find_subsequence(&data[data_start..], b"endstream")
            .map(|p| data_start + p)
            .ok_or_else(|| ParseError::syntax(data_start, "Stream without 'endstream'"))?;

        let mut data_end = keyword_pos;
        if data_end > data_start && data[data_end - 1] == b'\n' {
            data_end -= 1;
        }
        if data_end > data_start && data[data_end - 1] == b'\r' {
            data_end -= 1;
        }

        warn!(
            position = data_start,
            declared = ?declared,
            actual = data_end - data_start,
            "stream length repaired by scanning for endstream"
        );

        Ok((data[data_start..data_end].to_vec(), keyword_pos + b"endstream".len()))
    }
}

pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
