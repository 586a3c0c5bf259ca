//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+, ISO 32000-1
//! Section 7.5.7).

use super::lexer::Token;
use super::objects::{ObjectParser, PdfObject, PdfStream};
use super::{ParseError, ParseResult};
use tracing::warn;

/// A decoded object stream: the objects it holds, in stream order
#[derive(Debug, Clone)]
pub struct ObjectStream {
    numbers: Vec<u32>,
    objects: Vec<PdfObject>,
}

impl ObjectStream {
    /// Decode the stream and parse every object in it.
    pub fn parse(stream: &PdfStream, max_depth: usize) -> ParseResult<Self> {
        let dict = &stream.dict;
        let count = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingRequiredEntry("N in object stream".to_string()))?;
        let first = dict
            .get_integer("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingRequiredEntry("First in object stream".to_string()))?;

        let data = stream.decode()?;
        if first > data.len() {
            return Err(ParseError::syntax(first, "Object stream /First is past the end of its data"));
        }

        let parser = ObjectParser::new(&data).with_max_depth(max_depth);
        let lexer = parser.lexer();

        // Header: N pairs of `object-number offset`
        let mut header = Vec::with_capacity(count.min(data.len() / 4));
        let mut cursor = 0;
        for _ in 0..count {
            let pair = lexer.next_token(cursor).and_then(|(a, p1)| {
                let (b, p2) = lexer.next_token(p1)?;
                Ok((a, b, p2))
            });
            match pair {
                Ok((Token::Integer(num), Token::Integer(offset), next)) if num >= 0 && offset >= 0 => {
                    header.push((num as u32, offset as usize));
                    cursor = next;
                }
                _ => {
                    warn!(expected = count, found = header.len(), "object stream header truncated");
                    break;
                }
            }
        }

        let mut numbers = Vec::with_capacity(header.len());
        let mut objects = Vec::with_capacity(header.len());
        for (num, offset) in header {
            let object = match first
                .checked_add(offset)
                .filter(|&pos| pos < data.len())
                .map(|pos| parser.parse_object(pos))
            {
                Some(Ok((obj, _))) => obj,
                Some(Err(e)) => {
                    warn!(obj = num, error = %e, "unparseable object in object stream");
                    PdfObject::Null
                }
                None => {
                    warn!(obj = num, offset, "object stream offset out of range");
                    PdfObject::Null
                }
            };
            numbers.push(num);
            objects.push(object);
        }

        Ok(ObjectStream { numbers, objects })
    }

    /// Object `number`, expected at `index`. Falls back to a search by number when the
    /// xref index and the stream header disagree.
    pub fn get(&self, index: usize, number: u32) -> Option<&PdfObject> {
        if self.numbers.get(index) == Some(&number) {
            return self.objects.get(index);
        }
        self.numbers
            .iter()
            .position(|&n| n == number)
            .and_then(|i| self.objects.get(i))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Object numbers in stream order
    pub fn object_numbers(&self) -> &[u32] {
        &self.numbers
    }
}
