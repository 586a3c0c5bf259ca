//! PDF Cross-Reference Table Parser
//!
//! Parses xref tables according to ISO 32000-1 Section 7.5.4, cross-reference streams
//! (Section 7.5.8) and hybrid files, and walks the `/Prev` chain of incremental
//! updates into one merged index.

use super::lexer::{is_whitespace, Keyword, Lexer, Token};
use super::objects::{ObjectParser, PdfObject};
use super::source::ByteSource;
use super::trailer::{PdfTrailer, TrailerChain};
use super::xref_stream::XRefStream;
pub use super::xref_types::XRefEntry;
use super::{ParseError, ParseOptions, ParseResult};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Maximum number of xref sections followed through `/Prev`
pub const MAX_XREF_CHAIN: usize = 1024;

/// `startxref` must appear within this many bytes of the end of the file
pub const STARTXREF_SEARCH_WINDOW: usize = 1024;

/// One xref section: its entries in file order and its trailer
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub entries: Vec<(u32, XRefEntry)>,
    pub trailer: PdfTrailer,
}

/// Merged cross-reference index: object number to location
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the whole xref chain starting from the final `startxref`.
    pub fn load(source: &ByteSource, options: &ParseOptions) -> ParseResult<(Self, TrailerChain)> {
        let start = find_startxref(source.tail(STARTXREF_SEARCH_WINDOW), source.len())?;
        let data = source.as_slice();
        let mut table = Self::new();
        let mut chain: Option<TrailerChain> = None;
        let mut visited = HashSet::new();
        let mut next = Some(start);

        while let Some(offset) = next {
            if !visited.insert(offset) || visited.len() > options.max_xref_chain {
                return Err(ParseError::CircularXRef { offset });
            }

            let section = parse_section(data, offset, options)?;

            // Hybrid file: the supplementary stream wins over this level's table
            if let Some(stm_offset) = section.trailer.xref_stm {
                match parse_section(data, stm_offset, options) {
                    Ok(stm) if stm.trailer.is_xref_stream => table.merge_older(stm.entries),
                    Ok(_) => warn!(offset = stm_offset, "/XRefStm does not point at an xref stream"),
                    Err(e) => warn!(offset = stm_offset, error = %e, "unreadable /XRefStm section"),
                }
            }
            table.merge_older(section.entries);

            next = section.trailer.prev;
            match chain.as_mut() {
                Some(chain) => chain.add_previous(section.trailer),
                None => chain = Some(TrailerChain::new(section.trailer)),
            }
        }

        let chain = chain.ok_or_else(|| ParseError::DamagedDocument("empty xref chain".to_string()))?;
        table.entries.insert(0, XRefEntry::free());
        debug!(
            sections = chain.all().len(),
            objects = table.len(),
            "xref chain loaded"
        );
        Ok((table, chain))
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    /// Set an entry, replacing any existing one.
    pub fn insert(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    /// Add entries from an older section; numbers already present are kept.
    pub fn merge_older(&mut self, entries: impl IntoIterator<Item = (u32, XRefEntry)>) {
        for (number, entry) in entries {
            self.entries.entry(number).or_insert(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }

    /// Object numbers with an in-use or compressed entry
    pub fn in_use_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_in_use()).count()
    }
}

/// Offset following the last `startxref` in `tail`, the final bytes of a file of
/// `file_len` bytes.
pub fn find_startxref(tail: &[u8], file_len: u64) -> ParseResult<u64> {
    let keyword = Keyword::StartXRef.as_str().as_bytes();
    let found = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or_else(|| ParseError::DamagedDocument("startxref not found".to_string()))?;

    match Lexer::new(tail).next_token(found + keyword.len()) {
        Ok((Token::Integer(offset), _)) if offset >= 0 && (offset as u64) < file_len => Ok(offset as u64),
        _ => Err(ParseError::DamagedDocument(
            "startxref does not point inside the file".to_string(),
        )),
    }
}

/// Parse the classic table or xref stream at `offset`.
pub fn parse_section(data: &[u8], offset: u64, options: &ParseOptions) -> ParseResult<XRefSection> {
    let pos = usize::try_from(offset)
        .ok()
        .filter(|&p| p < data.len())
        .ok_or(ParseError::OutOfBounds {
            offset,
            length: 0,
            size: data.len() as u64,
        })?;

    let section = match Lexer::new(data).next_token(pos)? {
        (Token::Keyword(Keyword::XRef), after) => parse_table(data, offset, after, options)?,
        (Token::Integer(_), _) => parse_stream(data, offset, pos, options)?,
        (other, _) => {
            return Err(ParseError::syntax(
                pos,
                format!("Expected 'xref' or an xref stream, found {other:?}"),
            ))
        }
    };

    debug!(
        offset,
        kind = if section.trailer.is_xref_stream { "stream" } else { "table" },
        entries = section.entries.len(),
        "xref section parsed"
    );
    Ok(section)
}

fn parse_table(data: &[u8], offset: u64, mut pos: usize, options: &ParseOptions) -> ParseResult<XRefSection> {
    let lexer = Lexer::new(data);
    let mut entries = Vec::new();
    let mut first_subsection = true;

    loop {
        let (token, after) = lexer.next_token(pos)?;
        let first = match token {
            Token::Keyword(Keyword::Trailer) => {
                pos = after;
                break;
            }
            Token::Integer(n) => u32::try_from(n).map_err(|_| ParseError::syntax(pos, "Negative xref subsection start"))?,
            other => {
                return Err(ParseError::syntax(
                    lexer.token_start(pos),
                    format!("Expected xref subsection or 'trailer', found {other:?}"),
                ))
            }
        };
        let (count, after_count) = match lexer.next_token(after)? {
            (Token::Integer(n), p) if n >= 0 => (n as u64, p),
            _ => return Err(ParseError::syntax(after, "Invalid xref subsection count")),
        };

        let mut first = first;
        let mut cursor = after_count;
        for i in 0..count {
            let (field1, generation, flag, row_end) = parse_row(data, cursor)
                .ok_or_else(|| ParseError::syntax(cursor, "Malformed xref entry"))?;
            cursor = row_end;

            // Common off-by-one: the table starts at 1 but the first row is object 0
            if first_subsection && i == 0 && first == 1 && flag == b'f' && generation == 65535 {
                if options.strict_mode {
                    return Err(ParseError::syntax(cursor, "xref subsection numbering is off by one"));
                }
                debug!("xref subsection starting at 1 renumbered from 0");
                first = 0;
            }

            let Some(number) = u32::try_from(i).ok().and_then(|i| first.checked_add(i)) else {
                break;
            };
            let generation = u16::try_from(generation).unwrap_or(u16::MAX);
            let entry = match flag {
                b'n' if field1 == 0 => {
                    debug!(obj = number, "in-use xref entry at offset 0 ignored");
                    continue;
                }
                b'n' => XRefEntry::InUse {
                    offset: field1,
                    generation,
                },
                _ => XRefEntry::Free {
                    next_free: u32::try_from(field1).unwrap_or(0),
                    generation,
                },
            };
            entries.push((number, entry));
        }
        first_subsection = false;
        pos = cursor;
    }

    let parser = ObjectParser::new(data)
        .with_max_depth(options.max_nesting_depth)
        .with_lenient(options.lenient_streams);
    let dict = match parser.parse_object(pos)? {
        (PdfObject::Dictionary(dict), _) => dict,
        _ => return Err(ParseError::syntax(pos, "Trailer is not a dictionary")),
    };

    Ok(XRefSection {
        entries,
        trailer: PdfTrailer::from_dict(dict, offset, false),
    })
}

/// One `oooooooooo ggggg n` row. Tolerates any whitespace between and after fields.
fn parse_row(data: &[u8], pos: usize) -> Option<(u64, u64, u8, usize)> {
    let skip = |mut p: usize| {
        while p < data.len() && is_whitespace(data[p]) {
            p += 1;
        }
        p
    };
    let digits = |start: usize| -> Option<(u64, usize)> {
        let mut p = start;
        let mut value: u64 = 0;
        while p < data.len() && data[p].is_ascii_digit() {
            value = value.checked_mul(10)?.checked_add(u64::from(data[p] - b'0'))?;
            p += 1;
        }
        (p > start).then_some((value, p))
    };

    let (field1, p) = digits(skip(pos))?;
    let (generation, p) = digits(skip(p))?;
    let p = skip(p);
    match data.get(p)? {
        flag @ (b'n' | b'f') => Some((field1, generation, *flag, p + 1)),
        _ => None,
    }
}

fn parse_stream(data: &[u8], offset: u64, pos: usize, options: &ParseOptions) -> ParseResult<XRefSection> {
    let parser = ObjectParser::new(data)
        .with_max_depth(options.max_nesting_depth)
        .with_lenient(options.lenient_streams);
    let (id, object, _) = parser.parse_indirect_object(pos)?;
    let PdfObject::Stream(stream) = object else {
        return Err(ParseError::syntax(pos, format!("Object {} {} is not an xref stream", id.0, id.1)));
    };

    match stream.dict.get_type() {
        Some("XRef") => {}
        _ if options.strict_mode => {
            return Err(ParseError::syntax(pos, "xref stream without /Type /XRef"));
        }
        _ => warn!(obj = id.0, "xref stream without /Type /XRef"),
    }

    let entries = XRefStream::parse(&stream)?.entries();
    Ok(XRefSection {
        entries,
        trailer: PdfTrailer::from_dict(stream.dict, offset, true),
    })
}
