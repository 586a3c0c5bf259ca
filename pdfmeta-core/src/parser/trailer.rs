//! PDF Trailer Parser
//!
//! Parses PDF trailer according to ISO 32000-1 Section 7.5.5, for both the classic
//! `trailer` dictionary and the dictionary of a cross-reference stream.

use super::objects::{ObjectId, PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// Keys carried forward from older revisions when a newer trailer omits them
const DOCUMENT_KEYS: [&str; 5] = ["Root", "Info", "Encrypt", "ID", "Size"];

/// PDF Trailer information
#[derive(Debug, Clone)]
pub struct PdfTrailer {
    /// The trailer dictionary
    pub dict: PdfDictionary,
    /// Byte offset of previous xref section (if any)
    pub prev: Option<u64>,
    /// Byte offset of a hybrid file's supplementary xref stream
    pub xref_stm: Option<u64>,
    /// Byte offset of this xref section
    pub xref_offset: u64,
    /// The section was a cross-reference stream rather than a table
    pub is_xref_stream: bool,
}

impl PdfTrailer {
    pub fn from_dict(dict: PdfDictionary, xref_offset: u64, is_xref_stream: bool) -> Self {
        let offset_of = |key: &str| {
            dict.get_integer(key)
                .and_then(|value| u64::try_from(value).ok())
        };
        let prev = offset_of("Prev");
        let xref_stm = offset_of("XRefStm");

        PdfTrailer {
            dict,
            prev,
            xref_stm,
            xref_offset,
            is_xref_stream,
        }
    }

    /// Number of entries the xref index declares
    pub fn size(&self) -> Option<u32> {
        self.dict
            .get_integer("Size")
            .and_then(|value| u32::try_from(value).ok())
    }

    /// Get the root object reference (document catalog)
    pub fn root(&self) -> ParseResult<ObjectId> {
        self.dict
            .get("Root")
            .and_then(|obj| obj.as_reference())
            .ok_or_else(|| ParseError::MissingRequiredEntry("Root".to_string()))
    }

    /// Get the info object reference (document information dictionary)
    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get("Info").and_then(|obj| obj.as_reference())
    }

    /// The `/Encrypt` value: a reference or, rarely, a direct dictionary
    pub fn encrypt(&self) -> Option<&PdfObject> {
        self.dict.get("Encrypt")
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// The two `/ID` strings; the second falls back to the first when missing.
    pub fn id(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        let array = self.dict.get("ID")?.as_array()?;
        let first = array.get(0)?.as_string()?.as_bytes().to_vec();
        let second = array
            .get(1)
            .and_then(|obj| obj.as_string())
            .map_or_else(|| first.clone(), |s| s.as_bytes().to_vec());
        Some((first, second))
    }

    pub fn dict(&self) -> &PdfDictionary {
        &self.dict
    }
}

/// Trailers of every revision, newest first
#[derive(Debug, Clone)]
pub struct TrailerChain {
    trailers: Vec<PdfTrailer>,
}

impl TrailerChain {
    pub fn new(trailer: PdfTrailer) -> Self {
        Self {
            trailers: vec![trailer],
        }
    }

    /// Add an older trailer to the chain
    pub fn add_previous(&mut self, trailer: PdfTrailer) {
        self.trailers.push(trailer);
    }

    /// Get the most recent trailer
    pub fn current(&self) -> &PdfTrailer {
        &self.trailers[0]
    }

    pub fn all(&self) -> &[PdfTrailer] {
        &self.trailers
    }

    pub fn has_previous(&self) -> bool {
        self.trailers.len() > 1
    }

    /// The newest trailer with document keys it lacks filled in from older revisions.
    pub fn merged(&self) -> PdfTrailer {
        let mut merged = self.current().clone();
        for older in &self.trailers[1..] {
            for key in DOCUMENT_KEYS {
                if !merged.dict.contains_key(key) {
                    if let Some(value) = older.dict.get(key) {
                        merged.dict.insert(key, value.clone());
                    }
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfArray, PdfString};

    fn trailer(entries: &[(&str, PdfObject)], offset: u64) -> PdfTrailer {
        let mut dict = PdfDictionary::new();
        for (key, value) in entries {
            dict.insert(*key, value.clone());
        }
        PdfTrailer::from_dict(dict, offset, false)
    }

    #[test]
    fn test_trailer_basic() {
        let t = trailer(
            &[
                ("Size", PdfObject::Integer(10)),
                ("Root", PdfObject::Reference(1, 0)),
                ("Info", PdfObject::Reference(2, 0)),
                ("Prev", PdfObject::Integer(400)),
            ],
            900,
        );
        assert_eq!(t.size(), Some(10));
        assert_eq!(t.root().unwrap(), (1, 0));
        assert_eq!(t.info(), Some((2, 0)));
        assert_eq!(t.prev, Some(400));
        assert_eq!(t.xref_stm, None);
        assert!(!t.is_encrypted());
    }

    #[test]
    fn test_missing_root() {
        let t = trailer(&[("Size", PdfObject::Integer(3))], 0);
        assert!(matches!(t.root(), Err(ParseError::MissingRequiredEntry(ref key)) if key == "Root"));
    }

    #[test]
    fn test_negative_prev_ignored() {
        let t = trailer(&[("Prev", PdfObject::Integer(-5))], 0);
        assert_eq!(t.prev, None);
    }

    #[test]
    fn test_id_pair() {
        let id = PdfObject::Array(PdfArray(vec![
            PdfObject::String(PdfString(vec![1, 2])),
            PdfObject::String(PdfString(vec![3, 4])),
        ]));
        let t = trailer(&[("ID", id)], 0);
        assert_eq!(t.id(), Some((vec![1, 2], vec![3, 4])));

        let single = PdfObject::Array(PdfArray(vec![PdfObject::String(PdfString(vec![9]))]));
        let t = trailer(&[("ID", single)], 0);
        assert_eq!(t.id(), Some((vec![9], vec![9])));
    }

    #[test]
    fn test_chain_merge_newest_wins() {
        let newest = trailer(
            &[
                ("Size", PdfObject::Integer(8)),
                ("Info", PdfObject::Reference(7, 0)),
                ("Prev", PdfObject::Integer(100)),
            ],
            500,
        );
        let oldest = trailer(
            &[
                ("Size", PdfObject::Integer(5)),
                ("Root", PdfObject::Reference(1, 0)),
                ("Info", PdfObject::Reference(4, 0)),
            ],
            100,
        );
        let mut chain = TrailerChain::new(newest);
        chain.add_previous(oldest);
        assert!(chain.has_previous());

        let merged = chain.merged();
        assert_eq!(merged.size(), Some(8));
        assert_eq!(merged.info(), Some((7, 0)));
        assert_eq!(merged.root().unwrap(), (1, 0));
        assert_eq!(merged.xref_offset, 500);
    }
}
