//! Linearization parameter dictionary (ISO 32000-1 Annex F.2.2)

use super::objects::{ObjectParser, PdfDictionary, PdfObject};
use tracing::debug;

/// The first-object `/Linearized` dictionary of a linearized file
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinearizationParams {
    /// `/Linearized` version
    pub version: f64,
    /// `/L`: file length
    pub file_length: u64,
    /// `/H`: offset and length of the primary hint stream, optionally the overflow stream
    pub hint_streams: Vec<u64>,
    /// `/O`: first page's page object number
    pub first_page_object: u32,
    /// `/E`: end of the first page
    pub first_page_end: u64,
    /// `/N`: number of pages
    pub page_count: u32,
    /// `/T`: offset of the first entry in the main xref table
    pub main_xref_offset: u64,
}

impl LinearizationParams {
    /// Read the parameter dictionary; `None` if it is not one or lacks a required entry.
    pub fn from_dict(dict: &PdfDictionary) -> Option<Self> {
        let version = dict.get("Linearized")?.as_real()?;
        let unsigned = |key: &str| dict.get_integer(key).and_then(|v| u64::try_from(v).ok());
        let hint_streams = dict
            .get("H")?
            .as_array()?
            .iter()
            .map(|v| v.as_integer().and_then(|v| u64::try_from(v).ok()))
            .collect::<Option<Vec<u64>>>()?;

        Some(LinearizationParams {
            version,
            file_length: unsigned("L")?,
            hint_streams,
            first_page_object: u32::try_from(unsigned("O")?).ok()?,
            first_page_end: unsigned("E")?,
            page_count: u32::try_from(unsigned("N")?).ok()?,
            main_xref_offset: unsigned("T")?,
        })
    }

    /// Parameters from the first object after the header, if it is a linearization dictionary.
    pub fn detect(data: &[u8], max_depth: usize) -> Option<Self> {
        let parser = ObjectParser::new(data).with_max_depth(max_depth);
        // The header and binary marker are comments
        let first = parser.lexer().token_start(0);
        let (id, object, _) = parser.parse_indirect_object(first).ok()?;
        let params = match &object {
            PdfObject::Dictionary(dict) => Self::from_dict(dict),
            _ => None,
        }?;
        debug!(obj = id.0, file_length = params.file_length, "linearization dictionary found");
        Some(params)
    }

    /// `/L` matches the actual file length; false after an incremental update.
    pub fn matches_length(&self, file_length: u64) -> bool {
        self.file_length == file_length
    }
}
