//! PDF Parser Module
//!
//! Read-only structural parsing of PDF files according to ISO 32000-1 (PDF 1.7)
//! and ISO 32000-2 (PDF 2.0): from raw bytes, through tokens and objects, up to the
//! cross-reference index and the document catalog.

pub mod date;
pub mod document;
pub mod encoding;
pub mod filter_impls;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod linearization;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod reader;
pub mod source;
pub mod stack_safe;
pub mod trailer;
pub mod xref;
pub mod xref_stream;
pub mod xref_types;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::document::{DocumentId, DocumentInfo, PdfDocument};
pub use self::header::{PdfHeader, PdfVersion};
pub use self::lexer::{Keyword, Lexer, Token};
pub use self::objects::{ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::reader::PdfReader;
pub use self::source::ByteSource;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read of {length} bytes at offset {offset} exceeds file size {size}")]
    OutOfBounds { offset: u64, length: usize, size: u64 },

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Structure nested deeper than {limit} levels at position {position}")]
    StructureTooDeep { position: usize, limit: usize },

    #[error("Circular cross-reference chain at offset {offset}")]
    CircularXRef { offset: u64 },

    #[error("Damaged document: {0}")]
    DamagedDocument(String),

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Encrypted document: authentication failed")]
    EncryptedDocumentAuthFailed,

    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("Missing required entry: {0}")]
    MissingRequiredEntry(String),

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Circular reference detected at {0} {1} R")]
    CircularReference(u32, u16),
}

impl ParseError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ParseError::SyntaxError {
            position,
            message: message.into(),
        }
    }
}

/// Options controlling how tolerant the parser is and how much it will read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject repairable defects instead of repairing them
    pub strict_mode: bool,
    /// Rebuild the xref index by scanning the file when it cannot be read
    pub recover_xref: bool,
    /// Locate `endstream` by scanning when `/Length` is absent or wrong
    pub lenient_streams: bool,
    /// Maximum array/dictionary nesting
    pub max_nesting_depth: usize,
    /// Maximum number of cross-reference sections followed through `/Prev`
    pub max_xref_chain: usize,
    /// Maximum length of reference-to-reference chains and page-tree depth
    pub max_reference_depth: usize,
    /// Files of at least this many bytes are memory-mapped
    pub mmap_threshold: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            recover_xref: true,
            lenient_streams: true,
            max_nesting_depth: stack_safe::MAX_NESTING_DEPTH,
            max_xref_chain: xref::MAX_XREF_CHAIN,
            max_reference_depth: stack_safe::MAX_REFERENCE_DEPTH,
            mmap_threshold: source::DEFAULT_MMAP_THRESHOLD,
        }
    }
}

impl ParseOptions {
    /// Fail on every defect; no recovery scan, no stream length repair.
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            recover_xref: false,
            lenient_streams: false,
            ..Self::default()
        }
    }

    /// Repair everything that can be repaired.
    pub fn lenient() -> Self {
        Self::default()
    }
}
