use crate::parser::ParseError;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Coarse error classes reported to callers that only need to know why a
/// document could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ErrorCode {
    /// Generic failure of a document operation
    Invalid,
    /// The document is encrypted and could not be unlocked
    Encrypted,
    /// The file could not be opened or read
    OpenFile,
    /// The document catalog could not be read
    BadCatalog,
    /// The document is damaged beyond repair
    Damaged,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Invalid => "invalid",
            ErrorCode::Encrypted => "encrypted",
            ErrorCode::OpenFile => "open-file",
            ErrorCode::BadCatalog => "bad-catalog",
            ErrorCode::Damaged => "damaged",
        };
        f.write_str(name)
    }
}

impl ParseError {
    /// Classify this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ParseError::Io(_) => ErrorCode::OpenFile,
            ParseError::EncryptedDocumentAuthFailed | ParseError::UnsupportedEncryption(_) => {
                ErrorCode::Encrypted
            }
            ParseError::MissingRequiredEntry(_) => ErrorCode::BadCatalog,
            ParseError::DamagedDocument(_) | ParseError::CircularXRef { .. } => ErrorCode::Damaged,
            ParseError::InvalidHeader
            | ParseError::OutOfBounds { .. }
            | ParseError::SyntaxError { .. }
            | ParseError::StructureTooDeep { .. }
            | ParseError::UnsupportedFilter(_)
            | ParseError::StreamDecodeError(_)
            | ParseError::InvalidReference(..)
            | ParseError::CircularReference(..) => ErrorCode::Invalid,
        }
    }

    /// Whether the error only affects a single stream rather than the document.
    pub fn is_stream_local(&self) -> bool {
        matches!(
            self,
            ParseError::UnsupportedFilter(_) | ParseError::StreamDecodeError(_)
        )
    }
}
