//! PDF Header Parser
//!
//! Parses PDF header and version according to ISO 32000-1 Section 7.5.2

use super::objects::find_subsequence;
use super::{ParseError, ParseResult};

/// How far into the file the `%PDF-` marker is searched for
pub const HEADER_SEARCH_WINDOW: usize = 1024;

/// PDF Version information
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse `M.N`, as found in the header or a Catalog `/Version` name.
    pub fn parse(text: &str) -> Option<Self> {
        let (major, minor) = text.trim().split_once('.')?;
        let minor_digits: String = minor.chars().take_while(|c| c.is_ascii_digit()).collect();
        Some(Self::new(major.parse().ok()?, minor_digits.parse().ok()?))
    }

    /// Check if this version is defined by ISO 32000
    pub fn is_supported(&self) -> bool {
        matches!((self.major, self.minor), (1, 0..=7) | (2, 0))
    }
}

impl Default for PdfVersion {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// PDF Header information
#[derive(Debug, Clone, PartialEq)]
pub struct PdfHeader {
    pub version: PdfVersion,
    /// Offset of `%PDF-` in the file; non-zero when junk precedes it
    pub offset: usize,
    pub has_binary_marker: bool,
}

impl PdfHeader {
    /// Locate and parse the header within the first kilobyte.
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
        let offset = find_subsequence(window, b"%PDF-").ok_or(ParseError::InvalidHeader)?;

        let line_start = offset + 5;
        let line_end = data[line_start..]
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .map_or(data.len(), |p| line_start + p);
        let line = String::from_utf8_lossy(&data[line_start..line_end]);
        let version = PdfVersion::parse(&line).ok_or(ParseError::InvalidHeader)?;

        Ok(PdfHeader {
            version,
            offset,
            has_binary_marker: Self::check_binary_marker(&data[line_end..]),
        })
    }

    /// A comment line carrying at least four bytes >= 128.
    fn check_binary_marker(rest: &[u8]) -> bool {
        let start = rest
            .iter()
            .position(|&b| b != b'\r' && b != b'\n')
            .unwrap_or(rest.len());
        let rest = &rest[start..];
        if rest.first() != Some(&b'%') {
            return false;
        }
        rest.iter()
            .skip(1)
            .take_while(|&&b| b != b'\r' && b != b'\n')
            .filter(|&&b| b >= 128)
            .count()
            >= 4
    }
}
