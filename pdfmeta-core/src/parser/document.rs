//! PDF Document - read-only query surface
//!
//! A [`PdfDocument`] answers document-level questions: Info dictionary strings,
//! XMP metadata, dates, page count, version, linearization, encryption and
//! viewer settings.
//!
//! Everything needed to answer the cheap questions is computed when the document
//! is opened. The XMP stream is resolved on first request, through the reader's
//! object cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfmeta::{ParseOptions, PdfDocument};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open_with_options("scan.pdf", None, ParseOptions::strict())?;
//! println!("{} ({} pages)", document.pdf_version_string(), document.total_pages());
//! if let Some(id) = document.id() {
//!     println!("Permanent ID: {}", id.permanent_hex());
//! }
//! # Ok(())
//! # }
//! ```

use super::date::parse_pdf_date;
use super::header::PdfVersion;
use super::linearization::LinearizationParams;
use super::objects::{PdfDictionary, PdfObject};
use super::page_tree::page_count;
use super::reader::PdfReader;
use super::source::ByteSource;
use super::{ParseError, ParseOptions, ParseResult};
use crate::catalog::{PageLayout, PageMode, ViewerPreferences};
use crate::encryption::Permissions;
use chrono::{DateTime, FixedOffset};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// The trailer `/ID` pair
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DocumentId {
    /// Set when the file was first created
    pub permanent: Vec<u8>,
    /// Changed by every update
    pub update: Vec<u8>,
}

impl DocumentId {
    pub fn permanent_hex(&self) -> String {
        hex::encode(&self.permanent)
    }

    pub fn update_hex(&self) -> String {
        hex::encode(&self.update)
    }
}

/// Every document-level property at once
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<FixedOffset>>,
    pub modification_date: Option<DateTime<FixedOffset>>,
    pub pdf_version: PdfVersion,
    pub total_pages: u32,
    pub is_linearized: bool,
    pub is_encrypted: bool,
    pub permissions: Permissions,
    pub page_layout: PageLayout,
    pub page_mode: PageMode,
    pub viewer_preferences: ViewerPreferences,
    pub id: Option<DocumentId>,
}

/// An opened PDF document
pub struct PdfDocument {
    reader: PdfReader,
    catalog: PdfDictionary,
    info: Option<Arc<PdfObject>>,
    total_pages: u32,
    version: PdfVersion,
    linearization: Option<LinearizationParams>,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("total_pages", &self.total_pages)
            .field("encrypted", &self.is_encrypted())
            .field("linearized", &self.is_linearized())
            .finish()
    }
}

impl PdfDocument {
    /// Open a file with default options.
    pub fn open<P: AsRef<Path>>(path: P, password: Option<&str>) -> ParseResult<Self> {
        Self::open_with_options(path, password, ParseOptions::default())
    }

    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        password: Option<&str>,
        options: ParseOptions,
    ) -> ParseResult<Self> {
        let source = ByteSource::open(path, options.mmap_threshold)?;
        Self::from_source(source, password, options)
    }

    /// Open a document held in memory.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, password: Option<&str>) -> ParseResult<Self> {
        Self::from_bytes_with_options(bytes, password, ParseOptions::default())
    }

    pub fn from_bytes_with_options(
        bytes: impl Into<Vec<u8>>,
        password: Option<&str>,
        options: ParseOptions,
    ) -> ParseResult<Self> {
        Self::from_source(ByteSource::from_bytes(bytes), password, options)
    }

    fn from_source(source: ByteSource, password: Option<&str>, options: ParseOptions) -> ParseResult<Self> {
        let max_depth = options.max_nesting_depth;
        let reader = PdfReader::new(source, options, password)?;

        let catalog = reader
            .catalog()?
            .as_dict()
            .cloned()
            .ok_or_else(|| ParseError::MissingRequiredEntry("Root".to_string()))?;
        let total_pages = page_count(&reader, &catalog)?;

        let info = reader.info().unwrap_or_else(|e| {
            warn!(error = %e, "Info dictionary unreadable");
            None
        });

        let header_version = reader.version();
        let version = match catalog.get_name("Version").and_then(PdfVersion::parse) {
            Some(declared) if declared > header_version => declared,
            _ => header_version,
        };

        let linearization = LinearizationParams::detect(reader.source().as_slice(), max_depth);

        debug!(
            version = %version,
            pages = total_pages,
            encrypted = reader.is_encrypted(),
            "document opened"
        );
        Ok(PdfDocument {
            reader,
            catalog,
            info,
            total_pages,
            version,
            linearization,
        })
    }

    /// The object-level reader beneath this document
    pub fn reader(&self) -> &PdfReader {
        &self.reader
    }

    /// The catalog dictionary
    pub fn catalog(&self) -> &PdfDictionary {
        &self.catalog
    }

    fn info_dict(&self) -> Option<&PdfDictionary> {
        self.info.as_deref().and_then(|info| info.as_dict())
    }

    /// A resolved Info dictionary string, decoded as text
    fn info_text(&self, key: &str) -> Option<String> {
        let info = self.info_dict()?;
        match self.reader.resolve_entry(info, key) {
            Ok(Some(value)) => match value.as_string() {
                Some(text) => Some(text.to_text()),
                None => {
                    warn!(key, "Info entry is not a string");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Info entry unreadable");
                None
            }
        }
    }

    fn info_date(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        let text = self.info_text(key)?;
        let date = parse_pdf_date(text.as_bytes());
        if date.is_none() {
            debug!(key, value = %text, "malformed date");
        }
        date
    }

    pub fn title(&self) -> Option<String> {
        self.info_text("Title")
    }

    pub fn author(&self) -> Option<String> {
        self.info_text("Author")
    }

    pub fn subject(&self) -> Option<String> {
        self.info_text("Subject")
    }

    pub fn keywords(&self) -> Option<String> {
        self.info_text("Keywords")
    }

    pub fn creator(&self) -> Option<String> {
        self.info_text("Creator")
    }

    pub fn producer(&self) -> Option<String> {
        self.info_text("Producer")
    }

    pub fn creation_date(&self) -> Option<DateTime<FixedOffset>> {
        self.info_date("CreationDate")
    }

    pub fn modification_date(&self) -> Option<DateTime<FixedOffset>> {
        self.info_date("ModDate")
    }

    /// The XMP packet from the catalog's `/Metadata` stream
    pub fn metadata(&self) -> Option<String> {
        let stream = match self.reader.resolve_entry(self.catalog(), "Metadata") {
            Ok(Some(object)) => object,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "metadata stream unreadable");
                return None;
            }
        };
        let Some(stream) = stream.as_stream() else {
            warn!("/Metadata is not a stream");
            return None;
        };
        match stream.decode() {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(error = %e, "metadata stream could not be decoded");
                None
            }
        }
    }

    /// Number of pages, from the page tree
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Header version, raised by a higher catalog `/Version`
    pub fn pdf_version(&self) -> PdfVersion {
        self.version
    }

    /// The version as `PDF-M.N`
    pub fn pdf_version_string(&self) -> String {
        format!("PDF-{}", self.version)
    }

    pub fn linearization(&self) -> Option<&LinearizationParams> {
        self.linearization.as_ref()
    }

    /// The first object is a linearization dictionary whose `/L` matches the file length
    pub fn is_linearized(&self) -> bool {
        self.linearization
            .as_ref()
            .is_some_and(|params| params.matches_length(self.reader.source().len()))
    }

    pub fn is_encrypted(&self) -> bool {
        self.reader.is_encrypted()
    }

    /// Decoded `/P`; everything is allowed in an unencrypted document
    pub fn permissions(&self) -> Permissions {
        self.reader
            .security()
            .map_or(Permissions::FULL, |security| security.permissions())
    }

    /// The raw signed `/P` value, if the document is encrypted
    pub fn permissions_p_value(&self) -> Option<i32> {
        self.reader.security().map(|security| security.encryption().p)
    }

    pub fn page_layout(&self) -> PageLayout {
        PageLayout::from_catalog(self.catalog())
    }

    pub fn page_mode(&self) -> PageMode {
        PageMode::from_catalog(self.catalog())
    }

    pub fn viewer_preferences(&self) -> ViewerPreferences {
        match self.reader.resolve_entry(self.catalog(), "ViewerPreferences") {
            Ok(Some(object)) => object
                .as_dict()
                .map_or_else(ViewerPreferences::empty, ViewerPreferences::from_dict),
            Ok(None) => ViewerPreferences::empty(),
            Err(e) => {
                warn!(error = %e, "viewer preferences unreadable");
                ViewerPreferences::empty()
            }
        }
    }

    pub fn id(&self) -> Option<DocumentId> {
        self.reader
            .trailer()
            .id()
            .map(|(permanent, update)| DocumentId { permanent, update })
    }

    /// Collect every getter's result.
    pub fn info(&self) -> DocumentInfo {
        DocumentInfo {
            title: self.title(),
            author: self.author(),
            subject: self.subject(),
            keywords: self.keywords(),
            creator: self.creator(),
            producer: self.producer(),
            creation_date: self.creation_date(),
            modification_date: self.modification_date(),
            pdf_version: self.pdf_version(),
            total_pages: self.total_pages(),
            is_linearized: self.is_linearized(),
            is_encrypted: self.is_encrypted(),
            permissions: self.permissions(),
            page_layout: self.page_layout(),
            page_mode: self.page_mode(),
            viewer_preferences: self.viewer_preferences(),
            id: self.id(),
        }
    }
}
