//! # pdfmeta
//!
//! A self-contained PDF structure parser that answers document-level questions
//! without rendering anything.
//!
//! ## Features
//!
//! - **Cross-reference resolution**: classic tables, cross-reference streams, hybrid
//!   files, incremental updates and compressed object streams
//! - **Linear-scan recovery**: rebuilds the object index of files whose `startxref` is broken
//! - **Stream filters**: Flate, LZW, ASCIIHex, ASCII85 and RunLength, with PNG/TIFF predictors
//! - **Standard security handler**: RC4 and AES, revisions 2 through 6
//! - **Metadata**: Info dictionary strings, XMP packets, dates, page count, version,
//!   linearization, permissions and viewer preferences
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfmeta::PdfDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = PdfDocument::open("report.pdf", None)?;
//!
//! println!("Title: {}", document.title().unwrap_or_default());
//! println!("Pages: {}", document.total_pages());
//! println!("Version: {}", document.pdf_version());
//!
//! if let Some(created) = document.creation_date() {
//!     println!("Created: {}", created.to_rfc3339());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Encrypted documents
//!
//! ```rust,no_run
//! use pdfmeta::{ErrorCode, PdfDocument};
//!
//! # fn main() {
//! match PdfDocument::open("locked.pdf", Some("secret")) {
//!     Ok(doc) => println!("Permissions: {:?}", doc.permissions()),
//!     Err(e) if e.code() == ErrorCode::Encrypted => println!("Wrong password"),
//!     Err(e) => println!("Cannot open: {e}"),
//! }
//! # }
//! ```

pub mod catalog;
pub mod encryption;
pub mod error;
pub mod parser;
pub mod recovery;

pub use catalog::{PageLayout, PageMode, ViewerPreferences};
pub use encryption::Permissions;
pub use error::{ErrorCode, Result};
pub use parser::{
    DocumentId, DocumentInfo, ParseError, ParseOptions, ParseResult, PdfDocument, PdfVersion,
};

/// Current version of pdfmeta
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
