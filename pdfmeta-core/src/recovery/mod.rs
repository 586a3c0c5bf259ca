//! PDF error recovery
//!
//! When the cross-reference chain cannot be read, the object index is rebuilt
//! from a linear scan of the file. Recovery is itself allowed to fail; the reader
//! then reports [`ParseError::DamagedDocument`](crate::parser::ParseError::DamagedDocument).
//!
//! # Example
//!
//! ```rust
//! use pdfmeta::recovery::recover_xref;
//! use pdfmeta::ParseOptions;
//!
//! let damaged = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\nstartxref\n0\n";
//! let recovered = recover_xref(damaged, &ParseOptions::default()).unwrap();
//! assert_eq!(recovered.trailer.root().unwrap(), (1, 0));
//! ```

pub mod xref_recovery;

pub use xref_recovery::{recover_xref, register_object_stream, RecoveredXRef, RecoveryStats, XRefRecovery};
