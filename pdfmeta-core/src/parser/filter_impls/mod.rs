//! PDF stream filter implementations
//!
//! The non-trivial decoders behind [`super::filters`], according to
//! ISO 32000-1:2008 Section 7.4

pub mod lzw;
pub mod predictor;
pub mod run_length;

pub use lzw::decode_lzw;
pub use predictor::apply_predictor;
pub use run_length::decode_run_length;
