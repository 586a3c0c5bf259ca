//! LZWDecode (ISO 32000-1 Section 7.4.4)

use super::super::{ParseError, ParseResult};
use tracing::warn;
use weezl::{decode::Decoder, BitOrder};

/// Decode LZW data: MSB-first codes starting at 9 bits.
///
/// `early_change` is the `/EarlyChange` parameter; when set (the default) the code
/// width grows one code early, as TIFF does.
pub fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };

    let mut output = Vec::new();
    let result = decoder.into_vec(&mut output).decode(data);
    match result.status {
        Ok(_) => Ok(output),
        Err(e) if !output.is_empty() => {
            warn!(error = %e, decoded = output.len(), "LZW data corrupt, keeping partial output");
            Ok(output)
        }
        Err(e) => Err(ParseError::StreamDecodeError(format!("LZW decode error: {e}"))),
    }
}
