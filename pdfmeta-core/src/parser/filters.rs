//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-1 Section 7.4

use super::filter_impls::{apply_predictor, decode_lzw, decode_run_length, predictor::PredictorParams};
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use tracing::warn;

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    LZWDecode,
    /// Flate decode (zlib/deflate compression)
    FlateDecode,
    RunLengthDecode,
    /// Image filters; recognised but never decoded here
    CCITTFaxDecode,
    JBIG2Decode,
    DCTDecode,
    JPXDecode,
    /// Crypt filter; decryption itself happens before decoding
    Crypt,
}

impl Filter {
    /// Parse filter from name, including the inline-image abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }
}

/// The `/Filter` chain of a stream paired with its `/DecodeParms`
pub fn filter_chain(dict: &PdfDictionary) -> ParseResult<Vec<(Filter, Option<&PdfDictionary>)>> {
    let names: Vec<&str> = match dict.get("Filter") {
        None => return Ok(Vec::new()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array
            .iter()
            .map(|obj| {
                obj.as_name()
                    .map(|n| n.as_str())
                    .ok_or_else(|| ParseError::StreamDecodeError("Invalid filter in array".to_string()))
            })
            .collect::<ParseResult<_>>()?,
        Some(_) => return Err(ParseError::StreamDecodeError("Invalid Filter type".to_string())),
    };

    let params = dict.get("DecodeParms").or_else(|| dict.get("DP"));
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let filter =
                Filter::from_name(name).ok_or_else(|| ParseError::UnsupportedFilter(name.to_string()))?;
            let parms = match params {
                Some(PdfObject::Dictionary(d)) if i == 0 => Some(d),
                Some(PdfObject::Array(array)) => array.get(i).and_then(|p| p.as_dict()),
                _ => None,
            };
            Ok((filter, parms))
        })
        .collect()
}

/// Decode stream data according to its filter chain
pub fn decode_stream(dict: &PdfDictionary, data: &[u8]) -> ParseResult<Vec<u8>> {
    let chain = filter_chain(dict)?;
    let mut result = data.to_vec();
    for (filter, parms) in chain {
        result = apply_filter(result, filter, parms)?;
    }
    Ok(result)
}

/// Apply a single filter to data
pub fn apply_filter(data: Vec<u8>, filter: Filter, parms: Option<&PdfDictionary>) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => {
            let params = PredictorParams::from_dict(parms);
            apply_predictor(decode_flate(&data)?, &params)
        }
        Filter::LZWDecode => {
            let params = PredictorParams::from_dict(parms);
            apply_predictor(decode_lzw(&data, params.early_change)?, &params)
        }
        Filter::ASCIIHexDecode => decode_ascii_hex(&data),
        Filter::ASCII85Decode => decode_ascii85(&data),
        Filter::RunLengthDecode => Ok(decode_run_length(&data)),
        Filter::Crypt => match parms.and_then(|p| p.get_name("Name")) {
            None | Some("Identity") => Ok(data),
            Some(other) => Err(ParseError::UnsupportedFilter(format!("Crypt/{other}"))),
        },
        Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode => {
            Err(ParseError::UnsupportedFilter(format!("{filter:?}")))
        }
    }
}

/// Decode FlateDecode data: zlib, then raw deflate. Output decoded before a
/// corruption is kept.
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let zlib_error = match ZlibDecoder::new(data).read_to_end(&mut result) {
        Ok(_) => return Ok(result),
        Err(e) => e,
    };

    let mut raw = Vec::new();
    if DeflateDecoder::new(data).read_to_end(&mut raw).is_ok() {
        return Ok(raw);
    }

    if !result.is_empty() {
        warn!(error = %zlib_error, decoded = result.len(), "Flate data corrupt, keeping partial output");
        return Ok(result);
    }
    Err(ParseError::StreamDecodeError(format!("Flate decode error: {zlib_error}")))
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    warn!("FlateDecode requires the 'compression' feature");
    Err(ParseError::UnsupportedFilter("FlateDecode".to_string()))
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;

    for &ch in data.iter().filter(|&&b| !super::lexer::is_whitespace(b)) {
        if ch == b'>' {
            break;
        }
        let value = hex_digit_value(ch)
            .ok_or_else(|| ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char)))?;
        match pending.take() {
            Some(high) => result.push((high << 4) | value),
            None => pending = Some(value),
        }
    }
    // Odd number of digits: the last one is followed by an implicit 0
    if let Some(high) = pending {
        result.push(high << 4);
    }
    Ok(result)
}

fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut filled = 0;

    let body = data.strip_prefix(b"<~").unwrap_or(data);
    let mut chars = body.iter().copied().filter(|&b| !super::lexer::is_whitespace(b));

    while let Some(c) = chars.next() {
        match c {
            b'~' => {
                if chars.next() != Some(b'>') {
                    return Err(ParseError::StreamDecodeError(
                        "Invalid ASCII85 end marker".to_string(),
                    ));
                }
                break;
            }
            b'z' if filled == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[filled] = c - b'!';
                filled += 1;
                if filled == 5 {
                    result.extend_from_slice(&group_value(&group)?.to_be_bytes());
                    filled = 0;
                }
            }
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    c as char
                )))
            }
        }
    }

    match filled {
        0 => {}
        1 => {
            return Err(ParseError::StreamDecodeError(
                "ASCII85 final group has a single character".to_string(),
            ))
        }
        n => {
            // Pad with 'u' and keep n - 1 bytes
            group[n..].fill(b'u' - b'!');
            result.extend_from_slice(&group_value(&group)?.to_be_bytes()[..n - 1]);
        }
    }

    Ok(result)
}

fn group_value(group: &[u8; 5]) -> ParseResult<u32> {
    let value = group.iter().fold(0u64, |acc, &d| acc * 85 + u64::from(d));
    u32::try_from(value).map_err(|_| ParseError::StreamDecodeError("ASCII85 group overflows".to_string()))
}
