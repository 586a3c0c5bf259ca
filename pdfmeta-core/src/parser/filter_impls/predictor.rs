//! Predictor post-processing for FlateDecode and LZWDecode
//!
//! ISO 32000-1 Section 7.4.4.4: TIFF predictor 2 and the PNG predictors 10-15, where
//! every row carries its own PNG filter type byte.

use super::super::objects::PdfDictionary;
use super::super::{ParseError, ParseResult};

/// `/DecodeParms` entries relevant to Flate and LZW
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let defaults = Self::default();
        let Some(dict) = dict else {
            return defaults;
        };
        let positive = |key: &str, default: usize| {
            dict.get_integer(key)
                .and_then(|v| usize::try_from(v).ok())
                .filter(|&v| v > 0)
                .unwrap_or(default)
        };
        Self {
            predictor: dict.get_integer("Predictor").unwrap_or(defaults.predictor),
            colors: positive("Colors", defaults.colors),
            bits_per_component: positive("BitsPerComponent", defaults.bits_per_component),
            columns: positive("Columns", defaults.columns),
            early_change: dict.get_integer("EarlyChange").map_or(true, |v| v != 0),
        }
    }

    fn bytes_per_pixel(&self) -> usize {
        self.colors.saturating_mul(self.bits_per_component).div_ceil(8).max(1)
    }

    fn row_length(&self) -> usize {
        self.colors
            .saturating_mul(self.bits_per_component)
            .saturating_mul(self.columns)
            .div_ceil(8)
    }
}

/// Undo the predictor declared in `params`.
pub fn apply_predictor(data: Vec<u8>, params: &PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data),
        2 => decode_tiff(data, params),
        10..=15 => decode_png(&data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unknown predictor {other}"
        ))),
    }
}

fn decode_png(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let row_length = params.row_length().min(data.len().max(1));
    let bpp = params.bytes_per_pixel();
    let mut out = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_length];
    let mut current = vec![0u8; row_length];

    for chunk in data.chunks(row_length + 1) {
        let (tag, encoded) = (chunk[0], &chunk[1..]);
        for (i, &raw) in encoded.iter().enumerate() {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            current[i] = match tag {
                0 => raw,
                1 => raw.wrapping_add(left),
                2 => raw.wrapping_add(up),
                3 => raw.wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => raw.wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG filter type {other}"
                    )))
                }
            };
        }
        // A short final row is kept as far as it goes
        out.extend_from_slice(&current[..encoded.len()]);
        std::mem::swap(&mut previous, &mut current);
    }
    Ok(out)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn decode_tiff(mut data: Vec<u8>, params: &PredictorParams) -> ParseResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(ParseError::StreamDecodeError(format!(
            "TIFF predictor with {} bits per component",
            params.bits_per_component
        )));
    }
    let colors = params.colors;
    let row_length = params.row_length().max(1);
    for row in data.chunks_mut(row_length) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(data)
}
