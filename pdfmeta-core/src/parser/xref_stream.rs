//! Cross-reference stream support for PDF 1.5+
//!
//! This module implements cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8 (Cross-Reference Streams).

use super::objects::{PdfDictionary, PdfStream};
use super::xref_types::{XRefEntry, XRefEntryType};
use super::{ParseError, ParseResult};
use tracing::warn;

/// Decoded cross-reference stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    /// Field widths from the W array
    pub widths: [usize; 3],
    /// Index array (pairs of [first_object_number, count])
    pub index: Vec<(u32, u32)>,
    /// Decoded stream data
    pub data: Vec<u8>,
}

impl XRefStream {
    /// Decode a cross-reference stream object.
    pub fn parse(stream: &PdfStream) -> ParseResult<Self> {
        let widths = parse_widths(&stream.dict)?;
        let index = parse_index(&stream.dict)?;
        let data = stream.decode()?;
        Ok(XRefStream {
            widths,
            index,
            data,
        })
    }

    /// Rows of the stream as `(object number, entry)` pairs.
    ///
    /// A truncated stream yields the rows that are complete.
    pub fn entries(&self) -> Vec<(u32, XRefEntry)> {
        let row_size: usize = self.widths.iter().sum();
        let mut entries = Vec::new();
        if row_size == 0 {
            return entries;
        }

        let mut rows = self.data.chunks_exact(row_size);
        for &(first, count) in &self.index {
            for i in 0..count {
                let Some(row) = rows.next() else {
                    warn!(
                        expected = self.index.iter().map(|&(_, c)| c as u64).sum::<u64>(),
                        read = entries.len(),
                        "xref stream data truncated"
                    );
                    return entries;
                };
                let Some(number) = first.checked_add(i) else {
                    return entries;
                };

                let (type_bytes, rest) = row.split_at(self.widths[0]);
                let (field2, field3) = rest.split_at(self.widths[1]);
                // A zero-width type field defaults to type 1
                let kind = if self.widths[0] == 0 {
                    XRefEntryType::Uncompressed
                } else {
                    XRefEntryType::from_value(read_field(type_bytes))
                };
                entries.push((
                    number,
                    XRefEntry::from_stream_fields(kind, read_field(field2), read_field(field3)),
                ));
            }
        }
        entries
    }
}

fn parse_widths(dict: &PdfDictionary) -> ParseResult<[usize; 3]> {
    let array = dict
        .get("W")
        .and_then(|obj| obj.as_array())
        .ok_or_else(|| ParseError::MissingRequiredEntry("W array in xref stream".to_string()))?;
    if array.len() != 3 {
        return Err(ParseError::syntax(
            0,
            format!("W array must have 3 elements, found {}", array.len()),
        ));
    }

    let mut widths = [0usize; 3];
    for (slot, obj) in widths.iter_mut().zip(array.iter()) {
        *slot = obj
            .as_integer()
            .and_then(|w| usize::try_from(w).ok())
            .filter(|&w| w <= 8)
            .ok_or_else(|| ParseError::syntax(0, "Invalid width in W array"))?;
    }
    Ok(widths)
}

fn parse_index(dict: &PdfDictionary) -> ParseResult<Vec<(u32, u32)>> {
    let as_u32 = |value: Option<i64>, what: &str| {
        value
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ParseError::syntax(0, format!("Invalid {what} in xref stream")))
    };

    match dict.get("Index").and_then(|obj| obj.as_array()) {
        Some(array) => array
            .0
            .chunks_exact(2)
            .map(|pair| {
                Ok((
                    as_u32(pair[0].as_integer(), "first object number in Index")?,
                    as_u32(pair[1].as_integer(), "count in Index")?,
                ))
            })
            .collect(),
        None => {
            let size = dict
                .get_integer("Size")
                .ok_or_else(|| ParseError::MissingRequiredEntry("Size in xref stream".to_string()))?;
            Ok(vec![(0, as_u32(Some(size), "Size")?)])
        }
    }
}

/// Big-endian unsigned field
fn read_field(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
