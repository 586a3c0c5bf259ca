//! PDF date strings
//!
//! `D:YYYYMMDDHHmmSSOHH'mm'` (ISO 32000-1 Section 7.9.4). Every field after the year
//! is optional; the `D:` prefix is accepted but not required.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

/// Parse a PDF date. Returns `None` for anything malformed.
pub fn parse_pdf_date(bytes: &[u8]) -> Option<DateTime<FixedOffset>> {
    let text = std::str::from_utf8(bytes).ok()?.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let mut reader = DateReader {
        bytes: text.as_bytes(),
        pos: 0,
    };

    let year = reader.field(4, 0, 9999).ok()??;
    let month = reader.field(2, 1, 12).ok()?.unwrap_or(1);
    let day = reader.field(2, 1, 31).ok()?.unwrap_or(1);
    let hour = reader.field(2, 0, 23).ok()?.unwrap_or(0);
    let minute = reader.field(2, 0, 59).ok()?.unwrap_or(0);
    // Some producers write 60 for a leap second
    let second = reader.field(2, 0, 60).ok()?.unwrap_or(0).min(59);

    let offset_seconds = match reader.next() {
        None | Some(b'Z') => 0,
        Some(sign @ (b'+' | b'-')) => {
            let hours = reader.field(2, 0, 23).ok()?.unwrap_or(0) as i32;
            reader.skip(b'\'');
            let minutes = reader.field(2, 0, 59).ok()?.unwrap_or(0) as i32;
            let total = hours * 3600 + minutes * 60;
            if sign == b'-' {
                -total
            } else {
                total
            }
        }
        Some(_) => return None,
    };

    let offset = FixedOffset::east_opt(offset_seconds)?;
    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

struct DateReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DateReader<'a> {
    /// `Ok(None)` when the field is absent, `Err` when present but invalid.
    fn field(&mut self, width: usize, min: u32, max: u32) -> Result<Option<u32>, ()> {
        let rest = &self.bytes[self.pos..];
        if rest.is_empty() || !rest[0].is_ascii_digit() {
            return Ok(None);
        }
        if rest.len() < width || !rest[..width].iter().all(u8::is_ascii_digit) {
            return Err(());
        }
        let value = rest[..width]
            .iter()
            .fold(0u32, |acc, &d| acc * 10 + u32::from(d - b'0'));
        if value < min || value > max {
            return Err(());
        }
        self.pos += width;
        Ok(Some(value))
    }

    fn next(&mut self) -> Option<u8> {
        let byte = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, byte: u8) {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
        }
    }
}
