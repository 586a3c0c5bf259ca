//! Text string decoding
//!
//! PDF text strings (ISO 32000-1 Section 7.9.2.2) are UTF-16BE when they start
//! with a byte order mark, UTF-8 when they start with the UTF-8 BOM (PDF 2.0), and
//! PDFDocEncoding otherwise.

/// PDFDocEncoding code points for bytes 0x18..=0x1F
const PDF_DOC_0X18: [char; 8] = [
    '\u{02D8}', '\u{02C7}', '\u{02C6}', '\u{02D9}', '\u{02DD}', '\u{02DB}', '\u{02DA}', '\u{02DC}',
];

/// PDFDocEncoding code points for bytes 0x80..=0xA0
const PDF_DOC_0X80: [char; 33] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
    '\u{20AC}',
];

/// Decode a PDF text string into Unicode.
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        // Non-conforming but common
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => bytes.iter().map(|&b| pdf_doc_char(b)).collect(),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    strip_language_escapes(&String::from_utf16_lossy(&units))
}

/// Remove `ESC lang [country] ESC` markers embedded in UTF-16 text strings.
fn strip_language_escapes(text: &str) -> String {
    if !text.contains('\u{1B}') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut in_escape = false;
    for ch in text.chars() {
        if ch == '\u{1B}' {
            in_escape = !in_escape;
        } else if !in_escape {
            out.push(ch);
        }
    }
    out
}

/// Map one PDFDocEncoding byte to its character.
pub fn pdf_doc_char(byte: u8) -> char {
    match byte {
        0x18..=0x1F => PDF_DOC_0X18[(byte - 0x18) as usize],
        0x7F => '\u{FFFD}',
        0x80..=0xA0 => PDF_DOC_0X80[(byte - 0x80) as usize],
        _ => byte as char,
    }
}

/// Encode text as PDFDocEncoding; `None` if some character has no code.
pub fn encode_pdf_doc(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|ch| {
            let code = ch as u32;
            match code {
                0x00..=0x17 | 0x20..=0x7E | 0xA1..=0xFF => Some(code as u8),
                _ => PDF_DOC_0X18
                    .iter()
                    .position(|&c| c == ch)
                    .map(|i| 0x18 + i as u8)
                    .or_else(|| {
                        PDF_DOC_0X80
                            .iter()
                            .position(|&c| c == ch && c != '\u{FFFD}')
                            .map(|i| 0x80 + i as u8)
                    }),
            }
        })
        .collect()
}
