//! XRef recovery for corrupted PDF files
//!
//! Rebuilds the cross-reference index by scanning the whole file for `N G obj`
//! headers when `startxref` or the sections it leads to cannot be read.

use crate::parser::lexer::{is_regular, is_whitespace, Keyword};
use crate::parser::object_stream::ObjectStream;
use crate::parser::objects::{ObjectId, ObjectParser, PdfDictionary, PdfObject};
use crate::parser::trailer::PdfTrailer;
use crate::parser::xref::{XRefEntry, XRefTable};
use crate::parser::{ParseError, ParseOptions, ParseResult, PdfStream};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Object headers found by the scan
    pub objects_found: usize,
    /// Objects registered from object streams
    pub compressed_objects: usize,
    /// A `trailer` dictionary with `/Root` was found
    pub trailer_found: bool,
}

/// Result of a recovery scan
#[derive(Debug, Clone)]
pub struct RecoveredXRef {
    pub table: XRefTable,
    pub trailer: PdfTrailer,
    pub stats: RecoveryStats,
    /// Object streams found by the scan. In an encrypted file their members are not
    /// in `table` yet: the streams can only be decoded once a key is known.
    pub object_streams: Vec<u32>,
}

/// XRef recovery engine
pub struct XRefRecovery<'a> {
    data: &'a [u8],
    options: &'a ParseOptions,
    /// Object number to (generation, offset); later definitions replace earlier ones
    objects: BTreeMap<u32, (u16, u64)>,
    stats: RecoveryStats,
}

impl<'a> XRefRecovery<'a> {
    pub fn new(data: &'a [u8], options: &'a ParseOptions) -> Self {
        Self {
            data,
            options,
            objects: BTreeMap::new(),
            stats: RecoveryStats::default(),
        }
    }

    /// Scan the file and build an index and trailer from what was found.
    pub fn recover(mut self) -> ParseResult<RecoveredXRef> {
        self.scan_objects();
        if self.objects.is_empty() {
            return Err(ParseError::DamagedDocument(
                "no object definitions found by recovery scan".to_string(),
            ));
        }

        let mut table = XRefTable::new();
        for (&number, &(generation, offset)) in &self.objects {
            table.insert(number, XRefEntry::InUse { offset, generation });
        }

        let parser = ObjectParser::new(self.data)
            .with_max_depth(self.options.max_nesting_depth)
            .with_lenient(true);
        let mut catalog: Option<ObjectId> = None;
        let mut stream_trailer: Option<PdfDictionary> = None;
        let mut object_streams: Vec<(u32, PdfStream)> = Vec::new();

        for (&number, &(generation, offset)) in &self.objects {
            let object = match parser.parse_indirect_object(offset as usize) {
                Ok((_, object, _)) => object,
                Err(e) => {
                    debug!(obj = number, offset, error = %e, "recovered object does not parse");
                    continue;
                }
            };
            match object {
                PdfObject::Stream(stream) if stream.dict.get_type() == Some("ObjStm") => {
                    object_streams.push((number, stream));
                }
                other => {
                    let Some(dict) = other.as_dict() else {
                        continue;
                    };
                    match dict.get_type() {
                        Some("Catalog") => catalog = Some((number, generation)),
                        Some("XRef") if dict.contains_key("Root") => stream_trailer = Some(dict.clone()),
                        _ => {}
                    }
                }
            }
        }

        let trailer_dict = match self.find_trailer(&parser) {
            Some(dict) => {
                self.stats.trailer_found = true;
                dict
            }
            None => match (stream_trailer, catalog) {
                (Some(dict), _) => dict,
                (None, Some((num, gen))) => {
                    let mut dict = PdfDictionary::new();
                    dict.insert("Root", PdfObject::Reference(num, gen));
                    dict
                }
                (None, None) => {
                    return Err(ParseError::DamagedDocument(
                        "recovery scan found no trailer and no catalog".to_string(),
                    ))
                }
            },
        };

        let mut trailer = PdfTrailer::from_dict(trailer_dict, 0, false);
        // The scan replaces the whole chain
        trailer.prev = None;
        trailer.xref_stm = None;
        table.insert(0, XRefEntry::free());

        if trailer.is_encrypted() {
            debug!(streams = object_streams.len(), "object streams deferred until the file is unlocked");
        } else {
            for (number, stream) in &object_streams {
                match ObjectStream::parse(stream, self.options.max_nesting_depth) {
                    Ok(objects) => {
                        self.stats.compressed_objects += register_object_stream(&mut table, *number, &objects);
                    }
                    Err(e) => warn!(obj = number, error = %e, "object stream unreadable during recovery"),
                }
            }
        }

        warn!(
            objects = self.stats.objects_found,
            compressed = self.stats.compressed_objects,
            trailer_found = self.stats.trailer_found,
            "rebuilt cross-reference index by linear scan"
        );
        Ok(RecoveredXRef {
            table,
            trailer,
            stats: self.stats,
            object_streams: object_streams.into_iter().map(|(number, _)| number).collect(),
        })
    }

    /// Record every `N G obj` header in the file.
    fn scan_objects(&mut self) {
        let data = self.data;
        let keyword = Keyword::Obj.as_str().as_bytes();
        let mut pos = 0;

        while let Some(found) = find_from(data, keyword, pos) {
            pos = found + keyword.len();
            if data.get(pos).is_some_and(|&b| is_regular(b)) {
                continue;
            }
            if let Some((number, generation, start)) = header_before(data, found) {
                self.objects.insert(number, (generation, start as u64));
                self.stats.objects_found += 1;
            }
        }
    }

    /// The last `trailer` dictionary in the file that names a catalog.
    fn find_trailer(&self, parser: &ObjectParser<'_>) -> Option<PdfDictionary> {
        let keyword = Keyword::Trailer.as_str().as_bytes();
        let mut pos = 0;
        let mut last = None;

        while let Some(found) = find_from(self.data, keyword, pos) {
            pos = found + keyword.len();
            if let Ok((PdfObject::Dictionary(dict), _)) = parser.parse_object(pos) {
                if dict.get("Root").and_then(|r| r.as_reference()).is_some() {
                    last = Some(dict);
                }
            }
        }
        last
    }
}

/// Add the members of a decoded object stream that have no entry yet; returns
/// how many were added.
pub fn register_object_stream(table: &mut XRefTable, stream_number: u32, objects: &ObjectStream) -> usize {
    let mut added = 0;
    for (index, &number) in objects.object_numbers().iter().enumerate() {
        if table.get(number).is_some() {
            continue;
        }
        let Ok(index) = u32::try_from(index) else {
            break;
        };
        table.insert(number, XRefEntry::Compressed { stream_number, index });
        added += 1;
    }
    added
}

/// Rebuild the index of `data` by linear scan.
pub fn recover_xref(data: &[u8], options: &ParseOptions) -> ParseResult<RecoveredXRef> {
    XRefRecovery::new(data, options).recover()
}

fn find_from(data: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|p| from + p)
}

/// Parse `N G ` immediately before the `obj` keyword at `keyword_pos`.
fn header_before(data: &[u8], keyword_pos: usize) -> Option<(u32, u16, usize)> {
    let skip_ws = |mut i: usize| {
        while i > 0 && is_whitespace(data[i - 1]) {
            i -= 1;
        }
        i
    };
    let digits = |end: usize| {
        let mut i = end;
        while i > 0 && data[i - 1].is_ascii_digit() {
            i -= 1;
        }
        (i < end).then_some(i)
    };

    let gen_end = skip_ws(keyword_pos);
    if gen_end == keyword_pos {
        return None;
    }
    let gen_start = digits(gen_end)?;
    let num_end = skip_ws(gen_start);
    if num_end == gen_start {
        return None;
    }
    let num_start = digits(num_end)?;
    if num_start > 0 && is_regular(data[num_start - 1]) {
        return None;
    }

    let number = std::str::from_utf8(&data[num_start..num_end]).ok()?.parse().ok()?;
    let generation = std::str::from_utf8(&data[gen_start..gen_end]).ok()?.parse().ok()?;
    Some((number, generation, num_start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_before() {
        let data = b"junk\n12 0 obj << >>";
        assert_eq!(header_before(data, 10), Some((12, 0, 5)));

        let data = b"456 15 obj";
        assert_eq!(header_before(data, 7), Some((456, 15, 0)));

        // "endobj" is not a header
        let data = b"1 0 obj 5 endobj";
        assert_eq!(header_before(data, 13), None);

        // Digits glued to a preceding word
        let data = b"x12 0 obj";
        assert_eq!(header_before(data, 6), None);
    }

    #[test]
    fn test_recover_with_trailer() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\ntrailer\n<< /Root 1 0 R /Size 3 >>\nstartxref\n999999\n%%EOF";
        let recovered = recover_xref(data, &ParseOptions::default()).unwrap();
        assert_eq!(recovered.stats.objects_found, 2);
        assert!(recovered.stats.trailer_found);
        assert_eq!(recovered.trailer.root().unwrap(), (1, 0));
        assert_eq!(
            recovered.table.get(1),
            Some(&XRefEntry::InUse {
                offset: 9,
                generation: 0
            })
        );
        assert_eq!(recovered.table.get(0), Some(&XRefEntry::free()));
    }

    #[test]
    fn test_later_definition_wins() {
        let data = b"%PDF-1.4\n1 0 obj\n(old)\nendobj\n1 0 obj\n(new)\nendobj\n";
        let options = ParseOptions::default();
        let mut recovery = XRefRecovery::new(data, &options);
        recovery.scan_objects();
        assert_eq!(recovery.objects.get(&1), Some(&(0, 30)));
    }

    #[test]
    fn test_catalog_without_trailer() {
        let data = b"%PDF-1.7\n4 0 obj\n<< /Type /Catalog /Pages 5 0 R >>\nendobj\n5 0 obj\n<< /Type /Pages /Count 1 /Kids [] >>\nendobj\n";
        let recovered = recover_xref(data, &ParseOptions::default()).unwrap();
        assert!(!recovered.stats.trailer_found);
        assert_eq!(recovered.trailer.root().unwrap(), (4, 0));
    }

    #[test]
    fn test_nothing_to_recover() {
        assert!(matches!(
            recover_xref(b"%PDF-1.4\nnot a pdf body", &ParseOptions::default()),
            Err(ParseError::DamagedDocument(_))
        ));
        assert!(matches!(
            recover_xref(b"%PDF-1.4\n1 0 obj\n42\nendobj\n", &ParseOptions::default()),
            Err(ParseError::DamagedDocument(_))
        ));
    }

    #[test]
    fn test_object_stream_members_registered() {
        let header = "10 0 11 5 ";
        let body = "(ten) (eleven)";
        let stream = format!("{header}{body}");
        let data = format!(
            "%PDF-1.5\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n3 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{stream}\nendstream\nendobj\ntrailer\n<< /Root 1 0 R >>\n",
            header.len(),
            stream.len()
        );
        let recovered = recover_xref(data.as_bytes(), &ParseOptions::default()).unwrap();
        assert_eq!(recovered.stats.compressed_objects, 2);
        assert_eq!(recovered.object_streams, vec![3]);
        assert_eq!(
            recovered.table.get(11),
            Some(&XRefEntry::Compressed {
                stream_number: 3,
                index: 1
            })
        );
    }
}
