//! Object-level PDF Reader
//!
//! Owns the byte source and the merged cross-reference index, and resolves
//! indirect objects on demand. Resolved objects are cached behind a single lock
//! and shared as `Arc<PdfObject>`; a cached object is never replaced.

use super::header::{PdfHeader, PdfVersion, HEADER_SEARCH_WINDOW};
use super::object_stream::ObjectStream;
use super::objects::{LengthResolver, ObjectId, ObjectParser, PdfDictionary, PdfObject, PdfString};
use super::source::ByteSource;
use super::trailer::PdfTrailer;
use super::xref::{XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use crate::encryption::{EncryptionDict, SecurityHandler, StandardSecurityHandler};
use crate::recovery::{recover_xref, register_object_stream, RecoveredXRef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Default)]
struct ObjectCache {
    objects: HashMap<ObjectId, Arc<PdfObject>>,
    streams: HashMap<u32, Arc<ObjectStream>>,
}

/// Where the object index came from
struct Index {
    xref: XRefTable,
    trailer: PdfTrailer,
    sections: usize,
    recovered: bool,
    /// Object streams whose members still need registering once the file is unlocked
    deferred_streams: Vec<u32>,
}

impl Index {
    fn from_recovery(recovered: RecoveredXRef) -> Self {
        Index {
            xref: recovered.table,
            trailer: recovered.trailer,
            sections: 0,
            recovered: true,
            deferred_streams: recovered.object_streams,
        }
    }
}

/// Low-level PDF reader
pub struct PdfReader {
    source: ByteSource,
    header: Option<PdfHeader>,
    xref: XRefTable,
    trailer: PdfTrailer,
    sections: usize,
    recovered: bool,
    options: ParseOptions,
    security: Option<SecurityHandler>,
    /// The `/Encrypt` dictionary object, which is never itself encrypted
    encrypt_id: Option<ObjectId>,
    cache: Mutex<ObjectCache>,
}

impl std::fmt::Debug for PdfReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfReader")
            .field("source", &self.source)
            .field("version", &self.version())
            .field("objects", &self.xref.len())
            .field("sections", &self.sections)
            .field("recovered", &self.recovered)
            .field("encrypted", &self.security.is_some())
            .finish()
    }
}

impl PdfReader {
    /// Index `source` and, when it is encrypted, unlock it with `password` (or the
    /// empty user password).
    pub fn new(source: ByteSource, options: ParseOptions, password: Option<&str>) -> ParseResult<Self> {
        // Room for the version line and binary marker after a late header
        let head_len = source.as_slice().len().min(HEADER_SEARCH_WINDOW * 2);
        let header = match PdfHeader::parse(source.read(0, head_len)?) {
            Ok(header) => Some(header),
            Err(e) if options.strict_mode => return Err(e),
            Err(_) => {
                warn!("no %PDF- header in the first kilobyte, assuming version 1.0");
                None
            }
        };

        let index = Self::load_index(&source, &options)?;
        let deferred_streams = index.deferred_streams;
        let mut reader = PdfReader {
            source,
            header,
            xref: index.xref,
            trailer: index.trailer,
            sections: index.sections,
            recovered: index.recovered,
            options,
            security: None,
            encrypt_id: None,
            cache: Mutex::new(ObjectCache::default()),
        };
        reader.unlock(password)?;
        reader.register_deferred_streams(&deferred_streams);

        if !reader.recovered && reader.options.recover_xref {
            if let Err(e) = reader.catalog() {
                if !matches!(e, ParseError::MissingRequiredEntry(_)) {
                    warn!(error = %e, "catalog unreadable through the xref index, scanning file");
                    let recovered = recover_xref(reader.source.as_slice(), &reader.options).map_err(|re| {
                        ParseError::DamagedDocument(format!("{e}; recovery scan failed: {re}"))
                    })?;
                    let deferred_streams = recovered.object_streams.clone();
                    reader.replace_index(Index::from_recovery(recovered));
                    reader.unlock(password)?;
                    reader.register_deferred_streams(&deferred_streams);
                }
            }
        }

        debug!(
            objects = reader.xref.len(),
            sections = reader.sections,
            recovered = reader.recovered,
            encrypted = reader.security.is_some(),
            "reader ready"
        );
        Ok(reader)
    }

    fn load_index(source: &ByteSource, options: &ParseOptions) -> ParseResult<Index> {
        match XRefTable::load(source, options) {
            Ok((xref, chain)) => Ok(Index {
                xref,
                trailer: chain.merged(),
                sections: chain.all().len(),
                recovered: false,
                deferred_streams: Vec::new(),
            }),
            Err(e @ ParseError::CircularXRef { .. }) => Err(e),
            Err(e) if options.recover_xref => {
                warn!(error = %e, "cross-reference chain unreadable, scanning file");
                let recovered = recover_xref(source.as_slice(), options)
                    .map_err(|re| ParseError::DamagedDocument(format!("{e}; recovery scan failed: {re}")))?;
                Ok(Index::from_recovery(recovered))
            }
            Err(e) => Err(e),
        }
    }

    fn replace_index(&mut self, index: Index) {
        self.xref = index.xref;
        self.trailer = index.trailer;
        self.sections = index.sections;
        self.recovered = index.recovered;
        self.security = None;
        self.encrypt_id = None;
        *self.lock_cache() = ObjectCache::default();
    }

    /// Authenticate and install the security handler before any other object is loaded.
    fn unlock(&mut self, password: Option<&str>) -> ParseResult<()> {
        let Some(encrypt) = self.trailer.encrypt().cloned() else {
            return Ok(());
        };

        let encrypt_dict = match &encrypt {
            PdfObject::Reference(num, gen) => {
                self.encrypt_id = Some((*num, *gen));
                self.get_object((*num, *gen))?
            }
            direct => Arc::new(direct.clone()),
        };
        let dict = encrypt_dict
            .as_dict()
            .ok_or_else(|| ParseError::MissingRequiredEntry("Encrypt dictionary".to_string()))?;

        let encryption = EncryptionDict::from_dict(dict)?;
        let id = self.trailer.id().map(|(first, _)| first).unwrap_or_default();
        let key = StandardSecurityHandler::try_open(&encryption, &id, password.unwrap_or(""))?;
        self.security = Some(SecurityHandler::new(encryption, key));

        // Drop everything loaded before decryption was possible
        *self.lock_cache() = ObjectCache::default();
        Ok(())
    }

    /// Register members of object streams the recovery scan could not decode
    /// before the security handler existed.
    fn register_deferred_streams(&mut self, numbers: &[u32]) {
        if self.security.is_none() || numbers.is_empty() {
            return;
        }
        let mut added = 0;
        for &number in numbers {
            match self.object_stream(number) {
                Ok(objects) => added += register_object_stream(&mut self.xref, number, &objects),
                Err(e) => warn!(obj = number, error = %e, "encrypted object stream unreadable during recovery"),
            }
        }
        debug!(streams = numbers.len(), compressed = added, "registered decrypted object stream members");
    }

    fn lock_cache(&self) -> MutexGuard<'_, ObjectCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    pub fn header(&self) -> Option<&PdfHeader> {
        self.header.as_ref()
    }

    /// Header version, `1.0` when the header is missing
    pub fn version(&self) -> PdfVersion {
        self.header.as_ref().map_or_else(|| PdfVersion::new(1, 0), |h| h.version)
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// The newest trailer, with document keys inherited from older revisions
    pub fn trailer(&self) -> &PdfTrailer {
        &self.trailer
    }

    /// Number of xref sections read; 0 when the index was rebuilt by scanning
    pub fn section_count(&self) -> usize {
        self.sections
    }

    /// The index was rebuilt by the recovery scan
    pub fn was_recovered(&self) -> bool {
        self.recovered
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn security(&self) -> Option<&SecurityHandler> {
        self.security.as_ref()
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.is_encrypted()
    }

    /// Get an object by id. Free and absent objects are `Null`.
    pub fn get_object(&self, id: ObjectId) -> ParseResult<Arc<PdfObject>> {
        if let Some(object) = self.lock_cache().objects.get(&id) {
            return Ok(Arc::clone(object));
        }

        // The lock is not held while loading; a racing thread's copy wins
        let object = Arc::new(self.load_object(id)?);
        let mut cache = self.lock_cache();
        Ok(Arc::clone(cache.objects.entry(id).or_insert(object)))
    }

    /// Follow references until a direct object is reached.
    pub fn resolve(&self, object: &PdfObject) -> ParseResult<Arc<PdfObject>> {
        let Some(mut id) = object.as_reference() else {
            return Ok(Arc::new(object.clone()));
        };

        for _ in 0..=self.options.max_reference_depth {
            let resolved = self.get_object(id)?;
            match resolved.as_reference() {
                Some(next) => id = next,
                None => return Ok(resolved),
            }
        }
        Err(ParseError::CircularReference(id.0, id.1))
    }

    /// Resolve `dict[key]`; `None` when absent or null.
    pub fn resolve_entry(&self, dict: &PdfDictionary, key: &str) -> ParseResult<Option<Arc<PdfObject>>> {
        match dict.get(key) {
            Some(value) => {
                let resolved = self.resolve(value)?;
                Ok((!resolved.is_null()).then_some(resolved))
            }
            None => Ok(None),
        }
    }

    /// The document catalog
    pub fn catalog(&self) -> ParseResult<Arc<PdfObject>> {
        let root = self.trailer.root()?;
        let catalog = self.resolve(&PdfObject::Reference(root.0, root.1))?;
        if catalog.as_dict().is_none() {
            return Err(ParseError::MissingRequiredEntry(format!(
                "Root {} {} R is not a dictionary",
                root.0, root.1
            )));
        }
        Ok(catalog)
    }

    /// The Info dictionary, if the trailer names one that resolves to a dictionary
    pub fn info(&self) -> ParseResult<Option<Arc<PdfObject>>> {
        let Some(id) = self.trailer.info() else {
            return Ok(None);
        };
        let info = self.resolve(&PdfObject::Reference(id.0, id.1))?;
        Ok(info.as_dict().is_some().then_some(info))
    }

    fn load_object(&self, id: ObjectId) -> ParseResult<PdfObject> {
        match self.xref.get(id.0) {
            None | Some(XRefEntry::Free { .. }) => {
                debug!(obj = id.0, gen = id.1, "reference to a free or absent object");
                Ok(PdfObject::Null)
            }
            Some(&XRefEntry::InUse { offset, generation }) => {
                if generation != id.1 {
                    if self.options.strict_mode {
                        debug!(obj = id.0, wanted = id.1, found = generation, "generation mismatch");
                        return Ok(PdfObject::Null);
                    }
                    warn!(obj = id.0, wanted = id.1, found = generation, "generation mismatch, loading anyway");
                }
                let object = self.parse_at(id, offset)?;
                self.decrypt_object(id, object)
            }
            Some(&XRefEntry::Compressed { stream_number, index }) => {
                // Objects inside an object stream were decrypted with the stream
                let stream = self.object_stream(stream_number)?;
                Ok(stream.get(index as usize, id.0).cloned().unwrap_or_else(|| {
                    debug!(obj = id.0, stream = stream_number, index, "object missing from its object stream");
                    PdfObject::Null
                }))
            }
        }
    }

    fn parse_at(&self, id: ObjectId, offset: u64) -> ParseResult<PdfObject> {
        self.source.read(offset, 1)?;
        let data = self.source.as_slice();
        // In bounds after the read above
        let position = offset as usize;

        let parser = ObjectParser::new(data)
            .with_max_depth(self.options.max_nesting_depth)
            .with_lenient(self.options.lenient_streams)
            .with_length_resolver(self);
        let (found, object, _) = parser.parse_indirect_object(position)?;
        if found.0 != id.0 {
            return Err(ParseError::syntax(
                position,
                format!("Expected object {} {}, found {} {}", id.0, id.1, found.0, found.1),
            ));
        }
        Ok(object)
    }

    fn object_stream(&self, number: u32) -> ParseResult<Arc<ObjectStream>> {
        if let Some(stream) = self.lock_cache().streams.get(&number) {
            return Ok(Arc::clone(stream));
        }

        let generation = match self.xref.get(number) {
            Some(&XRefEntry::InUse { generation, .. }) => generation,
            _ => return Err(ParseError::InvalidReference(number, 0)),
        };
        let container = self.get_object((number, generation))?;
        let stream = container
            .as_stream()
            .filter(|s| s.dict.get_type() != Some("XRef"))
            .ok_or(ParseError::InvalidReference(number, generation))?;
        let parsed = Arc::new(ObjectStream::parse(stream, self.options.max_nesting_depth)?);
        debug!(obj = number, objects = parsed.len(), "object stream decoded");

        let mut cache = self.lock_cache();
        Ok(Arc::clone(cache.streams.entry(number).or_insert(parsed)))
    }

    fn decrypt_object(&self, id: ObjectId, object: PdfObject) -> ParseResult<PdfObject> {
        let Some(handler) = &self.security else {
            return Ok(object);
        };
        if self.encrypt_id == Some(id) {
            return Ok(object);
        }
        if let PdfObject::Stream(stream) = &object {
            if stream.dict.get_type() == Some("XRef") {
                return Ok(object);
            }
        }
        decrypt_value(handler, id, object)
    }
}

/// Decrypt every string and stream body inside `object`.
fn decrypt_value(handler: &SecurityHandler, id: ObjectId, object: PdfObject) -> ParseResult<PdfObject> {
    Ok(match object {
        PdfObject::String(s) => match handler.decrypt_string(id, s.as_bytes()) {
            Ok(plain) => PdfObject::String(PdfString(plain)),
            Err(e) => {
                warn!(obj = id.0, gen = id.1, error = %e, "undecryptable string dropped");
                PdfObject::Null
            }
        },
        PdfObject::Array(mut array) => {
            for element in array.0.iter_mut() {
                *element = decrypt_value(handler, id, std::mem::replace(element, PdfObject::Null))?;
            }
            PdfObject::Array(array)
        }
        PdfObject::Dictionary(dict) => PdfObject::Dictionary(decrypt_dict(handler, id, dict)?),
        PdfObject::Stream(mut stream) => {
            stream.data = handler.decrypt_stream(id, &stream.dict, &stream.data)?;
            stream.dict = decrypt_dict(handler, id, stream.dict)?;
            PdfObject::Stream(stream)
        }
        other => other,
    })
}

fn decrypt_dict(handler: &SecurityHandler, id: ObjectId, mut dict: PdfDictionary) -> ParseResult<PdfDictionary> {
    for value in dict.0.values_mut() {
        *value = decrypt_value(handler, id, std::mem::replace(value, PdfObject::Null))?;
    }
    Ok(dict)
}

impl LengthResolver for PdfReader {
    fn resolve_length(&self, id: ObjectId) -> Option<i64> {
        if let Some(object) = self.lock_cache().objects.get(&id) {
            return object.as_integer();
        }
        match self.xref.get(id.0)? {
            &XRefEntry::InUse { offset, .. } => {
                // No resolver here: a length object cannot itself need one
                let parser = ObjectParser::new(self.source.as_slice())
                    .with_max_depth(self.options.max_nesting_depth);
                let (_, object, _) = parser.parse_indirect_object(usize::try_from(offset).ok()?).ok()?;
                object.as_integer()
            }
            &XRefEntry::Compressed { stream_number, index } => self
                .lock_cache()
                .streams
                .get(&stream_number)?
                .get(index as usize, id.0)?
                .as_integer(),
            XRefEntry::Free { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{classic_pdf, classic_pdf_with_trailer};

    fn reader(bytes: Vec<u8>) -> PdfReader {
        PdfReader::new(ByteSource::from_bytes(bytes), ParseOptions::default(), None).unwrap()
    }

    #[test]
    fn test_get_object_and_cache() {
        let fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        ]);
        let reader = reader(fixture.bytes);
        assert_eq!(reader.version(), PdfVersion::new(1, 4));
        assert_eq!(reader.section_count(), 1);

        let first = reader.get_object((2, 0)).unwrap();
        let second = reader.get_object((2, 0)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.as_dict().and_then(|d| d.get_type()), Some("Pages"));
        assert_eq!(reader.catalog().unwrap().as_dict().and_then(|d| d.get_type()), Some("Catalog"));
    }

    #[test]
    fn test_free_and_absent_objects_are_null() {
        let fixture = classic_pdf(&[(1, "<< /Type /Catalog /Pages 3 0 R >>"), (3, "<< /Type /Pages >>")]);
        let reader = reader(fixture.bytes);
        assert!(reader.get_object((2, 0)).unwrap().is_null());
        assert!(reader.get_object((99, 0)).unwrap().is_null());
        assert!(reader.get_object((0, 65535)).unwrap().is_null());
    }

    #[test]
    fn test_reference_chains() {
        let fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R /Chain 3 0 R /Loop 5 0 R >>"),
            (2, "<< /Type /Pages >>"),
            (3, "4 0 R"),
            (4, "(end of chain)"),
            (5, "6 0 R"),
            (6, "5 0 R"),
        ]);
        let reader = reader(fixture.bytes);
        let resolved = reader.resolve(&PdfObject::Reference(3, 0)).unwrap();
        assert_eq!(resolved.as_string().map(|s| s.as_bytes()), Some(&b"end of chain"[..]));

        assert!(matches!(
            reader.resolve(&PdfObject::Reference(5, 0)),
            Err(ParseError::CircularReference(..))
        ));

        let direct = reader.resolve(&PdfObject::Integer(7)).unwrap();
        assert_eq!(*direct, PdfObject::Integer(7));
    }

    #[test]
    fn test_indirect_stream_length() {
        let fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R /Metadata 3 0 R >>"),
            (2, "<< /Type /Pages >>"),
            (3, "<< /Length 4 0 R >>\nstream\nhello endstream world\nendstream"),
            (4, "21"),
        ]);
        let options = ParseOptions {
            lenient_streams: false,
            ..ParseOptions::default()
        };
        let reader = PdfReader::new(ByteSource::from_bytes(fixture.bytes), options, None).unwrap();
        let stream = reader.get_object((3, 0)).unwrap();
        assert_eq!(stream.as_stream().unwrap().data, b"hello endstream world".to_vec());
    }

    #[test]
    fn test_info_dictionary() {
        let fixture = classic_pdf_with_trailer(
            &[
                (1, "<< /Type /Catalog /Pages 2 0 R >>"),
                (2, "<< /Type /Pages >>"),
                (3, "<< /Title (Report) >>"),
            ],
            "/Root 1 0 R /Info 3 0 R",
        );
        let reader = reader(fixture.bytes);
        let info = reader.info().unwrap().unwrap();
        assert!(info.as_dict().unwrap().contains_key("Title"));
    }

    #[test]
    fn test_bad_startxref_recovers() {
        let fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        ]);
        let text = String::from_utf8_lossy(&fixture.bytes).into_owned();
        let (body, _) = text.rsplit_once("startxref").unwrap();
        let damaged = format!("{body}startxref\n12345\n%%EOF\n");

        let reader = reader(damaged.clone().into_bytes());
        assert!(reader.was_recovered());
        assert_eq!(reader.section_count(), 0);
        assert!(reader.catalog().is_ok());

        let strict = PdfReader::new(ByteSource::from_bytes(damaged.into_bytes()), ParseOptions::strict(), None);
        assert!(matches!(strict, Err(ParseError::DamagedDocument(_))));
    }

    #[test]
    fn test_wrong_xref_offset_recovers() {
        let mut fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
        ]);
        // Shift every object; the xref offsets now point at the inserted string
        let at = fixture.offsets[0] as usize;
        fixture.bytes.splice(at..at, b"(x)\n".iter().copied());
        let text = String::from_utf8_lossy(&fixture.bytes).into_owned();
        let xref_at = text.rfind("xref\n0 ").unwrap();
        let (body, _) = text.rsplit_once("startxref").unwrap();
        let repaired = format!("{body}startxref\n{xref_at}\n%%EOF\n");

        let reader = reader(repaired.into_bytes());
        assert!(reader.was_recovered());
        assert_eq!(reader.catalog().unwrap().as_dict().and_then(|d| d.get_type()), Some("Catalog"));
    }

    #[test]
    fn test_object_stream_through_recovered_index() {
        let header = "10 0 11 5 ";
        let body = "(ten) (eleven)";
        let stream = format!("{header}{body}");
        let data = format!(
            "%PDF-1.5\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages >>\nendobj\n3 0 obj\n<< /Type /ObjStm /N 2 /First {} /Length {} >>\nstream\n{stream}\nendstream\nendobj\ntrailer\n<< /Root 1 0 R >>\n",
            header.len(),
            stream.len()
        );
        let reader = reader(data.into_bytes());
        let eleven = reader.get_object((11, 0)).unwrap();
        assert_eq!(eleven.as_string().map(|s| s.to_text()), Some("eleven".to_string()));
    }

    #[test]
    fn test_offset_past_end_of_file() {
        let mut fixture = classic_pdf(&[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages >>"),
            (3, "(unreachable)"),
        ]);
        let row = format!("{:010} 00000 n ", fixture.offsets[2]);
        let at = fixture
            .bytes
            .windows(row.len())
            .position(|w| w == row.as_bytes())
            .unwrap();
        fixture.bytes[at..at + 10].copy_from_slice(b"0099999999");

        let reader = reader(fixture.bytes);
        match reader.get_object((3, 0)) {
            Err(ParseError::OutOfBounds { offset, length, .. }) => assert_eq!((offset, length), (99_999_999, 1)),
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_header() {
        let fixture = classic_pdf(&[(1, "<< /Type /Catalog /Pages 2 0 R >>"), (2, "<< /Type /Pages >>")]);
        let mut bytes = fixture.bytes;
        bytes[..5].copy_from_slice(b"%XYZ-");

        let lenient = PdfReader::new(ByteSource::from_bytes(bytes.clone()), ParseOptions::default(), None).unwrap();
        assert_eq!(lenient.version(), PdfVersion::new(1, 0));

        let strict = PdfReader::new(ByteSource::from_bytes(bytes), ParseOptions::strict(), None);
        assert!(matches!(strict, Err(ParseError::InvalidHeader)));
    }
}
