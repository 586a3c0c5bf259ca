//! In-memory PDF construction for integration tests
//!
//! [`PdfBuilder`] writes objects and records their offsets, so every xref
//! section it emits points at the right bytes. Each call to one of the
//! `finish_*` methods closes a revision; further objects start an incremental
//! update chained through `/Prev`.

#![allow(dead_code)]

use pdfmeta::encryption::{
    aes_cbc_encrypt, compute_file_key, compute_owner_value, compute_user_value, encrypt_with_iv_prefix,
    hash_r6, object_key, rc4, CryptMethod, EncryptionDict,
};
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
enum Entry {
    InUse(u64),
    Compressed(u32, u32),
    Free,
}

/// Writes a PDF one object at a time
pub struct PdfBuilder {
    bytes: Vec<u8>,
    revision: BTreeMap<u32, Entry>,
    /// Table-only entries of a hybrid revision
    legacy: BTreeMap<u32, Entry>,
    last_xref: Option<usize>,
    size: u32,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut bytes = format!("%PDF-{version}\n").into_bytes();
        bytes.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            bytes,
            revision: BTreeMap::new(),
            legacy: BTreeMap::new(),
            last_xref: None,
            size: 1,
        }
    }

    /// Bytes before the header line (some producers emit junk there)
    pub fn with_prefix(prefix: &[u8], version: &str) -> Self {
        let mut builder = Self::new(version);
        let mut bytes = prefix.to_vec();
        bytes.append(&mut builder.bytes);
        builder.bytes = bytes;
        builder
    }

    fn track(&mut self, number: u32, entry: Entry) {
        self.size = self.size.max(number + 1);
        self.revision.insert(number, entry);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Append an object; returns its offset.
    pub fn object(&mut self, number: u32, body: &str) -> usize {
        self.object_bytes(number, body.as_bytes())
    }

    pub fn object_bytes(&mut self, number: u32, body: &[u8]) -> usize {
        let offset = self.bytes.len();
        self.track(number, Entry::InUse(offset as u64));
        write!(self.bytes, "{number} 0 obj\n").unwrap();
        self.bytes.extend_from_slice(body);
        self.bytes.extend_from_slice(b"\nendobj\n");
        offset
    }

    /// Append a stream object. `/Length` is added to `dict_entries`.
    pub fn stream(&mut self, number: u32, dict_entries: &str, data: &[u8]) -> usize {
        let mut body = format!("<< {dict_entries} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.object_bytes(number, &body)
    }

    /// Append a Flate-compressed stream.
    pub fn flate_stream(&mut self, number: u32, dict_entries: &str, data: &[u8]) -> usize {
        let compressed = deflate(data);
        self.stream(number, &format!("{dict_entries} /Filter /FlateDecode"), &compressed)
    }

    /// Append an object stream holding `members`, compressed with Flate.
    pub fn object_stream(&mut self, number: u32, members: &[(u32, &str)]) -> usize {
        let (dict_entries, data) = self.object_stream_parts(number, members);
        self.flate_stream(number, &dict_entries, &data)
    }

    /// Append a Flate-compressed object stream whose body is encrypted as object `number`.
    pub fn encrypted_object_stream(
        &mut self,
        number: u32,
        members: &[(u32, &str)],
        encryption: &StandardEncryption,
    ) -> usize {
        let (dict_entries, data) = self.object_stream_parts(number, members);
        let sealed = encryption.encrypt(number, &deflate(&data));
        self.stream(number, &format!("{dict_entries} /Filter /FlateDecode"), &sealed)
    }

    fn object_stream_parts(&mut self, number: u32, members: &[(u32, &str)]) -> (String, Vec<u8>) {
        let mut header = String::new();
        let mut body = String::new();
        for (index, (member, text)) in members.iter().enumerate() {
            header.push_str(&format!("{member} {} ", body.len()));
            body.push_str(text);
            body.push(' ');
            self.track(*member, Entry::Compressed(number, index as u32));
        }
        let dict_entries = format!("/Type /ObjStm /N {} /First {}", members.len(), header.len());
        (dict_entries, format!("{header}{body}").into_bytes())
    }

    /// Append an object only the classic table of a hybrid revision lists.
    pub fn legacy_object(&mut self, number: u32, body: &str) -> usize {
        let offset = self.bytes.len();
        self.size = self.size.max(number + 1);
        self.legacy.insert(number, Entry::InUse(offset as u64));
        write!(self.bytes, "{number} 0 obj\n{body}\nendobj\n").unwrap();
        offset
    }

    /// Mark an object deleted in the current revision.
    pub fn free(&mut self, number: u32) {
        self.track(number, Entry::Free);
    }

    /// Append raw bytes, untracked.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn take_revision(&mut self) -> BTreeMap<u32, Entry> {
        let mut revision = std::mem::take(&mut self.revision);
        if self.last_xref.is_none() {
            revision.insert(0, Entry::Free);
        }
        revision
    }

    fn prev_entry(&self) -> String {
        self.last_xref.map(|p| format!(" /Prev {p}")).unwrap_or_default()
    }

    fn write_table(&mut self, revision: &BTreeMap<u32, Entry>, trailer_entries: &str) -> usize {
        let offset = self.bytes.len();
        let mut text = String::from("xref\n");
        for run in contiguous_runs(revision.keys().copied()) {
            text.push_str(&format!("{} {}\n", run[0], run.len()));
            for number in run {
                match revision[&number] {
                    Entry::InUse(at) => text.push_str(&format!("{at:010} 00000 n \n")),
                    Entry::Free if number == 0 => text.push_str("0000000000 65535 f \n"),
                    Entry::Free => text.push_str("0000000000 00001 f \n"),
                    Entry::Compressed(..) => panic!("compressed object {number} in a classic table"),
                }
            }
        }
        text.push_str(&format!(
            "trailer\n<< /Size {}{} {trailer_entries} >>\n",
            self.size,
            self.prev_entry()
        ));
        self.bytes.extend_from_slice(text.as_bytes());
        offset
    }

    fn write_xref_stream(&mut self, number: u32, revision: &BTreeMap<u32, Entry>, dict_entries: &str) -> usize {
        let offset = self.bytes.len();
        let mut revision = revision.clone();
        revision.insert(number, Entry::InUse(offset as u64));
        self.size = self.size.max(number + 1);

        let mut index = String::new();
        let mut data = Vec::new();
        for run in contiguous_runs(revision.keys().copied()) {
            index.push_str(&format!("{} {} ", run[0], run.len()));
            for n in run {
                let (kind, field2, field3): (u8, u32, u16) = match revision[&n] {
                    Entry::Free if n == 0 => (0, 0, 65535),
                    Entry::Free => (0, 0, 1),
                    Entry::InUse(at) => (1, at as u32, 0),
                    Entry::Compressed(stream, i) => (2, stream, i as u16),
                };
                data.push(kind);
                data.extend_from_slice(&field2.to_be_bytes());
                data.extend_from_slice(&field3.to_be_bytes());
            }
        }
        let dict = format!(
            "/Type /XRef /Size {} /W [1 4 2] /Index [{}]{} {dict_entries}",
            self.size,
            index.trim_end(),
            self.prev_entry()
        );
        let compressed = deflate(&data);
        let mut body = format!("<< {dict} /Filter /FlateDecode /Length {} >>\nstream\n", compressed.len()).into_bytes();
        body.extend_from_slice(&compressed);
        body.extend_from_slice(b"\nendstream");
        write!(self.bytes, "{number} 0 obj\n").unwrap();
        self.bytes.extend_from_slice(&body);
        self.bytes.extend_from_slice(b"\nendobj\n");
        offset
    }

    fn write_startxref(&mut self, offset: usize) {
        write!(self.bytes, "startxref\n{offset}\n%%EOF\n").unwrap();
        self.last_xref = Some(offset);
    }

    /// Close the revision with a classic xref table.
    pub fn finish_table(&mut self, trailer_entries: &str) -> &mut Self {
        let revision = self.take_revision();
        let offset = self.write_table(&revision, trailer_entries);
        self.write_startxref(offset);
        self
    }

    /// Close the revision with a cross-reference stream stored as object `number`.
    pub fn finish_stream(&mut self, number: u32, trailer_entries: &str) -> &mut Self {
        let revision = self.take_revision();
        let offset = self.write_xref_stream(number, &revision, trailer_entries);
        self.write_startxref(offset);
        self
    }

    /// Close the revision as a hybrid file: compressed entries go into a supplementary
    /// xref stream named by `/XRefStm`, everything else into a classic table.
    pub fn finish_hybrid(&mut self, stream_number: u32, trailer_entries: &str) -> &mut Self {
        let revision = self.take_revision();
        let (compressed, plain): (BTreeMap<u32, Entry>, BTreeMap<u32, Entry>) = revision
            .into_iter()
            .partition(|(_, e)| matches!(e, Entry::Compressed(..)));

        let saved_prev = self.last_xref.take();
        let stm_offset = self.write_xref_stream(stream_number, &compressed, "");
        self.last_xref = saved_prev;

        let mut plain = plain;
        for (number, entry) in std::mem::take(&mut self.legacy) {
            plain.entry(number).or_insert(entry);
        }
        plain.insert(stream_number, Entry::InUse(stm_offset as u64));
        let offset = self.write_table(&plain, &format!("/XRefStm {stm_offset} {trailer_entries}"));
        self.write_startxref(offset);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

fn contiguous_runs(numbers: impl Iterator<Item = u32>) -> Vec<Vec<u32>> {
    let mut runs: Vec<Vec<u32>> = Vec::new();
    for n in numbers {
        match runs.last_mut() {
            Some(run) if *run.last().unwrap() + 1 == n => run.push(n),
            _ => runs.push(vec![n]),
        }
    }
    runs
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Catalog 1, Pages 2, Info 3 and `pages` leaves from object 4, with a classic table.
pub fn simple_pdf(pages: u32, info: &str) -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    write_simple_objects(&mut builder, pages, info);
    builder.finish_table("/Root 1 0 R /Info 3 0 R").build()
}

pub fn write_simple_objects(builder: &mut PdfBuilder, pages: u32, info: &str) {
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 4 + i)).collect();
    builder.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    builder.object(2, &format!("<< /Type /Pages /Kids [{}] /Count {pages} >>", kids.join(" ")));
    builder.object(3, info);
    for i in 0..pages {
        builder.object(4 + i, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>");
    }
}

/// Bytes as a PDF hex string
pub fn hex_string(bytes: &[u8]) -> String {
    format!("<{}>", hex::encode(bytes))
}

/// Standard security handler parameters and the key they produce
pub struct StandardEncryption {
    pub dict: EncryptionDict,
    pub file_key: Vec<u8>,
    pub id: Vec<u8>,
    extra_entries: String,
}

impl StandardEncryption {
    fn base(version: i64, revision: i64, key_length: usize, p: i32) -> EncryptionDict {
        EncryptionDict {
            version,
            revision,
            key_length,
            owner: Vec::new(),
            user: Vec::new(),
            owner_encrypted: Vec::new(),
            user_encrypted: Vec::new(),
            p,
            encrypt_metadata: true,
            string_method: CryptMethod::Rc4,
            stream_method: CryptMethod::Rc4,
        }
    }

    fn legacy(mut dict: EncryptionDict, user: &str, owner: &str, id: &[u8], extra: String) -> Self {
        dict.owner = compute_owner_value(owner.as_bytes(), user.as_bytes(), dict.revision, dict.key_length);
        let file_key = compute_file_key(user.as_bytes(), &dict, id);
        dict.user = compute_user_value(&file_key, dict.revision, id);
        Self {
            dict,
            file_key,
            id: id.to_vec(),
            extra_entries: extra,
        }
    }

    /// RC4, 40-bit key, revision 2
    pub fn rc4_r2(user: &str, owner: &str, p: i32, id: &[u8]) -> Self {
        Self::legacy(Self::base(1, 2, 5, p), user, owner, id, String::new())
    }

    /// RC4, 128-bit key, revision 3
    pub fn rc4_r3(user: &str, owner: &str, p: i32, id: &[u8]) -> Self {
        Self::legacy(Self::base(2, 3, 16, p), user, owner, id, "/Length 128".to_string())
    }

    /// AES-128 through a V4 crypt filter
    pub fn aes_v2(user: &str, owner: &str, p: i32, id: &[u8]) -> Self {
        let mut dict = Self::base(4, 4, 16, p);
        dict.string_method = CryptMethod::AesV2;
        dict.stream_method = CryptMethod::AesV2;
        Self::legacy(
            dict,
            user,
            owner,
            id,
            "/Length 128 /CF << /StdCF << /CFM /AESV2 /Length 16 /AuthEvent /DocOpen >> >> /StrF /StdCF /StmF /StdCF"
                .to_string(),
        )
    }

    /// AES-256, revision 6
    pub fn aes_v3(user: &str, owner: &str, p: i32, id: &[u8]) -> Self {
        let mut dict = Self::base(5, 6, 32, p);
        dict.string_method = CryptMethod::AesV3;
        dict.stream_method = CryptMethod::AesV3;
        let file_key: Vec<u8> = (0u8..32).map(|b| b.wrapping_mul(7).wrapping_add(3)).collect();
        let zero_iv = [0u8; 16];

        let (user_validation, user_key_salt) = ([0x11u8; 8], [0x22u8; 8]);
        let mut u = hash_r6(user.as_bytes(), &user_validation, &[], 6).unwrap().to_vec();
        u.extend_from_slice(&user_validation);
        u.extend_from_slice(&user_key_salt);
        let user_intermediate = hash_r6(user.as_bytes(), &user_key_salt, &[], 6).unwrap();
        dict.user_encrypted = aes_cbc_encrypt(&user_intermediate, &zero_iv, &file_key).unwrap();

        let (owner_validation, owner_key_salt) = ([0x33u8; 8], [0x44u8; 8]);
        let mut o = hash_r6(owner.as_bytes(), &owner_validation, &u, 6).unwrap().to_vec();
        o.extend_from_slice(&owner_validation);
        o.extend_from_slice(&owner_key_salt);
        let owner_intermediate = hash_r6(owner.as_bytes(), &owner_key_salt, &u, 6).unwrap();
        dict.owner_encrypted = aes_cbc_encrypt(&owner_intermediate, &zero_iv, &file_key).unwrap();

        dict.user = u;
        dict.owner = o;
        Self {
            dict,
            file_key,
            id: id.to_vec(),
            extra_entries:
                "/Length 256 /CF << /StdCF << /CFM /AESV3 /Length 32 /AuthEvent /DocOpen >> >> /StrF /StdCF /StmF /StdCF"
                    .to_string(),
        }
    }

    /// The `/Encrypt` dictionary body
    pub fn dictionary(&self) -> String {
        let mut entries = format!(
            "<< /Filter /Standard /V {} /R {} /O {} /U {} /P {} {}",
            self.dict.version,
            self.dict.revision,
            hex_string(&self.dict.owner),
            hex_string(&self.dict.user),
            self.dict.p,
            self.extra_entries,
        );
        if !self.dict.user_encrypted.is_empty() {
            entries.push_str(&format!(
                " /UE {} /OE {}",
                hex_string(&self.dict.user_encrypted),
                hex_string(&self.dict.owner_encrypted)
            ));
        }
        entries.push_str(" >>");
        entries
    }

    /// The trailer `/ID` entry
    pub fn id_entry(&self) -> String {
        format!("/ID [{} {}]", hex_string(&self.id), hex_string(&self.id))
    }

    /// Encrypt a string or stream body belonging to object `number`.
    pub fn encrypt(&self, number: u32, plain: &[u8]) -> Vec<u8> {
        let iv = [0x5Au8; 16];
        match self.dict.string_method {
            CryptMethod::Rc4 => rc4(&object_key(&self.file_key, (number, 0), false), plain),
            CryptMethod::AesV2 => {
                encrypt_with_iv_prefix(&object_key(&self.file_key, (number, 0), true), &iv, plain).unwrap()
            }
            CryptMethod::AesV3 => encrypt_with_iv_prefix(&self.file_key, &iv, plain).unwrap(),
            CryptMethod::Identity => plain.to_vec(),
        }
    }

    /// An encrypted string as a hex literal
    pub fn string(&self, number: u32, text: &str) -> String {
        hex_string(&self.encrypt(number, text.as_bytes()))
    }
}

/// A complete encrypted document: Info (Title, Author) and an XMP stream
pub fn encrypted_pdf(encryption: &StandardEncryption, title: &str, author: &str, xmp: &str) -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.6");
    builder.object(1, "<< /Type /Catalog /Pages 2 0 R /Metadata 5 0 R >>");
    builder.object(2, "<< /Type /Pages /Kids [4 0 R] /Count 1 >>");
    builder.object(
        3,
        &format!(
            "<< /Title {} /Author {} >>",
            encryption.string(3, title),
            encryption.string(3, author)
        ),
    );
    builder.object(4, "<< /Type /Page /Parent 2 0 R >>");
    builder.stream(5, "/Type /Metadata /Subtype /XML", &encryption.encrypt(5, xmp.as_bytes()));
    builder.object(6, &encryption.dictionary());
    builder
        .finish_table(&format!("/Root 1 0 R /Info 3 0 R /Encrypt 6 0 R {}", encryption.id_entry()))
        .build()
}
