//! Standard Security Handler implementation according to ISO 32000-1 Section 7.6.3
//! and ISO 32000-2 Section 7.6.4 (revision 6)

use super::aes::{aes_cbc_decrypt, aes_cbc_encrypt, decrypt_with_iv_prefix};
use super::permissions::Permissions;
use super::rc4::{rc4, Rc4};
use crate::parser::encoding::encode_pdf_doc;
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject};
use crate::parser::{ParseError, ParseResult};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

/// Padding used in password processing
pub const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// How strings or streams are encrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    /// RC4 with a per-object key
    Rc4,
    /// AES-128-CBC with a per-object key
    AesV2,
    /// AES-256-CBC with the file key
    AesV3,
}

/// The parts of a Standard security handler `/Encrypt` dictionary this crate uses
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionDict {
    /// `/V`
    pub version: i64,
    /// `/R`
    pub revision: i64,
    /// File key length in bytes
    pub key_length: usize,
    pub owner: Vec<u8>,
    pub user: Vec<u8>,
    pub owner_encrypted: Vec<u8>,
    pub user_encrypted: Vec<u8>,
    /// Raw `/P`, a signed 32-bit value
    pub p: i32,
    pub encrypt_metadata: bool,
    pub string_method: CryptMethod,
    pub stream_method: CryptMethod,
}

impl EncryptionDict {
    pub fn from_dict(dict: &PdfDictionary) -> ParseResult<Self> {
        let filter = dict.get_name("Filter").unwrap_or("Standard");
        if filter != "Standard" {
            return Err(ParseError::UnsupportedEncryption(format!(
                "security handler /{filter}"
            )));
        }

        let version = dict.get_integer("V").unwrap_or(0);
        let revision = dict
            .get_integer("R")
            .ok_or_else(|| ParseError::MissingRequiredEntry("R in encryption dictionary".to_string()))?;
        if !(2..=6).contains(&revision) {
            return Err(ParseError::UnsupportedEncryption(format!("revision {revision}")));
        }

        let bytes = |key: &str| -> Vec<u8> {
            dict.get(key)
                .and_then(|obj| obj.as_string())
                .map(|s| s.as_bytes().to_vec())
                .unwrap_or_default()
        };
        let owner = bytes("O");
        let user = bytes("U");
        let hash_len = if revision >= 5 { 48 } else { 32 };
        if owner.len() < hash_len || user.len() < hash_len {
            return Err(ParseError::MissingRequiredEntry(format!(
                "{hash_len}-byte O and U in encryption dictionary"
            )));
        }

        let p = dict
            .get_integer("P")
            .ok_or_else(|| ParseError::MissingRequiredEntry("P in encryption dictionary".to_string()))?;
        // Some writers store /P unsigned
        let p = p as u32 as i32;

        let (key_length, string_method, stream_method) = match version {
            0 | 1 => (5, CryptMethod::Rc4, CryptMethod::Rc4),
            2 | 3 => (rc4_key_length(dict.get_integer("Length")), CryptMethod::Rc4, CryptMethod::Rc4),
            4 => {
                let (string_method, string_len) = crypt_filter(dict, "StrF")?;
                let (stream_method, stream_len) = crypt_filter(dict, "StmF")?;
                (string_len.max(stream_len).max(5), string_method, stream_method)
            }
            5 => {
                let (string_method, _) = crypt_filter(dict, "StrF")?;
                let (stream_method, _) = crypt_filter(dict, "StmF")?;
                (32, string_method, stream_method)
            }
            other => return Err(ParseError::UnsupportedEncryption(format!("/V {other}"))),
        };

        Ok(EncryptionDict {
            version,
            revision,
            key_length,
            owner,
            user,
            owner_encrypted: bytes("OE"),
            user_encrypted: bytes("UE"),
            p,
            encrypt_metadata: dict.get_bool("EncryptMetadata").unwrap_or(true),
            string_method,
            stream_method,
        })
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::from_p_value(self.p, self.revision)
    }
}

fn rc4_key_length(bits: Option<i64>) -> usize {
    let bits = bits.unwrap_or(40).clamp(40, 128);
    (bits / 8) as usize
}

/// Resolve `/StrF` or `/StmF` through `/CF`; returns the method and its key length.
fn crypt_filter(dict: &PdfDictionary, key: &str) -> ParseResult<(CryptMethod, usize)> {
    let name = dict.get_name(key).unwrap_or("Identity");
    if name == "Identity" {
        return Ok((CryptMethod::Identity, 0));
    }
    let filter = dict
        .get("CF")
        .and_then(|cf| cf.as_dict())
        .and_then(|cf| cf.get(name))
        .and_then(|f| f.as_dict())
        .ok_or_else(|| ParseError::UnsupportedEncryption(format!("crypt filter /{name} not in /CF")))?;

    match filter.get_name("CFM").unwrap_or("None") {
        "None" => Ok((CryptMethod::Identity, 0)),
        "V2" => {
            // Crypt filter /Length is in bytes for some writers and bits for others
            let length = filter.get_integer("Length").map(|l| if l <= 16 { l * 8 } else { l });
            Ok((CryptMethod::Rc4, rc4_key_length(length.or(Some(128)))))
        }
        "AESV2" => Ok((CryptMethod::AesV2, 16)),
        "AESV3" => Ok((CryptMethod::AesV3, 32)),
        other => Err(ParseError::UnsupportedEncryption(format!("crypt filter method /{other}"))),
    }
}

/// Which password unlocked the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordKind {
    User,
    Owner,
}

/// Derived file key
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key: Vec<u8>,
    pub authenticated_as: PasswordKind,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_len", &self.key.len())
            .field("authenticated_as", &self.authenticated_as)
            .finish()
    }
}

/// Password checks and key derivation for the Standard security handler
pub struct StandardSecurityHandler;

impl StandardSecurityHandler {
    /// Authenticate `password` as the user or the owner password.
    pub fn try_open(encryption: &EncryptionDict, id: &[u8], password: &str) -> ParseResult<KeyMaterial> {
        let password = password_bytes(password, encryption.revision);
        let result = if encryption.revision >= 5 {
            authenticate_aes256(encryption, &password)?
        } else {
            authenticate_user(encryption, id, &password)
                .map(|key| (key, PasswordKind::User))
                .or_else(|| {
                    let user_password = user_password_from_owner(encryption, &password);
                    authenticate_user(encryption, id, &user_password).map(|key| (key, PasswordKind::Owner))
                })
        };

        match result {
            Some((key, kind)) => {
                debug!(revision = encryption.revision, kind = ?kind, "password accepted");
                Ok(KeyMaterial {
                    key,
                    authenticated_as: kind,
                })
            }
            None => {
                debug!(revision = encryption.revision, "password rejected");
                Err(ParseError::EncryptedDocumentAuthFailed)
            }
        }
    }
}

/// Password bytes as the revision expects them.
pub fn password_bytes(password: &str, revision: i64) -> Vec<u8> {
    if revision >= 5 {
        let mut bytes = password.nfkc().collect::<String>().into_bytes();
        bytes.truncate(127);
        bytes
    } else {
        encode_pdf_doc(password).unwrap_or_else(|| password.as_bytes().to_vec())
    }
}

pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// Algorithm 2: file key from a user password (revisions 2-4).
pub fn compute_file_key(password: &[u8], encryption: &EncryptionDict, id: &[u8]) -> Vec<u8> {
    let n = encryption.key_length.min(16);
    let mut context = md5::Context::new();
    context.consume(pad_password(password));
    context.consume(&encryption.owner[..32]);
    context.consume(encryption.p.to_le_bytes());
    context.consume(id);
    if encryption.revision >= 4 && !encryption.encrypt_metadata {
        context.consume([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = context.finalize().0;

    if encryption.revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..n]).0;
        }
    }
    hash[..n].to_vec()
}

/// Algorithms 4 and 5: the `/U` value a file key produces.
pub fn compute_user_value(file_key: &[u8], revision: i64, id: &[u8]) -> Vec<u8> {
    if revision == 2 {
        return rc4(file_key, &PASSWORD_PADDING);
    }
    let mut context = md5::Context::new();
    context.consume(PASSWORD_PADDING);
    context.consume(id);
    let mut result = rc4(file_key, &context.finalize().0);
    for i in 1..=19u8 {
        let round_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        Rc4::new(&round_key).process_in_place(&mut result);
    }
    // Only the first 16 bytes are significant
    result.resize(32, 0);
    result
}

/// Algorithm 3 steps a-d: the RC4 key derived from an owner password.
fn owner_key(owner_password: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let n = key_length.min(16);
    let mut hash = md5::compute(pad_password(owner_password)).0;
    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(hash).0;
        }
    }
    hash[..n].to_vec()
}

/// Algorithm 3: the `/O` value for an owner and user password pair.
pub fn compute_owner_value(owner_password: &[u8], user_password: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let key = owner_key(owner_password, revision, key_length);
    let mut result = rc4(&key, &pad_password(user_password));
    if revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            Rc4::new(&round_key).process_in_place(&mut result);
        }
    }
    result
}

/// Algorithm 7 step b: recover the padded user password from `/O`.
fn user_password_from_owner(encryption: &EncryptionDict, owner_password: &[u8]) -> Vec<u8> {
    let key = owner_key(owner_password, encryption.revision, encryption.key_length);
    let mut result = encryption.owner[..32].to_vec();
    if encryption.revision == 2 {
        Rc4::new(&key).process_in_place(&mut result);
    } else {
        for i in (0..=19u8).rev() {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            Rc4::new(&round_key).process_in_place(&mut result);
        }
    }
    result
}

/// Algorithm 6: check a user password, returning the file key.
fn authenticate_user(encryption: &EncryptionDict, id: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    let key = compute_file_key(password, encryption, id);
    let computed = compute_user_value(&key, encryption.revision, id);
    let matches = if encryption.revision == 2 {
        computed[..32] == encryption.user[..32]
    } else {
        computed[..16] == encryption.user[..16]
    };
    matches.then_some(key)
}

/// Revisions 5 and 6: validate against `/U` then `/O` and unwrap `/UE` or `/OE`.
fn authenticate_aes256(encryption: &EncryptionDict, password: &[u8]) -> ParseResult<Option<(Vec<u8>, PasswordKind)>> {
    let revision = encryption.revision;
    let user = &encryption.user[..48];
    let owner = &encryption.owner[..48];

    let (hash, validation_salt, key_salt) = (&user[..32], &user[32..40], &user[40..48]);
    if hash_r6(password, validation_salt, &[], revision)? == hash {
        let intermediate = hash_r6(password, key_salt, &[], revision)?;
        return unwrap_file_key(&intermediate, &encryption.user_encrypted).map(|k| Some((k, PasswordKind::User)));
    }

    let (hash, validation_salt, key_salt) = (&owner[..32], &owner[32..40], &owner[40..48]);
    if hash_r6(password, validation_salt, user, revision)? == hash {
        let intermediate = hash_r6(password, key_salt, user, revision)?;
        return unwrap_file_key(&intermediate, &encryption.owner_encrypted).map(|k| Some((k, PasswordKind::Owner)));
    }
    Ok(None)
}

fn unwrap_file_key(intermediate: &[u8; 32], wrapped: &[u8]) -> ParseResult<Vec<u8>> {
    if wrapped.len() < 32 {
        return Err(ParseError::MissingRequiredEntry(
            "32-byte UE/OE in encryption dictionary".to_string(),
        ));
    }
    aes_cbc_decrypt(intermediate, &[0u8; 16], &wrapped[..32])
        .map_err(|e| ParseError::UnsupportedEncryption(e.to_string()))
}

/// Algorithm 2.B (revision 6) or plain SHA-256 (revision 5).
pub fn hash_r6(password: &[u8], salt: &[u8], user_key: &[u8], revision: i64) -> ParseResult<[u8; 32]> {
    let mut k: Vec<u8> = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(user_key)
        .finalize()
        .to_vec();

    if revision >= 6 {
        let mut round: u32 = 0;
        loop {
            let block: Vec<u8> = [password, &k, user_key].concat();
            let k1 = block.repeat(64);
            let e = aes_cbc_encrypt(&k[..16], &k[16..32], &k1)
                .map_err(|err| ParseError::UnsupportedEncryption(err.to_string()))?;

            let selector: u32 = e[..16].iter().map(|&b| u32::from(b)).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };

            round += 1;
            let last = u32::from(e[e.len() - 1]);
            if round >= 64 && last <= round - 32 {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    Ok(out)
}

/// Decrypts strings and streams of an unlocked document
#[derive(Debug, Clone)]
pub struct SecurityHandler {
    encryption: EncryptionDict,
    key: KeyMaterial,
}

impl SecurityHandler {
    pub fn new(encryption: EncryptionDict, key: KeyMaterial) -> Self {
        Self { encryption, key }
    }

    pub fn encryption(&self) -> &EncryptionDict {
        &self.encryption
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    pub fn permissions(&self) -> Permissions {
        self.encryption.permissions()
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        self.decrypt(self.encryption.string_method, id, data)
    }

    pub fn decrypt_stream(&self, id: ObjectId, dict: &PdfDictionary, data: &[u8]) -> ParseResult<Vec<u8>> {
        if !self.encryption.encrypt_metadata && dict.get_type() == Some("Metadata") {
            return Ok(data.to_vec());
        }
        if has_identity_crypt_filter(dict) {
            return Ok(data.to_vec());
        }
        self.decrypt(self.encryption.stream_method, id, data)
    }

    fn decrypt(&self, method: CryptMethod, id: ObjectId, data: &[u8]) -> ParseResult<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => Ok(rc4(&self.object_key(id, false), data)),
            CryptMethod::AesV2 => aes_body(&self.object_key(id, true), data),
            CryptMethod::AesV3 => aes_body(&self.key.key, data),
        }
    }

    /// Algorithm 1: per-object key for RC4 and AESV2.
    pub fn object_key(&self, id: ObjectId, aes: bool) -> Vec<u8> {
        object_key(&self.key.key, id, aes)
    }
}

pub fn object_key(file_key: &[u8], id: ObjectId, aes: bool) -> Vec<u8> {
    let mut context = md5::Context::new();
    context.consume(file_key);
    context.consume(&id.0.to_le_bytes()[..3]);
    context.consume(id.1.to_le_bytes());
    if aes {
        context.consume(b"sAlT");
    }
    let n = (file_key.len() + 5).min(16);
    context.finalize().0[..n].to_vec()
}

fn aes_body(key: &[u8], data: &[u8]) -> ParseResult<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    decrypt_with_iv_prefix(key, data).map_err(|e| {
        warn!(error = %e, "AES decryption failed");
        ParseError::StreamDecodeError(format!("AES decryption failed: {e}"))
    })
}

/// A stream whose first filter is `/Crypt` with the `/Identity` crypt filter
fn has_identity_crypt_filter(dict: &PdfDictionary) -> bool {
    let first_filter = match dict.get("Filter") {
        Some(PdfObject::Name(name)) => Some(name.as_str()),
        Some(PdfObject::Array(array)) => array.get(0).and_then(|f| f.as_name()).map(|n| n.as_str()),
        _ => None,
    };
    if first_filter != Some("Crypt") {
        return false;
    }
    let parms = match dict.get("DecodeParms") {
        Some(PdfObject::Array(array)) => array.get(0).and_then(|p| p.as_dict()),
        Some(other) => other.as_dict(),
        None => None,
    };
    parms.and_then(|p| p.get_name("Name")).map_or(true, |name| name == "Identity")
}
