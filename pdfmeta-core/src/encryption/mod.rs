//! PDF decryption support according to ISO 32000-1 Chapter 7.6
//!
//! The Standard Security Handler, revisions 2 through 6: RC4 40-bit and 128-bit,
//! AES-128 (AESV2) and AES-256 (AESV3). Documents are only ever decrypted.

mod aes;
mod permissions;
mod rc4;
mod standard_security;

pub use aes::{
    aes_cbc_decrypt, aes_cbc_encrypt, decrypt_with_iv_prefix, encrypt_with_iv_prefix, pad_pkcs7,
    unpad_pkcs7, AesError, BLOCK_SIZE,
};
pub use permissions::Permissions;
pub use rc4::{rc4, Rc4};
pub use standard_security::{
    compute_file_key, compute_owner_value, compute_user_value, hash_r6, object_key, pad_password,
    password_bytes, CryptMethod, EncryptionDict, KeyMaterial, PasswordKind, SecurityHandler,
    StandardSecurityHandler, PASSWORD_PADDING,
};
