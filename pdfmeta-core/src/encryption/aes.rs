//! AES-CBC for the AESV2 and AESV3 crypt filters (ISO 32000-1 Section 7.6.2)

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// AES-related errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AesError {
    #[error("AES key must be 16 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("AES IV must be 16 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("AES input must be a multiple of 16 bytes, got {0}")]
    InvalidDataLength(usize),
}

fn check(key: &[u8], iv: &[u8], data: &[u8]) -> Result<(), AesError> {
    if key.len() != 16 && key.len() != 32 {
        return Err(AesError::InvalidKeyLength(key.len()));
    }
    if iv.len() != BLOCK_SIZE {
        return Err(AesError::InvalidIvLength(iv.len()));
    }
    if data.len() % BLOCK_SIZE != 0 {
        return Err(AesError::InvalidDataLength(data.len()));
    }
    Ok(())
}

/// CBC-decrypt whole blocks with a 128 or 256 bit key; no padding is removed.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, AesError> {
    check(key, iv, data)?;
    let mut buf = data.to_vec();
    let invalid_key = |_| AesError::InvalidKeyLength(key.len());
    let result = if key.len() == 16 {
        Aes128CbcDec::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|plain| plain.len())
    } else {
        Aes256CbcDec::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map(|plain| plain.len())
    };
    let len = result.map_err(|_| AesError::InvalidDataLength(data.len()))?;
    buf.truncate(len);
    Ok(buf)
}

/// CBC-encrypt whole blocks with a 128 or 256 bit key; no padding is added.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, AesError> {
    check(key, iv, data)?;
    let mut buf = data.to_vec();
    let invalid_key = |_| AesError::InvalidKeyLength(key.len());
    let result = if key.len() == 16 {
        Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
            .map(|cipher| cipher.len())
    } else {
        Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(invalid_key)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
            .map(|cipher| cipher.len())
    };
    let len = result.map_err(|_| AesError::InvalidDataLength(data.len()))?;
    buf.truncate(len);
    Ok(buf)
}

/// Strip PKCS#7 padding; data with invalid padding is returned unchanged.
pub fn unpad_pkcs7(data: &[u8]) -> &[u8] {
    let Some(&last) = data.last() else {
        return data;
    };
    let pad = last as usize;
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return data;
    }
    let start = data.len() - pad;
    if data[start..].iter().all(|&b| b == last) {
        &data[..start]
    } else {
        data
    }
}

/// Add PKCS#7 padding up to the next block boundary.
pub fn pad_pkcs7(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat(pad as u8).take(pad));
    out
}

/// Decrypt a string or stream body: a 16-byte IV followed by padded ciphertext.
pub fn decrypt_with_iv_prefix(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AesError> {
    if data.len() < BLOCK_SIZE {
        return Err(AesError::InvalidDataLength(data.len()));
    }
    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);
    // Trailing partial block is dropped
    let whole = ciphertext.len() - ciphertext.len() % BLOCK_SIZE;
    let plain = aes_cbc_decrypt(key, iv, &ciphertext[..whole])?;
    Ok(unpad_pkcs7(&plain).to_vec())
}

/// Encrypt with PKCS#7 padding and prepend the IV.
pub fn encrypt_with_iv_prefix(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &[u8]) -> Result<Vec<u8>, AesError> {
    let mut out = iv.to_vec();
    out.extend_from_slice(&aes_cbc_encrypt(key, iv, &pad_pkcs7(data))?);
    Ok(out)
}
