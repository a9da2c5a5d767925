//! Authenticated encryption for bulk payloads
//!
//! AES-128-GCM with an explicit 12-byte IV and a 128-bit tag appended to the
//! ciphertext. Tag failures surface as [`CryptoError::AeadFailure`]; a caller
//! never sees corrupted plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, Result};

/// AES-128 key size in bytes
pub const AEAD_KEY_SIZE: usize = 16;

/// GCM IV size in bytes
pub const AEAD_IV_SIZE: usize = 12;

/// GCM authentication tag size in bytes
pub const AEAD_TAG_SIZE: usize = 16;

/// A 128-bit symmetric key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadKey(pub [u8; AEAD_KEY_SIZE]);

impl AeadKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; AEAD_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        AeadKey(bytes)
    }

    /// Create from a slice, failing on wrong length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != AEAD_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} key bytes, got {}",
                AEAD_KEY_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; AEAD_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(AeadKey(arr))
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; AEAD_KEY_SIZE] {
        &self.0
    }
}

/// A 96-bit GCM initialization vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AeadIv(pub [u8; AEAD_IV_SIZE]);

impl AeadIv {
    /// Generate a fresh random IV
    pub fn generate() -> Self {
        let mut bytes = [0u8; AEAD_IV_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        AeadIv(bytes)
    }

    /// Create from a slice, failing on wrong length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != AEAD_IV_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} IV bytes, got {}",
                AEAD_IV_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; AEAD_IV_SIZE];
        arr.copy_from_slice(bytes);
        Ok(AeadIv(arr))
    }

    /// Get the IV bytes
    pub fn as_bytes(&self) -> &[u8; AEAD_IV_SIZE] {
        &self.0
    }
}

/// Encrypt plaintext under the given key and IV
pub fn encrypt(key: &AeadKey, iv: &AeadIv, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128Gcm::new_from_slice(&key.0)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    cipher
        .encrypt(Nonce::from_slice(&iv.0), plaintext)
        .map_err(|_| CryptoError::AeadFailure)
}

/// Decrypt and authenticate ciphertext under the given key and IV
pub fn decrypt(key: &AeadKey, iv: &AeadIv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128Gcm::new_from_slice(&key.0)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&iv.0), ciphertext)
        .map_err(|_| CryptoError::AeadFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = AeadKey::generate();
        let iv = AeadIv::generate();
        let plaintext = b"per-hop build instructions";

        let ciphertext = encrypt(&key, &iv, plaintext).unwrap();
        assert_ne!(&ciphertext[..plaintext.len()], plaintext.as_slice());
        assert_eq!(ciphertext.len(), plaintext.len() + AEAD_TAG_SIZE);

        let decrypted = decrypt(&key, &iv, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_tamper_fails_authentication() {
        let key = AeadKey::generate();
        let iv = AeadIv::generate();

        let mut ciphertext = encrypt(&key, &iv, b"payload").unwrap();
        ciphertext[0] ^= 0x01;

        assert_eq!(decrypt(&key, &iv, &ciphertext), Err(CryptoError::AeadFailure));
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = AeadKey::generate();
        let iv = AeadIv::generate();
        let ciphertext = encrypt(&key, &iv, b"payload").unwrap();

        let other = AeadKey::generate();
        assert!(decrypt(&other, &iv, &ciphertext).is_err());
    }

    #[test]
    fn test_wrong_iv_fails() {
        let key = AeadKey::generate();
        let iv = AeadIv::generate();
        let ciphertext = encrypt(&key, &iv, b"payload").unwrap();

        let other = AeadIv::generate();
        assert!(decrypt(&key, &other, &ciphertext).is_err());
    }

    #[test]
    fn test_key_from_slice_validates_length() {
        assert!(AeadKey::from_slice(&[0u8; 15]).is_err());
        assert!(AeadKey::from_slice(&[0u8; 16]).is_ok());
        assert!(AeadIv::from_slice(&[0u8; 11]).is_err());
        assert!(AeadIv::from_slice(&[0u8; 12]).is_ok());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = AeadKey::generate();
        let iv = AeadIv::generate();

        let ciphertext = encrypt(&key, &iv, b"").unwrap();
        assert_eq!(ciphertext.len(), AEAD_TAG_SIZE);
        assert_eq!(decrypt(&key, &iv, &ciphertext).unwrap(), Vec::<u8>::new());
    }
}
