//! Credential encryption domain models
//!
//! AES-256-GCM with a fresh 96-bit nonce per encryption. The 128-bit tag is
//! appended to the ciphertext, so a wrong key or a tampered payload fails
//! to decrypt instead of yielding garbage.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::result::{Error, Result};

/// Key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes (GCM standard nonce)
pub const NONCE_LEN: usize = 12;

/// Symmetric key used to seal the stored API key
///
/// The raw bytes only leave this type through [`EncryptionKey::to_base64`],
/// which is what gets persisted so the key survives a process restart.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LEN],
}

impl EncryptionKey {
    /// Generate a new random key from OS entropy
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::KeyUnavailable(format!("random source failed: {}", e)))?;
        Ok(Self { bytes })
    }

    /// Rebuild a key from its raw bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = raw.try_into().map_err(|_| {
            Error::KeyUnavailable(format!(
                "expected {} key bytes, found {}",
                KEY_LEN,
                raw.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Rebuild a key from its persisted base64 form
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::KeyUnavailable(format!("stored key is not base64: {}", e)))?;
        let key = Self::from_bytes(&raw);
        raw.zeroize();
        key
    }

    /// Export the raw bytes as base64 for persistence
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Short stable identifier, safe to log
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.bytes))
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for EncryptionKey {}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Ciphertext and the nonce it was sealed with
///
/// The two are only meaningful together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCredential {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl EncryptedCredential {
    /// Encrypt `plaintext` under `key` with a freshly drawn nonce
    pub fn seal(key: &EncryptionKey, plaintext: &str) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| Error::KeyUnavailable(format!("random source failed: {}", e)))?;

        let ciphertext = key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::KeyUnavailable("encryption failed".to_string()))?;

        Ok(Self {
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    /// Decrypt with `key`; fails on a wrong key, wrong nonce or altered bytes
    pub fn open(&self, key: &EncryptionKey) -> Result<String> {
        if self.nonce.len() != NONCE_LEN {
            return Err(Error::DecryptionFailure(format!(
                "nonce has {} bytes, expected {}",
                self.nonce.len(),
                NONCE_LEN
            )));
        }

        let plaintext = key
            .cipher()
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::DecryptionFailure("plaintext is not UTF-8".to_string()))
    }

    /// Encode both halves for the store (`apiKey`, `iv`)
    pub fn to_base64_pair(&self) -> (String, String) {
        (STANDARD.encode(&self.ciphertext), STANDARD.encode(&self.nonce))
    }

    /// Decode both halves read back from the store
    pub fn from_base64_pair(ciphertext: &str, nonce: &str) -> Result<Self> {
        let ciphertext = STANDARD
            .decode(ciphertext)
            .map_err(|e| Error::DecryptionFailure(format!("ciphertext is not base64: {}", e)))?;
        let nonce = STANDARD
            .decode(nonce)
            .map_err(|e| Error::DecryptionFailure(format!("nonce is not base64: {}", e)))?;
        Ok(Self { ciphertext, nonce })
    }
}
