//! Credential vault - persists the API key only in encrypted form

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::Mutex;

use crate::domain::result::{Error, Result};
use crate::domain::{EncryptedCredential, EncryptionKey};
use crate::ports::{keys, KeyValueStore};
use crate::services::KeyStore;

/// Entries sealed under the encryption key
const SEALED: &[&str] = &[keys::CIPHERTEXT, keys::NONCE];

/// Encrypts, stores, and recovers the API key
pub struct CredentialVault {
    store: Arc<dyn KeyValueStore>,
    key_store: Arc<KeyStore>,
    /// Held from key selection until the sealed pair is written
    updates: Mutex<()>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn KeyValueStore>, key_store: Arc<KeyStore>) -> Self {
        Self {
            store,
            key_store,
            updates: Mutex::new(()),
        }
    }

    /// Make sure a usable key is stored, replacing an unreadable one
    pub async fn ensure_key(&self) -> Result<EncryptionKey> {
        let _updates = self.updates.lock().await;
        self.key_store.ensure_key(SEALED).await
    }

    /// Seal `plaintext` under the current key and persist ciphertext and
    /// nonce as one batch
    pub async fn set_credential(&self, plaintext: &str) -> Result<()> {
        validate_plaintext(plaintext)?;
        let _updates = self.updates.lock().await;
        let key = self.key_store.ensure_key(SEALED).await?;
        self.persist_sealed(&key, plaintext).await
    }

    /// Replace the stored credential under a freshly generated key
    ///
    /// The old key and ciphertext are discarded together before anything
    /// new is written.
    pub async fn replace_credential(&self, plaintext: &str) -> Result<()> {
        validate_plaintext(plaintext)?;
        let _updates = self.updates.lock().await;
        let key = self.key_store.rotate_key(SEALED).await?;
        self.persist_sealed(&key, plaintext).await?;
        tracing::info!(fingerprint = %key.fingerprint(), "API key replaced");
        Ok(())
    }

    /// Recover the stored credential
    ///
    /// Returns `None` when nothing is stored, when only half of the
    /// ciphertext/nonce pair exists, or when the ciphertext no longer opens
    /// under the current key, including when the stored key itself cannot be
    /// decoded.
    pub async fn get_credential(&self) -> Result<Option<String>> {
        let entries = self.store.get(&[keys::CIPHERTEXT, keys::NONCE]).await?;
        let ciphertext = entries.get(keys::CIPHERTEXT).and_then(JsonValue::as_str);
        let nonce = entries.get(keys::NONCE).and_then(JsonValue::as_str);

        let (ciphertext, nonce) = match (ciphertext, nonce) {
            (Some(c), Some(n)) if !c.is_empty() && !n.is_empty() => (c, n),
            (None, None) => return Ok(None),
            _ => {
                tracing::warn!("stored credential is incomplete; treating it as absent");
                return Ok(None);
            }
        };

        let Some(key) = self.key_store.load_key().await? else {
            tracing::warn!("stored credential has no key to open it; treating it as absent");
            return Ok(None);
        };

        let opened = EncryptedCredential::from_base64_pair(ciphertext, nonce)
            .and_then(|sealed| sealed.open(&key));
        match opened {
            Ok(plaintext) => Ok(Some(plaintext)),
            Err(Error::DecryptionFailure(reason)) => {
                tracing::warn!(
                    fingerprint = %key.fingerprint(),
                    reason = %reason,
                    "stored credential could not be decrypted"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn has_credential(&self) -> Result<bool> {
        Ok(self.get_credential().await?.is_some())
    }

    /// Remove ciphertext, nonce, and key as one batch
    pub async fn reset_credential(&self) -> Result<()> {
        let _updates = self.updates.lock().await;
        self.store
            .remove(&[keys::CIPHERTEXT, keys::NONCE, keys::ENCRYPTION_KEY])
            .await?;
        self.key_store.forget();
        tracing::info!("stored credential and encryption key removed");
        Ok(())
    }

    async fn persist_sealed(&self, key: &EncryptionKey, plaintext: &str) -> Result<()> {
        let sealed = EncryptedCredential::seal(key, plaintext)?;
        let (ciphertext, nonce) = sealed.to_base64_pair();

        self.store
            .set(HashMap::from([
                (keys::CIPHERTEXT.to_string(), JsonValue::String(ciphertext)),
                (keys::NONCE.to_string(), JsonValue::String(nonce)),
            ]))
            .await
    }
}

fn validate_plaintext(plaintext: &str) -> Result<()> {
    if plaintext.trim().is_empty() {
        return Err(Error::validation("API key cannot be empty"));
    }
    Ok(())
}
