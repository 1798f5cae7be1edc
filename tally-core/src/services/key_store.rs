//! Key store - lifecycle of the symmetric encryption key
//!
//! The host store is the source of truth. The decoded key is cached in memory
//! but every call re-reads the persisted bytes first, so a process that was
//! suspended and resumed (or another activation that reset the key) never
//! keeps using a stale key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as JsonValue;
use tokio::sync::Mutex as AsyncMutex;

use crate::domain::result::{Error, Result};
use crate::domain::EncryptionKey;
use crate::ports::{keys, KeyValueStore};

/// What the store holds under the key entry
enum StoredKey {
    Missing,
    Usable(EncryptionKey),
    Unreadable(String),
}

pub struct KeyStore {
    store: Arc<dyn KeyValueStore>,
    /// Serializes check-then-generate and rotation
    writer: AsyncMutex<()>,
    current: Mutex<Option<EncryptionKey>>,
    /// Set once key generation fails; every later call reports it
    failure: Mutex<Option<String>>,
}

impl KeyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            writer: AsyncMutex::new(()),
            current: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    /// Return the current key, generating and persisting one if none is stored
    ///
    /// Repeated calls return the same key for as long as it stays persisted.
    /// Stored bytes that do not decode as a key are replaced, and the
    /// entries in `dependents` (sealed under the unreadable key) are removed
    /// in the same batch.
    pub async fn ensure_key(&self, dependents: &[&str]) -> Result<EncryptionKey> {
        let _writer = self.writer.lock().await;

        match self.read_stored().await? {
            StoredKey::Usable(key) => Ok(key),
            StoredKey::Missing => self.generate_and_persist().await,
            StoredKey::Unreadable(reason) => {
                tracing::warn!(reason = %reason, "stored encryption key is unreadable; replacing it");
                self.remove_with(dependents).await?;
                self.generate_and_persist().await
            }
        }
    }

    /// Return the persisted key without ever generating one
    ///
    /// A key that cannot be decoded counts as absent.
    pub async fn load_key(&self) -> Result<Option<EncryptionKey>> {
        match self.read_stored().await? {
            StoredKey::Usable(key) => Ok(Some(key)),
            StoredKey::Missing => Ok(None),
            StoredKey::Unreadable(reason) => {
                tracing::warn!(reason = %reason, "stored encryption key is unreadable");
                Ok(None)
            }
        }
    }

    async fn read_stored(&self) -> Result<StoredKey> {
        self.check_failure()?;

        let Some(stored) = self.store.get_one(keys::ENCRYPTION_KEY).await? else {
            lock(&self.current).take();
            return Ok(StoredKey::Missing);
        };

        let decoded = match stored.as_str() {
            Some(encoded) => EncryptionKey::from_base64(encoded),
            None => Err(Error::KeyUnavailable("stored key is not a string".to_string())),
        };
        let key = match decoded {
            Ok(key) => key,
            Err(e) => {
                lock(&self.current).take();
                return Ok(StoredKey::Unreadable(e.to_string()));
            }
        };

        let mut current = lock(&self.current);
        if current.as_ref() != Some(&key) {
            tracing::debug!(fingerprint = %key.fingerprint(), "encryption key loaded from store");
            *current = Some(key.clone());
        }
        Ok(StoredKey::Usable(key))
    }

    /// Discard the current key together with the entries sealed under it,
    /// then generate and persist a new key
    ///
    /// The old key and `dependents` are removed in one batch before the new
    /// key is written, so no reader can pair the new key with old ciphertext.
    pub async fn rotate_key(&self, dependents: &[&str]) -> Result<EncryptionKey> {
        let _writer = self.writer.lock().await;
        self.check_failure()?;
        self.remove_with(dependents).await?;

        let key = self.generate_and_persist().await?;
        tracing::info!(fingerprint = %key.fingerprint(), "encryption key rotated");
        Ok(key)
    }

    /// Drop the in-memory copy (after the persisted bytes were removed)
    pub fn forget(&self) {
        lock(&self.current).take();
    }

    /// Remove the key entry and `dependents` as one batch
    async fn remove_with(&self, dependents: &[&str]) -> Result<()> {
        let mut batch = Vec::with_capacity(dependents.len() + 1);
        batch.push(keys::ENCRYPTION_KEY);
        batch.extend_from_slice(dependents);

        self.store.remove(&batch).await?;
        lock(&self.current).take();
        Ok(())
    }

    async fn generate_and_persist(&self) -> Result<EncryptionKey> {
        let key = match EncryptionKey::generate() {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(error = %e, "encryption key generation failed");
                *lock(&self.failure) = Some(e.to_string());
                return Err(e);
            }
        };

        let entry = HashMap::from([(
            keys::ENCRYPTION_KEY.to_string(),
            JsonValue::String(key.to_base64()),
        )]);
        self.store.set(entry).await?;

        *lock(&self.current) = Some(key.clone());
        tracing::info!(fingerprint = %key.fingerprint(), "encryption key generated");
        Ok(key)
    }

    fn check_failure(&self) -> Result<()> {
        match lock(&self.failure).as_ref() {
            Some(reason) => Err(Error::KeyUnavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
