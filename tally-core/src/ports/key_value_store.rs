//! Host key-value store port

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::domain::result::Result;

/// A batch of entries read from or written to the store
pub type StoreMap = HashMap<String, JsonValue>;

/// Names of the persisted entries
pub mod keys {
    /// Base64 raw bytes of the current encryption key
    pub const ENCRYPTION_KEY: &str = "encryptionKey";
    /// Base64 ciphertext of the API key
    pub const CIPHERTEXT: &str = "apiKey";
    /// Base64 nonce the ciphertext was sealed with
    pub const NONCE: &str = "iv";
    /// Refresh interval in minutes
    pub const REFRESH_INTERVAL: &str = "refreshInterval";
}

/// Persistent key-value storage provided by the host
///
/// Every `set` and `remove` call is one batch: a reader sees either all of
/// its entries or none of them. That is what keeps ciphertext and nonce
/// from ever being observed half-written.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the given keys; absent keys are simply missing from the map
    async fn get(&self, keys: &[&str]) -> Result<StoreMap>;

    /// Write all entries as one batch
    async fn set(&self, entries: StoreMap) -> Result<()>;

    /// Remove all keys as one batch
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    /// Read without effect; keeps the host from reclaiming an idle process
    async fn touch(&self) -> Result<()> {
        self.get(&[]).await.map(|_| ())
    }

    /// Read a single key
    async fn get_one(&self, key: &str) -> Result<Option<JsonValue>> {
        Ok(self.get(&[key]).await?.remove(key))
    }
}
