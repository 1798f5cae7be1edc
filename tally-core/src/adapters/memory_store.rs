//! In-memory key-value store
//!
//! Used by tests and by ephemeral runs where nothing should touch disk.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::result::{Error, Result};
use crate::ports::{KeyValueStore, StoreMap};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<StoreMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing entries (e.g. what a previous process persisted)
    pub fn with_entries(entries: StoreMap) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Copy of everything currently stored
    pub fn contents(&self) -> StoreMap {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreMap>> {
        self.entries
            .lock()
            .map_err(|e| Error::store(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let entries = self.lock()?;
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect::<HashMap<_, _>>())
    }

    async fn set(&self, batch: StoreMap) -> Result<()> {
        self.lock()?.extend(batch);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.lock()?;
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}
