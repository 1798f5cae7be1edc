//! JSON file key-value store
//!
//! The whole store is one JSON object in `storage.json`. Each operation
//! re-reads the file, so a freshly started process sees exactly what the
//! previous one left behind. Writes go to a temp file in the same directory
//! and are renamed over the original while holding an exclusive lock on
//! `storage.lock`, so a batch is either fully visible or not at all.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use fs2::FileExt;
use serde_json::{Map, Value as JsonValue};
use tempfile::NamedTempFile;

use crate::domain::result::{Error, Result};
use crate::ports::{KeyValueStore, StoreMap};

const STORE_FILENAME: &str = "storage.json";
const LOCK_FILENAME: &str = "storage.lock";

/// File-backed implementation of [`KeyValueStore`]
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (or prepare) the store inside `dir`
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(STORE_FILENAME),
            lock_path: dir.join(LOCK_FILENAME),
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path, &Path) -> AnyResult<T> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || op(&path, &lock_path))
            .await
            .map_err(|e| Error::store(format!("storage task failed: {}", e)))?
            .map_err(|e| Error::store(format!("{:#}", e)))
    }
}

/// Run `f` while holding the store lock
fn with_lock<T>(lock_path: &Path, exclusive: bool, f: impl FnOnce() -> AnyResult<T>) -> AnyResult<T> {
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("Failed to open lock file {:?}", lock_path))?;

    let locked = if exclusive {
        lock_file.lock_exclusive()
    } else {
        lock_file.lock_shared()
    };
    locked.context("Failed to lock storage")?;

    let result = f();
    let _ = lock_file.unlock();
    result
}

fn read_document(path: &Path) -> AnyResult<Map<String, JsonValue>> {
    if !path.exists() {
        return Ok(Map::new());
    }

    let content = fs::read_to_string(path).context("Failed to read storage file")?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    serde_json::from_str(&content).context("Storage file is not a JSON object")
}

fn write_document(path: &Path, document: &Map<String, JsonValue>) -> AnyResult<()> {
    let dir = path
        .parent()
        .context("Storage path has no parent directory")?;

    let mut temp = NamedTempFile::new_in(dir).context("Failed to create temp storage file")?;
    let content = serde_json::to_string_pretty(document)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;

    temp.persist(path)
        .map_err(|e| e.error)
        .context("Failed to replace storage file")?;
    Ok(())
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreMap> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        self.run(move |path, lock_path| {
            let document = with_lock(lock_path, false, || read_document(path))?;
            Ok(keys
                .into_iter()
                .filter_map(|k| document.get(&k).cloned().map(|v| (k, v)))
                .collect())
        })
        .await
    }

    async fn set(&self, entries: StoreMap) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        self.run(move |path, lock_path| {
            with_lock(lock_path, true, || {
                let mut document = read_document(path)?;
                document.extend(entries);
                write_document(path, &document)
            })
        })
        .await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        self.run(move |path, lock_path| {
            with_lock(lock_path, true, || {
                let mut document = read_document(path)?;
                let before = document.len();
                for key in &keys {
                    document.remove(key);
                }
                if document.len() != before {
                    write_document(path, &document)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn touch(&self) -> Result<()> {
        self.run(|path, _| {
            // Metadata only; the document itself is not parsed
            if path.exists() {
                File::open(path).context("Failed to open storage file")?;
            }
            Ok(())
        })
        .await
    }
}
