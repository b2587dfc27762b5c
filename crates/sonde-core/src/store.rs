//! Parameter store — the small key-value space that survives a restart.
//!
//! `FileStore` keeps the values in a JSON file and rewrites it on every
//! change (tmp file → rename). `MemoryStore` is the volatile equivalent used
//! by tests and by nodes started without a store path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::params::ParamKey;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, serde_json::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(serde_json::Error),
    #[error("store unavailable")]
    Unavailable,
}

/// Persistent storage for node parameters.
pub trait KvStore: Send + Sync {
    fn read(&self, key: ParamKey) -> Result<Option<u32>, StoreError>;
    fn write(&self, key: ParamKey, value: u32) -> Result<(), StoreError>;
    /// Removing an absent key is not an error.
    fn delete(&self, key: ParamKey) -> Result<(), StoreError>;
}

// ── File-backed store ─────────────────────────────────────────────────────────

pub struct FileStore {
    path: PathBuf,
    values: DashMap<ParamKey, u32>,
}

impl FileStore {
    /// Open the store at `path`, loading existing values if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = DashMap::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| StoreError::ReadFailed(path.clone(), e))?;
            let stored: BTreeMap<ParamKey, u32> = serde_json::from_str(&text)
                .map_err(|e| StoreError::ParseFailed(path.clone(), e))?;
            for (key, value) in stored {
                values.insert(key, value);
            }
            tracing::debug!(path = %path.display(), entries = values.len(), "parameter store loaded");
        }
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let snapshot: BTreeMap<ParamKey, u32> = self
            .values
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot).map_err(StoreError::SerializeFailed)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::WriteFailed(parent.to_path_buf(), e))?;
        }
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| StoreError::WriteFailed(tmp_path.clone(), e))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StoreError::WriteFailed(self.path.clone(), e))
    }
}

impl KvStore for FileStore {
    fn read(&self, key: ParamKey) -> Result<Option<u32>, StoreError> {
        Ok(self.values.get(&key).map(|v| *v.value()))
    }

    fn write(&self, key: ParamKey, value: u32) -> Result<(), StoreError> {
        self.values.insert(key, value);
        self.flush()
    }

    fn delete(&self, key: ParamKey) -> Result<(), StoreError> {
        if self.values.remove(&key).is_none() {
            return Ok(());
        }
        self.flush()
    }
}

// ── Volatile store ────────────────────────────────────────────────────────────

/// In-memory store. Clones share the same contents, so a clone handed to a
/// second node instance behaves like the same flash surviving a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<DashMap<ParamKey, u32>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write and delete fail with `Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn read(&self, key: ParamKey) -> Result<Option<u32>, StoreError> {
        Ok(self.values.get(&key).map(|v| *v.value()))
    }

    fn write(&self, key: ParamKey, value: u32) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable);
        }
        self.values.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: ParamKey) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable);
        }
        self.values.remove(&key);
        Ok(())
    }
}
