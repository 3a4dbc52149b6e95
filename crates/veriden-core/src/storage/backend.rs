//! Backing-store contract and the bundled implementations

use crate::error::{StorageError, StorageErrorCode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

/// Minimal persistent key/value contract consumed by [`super::PluginStorage`]
/// and the license cache.
///
/// `retrieve` returns `Ok(None)` for missing keys; implementations reserve
/// errors for genuine failures (I/O, encryption, quota).
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError>;
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory backing store.
///
/// The default store for tests and ephemeral agents; several plugin contexts
/// may share one instance because the facade namespaces every key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// File-backed store persisting all entries as one JSON document.
///
/// Values are kept base64-free as raw byte vectors in the JSON map
/// (serde_json serializes `Vec<u8>` as an array); adequate for the small
/// records this runtime persists (licenses, plugin state).
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles against the document
    io_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> Result<HashMap<String, Vec<u8>>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            StorageError::new(
                StorageErrorCode::RestoreFailed,
                "retrieve",
                format!("failed to read {}: {e}", self.path.display()),
            )
        })?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            StorageError::new(
                StorageErrorCode::RestoreFailed,
                "retrieve",
                format!("corrupt store document {}: {e}", self.path.display()),
            )
        })
    }

    fn write_document(&self, document: &HashMap<String, Vec<u8>>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::new(
                    StorageErrorCode::BackupFailed,
                    "store",
                    format!("failed to create {}: {e}", parent.display()),
                )
            })?;
        }
        let json = serde_json::to_string(document).map_err(|e| {
            StorageError::new(StorageErrorCode::BackupFailed, "store", e.to_string())
        })?;
        std::fs::write(&self.path, json).map_err(|e| {
            StorageError::new(
                StorageErrorCode::BackupFailed,
                "store",
                format!("failed to write {}: {e}", self.path.display()),
            )
        })
    }
}

#[async_trait]
impl BackingStore for FileStore {
    async fn store(&self, key: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read_document()?;
        document.insert(key.to_string(), data);
        self.write_document(&document)
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_document()?.remove(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.io_lock.lock().await;
        let mut document = self.read_document()?;
        if document.remove(key).is_some() {
            self.write_document(&document)?;
        }
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let _guard = self.io_lock.lock().await;
        Ok(self.read_document()?.into_keys().collect())
    }
}
