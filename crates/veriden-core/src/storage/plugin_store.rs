//! Per-plugin namespaced storage facade

use super::BackingStore;
use crate::error::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One stored value with access accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntry {
    pub value: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

/// Aggregate statistics over one plugin's namespace
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub most_accessed_key: Option<String>,
}

/// Storage handle scoped to a single plugin.
///
/// Every key is namespaced with `plugin:{id}:` so multiple plugins can share
/// one backing store without collision. Missing keys read as `None`; genuine
/// backend failures propagate as [`StorageError`].
#[derive(Clone)]
pub struct PluginStorage {
    backend: Arc<dyn BackingStore>,
    prefix: String,
}

impl PluginStorage {
    pub fn new(plugin_id: &str, backend: Arc<dyn BackingStore>) -> Self {
        Self {
            backend,
            prefix: format!("plugin:{plugin_id}:"),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Store a value, overwriting any previous entry for the key.
    ///
    /// Overwrite resets access accounting; there is no merge.
    pub async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        let now = Utc::now();
        let entry = StorageEntry {
            value,
            timestamp: now,
            access_count: 0,
            last_accessed: now,
        };
        self.write_entry(key, &entry).await
    }

    /// Fetch a value, bumping its access accounting on hit.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let Some(mut entry) = self.read_entry(key).await? else {
            return Ok(None);
        };

        entry.access_count += 1;
        entry.last_accessed = Utc::now();
        self.write_entry(key, &entry).await?;

        Ok(Some(entry.value))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.backend.delete(&self.namespaced(key)).await
    }

    pub async fn has(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.read_entry(key).await?.is_some())
    }

    /// Keys in this plugin's namespace, with the prefix stripped
    pub async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .backend
            .list_keys()
            .await?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    /// Remove every entry under this plugin's namespace, leaving other
    /// plugins' data untouched.
    pub async fn clear(&self) -> Result<(), StorageError> {
        for key in self.list_keys().await? {
            self.backend.delete(&self.namespaced(&key)).await?;
        }
        debug!(prefix = %self.prefix, "Cleared plugin storage namespace");
        Ok(())
    }

    pub async fn stats(&self) -> Result<StorageStats, StorageError> {
        let mut entries = 0usize;
        let mut total_bytes = 0usize;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut most_accessed: Option<(String, u64)> = None;

        for key in self.list_keys().await? {
            let Some(entry) = self.read_entry(&key).await? else {
                continue;
            };
            entries += 1;
            total_bytes += serde_json::to_vec(&entry.value)
                .map(|v| v.len())
                .unwrap_or(0);
            if oldest.is_none_or(|t| entry.timestamp < t) {
                oldest = Some(entry.timestamp);
            }
            if most_accessed
                .as_ref()
                .is_none_or(|(_, count)| entry.access_count > *count)
            {
                most_accessed = Some((key, entry.access_count));
            }
        }

        Ok(StorageStats {
            entries,
            total_bytes,
            oldest_entry: oldest,
            most_accessed_key: most_accessed.map(|(k, _)| k),
        })
    }

    async fn read_entry(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let raw = match self.backend.retrieve(&self.namespaced(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            // "not found" surfaced as an error by a backend reads as absence
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let entry = serde_json::from_slice(&raw).map_err(|e| {
            StorageError::new(
                crate::error::StorageErrorCode::DecryptionFailed,
                "get",
                format!("corrupt entry for key '{key}': {e}"),
            )
        })?;
        Ok(Some(entry))
    }

    async fn write_entry(&self, key: &str, entry: &StorageEntry) -> Result<(), StorageError> {
        let raw = serde_json::to_vec(entry).map_err(|e| {
            StorageError::new(crate::error::StorageErrorCode::BackupFailed, "store", e.to_string())
        })?;
        self.backend.store(&self.namespaced(key), raw).await
    }
}
