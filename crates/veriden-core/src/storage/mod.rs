//! Plugin storage
//!
//! A minimal backing-store contract plus the per-plugin namespaced facade.
//! Platform backends (OS keychain, encrypted file stores, browser storage)
//! implement [`BackingStore`] and look identical to the runtime; the crate
//! ships an in-memory store and a single-file JSON store.

mod backend;
mod plugin_store;

pub use backend::{BackingStore, FileStore, MemoryStore};
pub use plugin_store::{PluginStorage, StorageEntry, StorageStats};
