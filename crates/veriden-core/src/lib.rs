//! Veriden Core Library
//!
//! This crate provides the substrate every Veriden plugin runs against:
//! - Isolated per-plugin storage over pluggable backing stores
//! - The capability permission gate (default grants, auto-grant and
//!   sensitive classification, request history)
//! - The per-context event bus with bounded history and targeted dispatch
//! - The host API facade
//! - The `PluginContext` composition root handed to each plugin
//! - Error taxonomy and runtime configuration

pub mod apis;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod permissions;
pub mod storage;

pub use error::{Error, Result, StorageError, StorageErrorCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::PluginContext;
    pub use crate::error::{Error, Result};
    pub use crate::events::PluginEventBus;
    pub use crate::permissions::{Capability, PermissionGate};
    pub use crate::storage::{BackingStore, MemoryStore, PluginStorage};
}
