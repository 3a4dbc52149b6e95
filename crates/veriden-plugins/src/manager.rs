//! Plugin manager
//!
//! The top-level orchestrator: owns the registry of plugin instances, the
//! registration/enable/disable/unregister state machine, the capacity and
//! validation policy, and the manager-level lifecycle event stream.
//!
//! The registry is an arena owned exclusively by the manager. Callers get
//! immutable snapshots, never references into the map; every mutation goes
//! through manager methods, and each mutating operation holds the registry
//! write guard across its checks, the awaited plugin `initialize`/`cleanup`,
//! the map mutation, and the event emission. Duplicate-id and capacity
//! checks are therefore atomic with the insert, and lifecycle events are
//! delivered in the serialized operation order.

use crate::plugin::Plugin;
use crate::PluginMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;
use veriden_core::context::PluginContext;
use veriden_core::error::{Error, Result};

/// Manager policy knobs
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of concurrently registered plugins
    pub max_plugins: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { max_plugins: 50 }
    }
}

/// Aggregate outcome of a registration (or bulk) operation
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl RegistrationResult {
    fn ok() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn failed(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Manager-level plugin state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEventType {
    Registered,
    Enabled,
    Disabled,
    Unregistered,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub event_type: LifecycleEventType,
    pub plugin_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Immutable view of one registry entry
#[derive(Debug, Clone, Serialize)]
pub struct PluginSnapshot {
    pub metadata: PluginMetadata,
    pub enabled: bool,
    pub registered_at: DateTime<Utc>,
}

struct RegisteredPlugin {
    plugin: Box<dyn Plugin>,
    context: PluginContext,
    enabled: bool,
    registered_at: DateTime<Utc>,
}

type LifecycleHandler = Box<dyn Fn(&LifecycleEvent) + Send + Sync>;

pub struct PluginManager {
    config: ManagerConfig,
    registry: RwLock<HashMap<String, RegisteredPlugin>>,
    lifecycle_handlers: Mutex<Vec<(Uuid, LifecycleHandler)>>,
}

impl PluginManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(HashMap::new()),
            lifecycle_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ManagerConfig::default())
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Register a plugin with its freshly constructed context.
    ///
    /// Checks run in a fixed order: metadata fields, duplicate id, capacity.
    /// `initialize` is awaited inside the registry guard; on failure the
    /// plugin is not stored. Success stores the plugin enabled and emits a
    /// `registered` lifecycle event.
    pub async fn register(
        &self,
        mut plugin: Box<dyn Plugin>,
        context: PluginContext,
    ) -> RegistrationResult {
        let metadata = plugin.metadata();

        let mut errors = Vec::new();
        if metadata.id.trim().is_empty() {
            errors.push("Plugin id is required".to_string());
        }
        if metadata.name.trim().is_empty() {
            errors.push("Plugin name is required".to_string());
        }
        if metadata.version.trim().is_empty() {
            errors.push("Plugin version is required".to_string());
        }
        if !errors.is_empty() {
            return RegistrationResult::failed(errors);
        }

        let mut registry = self.registry.write().await;

        if registry.contains_key(&metadata.id) {
            return RegistrationResult::failed(vec![format!(
                "Plugin {} is already registered",
                metadata.id
            )]);
        }
        if registry.len() >= self.config.max_plugins {
            return RegistrationResult::failed(vec![format!(
                "Maximum number of plugins ({}) reached",
                self.config.max_plugins
            )]);
        }

        if let Err(e) = plugin.initialize(&context).await {
            warn!(plugin_id = %metadata.id, error = %e, "Plugin initialization failed");
            return RegistrationResult::failed(vec![format!(
                "Plugin initialization failed: {e}"
            )]);
        }

        registry.insert(
            metadata.id.clone(),
            RegisteredPlugin {
                plugin,
                context,
                enabled: true,
                registered_at: Utc::now(),
            },
        );
        info!(plugin_id = %metadata.id, "Plugin registered");
        self.emit(LifecycleEventType::Registered, &metadata.id);

        RegistrationResult::ok()
    }

    /// Enable a registered plugin and emit an `enabled` event
    pub async fn enable(&self, plugin_id: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(plugin_id)
            .ok_or_else(|| Error::PluginNotFound(plugin_id.to_string()))?;
        entry.enabled = true;
        info!(plugin_id = %plugin_id, "Plugin enabled");
        self.emit(LifecycleEventType::Enabled, plugin_id);
        Ok(())
    }

    /// Disable a registered plugin without removing it from the registry
    pub async fn disable(&self, plugin_id: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        let entry = registry
            .get_mut(plugin_id)
            .ok_or_else(|| Error::PluginNotFound(plugin_id.to_string()))?;
        entry.enabled = false;
        info!(plugin_id = %plugin_id, "Plugin disabled");
        self.emit(LifecycleEventType::Disabled, plugin_id);
        Ok(())
    }

    /// Remove a plugin: awaits its `cleanup`, tears down its context, and
    /// emits an `unregistered` event. A failing plugin cleanup is logged
    /// and does not block removal.
    pub async fn unregister(&self, plugin_id: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        let mut entry = registry
            .remove(plugin_id)
            .ok_or_else(|| Error::PluginNotFound(plugin_id.to_string()))?;

        if let Err(e) = entry.plugin.cleanup().await {
            warn!(plugin_id = %plugin_id, error = %e, "Plugin cleanup failed during unregistration");
        }
        if let Err(e) = entry.context.cleanup().await {
            warn!(plugin_id = %plugin_id, error = %e, "Context teardown failed during unregistration");
        }

        info!(plugin_id = %plugin_id, "Plugin unregistered");
        self.emit(LifecycleEventType::Unregistered, plugin_id);
        Ok(())
    }

    /// Snapshot of one registry entry
    pub async fn get(&self, plugin_id: &str) -> Option<PluginSnapshot> {
        let registry = self.registry.read().await;
        registry.get(plugin_id).map(snapshot)
    }

    /// Snapshots of every registry entry, ordered by plugin id
    pub async fn list_all(&self) -> Vec<PluginSnapshot> {
        let registry = self.registry.read().await;
        let mut snapshots: Vec<_> = registry.values().map(snapshot).collect();
        snapshots.sort_by(|a, b| a.metadata.id.cmp(&b.metadata.id));
        snapshots
    }

    pub async fn is_enabled(&self, plugin_id: &str) -> bool {
        let registry = self.registry.read().await;
        registry.get(plugin_id).map(|e| e.enabled).unwrap_or(false)
    }

    pub async fn count(&self) -> usize {
        self.registry.read().await.len()
    }

    /// Subscribe to the manager-level lifecycle stream.
    ///
    /// Handlers run synchronously on the mutating call, in emission order,
    /// and see no replay of past events. They must not call back into the
    /// manager.
    pub fn on_lifecycle_event(
        &self,
        handler: impl Fn(&LifecycleEvent) + Send + Sync + 'static,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.lifecycle_handlers
            .lock()
            .unwrap()
            .push((id, Box::new(handler)));
        id
    }

    pub fn remove_lifecycle_handler(&self, handler_id: Uuid) -> bool {
        let mut handlers = self.lifecycle_handlers.lock().unwrap();
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != handler_id);
        handlers.len() < before
    }

    /// Unregister every plugin, awaiting each cleanup; leaves an empty
    /// registry. Per-plugin failures are aggregated into the report.
    pub async fn cleanup(&self) -> RegistrationResult {
        let mut registry = self.registry.write().await;
        let mut report = RegistrationResult::ok();

        let mut ids: Vec<String> = registry.keys().cloned().collect();
        ids.sort();

        for plugin_id in ids {
            let Some(mut entry) = registry.remove(&plugin_id) else {
                continue;
            };
            if let Err(e) = entry.plugin.cleanup().await {
                report
                    .warnings
                    .push(format!("Cleanup failed for plugin {plugin_id}: {e}"));
            }
            if let Err(e) = entry.context.cleanup().await {
                report
                    .warnings
                    .push(format!("Context teardown failed for plugin {plugin_id}: {e}"));
            }
            self.emit(LifecycleEventType::Unregistered, &plugin_id);
        }

        info!("Plugin manager cleaned up");
        report
    }

    fn emit(&self, event_type: LifecycleEventType, plugin_id: &str) {
        let event = LifecycleEvent {
            event_type,
            plugin_id: plugin_id.to_string(),
            timestamp: Utc::now(),
        };
        let handlers = self.lifecycle_handlers.lock().unwrap();
        for (_, handler) in handlers.iter() {
            handler(&event);
        }
    }
}

fn snapshot(entry: &RegisteredPlugin) -> PluginSnapshot {
    PluginSnapshot {
        metadata: entry.plugin.metadata(),
        enabled: entry.enabled,
        registered_at: entry.registered_at,
    }
}
