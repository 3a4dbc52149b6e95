//! Plugin context
//!
//! The isolated channel each plugin receives at registration. Storage,
//! permissions, events, and host APIs are per-context instances composed at
//! construction; nothing here is ambient or shared across plugins, and the
//! whole channel is torn down when the plugin is unregistered.

use crate::apis::HostApis;
use crate::error::Result;
use crate::events::{EventHandler, PluginEventBus};
use crate::permissions::PermissionGate;
use crate::storage::{BackingStore, MemoryStore, PluginStorage, StorageStats};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Dispatch target used for plugin-to-agent messages
const AGENT_TARGET: &str = "agent";

pub struct PluginContext {
    pub agent_id: String,
    pub agent_type: String,
    pub storage: PluginStorage,
    pub permissions: Arc<PermissionGate>,
    pub events: Arc<PluginEventBus>,
    pub apis: HostApis,
}

impl PluginContext {
    pub fn builder(agent_id: impl Into<String>) -> PluginContextBuilder {
        PluginContextBuilder {
            agent_id: agent_id.into(),
            agent_type: "identity".to_string(),
            backend: None,
            apis: HostApis::new(),
            event_history_capacity: None,
        }
    }

    /// Request a batch of permissions; the returned flags line up with the
    /// requested list.
    pub fn request_permissions(&self, permissions: &[&str]) -> Vec<bool> {
        permissions
            .iter()
            .map(|p| self.permissions.request(p))
            .collect()
    }

    pub fn has_all_permissions(&self, permissions: &[&str]) -> bool {
        self.permissions.has_all(permissions)
    }

    /// Subscribe one handler to several agent event types at once; returns
    /// the handler ids in the same order as `types`.
    pub fn subscribe_to_agent_events(&self, types: &[&str], handler: EventHandler) -> Vec<Uuid> {
        types
            .iter()
            .map(|t| self.events.subscribe(t, handler.clone()))
            .collect()
    }

    /// Publish a message addressed to the host agent
    pub fn publish_to_agent(&self, event: &str, data: serde_json::Value) {
        self.events.publish_to_target(event, data, AGENT_TARGET);
    }

    pub async fn storage_stats(&self) -> Result<StorageStats> {
        Ok(self.storage.stats().await?)
    }

    /// Tear the channel down: clear this plugin's storage namespace, reset
    /// the permission gate to its construction state, and drop all event
    /// handlers and history.
    pub async fn cleanup(&self) -> Result<()> {
        self.storage.clear().await?;
        self.permissions.reset();
        self.events.clear_all_handlers();
        self.events.clear_history();
        info!(agent_id = %self.agent_id, "Plugin context torn down");
        Ok(())
    }
}

pub struct PluginContextBuilder {
    agent_id: String,
    agent_type: String,
    backend: Option<Arc<dyn BackingStore>>,
    apis: HostApis,
    event_history_capacity: Option<usize>,
}

impl PluginContextBuilder {
    pub fn agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Backing store shared with other contexts; defaults to a private
    /// in-memory store.
    pub fn backend(mut self, backend: Arc<dyn BackingStore>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn apis(mut self, apis: HostApis) -> Self {
        self.apis = apis;
        self
    }

    pub fn event_history_capacity(mut self, capacity: usize) -> Self {
        self.event_history_capacity = Some(capacity);
        self
    }

    /// Build the isolated channel for `plugin_id`
    pub fn build_for(self, plugin_id: &str) -> PluginContext {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let events = match self.event_history_capacity {
            Some(capacity) => PluginEventBus::with_capacity(capacity),
            None => PluginEventBus::new(),
        };
        PluginContext {
            agent_id: self.agent_id,
            agent_type: self.agent_type,
            storage: PluginStorage::new(plugin_id, backend),
            permissions: Arc::new(PermissionGate::new()),
            events: Arc::new(events),
            apis: self.apis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> PluginContext {
        PluginContext::builder("agent-1").build_for("plugin-a")
    }

    #[test]
    fn request_permissions_preserves_order() {
        let ctx = context();
        let results = ctx.request_permissions(&["network", "admin", "read"]);
        assert_eq!(results, vec![true, false, true]);
        assert!(ctx.has_all_permissions(&["read", "network"]));
    }

    #[test]
    fn publish_to_agent_reaches_targeted_subscription() {
        let ctx = context();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        ctx.events.subscribe(
            "credential-issued:agent",
            Arc::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        ctx.publish_to_agent("credential-issued", json!({"id": "vc-1"}));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscribe_to_agent_events_covers_all_types() {
        let ctx = context();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let ids = ctx.subscribe_to_agent_events(
            &["did-created", "did-rotated"],
            Arc::new(move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(ids.len(), 2);

        ctx.events.publish("did-created", json!(null));
        ctx.events.publish("did-rotated", json!(null));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cleanup_resets_the_whole_channel() {
        let ctx = context();
        ctx.storage.store("k", json!("v")).await.unwrap();
        ctx.permissions.request("network");
        ctx.events.subscribe("e", Arc::new(|_| {}));
        ctx.events.publish("e", json!(null));

        ctx.cleanup().await.unwrap();

        assert!(ctx.storage.list_keys().await.unwrap().is_empty());
        assert!(!ctx.permissions.has("network"));
        assert!(ctx.events.active_subscriptions().is_empty());
        assert_eq!(ctx.events.stats().recent_messages.len(), 0);
    }

    #[tokio::test]
    async fn contexts_sharing_a_backend_stay_isolated() {
        let backend: Arc<dyn BackingStore> = Arc::new(MemoryStore::new());
        let a = PluginContext::builder("agent")
            .backend(backend.clone())
            .build_for("a");
        let b = PluginContext::builder("agent")
            .backend(backend.clone())
            .build_for("b");

        a.storage.store("shared-key", json!("from-a")).await.unwrap();
        b.storage.store("shared-key", json!("from-b")).await.unwrap();

        assert_eq!(a.storage.get("shared-key").await.unwrap(), Some(json!("from-a")));
        assert_eq!(b.storage.get("shared-key").await.unwrap(), Some(json!("from-b")));
    }
}
