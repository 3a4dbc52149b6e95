//! Plugin discovery
//!
//! External discovery sources surface candidate plugin descriptors; a
//! factory turns a descriptor into a plugin instance, a context provider
//! builds its isolated channel, and the manager takes it from there. The
//! transport behind a source (marketplace API, registry file, peer
//! exchange) is not this crate's concern.

use crate::manager::PluginManager;
use crate::plugin::Plugin;
use crate::{PluginMetadata, ValidationReport};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use veriden_core::context::PluginContext;

/// Candidate plugin surfaced by a discovery source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl PluginDescriptor {
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::valid();
        if self.name.trim().is_empty() {
            report.error("Descriptor name is required");
        }
        if self.version.trim().is_empty() {
            report.error("Descriptor version is required");
        }
        if self.kind.trim().is_empty() {
            report.error("Descriptor type is required");
        }
        report
    }
}

/// External source of installable plugin metadata
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    fn id(&self) -> &str;

    async fn discover(&self) -> anyhow::Result<Vec<PluginDescriptor>>;
}

/// Instantiates plugins from descriptors it recognizes
pub trait PluginFactory: Send + Sync {
    fn supports(&self, descriptor: &PluginDescriptor) -> bool;

    fn create(&self, descriptor: &PluginDescriptor) -> anyhow::Result<Box<dyn Plugin>>;
}

/// Builds the isolated context a freshly created plugin will receive
pub trait ContextProvider: Send + Sync {
    fn context_for(&self, metadata: &PluginMetadata) -> PluginContext;
}

/// Per-descriptor outcome of an installation sweep
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryOutcome {
    pub descriptor_name: String,
    pub plugin_id: Option<String>,
    pub registered: bool,
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct DiscoveryService {
    sources: Vec<Arc<dyn DiscoverySource>>,
    factories: Vec<Arc<dyn PluginFactory>>,
}

impl DiscoveryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, source: Arc<dyn DiscoverySource>) {
        self.sources.push(source);
    }

    pub fn add_factory(&mut self, factory: Arc<dyn PluginFactory>) {
        self.factories.push(factory);
    }

    /// Collect descriptors from every source. A failing source is logged
    /// and skipped; one unreachable marketplace must not hide the others.
    pub async fn discover_all(&self) -> Vec<PluginDescriptor> {
        let mut descriptors = Vec::new();
        for source in &self.sources {
            match source.discover().await {
                Ok(mut found) => {
                    info!(source = %source.id(), count = found.len(), "Discovered plugins");
                    descriptors.append(&mut found);
                }
                Err(e) => {
                    warn!(source = %source.id(), error = %e, "Discovery source failed");
                }
            }
        }
        descriptors
    }

    /// Instantiate and register every discovered descriptor.
    ///
    /// Invalid descriptors, unsupported types, factory failures, and
    /// registration rejections each land in that descriptor's outcome;
    /// the sweep itself never fails.
    pub async fn install_discovered(
        &self,
        manager: &PluginManager,
        contexts: &dyn ContextProvider,
    ) -> Vec<DiscoveryOutcome> {
        let mut outcomes = Vec::new();

        for descriptor in self.discover_all().await {
            let report = descriptor.validate();
            if !report.is_valid {
                outcomes.push(DiscoveryOutcome {
                    descriptor_name: descriptor.name.clone(),
                    plugin_id: None,
                    registered: false,
                    errors: report.errors,
                });
                continue;
            }

            let Some(factory) = self.factories.iter().find(|f| f.supports(&descriptor)) else {
                outcomes.push(DiscoveryOutcome {
                    descriptor_name: descriptor.name.clone(),
                    plugin_id: None,
                    registered: false,
                    errors: vec![format!(
                        "No factory supports plugin type '{}'",
                        descriptor.kind
                    )],
                });
                continue;
            };

            let plugin = match factory.create(&descriptor) {
                Ok(plugin) => plugin,
                Err(e) => {
                    outcomes.push(DiscoveryOutcome {
                        descriptor_name: descriptor.name.clone(),
                        plugin_id: None,
                        registered: false,
                        errors: vec![format!("Failed to instantiate plugin: {e}")],
                    });
                    continue;
                }
            };

            let metadata = plugin.metadata();
            let context = contexts.context_for(&metadata);
            let result = manager.register(plugin, context).await;

            outcomes.push(DiscoveryOutcome {
                descriptor_name: descriptor.name.clone(),
                plugin_id: Some(metadata.id),
                registered: result.success,
                errors: result.errors,
            });
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Author, PluginKind};
    use serde_json::json;

    struct StaticSource {
        id: String,
        descriptors: Vec<PluginDescriptor>,
        fail: bool,
    }

    #[async_trait]
    impl DiscoverySource for StaticSource {
        fn id(&self) -> &str {
            &self.id
        }

        async fn discover(&self) -> anyhow::Result<Vec<PluginDescriptor>> {
            if self.fail {
                anyhow::bail!("marketplace unreachable");
            }
            Ok(self.descriptors.clone())
        }
    }

    struct DiscoveredPlugin {
        metadata: PluginMetadata,
    }

    #[async_trait]
    impl Plugin for DiscoveredPlugin {
        fn metadata(&self) -> PluginMetadata {
            self.metadata.clone()
        }

        async fn initialize(&mut self, _context: &PluginContext) -> anyhow::Result<()> {
            Ok(())
        }

        async fn cleanup(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct UtilityFactory;

    impl PluginFactory for UtilityFactory {
        fn supports(&self, descriptor: &PluginDescriptor) -> bool {
            descriptor.kind == "utility"
        }

        fn create(&self, descriptor: &PluginDescriptor) -> anyhow::Result<Box<dyn Plugin>> {
            Ok(Box::new(DiscoveredPlugin {
                metadata: PluginMetadata {
                    id: descriptor.name.clone(),
                    name: descriptor.name.clone(),
                    version: descriptor.version.clone(),
                    kind: PluginKind::Regular,
                    category: "utility".to_string(),
                    author: Author {
                        name: "Marketplace".to_string(),
                        did: "did:web:market.example".to_string(),
                        email: None,
                    },
                    capabilities: vec![],
                },
            }))
        }
    }

    struct DefaultContexts;

    impl ContextProvider for DefaultContexts {
        fn context_for(&self, metadata: &PluginMetadata) -> PluginContext {
            PluginContext::builder("discovery-agent").build_for(&metadata.id)
        }
    }

    fn descriptor(name: &str, kind: &str) -> PluginDescriptor {
        PluginDescriptor {
            name: name.to_string(),
            version: "0.2.0".to_string(),
            kind: kind.to_string(),
            config: json!({}),
        }
    }

    #[tokio::test]
    async fn failing_source_does_not_hide_the_others() {
        let mut service = DiscoveryService::new();
        service.add_source(Arc::new(StaticSource {
            id: "down".to_string(),
            descriptors: vec![],
            fail: true,
        }));
        service.add_source(Arc::new(StaticSource {
            id: "up".to_string(),
            descriptors: vec![descriptor("qr-share", "utility")],
            fail: false,
        }));

        let found = service.discover_all().await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "qr-share");
    }

    #[tokio::test]
    async fn install_discovered_registers_supported_plugins() {
        let mut service = DiscoveryService::new();
        service.add_source(Arc::new(StaticSource {
            id: "market".to_string(),
            descriptors: vec![
                descriptor("qr-share", "utility"),
                descriptor("iris-scan", "biometric"),
            ],
            fail: false,
        }));
        service.add_factory(Arc::new(UtilityFactory));

        let manager = PluginManager::with_defaults();
        let outcomes = service.install_discovered(&manager, &DefaultContexts).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].registered);
        assert!(!outcomes[1].registered);
        assert!(outcomes[1].errors[0].contains("No factory supports plugin type 'biometric'"));

        assert!(manager.get("qr-share").await.is_some());
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn invalid_descriptor_is_reported_per_item() {
        let mut service = DiscoveryService::new();
        service.add_source(Arc::new(StaticSource {
            id: "market".to_string(),
            descriptors: vec![descriptor("", "utility")],
            fail: false,
        }));
        service.add_factory(Arc::new(UtilityFactory));

        let manager = PluginManager::with_defaults();
        let outcomes = service.install_discovered(&manager, &DefaultContexts).await;

        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].registered);
        assert!(outcomes[0].errors[0].contains("Descriptor name is required"));
        assert_eq!(manager.count().await, 0);
    }

    #[test]
    fn descriptor_type_field_round_trips_as_type() {
        let parsed: PluginDescriptor = serde_json::from_value(json!({
            "name": "qr-share",
            "version": "1.0.0",
            "type": "utility"
        }))
        .unwrap();
        assert_eq!(parsed.kind, "utility");

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["type"], "utility");
    }
}
