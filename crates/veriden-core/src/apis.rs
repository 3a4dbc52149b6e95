//! Host API facade
//!
//! Plugins never touch host agent services directly; the context exposes a
//! registry of named endpoints the host chose to share. Each endpoint is a
//! narrow request/response surface.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One host-provided service endpoint reachable from plugin code
#[async_trait]
pub trait HostApi: Send + Sync {
    fn name(&self) -> &str;

    /// Invoke a method on this endpoint with JSON parameters
    async fn invoke(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value>;
}

/// The set of endpoints a context was constructed with
#[derive(Clone, Default)]
pub struct HostApis {
    endpoints: HashMap<String, Arc<dyn HostApi>>,
}

impl HostApis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, api: Arc<dyn HostApi>) -> Self {
        self.endpoints.insert(api.name().to_string(), api);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn HostApi>> {
        self.endpoints.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.endpoints.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke `method` on the named endpoint
    pub async fn invoke(
        &self,
        api: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let endpoint = self
            .get(api)
            .ok_or_else(|| Error::Other(format!("Host API '{api}' is not available")))?;
        endpoint.invoke(method, params).await
    }
}
