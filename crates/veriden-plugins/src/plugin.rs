//! Plugin contracts
//!
//! Two closed variants: regular plugins implement [`Plugin`]; plugins whose
//! provenance can be checked additionally implement [`VerifiablePlugin`].
//! The `check_*` hooks are where a concrete plugin wires its real
//! cryptographic or registry backend; the pipeline in
//! [`crate::verification`] composes them with the declared profile data.

use crate::{PluginMetadata, ValidationReport, VerifiableProfile};
use async_trait::async_trait;
use veriden_core::context::PluginContext;

/// Base contract every managed plugin fulfils.
///
/// `initialize` and `cleanup` may perform I/O and are awaited by the
/// manager; a plugin is not considered registered until `initialize`
/// returns `Ok`.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn metadata(&self) -> PluginMetadata;

    /// Bind the plugin to its isolated context. Failure aborts
    /// registration; nothing is stored.
    async fn initialize(&mut self, context: &PluginContext) -> anyhow::Result<()>;

    /// Release plugin-held resources; invoked on unregistration before the
    /// context is torn down.
    async fn cleanup(&mut self) -> anyhow::Result<()>;

    /// Validate the plugin's own configuration
    fn validate_config(&self) -> ValidationReport {
        ValidationReport::valid()
    }
}

/// Errors and warnings from one plugin-specific verification stage
#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl CheckOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            warnings: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Trust-extended contract for plugins whose code and provenance can be
/// cryptographically checked before trust is extended.
#[async_trait]
pub trait VerifiablePlugin: Plugin {
    /// The trust-relevant data this plugin declares about itself
    fn profile(&self) -> &VerifiableProfile;

    /// Plugin-specific source check, merged into every
    /// [`crate::VerificationPipeline::verify_source`] run. Real
    /// implementations verify the bundle against the declared digest and
    /// resolve the source DID.
    async fn check_source(&self) -> CheckOutcome {
        CheckOutcome::ok()
    }

    /// Plugin-specific trust-chain check, run only when a trust chain is
    /// configured.
    async fn check_trust_chain(&self) -> CheckOutcome {
        CheckOutcome::ok()
    }

    /// Plugin-specific integrity check, always part of
    /// [`crate::VerificationPipeline::verify_integrity`].
    async fn check_integrity(&self) -> CheckOutcome {
        CheckOutcome::ok()
    }

    /// Profile validation plus the plugin's own config validation
    fn validate_verifiable_config(&self) -> ValidationReport {
        let mut report = self.profile().validate();
        report.merge(self.validate_config());
        report
    }
}
