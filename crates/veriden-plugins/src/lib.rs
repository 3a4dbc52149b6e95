//! Veriden Plugin Runtime
//!
//! Lets a host identity/credential agent load third-party capability
//! plugins without trusting them by default:
//! - Plugin lifecycle (register/enable/disable/unregister) with a capacity-
//!   bounded registry and an ordered lifecycle event stream
//! - Multi-stage integrity and trust-chain verification for verifiable
//!   plugins
//! - Monetized-license gating with offline execution accounting
//! - Discovery adapter feeding candidate descriptors into the manager
//!
//! The per-plugin communication channel (storage, permissions, events) lives
//! in `veriden-core`; this crate manages the plugins confined to it.

pub mod discovery;
pub mod license;
pub mod manager;
pub mod plugin;
pub mod verification;

use serde::{Deserialize, Serialize};

pub use discovery::{DiscoveryService, DiscoverySource, PluginDescriptor, PluginFactory};
pub use license::{InstallOptions, InstallRequest, InstallResult, LicenseManager, PaymentProcessor};
pub use manager::{ManagerConfig, PluginManager, RegistrationResult};
pub use plugin::{CheckOutcome, Plugin, VerifiablePlugin};
pub use verification::{TrustRegistry, VerificationPipeline};

/// Closed set of plugin variants managed by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Regular,
    Verifiable,
}

/// Plugin author identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub did: String,
    pub email: Option<String>,
}

/// Static description of a plugin, reported by [`plugin::Plugin::metadata`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    pub category: String,
    pub author: Author,
    pub capabilities: Vec<String>,
}

/// How strictly a verifiable plugin's provenance is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    Basic,
    Standard,
    Strict,
}

/// Provenance data a verifiable plugin declares about its own bundle.
/// `source_did`, `bundle_hash`, and `package_did` are mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVerification {
    pub source_did: String,
    pub bundle_hash: String,
    pub package_did: String,
    pub source_hash: Option<String>,
    #[serde(default)]
    pub blockchain_verified: bool,
    #[serde(default)]
    pub identity_aggregated: bool,
}

/// Delegated-authority path from a root trust anchor to the plugin creator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustChain {
    pub root_tao: String,
    pub platform_did: String,
    pub accreditation_credential: String,
    #[serde(default)]
    pub dns_anchored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monetization {
    pub requires_license: bool,
    pub license_type: String,
    pub price: Price,
}

/// Trust-relevant declaration carried only by verifiable plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiableProfile {
    pub verification_level: VerificationLevel,
    pub source_verification: Option<SourceVerification>,
    pub trust_chain: Option<TrustChain>,
    pub monetization: Option<Monetization>,
}

impl VerifiableProfile {
    /// Validate the declared profile.
    ///
    /// Missing source verification (or a missing source DID) is a hard
    /// error; a monetized plugin without a trust chain passes with a
    /// warning.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::valid();

        match &self.source_verification {
            None => report.error("Source verification data is required for verifiable plugins"),
            Some(sv) => {
                if sv.source_did.trim().is_empty() {
                    report.error("Source DID is required for source verification");
                }
            }
        }

        if let Some(monetization) = &self.monetization
            && monetization.requires_license
            && self.trust_chain.is_none()
        {
            report.warn("Trust chain verification is recommended for monetized plugins");
        }

        report
    }
}

/// Outcome of a configuration validation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}
