//! Verification pipeline for verifiable plugins
//!
//! Three stages over the plugin's declared profile:
//! - source verification (mandatory provenance fields + plugin check)
//! - trust-chain verification (root TAO → platform → creator), an expected
//!   no-op when no chain is configured
//! - integrity aggregation ANDing every stage that ran
//!
//! An optional trust-registry collaborator resolves accreditation
//! credentials; DID-method cryptography stays behind the plugin's own
//! `check_*` hooks.

use crate::plugin::VerifiablePlugin;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Trust extended to a plugin after chain verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    None,
    Basic,
    Verified,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceVerificationResult {
    pub is_valid: bool,
    pub source_hash: Option<String>,
    pub did_key: Option<String>,
    pub blockchain_verified: bool,
    pub identity_aggregated: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrustChainVerificationResult {
    pub is_valid: bool,
    pub trust_level: TrustLevel,
    pub chain_length: usize,
    pub verification_path: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Aggregated outcome of a full integrity run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub is_valid: bool,
    pub source: SourceVerificationResult,
    pub trust_chain: Option<TrustChainVerificationResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

/// Accreditation material resolved for a DID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccreditationCredential {
    pub issuer_did: String,
    pub subject_did: String,
    pub credential: serde_json::Value,
}

/// External trust-registry collaborator: resolves the accreditation
/// credential delegated to a DID. Treated as a black-box fetch.
#[async_trait]
pub trait TrustRegistry: Send + Sync {
    async fn resolve_accreditation(&self, did: &str) -> Result<AccreditationCredential>;
}

/// Hex-encoded SHA-256 digest over a plugin bundle; the format
/// `SourceVerification::bundle_hash` is expected to carry.
pub fn bundle_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn is_sha256_hex(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.chars().all(|c| c.is_ascii_hexdigit())
}

pub struct VerificationPipeline {
    trust_registry: Option<Arc<dyn TrustRegistry>>,
}

impl VerificationPipeline {
    pub fn new() -> Self {
        Self {
            trust_registry: None,
        }
    }

    pub fn with_trust_registry(trust_registry: Arc<dyn TrustRegistry>) -> Self {
        Self {
            trust_registry: Some(trust_registry),
        }
    }

    /// Verify the plugin's declared provenance.
    ///
    /// Fails when any of the three mandatory fields is missing; the
    /// plugin-specific source check always runs and its findings are merged.
    pub async fn verify_source(&self, plugin: &dyn VerifiablePlugin) -> SourceVerificationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let declared = plugin.profile().source_verification.clone();

        match &declared {
            None => {
                errors.push("Source verification data is required for verifiable plugins".to_string());
            }
            Some(sv) => {
                if sv.source_did.trim().is_empty() {
                    errors.push("Source DID is required for source verification".to_string());
                }
                if sv.bundle_hash.trim().is_empty() {
                    errors.push("Bundle hash is required for source verification".to_string());
                } else if !is_sha256_hex(&sv.bundle_hash) {
                    errors.push("Bundle hash must be a hex-encoded SHA-256 digest".to_string());
                }
                if sv.package_did.trim().is_empty() {
                    errors.push("Package DID is required for source verification".to_string());
                }
            }
        }

        let outcome = plugin.check_source().await;
        errors.extend(outcome.errors);
        warnings.extend(outcome.warnings);

        let is_valid = errors.is_empty();
        debug!(
            plugin_id = %plugin.metadata().id,
            is_valid,
            "Source verification completed"
        );

        SourceVerificationResult {
            is_valid,
            source_hash: declared.as_ref().and_then(|sv| sv.source_hash.clone()),
            did_key: declared.as_ref().map(|sv| sv.source_did.clone()),
            blockchain_verified: declared.as_ref().is_some_and(|sv| sv.blockchain_verified),
            identity_aggregated: declared.as_ref().is_some_and(|sv| sv.identity_aggregated),
            errors,
            warnings,
        }
    }

    /// Verify the plugin's delegated-authority chain.
    ///
    /// An absent chain is a normal outcome: `is_valid = false`, trust level
    /// none, and an explanatory error, without failing the caller.
    pub async fn verify_trust_chain(
        &self,
        plugin: &dyn VerifiablePlugin,
    ) -> TrustChainVerificationResult {
        let metadata = plugin.metadata();
        let Some(chain) = plugin.profile().trust_chain.clone() else {
            return TrustChainVerificationResult {
                is_valid: false,
                trust_level: TrustLevel::None,
                chain_length: 0,
                verification_path: Vec::new(),
                errors: vec!["Trust chain verification data not available".to_string()],
                warnings: Vec::new(),
            };
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if chain.root_tao.trim().is_empty() {
            errors.push("Root TAO is required for trust chain verification".to_string());
        }
        if chain.platform_did.trim().is_empty() {
            errors.push("Platform DID is required for trust chain verification".to_string());
        }
        if chain.accreditation_credential.trim().is_empty() {
            errors.push("Accreditation credential is required for trust chain verification".to_string());
        }

        if let Some(registry) = &self.trust_registry {
            match registry.resolve_accreditation(&chain.platform_did).await {
                Ok(credential) => {
                    debug!(
                        platform_did = %chain.platform_did,
                        issuer = %credential.issuer_did,
                        "Resolved platform accreditation"
                    );
                }
                Err(e) => {
                    errors.push(format!(
                        "Failed to resolve accreditation for {}: {e}",
                        chain.platform_did
                    ));
                }
            }
        }

        let outcome = plugin.check_trust_chain().await;
        errors.extend(outcome.errors);
        warnings.extend(outcome.warnings);

        // Conceptually root TAO -> platform -> creator
        let trust_level = if chain.dns_anchored {
            TrustLevel::Verified
        } else {
            TrustLevel::Basic
        };

        if !errors.is_empty() {
            warn!(plugin_id = %metadata.id, ?errors, "Trust chain verification failed");
        }

        TrustChainVerificationResult {
            is_valid: errors.is_empty(),
            trust_level,
            chain_length: 2,
            verification_path: vec![chain.root_tao, chain.platform_did, metadata.author.did],
            errors,
            warnings,
        }
    }

    /// Run the full pipeline: source always, trust chain only when
    /// configured, plus the plugin's own integrity check. Overall validity
    /// is the AND of every stage that ran.
    pub async fn verify_integrity(&self, plugin: &dyn VerifiablePlugin) -> VerificationReport {
        let source = self.verify_source(plugin).await;

        let trust_chain = if plugin.profile().trust_chain.is_some() {
            Some(self.verify_trust_chain(plugin).await)
        } else {
            None
        };

        let integrity = plugin.check_integrity().await;

        let mut errors = source.errors.clone();
        let mut warnings = source.warnings.clone();
        if let Some(chain) = &trust_chain {
            errors.extend(chain.errors.clone());
            warnings.extend(chain.warnings.clone());
        }
        errors.extend(integrity.errors.clone());
        warnings.extend(integrity.warnings.clone());

        let is_valid = source.is_valid
            && trust_chain.as_ref().is_none_or(|c| c.is_valid)
            && integrity.is_valid();

        VerificationReport {
            is_valid,
            source,
            trust_chain,
            errors,
            warnings,
            verified_at: Utc::now(),
        }
    }
}

impl Default for VerificationPipeline {
    fn default() -> Self {
        Self::new()
    }
}
