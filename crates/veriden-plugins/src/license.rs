//! License manager
//!
//! Gates execution of monetized plugins. Installation drives the external
//! payment collaborator; payment success is the only commit point — no
//! record is written before the charge is confirmed. Records can be cached
//! for offline execution with monotone usage accounting, and re-installing
//! a plugin whose license is still valid never charges twice.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use veriden_core::error::{Error, Result};
use veriden_core::storage::BackingStore;

/// Payment request handed to the external collaborator
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub method: String,
    pub amount: f64,
    pub currency: String,
    pub user_did: String,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentReceipt {
    pub success: bool,
    pub transaction_id: String,
    pub error: Option<String>,
}

/// Transport-level payment failure; a declined charge is a successful call
/// with `PaymentReceipt::success == false`.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment transport error: {0}")]
    Transport(String),

    #[error("Payment timed out after {0} seconds")]
    Timeout(u64),

    #[error("Payment was cancelled")]
    Cancelled,
}

/// External payment collaborator
#[async_trait::async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentReceipt, PaymentError>;
}

/// Per-plugin license state held by the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub plugin_id: String,
    pub license_credential: String,
    pub payment_transaction: String,
    pub cached_for_offline: bool,
    pub usage_count: u64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub method: String,
    pub amount: f64,
    pub currency: String,
    pub user_did: String,
}

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub cache_for_offline: bool,
    pub verify_immediately: bool,
    /// Validity window for the issued license; `None` issues a perpetual
    /// license.
    pub validity: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub plugin_id: String,
    pub payment: PaymentConfig,
    pub options: InstallOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallResult {
    pub success: bool,
    pub plugin_id: String,
    pub installed_at: Option<DateTime<Utc>>,
    pub license_credential: Option<String>,
    pub payment_transaction: Option<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseVerification {
    pub is_valid: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub verification_method: Option<String>,
    pub errors: Vec<String>,
}

fn cache_key(plugin_id: &str) -> String {
    format!("license:{plugin_id}")
}

/// Derive an opaque license credential from the plugin id and the confirmed
/// payment transaction.
fn derive_credential(plugin_id: &str, transaction_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plugin_id.as_bytes());
    hasher.update(b":");
    hasher.update(transaction_id.as_bytes());
    format!("vc-license-{}", BASE64_STANDARD.encode(hasher.finalize()))
}

pub struct LicenseManager {
    payments: Arc<dyn PaymentProcessor>,
    cache: Arc<dyn BackingStore>,
    records: RwLock<HashMap<String, LicenseRecord>>,
}

impl LicenseManager {
    pub fn new(payments: Arc<dyn PaymentProcessor>, cache: Arc<dyn BackingStore>) -> Self {
        Self {
            payments,
            cache,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Install (purchase) a license for a plugin.
    ///
    /// Idempotent with respect to charging: a license that still verifies
    /// as valid short-circuits with success and no payment. Any failure
    /// returns `success = false` with explanatory errors; nothing is
    /// persisted before the payment collaborator confirms the charge.
    pub async fn install_plugin(&self, request: InstallRequest) -> InstallResult {
        let plugin_id = request.plugin_id.clone();

        let existing = self.verify_license(&plugin_id).await;
        if existing.is_valid {
            let records = self.records.read().await;
            let record = records.get(&plugin_id);
            debug!(plugin_id = %plugin_id, "License already valid; skipping payment");
            return InstallResult {
                success: true,
                plugin_id,
                installed_at: record.map(|r| r.issued_at),
                license_credential: record.map(|r| r.license_credential.clone()),
                payment_transaction: record.map(|r| r.payment_transaction.clone()),
                errors: Vec::new(),
            };
        }

        let receipt = match self
            .payments
            .process_payment(PaymentRequest {
                method: request.payment.method.clone(),
                amount: request.payment.amount,
                currency: request.payment.currency.clone(),
                user_did: request.payment.user_did.clone(),
                metadata: Some(serde_json::json!({ "plugin_id": plugin_id })),
            })
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "Payment processing failed");
                return InstallResult {
                    success: false,
                    plugin_id,
                    installed_at: None,
                    license_credential: None,
                    payment_transaction: None,
                    errors: vec![format!("Payment processing failed: {e}")],
                };
            }
        };

        if !receipt.success {
            let reason = receipt
                .error
                .unwrap_or_else(|| "Payment was declined".to_string());
            return InstallResult {
                success: false,
                plugin_id,
                installed_at: None,
                license_credential: None,
                payment_transaction: None,
                errors: vec![format!("Payment declined: {reason}")],
            };
        }

        // Payment confirmed: this is the commit point
        let issued_at = Utc::now();
        let record = LicenseRecord {
            plugin_id: plugin_id.clone(),
            license_credential: derive_credential(&plugin_id, &receipt.transaction_id),
            payment_transaction: receipt.transaction_id,
            cached_for_offline: request.options.cache_for_offline,
            usage_count: 0,
            issued_at,
            expires_at: request.options.validity.map(|v| issued_at + v),
        };

        let mut errors = Vec::new();
        if request.options.cache_for_offline
            && let Err(e) = self.persist(&record).await
        {
            // The charge went through; surface the cache failure but keep
            // the in-memory license usable.
            errors.push(format!("Failed to cache license for offline use: {e}"));
        }

        self.records
            .write()
            .await
            .insert(plugin_id.clone(), record.clone());
        info!(
            plugin_id = %plugin_id,
            transaction = %record.payment_transaction,
            cached_for_offline = record.cached_for_offline,
            "Plugin license installed"
        );

        if request.options.verify_immediately {
            let verification = self.verify_license(&plugin_id).await;
            if !verification.is_valid {
                errors.extend(verification.errors);
                return InstallResult {
                    success: false,
                    plugin_id,
                    installed_at: Some(issued_at),
                    license_credential: Some(record.license_credential),
                    payment_transaction: Some(record.payment_transaction),
                    errors,
                };
            }
        }

        InstallResult {
            success: true,
            plugin_id,
            installed_at: Some(issued_at),
            license_credential: Some(record.license_credential),
            payment_transaction: Some(record.payment_transaction),
            errors,
        }
    }

    /// Check whether a valid (installed or cached) license exists
    pub async fn verify_license(&self, plugin_id: &str) -> LicenseVerification {
        let now = Utc::now();

        let (record, method) = match self.load_record(plugin_id).await {
            Some(found) => found,
            None => {
                return LicenseVerification {
                    is_valid: false,
                    verified_at: None,
                    verification_method: None,
                    errors: vec![format!("No license found for plugin '{plugin_id}'")],
                };
            }
        };

        if let Some(expires) = record.expires_at
            && now > expires
        {
            return LicenseVerification {
                is_valid: false,
                verified_at: None,
                verification_method: Some(method),
                errors: vec![format!(
                    "License for plugin '{plugin_id}' expired at {expires}"
                )],
            };
        }

        LicenseVerification {
            is_valid: true,
            verified_at: Some(now),
            verification_method: Some(method),
            errors: Vec::new(),
        }
    }

    /// True iff a cached, offline-capable, unexpired license exists
    pub async fn check_offline_execution(&self, plugin_id: &str) -> bool {
        match self.load_record(plugin_id).await {
            Some((record, _)) => record.cached_for_offline && !record.is_expired(Utc::now()),
            None => false,
        }
    }

    /// Increment the cached record's usage counter, persisting the new
    /// count. The counter is monotone; this is its only mutation path.
    pub async fn increment_offline_usage(&self, plugin_id: &str) -> Result<u64> {
        let mut records = self.records.write().await;

        if !records.contains_key(plugin_id) {
            match self.load_cached(plugin_id).await {
                Some(record) => {
                    records.insert(plugin_id.to_string(), record);
                }
                None => {
                    return Err(Error::License(format!(
                        "No cached license for plugin '{plugin_id}'"
                    )));
                }
            }
        }

        let Some(record) = records.get_mut(plugin_id) else {
            return Err(Error::License(format!(
                "No cached license for plugin '{plugin_id}'"
            )));
        };
        record.usage_count += 1;
        let count = record.usage_count;

        if record.cached_for_offline {
            // Persist inside the write guard so concurrent increments cannot
            // write a stale count back to the cache.
            let snapshot = record.clone();
            if let Err(e) = self.persist(&snapshot).await {
                warn!(plugin_id = %plugin_id, error = %e, "Failed to persist offline usage count");
            }
        }

        debug!(plugin_id = %plugin_id, usage_count = count, "Offline usage recorded");
        Ok(count)
    }

    /// The current license record for a plugin, if any
    pub async fn get_record(&self, plugin_id: &str) -> Option<LicenseRecord> {
        self.load_record(plugin_id).await.map(|(record, _)| record)
    }

    async fn load_record(&self, plugin_id: &str) -> Option<(LicenseRecord, String)> {
        if let Some(record) = self.records.read().await.get(plugin_id) {
            return Some((record.clone(), "memory".to_string()));
        }

        let record = self.load_cached(plugin_id).await?;
        self.records
            .write()
            .await
            .insert(plugin_id.to_string(), record.clone());
        Some((record, "cache".to_string()))
    }

    async fn load_cached(&self, plugin_id: &str) -> Option<LicenseRecord> {
        let raw = match self.cache.retrieve(&cache_key(plugin_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "License cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(plugin_id = %plugin_id, error = %e, "Corrupt cached license record");
                None
            }
        }
    }

    async fn persist(&self, record: &LicenseRecord) -> Result<()> {
        let raw = serde_json::to_vec(record)?;
        self.cache.store(&cache_key(&record.plugin_id), raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use veriden_core::storage::MemoryStore;

    struct MockPaymentProcessor {
        decline: bool,
        fail_transport: bool,
        charges: Mutex<Vec<PaymentRequest>>,
    }

    impl MockPaymentProcessor {
        fn accepting() -> Self {
            Self {
                decline: false,
                fail_transport: false,
                charges: Mutex::new(Vec::new()),
            }
        }

        fn declining() -> Self {
            Self {
                decline: true,
                ..Self::accepting()
            }
        }

        fn charge_count(&self) -> usize {
            self.charges.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl PaymentProcessor for MockPaymentProcessor {
        async fn process_payment(
            &self,
            request: PaymentRequest,
        ) -> std::result::Result<PaymentReceipt, PaymentError> {
            if self.fail_transport {
                return Err(PaymentError::Transport("gateway unreachable".to_string()));
            }
            self.charges.lock().unwrap().push(request);
            if self.decline {
                return Ok(PaymentReceipt {
                    success: false,
                    transaction_id: String::new(),
                    error: Some("insufficient funds".to_string()),
                });
            }
            Ok(PaymentReceipt {
                success: true,
                transaction_id: format!("tx-{}", self.charge_count()),
                error: None,
            })
        }
    }

    fn install_request(plugin_id: &str, cache_for_offline: bool) -> InstallRequest {
        InstallRequest {
            plugin_id: plugin_id.to_string(),
            payment: PaymentConfig {
                method: "card".to_string(),
                amount: 4.99,
                currency: "EUR".to_string(),
                user_did: "did:web:user.example".to_string(),
            },
            options: InstallOptions {
                cache_for_offline,
                verify_immediately: false,
                validity: None,
            },
        }
    }

    fn manager_with(payments: Arc<MockPaymentProcessor>) -> LicenseManager {
        LicenseManager::new(payments, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn successful_install_issues_a_license() {
        let payments = Arc::new(MockPaymentProcessor::accepting());
        let manager = manager_with(payments.clone());

        let result = manager.install_plugin(install_request("paid", true)).await;

        assert!(result.success);
        assert!(result.license_credential.is_some());
        assert!(result.payment_transaction.is_some());
        assert_eq!(payments.charge_count(), 1);

        let verification = manager.verify_license("paid").await;
        assert!(verification.is_valid);
        assert_eq!(verification.verification_method.as_deref(), Some("memory"));
    }

    #[tokio::test]
    async fn declined_payment_writes_no_state() {
        let payments = Arc::new(MockPaymentProcessor::declining());
        let cache = Arc::new(MemoryStore::new());
        let manager = LicenseManager::new(payments, cache.clone());

        let result = manager.install_plugin(install_request("paid", true)).await;

        assert!(!result.success);
        assert!(result.errors[0].contains("insufficient funds"));
        assert!(manager.get_record("paid").await.is_none());
        assert!(cache.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_reported_not_thrown() {
        let payments = Arc::new(MockPaymentProcessor {
            fail_transport: true,
            ..MockPaymentProcessor::accepting()
        });
        let manager = manager_with(payments);

        let result = manager.install_plugin(install_request("paid", false)).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("gateway unreachable"));
    }

    #[tokio::test]
    async fn reinstall_with_valid_license_does_not_charge_again() {
        let payments = Arc::new(MockPaymentProcessor::accepting());
        let manager = manager_with(payments.clone());

        let first = manager.install_plugin(install_request("paid", true)).await;
        let second = manager.install_plugin(install_request("paid", true)).await;

        assert!(first.success);
        assert!(second.success);
        assert_eq!(second.payment_transaction, first.payment_transaction);
        assert_eq!(payments.charge_count(), 1);
    }

    #[tokio::test]
    async fn expired_license_fails_verification_and_allows_repurchase() {
        let payments = Arc::new(MockPaymentProcessor::accepting());
        let manager = manager_with(payments.clone());

        let mut request = install_request("paid", false);
        request.options.validity = Some(Duration::seconds(-60));
        assert!(manager.install_plugin(request).await.success);

        let verification = manager.verify_license("paid").await;
        assert!(!verification.is_valid);
        assert!(verification.errors[0].contains("expired"));

        // A second install is a genuine repurchase
        let result = manager.install_plugin(install_request("paid", false)).await;
        assert!(result.success);
        assert_eq!(payments.charge_count(), 2);
    }

    #[tokio::test]
    async fn verify_unknown_plugin_reports_missing_license() {
        let manager = manager_with(Arc::new(MockPaymentProcessor::accepting()));
        let verification = manager.verify_license("never-installed").await;
        assert!(!verification.is_valid);
        assert!(verification.errors[0].contains("No license found"));
    }

    #[tokio::test]
    async fn offline_execution_requires_a_cached_license() {
        let manager = manager_with(Arc::new(MockPaymentProcessor::accepting()));

        manager.install_plugin(install_request("cached", true)).await;
        manager.install_plugin(install_request("online-only", false)).await;

        assert!(manager.check_offline_execution("cached").await);
        assert!(!manager.check_offline_execution("online-only").await);
        assert!(!manager.check_offline_execution("never-installed").await);
    }

    #[tokio::test]
    async fn offline_usage_counts_from_a_cold_cache() {
        let payments = Arc::new(MockPaymentProcessor::accepting());
        let cache = Arc::new(MemoryStore::new());

        // Install and cache, then drop the manager to go cold
        {
            let manager = LicenseManager::new(payments.clone(), cache.clone());
            let result = manager.install_plugin(install_request("offline", true)).await;
            assert!(result.success);
        }

        let manager = LicenseManager::new(payments, cache);
        assert_eq!(manager.increment_offline_usage("offline").await.unwrap(), 1);
        assert_eq!(manager.increment_offline_usage("offline").await.unwrap(), 2);

        let record = manager.get_record("offline").await.unwrap();
        assert_eq!(record.usage_count, 2);
    }

    #[tokio::test]
    async fn increment_without_license_is_an_error() {
        let manager = manager_with(Arc::new(MockPaymentProcessor::accepting()));
        let err = manager.increment_offline_usage("ghost").await.unwrap_err();
        assert!(matches!(err, Error::License(_)));
    }

    #[test]
    fn credential_derivation_is_deterministic() {
        let a = derive_credential("plugin", "tx-1");
        assert_eq!(a, derive_credential("plugin", "tx-1"));
        assert_ne!(a, derive_credential("plugin", "tx-2"));
        assert!(a.starts_with("vc-license-"));
    }
}
