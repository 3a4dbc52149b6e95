//! Capability permission gate
//!
//! Every plugin context carries its own gate. Four capabilities are granted
//! at construction and can never be revoked; further requests are classified
//! into an auto-grant set and a sensitive set, and anything unrecognized is
//! denied. Every request, grant, and denial lands in a per-capability
//! history so the host can audit what a plugin asked for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Closed set of capabilities a plugin may hold.
///
/// The gate classifies against this enum rather than raw strings; requests
/// that fail to parse take the unknown-permission denial path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Sign,
    Verify,
    Network,
    Storage,
    Admin,
    System,
    Hardware,
    Biometric,
}

impl Capability {
    /// Granted to every context at construction; irrevocable
    pub const DEFAULTS: [Capability; 4] = [
        Capability::Read,
        Capability::Write,
        Capability::Sign,
        Capability::Verify,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Sign => "sign",
            Capability::Verify => "verify",
            Capability::Network => "network",
            Capability::Storage => "storage",
            Capability::Admin => "admin",
            Capability::System => "system",
            Capability::Hardware => "hardware",
            Capability::Biometric => "biometric",
        }
    }

    pub fn is_default(&self) -> bool {
        Self::DEFAULTS.contains(self)
    }

    /// Grantable without operator involvement
    pub fn is_auto_grantable(&self) -> bool {
        matches!(
            self,
            Capability::Read
                | Capability::Write
                | Capability::Sign
                | Capability::Verify
                | Capability::Network
                | Capability::Storage
        )
    }

    /// Requires an explicit administrative grant
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Capability::Admin | Capability::System | Capability::Hardware | Capability::Biometric
        )
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Capability::Read),
            "write" => Ok(Capability::Write),
            "sign" => Ok(Capability::Sign),
            "verify" => Ok(Capability::Verify),
            "network" => Ok(Capability::Network),
            "storage" => Ok(Capability::Storage),
            "admin" => Ok(Capability::Admin),
            "system" => Ok(Capability::System),
            "hardware" => Ok(Capability::Hardware),
            "biometric" => Ok(Capability::Biometric),
            _ => Err(()),
        }
    }
}

/// One capability's request history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub capability: String,
    pub requested_at: DateTime<Utc>,
    pub granted_at: Option<DateTime<Utc>>,
    pub denied_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Request/grant/denial counts; `pending = requested - granted - denied`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionStats {
    pub granted: usize,
    pub requested: usize,
    pub denied: usize,
    pub pending: usize,
}

/// The capability gate enforced on a single plugin context
pub struct PermissionGate {
    granted: RwLock<HashSet<Capability>>,
    history: RwLock<HashMap<String, PermissionRequest>>,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self {
            granted: RwLock::new(Capability::DEFAULTS.into_iter().collect()),
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Request a capability by name.
    ///
    /// Already-granted capabilities return `true` immediately; otherwise the
    /// request is classified (auto-grant, sensitive, unknown). Every request
    /// is recorded in the history regardless of outcome.
    pub fn request(&self, permission: &str) -> bool {
        let requested_at = Utc::now();

        let Ok(capability) = permission.parse::<Capability>() else {
            warn!(permission = %permission, "Denied unknown permission");
            self.record(permission, requested_at, None, Some(requested_at), Some("Unknown permission"));
            return false;
        };

        if self.granted.read().unwrap().contains(&capability) {
            self.record(permission, requested_at, Some(requested_at), None, None);
            return true;
        }

        if capability.is_auto_grantable() {
            self.granted.write().unwrap().insert(capability);
            debug!(capability = %capability, "Auto-granted permission");
            self.record(permission, requested_at, Some(requested_at), None, Some("Auto-granted"));
            return true;
        }

        // Sensitive capability: denied until an operator grants it explicitly
        warn!(capability = %capability, "Denied sensitive permission");
        self.record(
            permission,
            requested_at,
            None,
            Some(requested_at),
            Some("Sensitive permission requires explicit administrative grant"),
        );
        false
    }

    /// Administrative override: grant a capability with a recorded reason.
    ///
    /// Returns `false` for unrecognized capability names.
    pub fn grant(&self, permission: &str, reason: &str) -> bool {
        let Ok(capability) = permission.parse::<Capability>() else {
            return false;
        };
        self.granted.write().unwrap().insert(capability);
        let now = Utc::now();
        self.record(permission, now, Some(now), None, Some(reason));
        debug!(capability = %capability, reason = %reason, "Permission granted");
        true
    }

    /// Administrative override: deny a capability with a recorded reason.
    ///
    /// Removes a prior non-default grant; the default set stays intact.
    pub fn deny(&self, permission: &str, reason: &str) {
        if let Ok(capability) = permission.parse::<Capability>()
            && !capability.is_default()
        {
            self.granted.write().unwrap().remove(&capability);
        }
        let now = Utc::now();
        self.record(permission, now, None, Some(now), Some(reason));
        debug!(permission = %permission, reason = %reason, "Permission denied");
    }

    /// Revoke a previously granted capability.
    ///
    /// The default set is irrevocable; revoking a default (or anything not
    /// currently granted) is a no-op returning `false`.
    pub fn revoke(&self, permission: &str) -> bool {
        let Ok(capability) = permission.parse::<Capability>() else {
            return false;
        };
        if capability.is_default() {
            return false;
        }
        self.granted.write().unwrap().remove(&capability)
    }

    pub fn has(&self, permission: &str) -> bool {
        permission
            .parse::<Capability>()
            .map(|c| self.granted.read().unwrap().contains(&c))
            .unwrap_or(false)
    }

    pub fn has_all(&self, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.has(p))
    }

    /// Currently granted capabilities, sorted
    pub fn list(&self) -> Vec<Capability> {
        let mut granted: Vec<_> = self.granted.read().unwrap().iter().copied().collect();
        granted.sort();
        granted
    }

    pub fn history(&self) -> Vec<PermissionRequest> {
        self.history.read().unwrap().values().cloned().collect()
    }

    pub fn stats(&self) -> PermissionStats {
        let history = self.history.read().unwrap();
        let requested = history.len();
        let granted = history.values().filter(|r| r.granted_at.is_some()).count();
        let denied = history
            .values()
            .filter(|r| r.granted_at.is_none() && r.denied_at.is_some())
            .count();
        PermissionStats {
            granted,
            requested,
            denied,
            pending: requested.saturating_sub(granted + denied),
        }
    }

    /// Restore the construction state: default grants only, empty history.
    /// Used by context teardown.
    pub fn reset(&self) {
        *self.granted.write().unwrap() = Capability::DEFAULTS.into_iter().collect();
        self.history.write().unwrap().clear();
    }

    fn record(
        &self,
        permission: &str,
        requested_at: DateTime<Utc>,
        granted_at: Option<DateTime<Utc>>,
        denied_at: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) {
        self.history.write().unwrap().insert(
            permission.to_string(),
            PermissionRequest {
                capability: permission.to_string(),
                requested_at,
                granted_at,
                denied_at,
                reason: reason.map(str::to_string),
            },
        );
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}
