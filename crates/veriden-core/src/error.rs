//! Error types for Veriden

use thiserror::Error;

/// Result type alias using Veriden's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Veriden error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Validation errors (V100-V199)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Registry errors (V200-V299)
    #[error("Plugin {0} is already registered")]
    DuplicateRegistration(String),

    #[error("Maximum number of plugins ({0}) reached")]
    CapacityExceeded(usize),

    #[error("Plugin '{0}' is not registered")]
    PluginNotFound(String),

    // Verification errors (V300-V399)
    #[error("Integrity verification failed: {0}")]
    IntegrityFailure(String),

    #[error("Trust chain verification data not available")]
    TrustChainUnavailable,

    // Permission errors (V400-V499)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // License errors (V500-V599)
    #[error("License error: {0}")]
    License(String),

    // Storage errors (V600-V699)
    #[error(transparent)]
    Storage(#[from] StorageError),

    // Config errors (V700-V799)
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic errors (V900+)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "V100",
            Self::DuplicateRegistration(_) => "V200",
            Self::CapacityExceeded(_) => "V201",
            Self::PluginNotFound(_) => "V202",
            Self::IntegrityFailure(_) => "V300",
            Self::TrustChainUnavailable => "V301",
            Self::PermissionDenied(_) => "V400",
            Self::License(_) => "V500",
            Self::Storage(_) => "V600",
            Self::Config(_) => "V700",
            Self::Serialization(_) => "V900",
            Self::Io(_) => "V901",
            Self::Other(_) => "V999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::PluginNotFound(id) => Some(format!("veriden plugins list (looking for '{id}')")),
            Self::CapacityExceeded(_) => {
                Some("Raise runtime.max_plugins in config.toml".to_string())
            }
            Self::TrustChainUnavailable => {
                Some("Configure a trust chain for the plugin to raise its trust level".to_string())
            }
            Self::License(_) => Some("veriden license inspect <cache-file>".to_string()),
            Self::Config(_) => Some("veriden config show".to_string()),
            _ => None,
        }
    }
}

/// Typed storage failure raised by backing stores.
///
/// The storage facade converts `ItemNotFound` into `None`; every other code
/// propagates to the caller.
#[derive(Error, Debug)]
#[error("Storage operation '{operation}' failed ({code:?}): {message}")]
pub struct StorageError {
    pub code: StorageErrorCode,
    pub operation: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    EncryptionFailed,
    DecryptionFailed,
    ItemNotFound,
    StorageFull,
    BackupFailed,
    RestoreFailed,
    PermissionDenied,
}

impl StorageError {
    pub fn new(
        code: StorageErrorCode,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, key: &str) -> Self {
        Self::new(
            StorageErrorCode::ItemNotFound,
            operation,
            format!("item '{key}' not found"),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StorageErrorCode::ItemNotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).code(), "V100");
        assert_eq!(Error::DuplicateRegistration("p".into()).code(), "V200");
        assert_eq!(Error::CapacityExceeded(5).code(), "V201");
        assert_eq!(Error::TrustChainUnavailable.code(), "V301");
    }

    #[test]
    fn duplicate_registration_message() {
        let err = Error::DuplicateRegistration("did-key".into());
        assert_eq!(err.to_string(), "Plugin did-key is already registered");
    }

    #[test]
    fn capacity_message_includes_limit() {
        let err = Error::CapacityExceeded(5);
        assert_eq!(err.to_string(), "Maximum number of plugins (5) reached");
    }

    #[test]
    fn storage_error_not_found_detection() {
        let err = StorageError::not_found("retrieve", "plugin:a:k");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("retrieve"));

        let err = StorageError::new(StorageErrorCode::StorageFull, "store", "disk full");
        assert!(!err.is_not_found());
    }
}
