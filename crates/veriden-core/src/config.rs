//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Veriden configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub license: LicenseConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Identifier of the host agent plugins are attached to
    pub agent_id: String,
    /// Agent flavor handed to plugin contexts (e.g. "identity", "credential")
    pub agent_type: String,
    /// Maximum number of concurrently registered plugins
    pub max_plugins: usize,
    /// Bounded per-context event history capacity
    pub event_history_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Directory holding cached offline license records
    pub cache_dir: Option<PathBuf>,
    /// Default validity window for newly issued licenses, in days.
    /// `None` issues perpetual licenses.
    pub default_validity_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for file-backed plugin storage
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig {
                agent_id: "veriden-agent".to_string(),
                agent_type: "identity".to_string(),
                max_plugins: 50,
                event_history_capacity: 1000,
            },
            license: LicenseConfig {
                cache_dir: None,
                default_validity_days: None,
            },
            storage: StorageConfig { data_dir: None },
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("VERIDEN_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("veriden")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            // Return default config without creating file
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runtime.agent_id.trim().is_empty() {
            return Err(anyhow!("runtime.agent_id cannot be empty"));
        }
        if self.runtime.max_plugins == 0 {
            return Err(anyhow!("runtime.max_plugins must be at least 1"));
        }
        if self.runtime.event_history_capacity == 0 {
            return Err(anyhow!("runtime.event_history_capacity must be at least 1"));
        }
        if let Some(days) = self.license.default_validity_days
            && days == 0
        {
            return Err(anyhow!(
                "license.default_validity_days must be at least 1 when set"
            ));
        }
        Ok(())
    }
}
