//! Service configuration
//!
//! Loaded from YAML, with every field optional, then overridden from the
//! environment for per-instance values such as the generator node number.

use crate::id::{DEFAULT_EPOCH_MS, MAX_NODE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding [`IdConfig::node_id`]
pub const ENV_NODE_ID: &str = "FRIENDGRAPH_NODE_ID";

/// Environment variable overriding [`StorageConfig::data_path`]
pub const ENV_DATA_PATH: &str = "FRIENDGRAPH_DATA_PATH";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Identifier generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdConfig {
    /// Node number, distinct per running instance
    pub node_id: u16,
    pub epoch_ms: i64,
    /// Backwards clock movement absorbed without failing
    pub clock_tolerance_ms: i64,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            epoch_ms: DEFAULT_EPOCH_MS,
            clock_tolerance_ms: 5,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for RocksDB (None = in-memory only)
    pub data_path: Option<String>,
    /// Upper bound on a row lock wait
    pub lock_timeout_ms: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: Some("./friendgraph_data".to_string()),
            lock_timeout_ms: 1000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub ids: IdConfig,
    pub storage: StorageConfig,
    /// Default deadline for one relationship operation
    pub operation_timeout_ms: u64,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ids: IdConfig::default(),
            storage: StorageConfig::default(),
            operation_timeout_ms: 3000,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_yaml_str(&contents)
    }

    /// Apply `FRIENDGRAPH_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(raw) = std::env::var(ENV_NODE_ID) {
            self.ids.node_id = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a node number, got {:?}", ENV_NODE_ID, raw))
            })?;
        }

        if let Ok(path) = std::env::var(ENV_DATA_PATH) {
            self.storage.data_path = if path.is_empty() { None } else { Some(path) };
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ids.node_id > MAX_NODE {
            return Err(ConfigError::Invalid(format!(
                "node_id must be <= {}, got {}",
                MAX_NODE, self.ids.node_id
            )));
        }

        if self.ids.clock_tolerance_ms < 0 {
            return Err(ConfigError::Invalid(format!(
                "clock_tolerance_ms must not be negative, got {}",
                self.ids.clock_tolerance_ms
            )));
        }

        if self.storage.lock_timeout_ms <= 0 {
            return Err(ConfigError::Invalid(format!(
                "lock_timeout_ms must be positive, got {}",
                self.storage.lock_timeout_ms
            )));
        }

        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "operation_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert_eq!(config.ids.epoch_ms, 1_288_834_974_657);
        assert_eq!(config.ids.clock_tolerance_ms, 5);
        assert_eq!(config.storage.lock_timeout_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "ids:\n  node_id: 17\noperation_timeout_ms: 500\n";
        let config = ServiceConfig::from_yaml_str(yaml).unwrap();

        assert_eq!(config.ids.node_id, 17);
        assert_eq!(config.ids.clock_tolerance_ms, 5);
        assert_eq!(config.operation_timeout_ms, 500);
        assert_eq!(config.storage.data_path.as_deref(), Some("./friendgraph_data"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("friendgraph.yaml");
        std::fs::write(&path, "storage:\n  data_path: null\nlog_level: debug\n").unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert!(config.storage.data_path.is_none());
        assert_eq!(config.log_level, "debug");

        assert!(matches!(
            ServiceConfig::from_file(dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServiceConfig::default();
        config.ids.node_id = 1024;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = ServiceConfig::default();
        config.ids.clock_tolerance_ms = -1;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.operation_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    // The only test touching FRIENDGRAPH_* variables, so it owns them
    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();

        std::env::set_var(ENV_NODE_ID, " 42 ");
        std::env::set_var(ENV_DATA_PATH, "/var/lib/friendgraph");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.ids.node_id, 42);
        assert_eq!(config.storage.data_path.as_deref(), Some("/var/lib/friendgraph"));

        std::env::set_var(ENV_DATA_PATH, "");
        config.apply_env_overrides().unwrap();
        assert!(config.storage.data_path.is_none());

        std::env::set_var(ENV_NODE_ID, "node-seven");
        let result = config.apply_env_overrides();

        std::env::remove_var(ENV_NODE_ID);
        std::env::remove_var(ENV_DATA_PATH);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(config.ids.node_id, 42);
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            ServiceConfig::from_yaml_str("ids: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }
}
