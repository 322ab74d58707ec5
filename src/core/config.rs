//! Engine configuration with documented defaults
//!
//! Values load from a TOML file, then environment overrides apply, then
//! command-line flags. Every field has a default so an empty file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};
use crate::core::types::DEFAULT_MAX_LEVEL_LEN;

/// Environment variable overriding `store.database_path`
pub const ENV_DATABASE_PATH: &str = "SURVIVOR_DB_PATH";

/// Environment variable overriding `store.operation_timeout_ms`
pub const ENV_OPERATION_TIMEOUT_MS: &str = "SURVIVOR_OPERATION_TIMEOUT_MS";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub reports: ReportConfig,
    pub inventory: InventoryConfig,
}

/// Relational store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file shared by every engine instance
    pub database_path: PathBuf,

    /// Upper bound on open connections held by one process
    ///
    /// Requests beyond this wait for a free connection; the wait counts
    /// against their deadline.
    pub max_connections: usize,

    /// How long a writer waits for another writer's lock (milliseconds)
    ///
    /// Concurrent updates to one survivor serialize on the store lock, so
    /// this should comfortably exceed the longest single transaction.
    pub busy_timeout_ms: u64,

    /// Default budget for one engine operation (milliseconds)
    ///
    /// Callers can shorten or extend it per call with `with_deadline`.
    pub operation_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("survivors.db"),
            max_connections: 8,
            busy_timeout_ms: 5_000,
            operation_timeout_ms: 2_000,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// What happens to contamination reports against an infected survivor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AfterInfection {
    /// Reject the report as a conflict and leave the counter alone
    #[default]
    Reject,
    /// Keep counting (legacy behavior of the plain report endpoint)
    Accumulate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub after_infection: AfterInfection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// Longest accepted resource level label, in characters
    pub max_level_len: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_level_len: DEFAULT_MAX_LEVEL_LEN,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config pointing at a specific database file
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.store.database_path = path.into();
        config
    }

    /// Load configuration from a TOML file
    pub fn load_from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SURVIVOR_*` environment overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DATABASE_PATH) {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_OPERATION_TIMEOUT_MS) {
            self.store.operation_timeout_ms = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!("{} must be an integer, got {:?}", ENV_OPERATION_TIMEOUT_MS, raw))
            })?;
        }
        self.validate()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.store.max_connections == 0 {
            return Err(EngineError::Config("store.max_connections must be at least 1".into()));
        }
        if self.store.operation_timeout_ms == 0 {
            return Err(EngineError::Config("store.operation_timeout_ms must be positive".into()));
        }
        if self.store.database_path.as_os_str().is_empty() {
            return Err(EngineError::Config("store.database_path must not be empty".into()));
        }
        if self.inventory.max_level_len == 0 {
            return Err(EngineError::Config("inventory.max_level_len must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.reports.after_infection, AfterInfection::Reject);
        assert_eq!(config.store.operation_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = EngineConfig::parse_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_parse_full_toml() {
        let config = EngineConfig::parse_toml(
            r#"
            [store]
            database_path = "/var/lib/survivors/ledger.db"
            max_connections = 2
            busy_timeout_ms = 750

            [reports]
            after_infection = "accumulate"

            [inventory]
            max_level_len = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.store.database_path, PathBuf::from("/var/lib/survivors/ledger.db"));
        assert_eq!(config.store.max_connections, 2);
        assert_eq!(config.store.busy_timeout(), Duration::from_millis(750));
        // Unspecified fields keep their defaults
        assert_eq!(config.store.operation_timeout_ms, 2_000);
        assert_eq!(config.reports.after_infection, AfterInfection::Accumulate);
        assert_eq!(config.inventory.max_level_len, 12);
    }

    #[test]
    fn test_rejects_zero_connections() {
        let err = EngineConfig::parse_toml("[store]\nmax_connections = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_connections"));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        assert!(EngineConfig::parse_toml("[reports]\nafter_infection = \"forgive\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::new();
        config
            .apply_overrides(|key| match key {
                ENV_DATABASE_PATH => Some("/tmp/override.db".into()),
                ENV_OPERATION_TIMEOUT_MS => Some("150".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.store.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.store.operation_timeout_ms, 150);

        let err = config
            .apply_overrides(|key| (key == ENV_OPERATION_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_OPERATION_TIMEOUT_MS));
    }
}
