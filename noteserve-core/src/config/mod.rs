//! Configuration management for noteserve
//!
//! Configuration comes from a TOML file, from `NOTESERVE_*` environment
//! variables layered over the defaults, or from both (file first, then
//! environment overrides via [`Config::apply_env`]).

use crate::core_sync::MAX_FRAGMENT_LIMIT;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub store: StoreConfig,

    /// Sync protocol configuration
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a writer waits for the database lock
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Sync protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Unix seconds. Clients whose last sync predates this must resync from 0
    pub full_sync_before: i64,

    /// Page size used when a fragment request names no limit
    pub default_fragment_limit: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter
    pub enabled: bool,

    /// Exporter bind address
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/noteserve.db"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            full_sync_before: 0,
            default_fragment_limit: MAX_FRAGMENT_LIMIT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
        }
    }
}

fn parse_var<T>(name: &str, what: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", what, e))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults
    ///
    /// Environment variables follow the pattern: NOTESERVE_<SECTION>_<KEY>
    /// Example: NOTESERVE_SERVER_BIND_ADDRESS=0.0.0.0:3000
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `NOTESERVE_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(addr) = parse_var("NOTESERVE_SERVER_BIND_ADDRESS", "bind address")? {
            self.server.bind_address = addr;
        }
        if let Ok(timeout) = env::var("NOTESERVE_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = humantime_serde::re::humantime::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid request timeout: {}", e)))?;
        }

        if let Ok(path) = env::var("NOTESERVE_STORE_DB_PATH") {
            self.store.db_path = PathBuf::from(path);
        }
        if let Some(size) = parse_var("NOTESERVE_STORE_POOL_SIZE", "pool size")? {
            self.store.pool_size = size;
        }

        if let Some(before) = parse_var("NOTESERVE_SYNC_FULL_SYNC_BEFORE", "full sync threshold")? {
            self.sync.full_sync_before = before;
        }
        if let Some(limit) =
            parse_var("NOTESERVE_SYNC_DEFAULT_FRAGMENT_LIMIT", "default fragment limit")?
        {
            self.sync.default_fragment_limit = limit;
        }

        if let Ok(level) = env::var("NOTESERVE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_var("NOTESERVE_LOG_JSON", "JSON flag")? {
            self.logging.json_format = json;
        }

        if let Some(enabled) = parse_var("NOTESERVE_METRICS_ENABLED", "metrics flag")? {
            self.metrics.enabled = enabled;
        }
        if let Some(addr) = parse_var("NOTESERVE_METRICS_BIND_ADDRESS", "metrics address")? {
            self.metrics.bind_address = addr;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.sync.default_fragment_limit == 0
            || self.sync.default_fragment_limit > MAX_FRAGMENT_LIMIT
        {
            return Err(ConfigError::ValidationFailed(format!(
                "default_fragment_limit must be between 1 and {}",
                MAX_FRAGMENT_LIMIT
            )));
        }

        if self.sync.full_sync_before < 0 {
            return Err(ConfigError::ValidationFailed(
                "full_sync_before must not be negative".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.default_fragment_limit, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.store.pool_size = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.default_fragment_limit = 101;
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.default_fragment_limit = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.server.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noteserve.toml");

        let mut config = Config::default();
        config.sync.full_sync_before = 1_541_108_743;
        config.server.request_timeout = Duration::from_secs(5);
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sync.full_sync_before, 1_541_108_743);
        assert_eq!(loaded.server.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[sync]\nfull_sync_before = 10\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sync.full_sync_before, 10);
        assert_eq!(loaded.sync.default_fragment_limit, MAX_FRAGMENT_LIMIT);
        assert_eq!(loaded.store.pool_size, 8);
    }
}
