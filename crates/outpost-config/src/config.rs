//! Configuration management for the daemon.

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default message bus endpoint.
pub const DEFAULT_BUS_URL: &str = "http://127.0.0.1:8085/events";

/// Tenant used when the config file lists none.
pub const DEFAULT_TENANT_ID: &str = "default";

/// Main daemon configuration.
///
/// Every field has a default so a partial config file (or none at all)
/// still yields a working daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Database file location. Defaults to the standard path under the
    /// base directory when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Message bus endpoint events are published to.
    #[serde(default = "default_bus_url")]
    pub bus_url: String,
    /// Bearer token sent with publish requests (optional).
    #[serde(default)]
    pub bus_token: Option<String>,
    /// Tenants the daemon projects for. Empty means the default tenant only.
    #[serde(default)]
    pub tenants: Vec<String>,
    /// Tenant assumed when callers do not name one.
    #[serde(default = "default_tenant_id")]
    pub default_tenant_id: String,
    /// Event types the daemon accepts. Empty means all types pass through
    /// without schema validation.
    #[serde(default)]
    pub event_types: Vec<String>,
    /// Maximum rows a projector claims per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Publish attempts before a row is dead-lettered.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: i32,
    /// Sleep after a cycle that handled work (milliseconds).
    #[serde(default = "default_sleep_busy_ms")]
    pub sleep_busy_ms: u64,
    /// Base sleep after an empty poll (milliseconds).
    #[serde(default = "default_sleep_idle_ms")]
    pub sleep_idle_ms: u64,
    /// Ceiling for the idle sleep (milliseconds).
    #[serde(default = "default_sleep_idle_max_ms")]
    pub sleep_idle_max_ms: u64,
    /// How long a claim holds rows before they return to the pool (seconds).
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
    /// Pause after an infrastructure error before the loop resumes
    /// (milliseconds).
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// How long idempotency records stay valid (hours).
    #[serde(default = "default_idempotency_ttl_hours")]
    pub idempotency_ttl_hours: i64,
    /// How long sent and dead outbox rows are kept (days).
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// How often the janitor sweeps expired records (seconds).
    #[serde(default = "default_janitor_interval_secs")]
    pub janitor_interval_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_bus_url() -> String {
    DEFAULT_BUS_URL.to_string()
}

fn default_tenant_id() -> String {
    DEFAULT_TENANT_ID.to_string()
}

fn default_batch_size() -> usize {
    200
}

fn default_max_retry_attempts() -> i32 {
    5
}

fn default_sleep_busy_ms() -> u64 {
    100
}

fn default_sleep_idle_ms() -> u64 {
    1_000
}

fn default_sleep_idle_max_ms() -> u64 {
    5_000
}

fn default_claim_ttl_secs() -> u64 {
    30
}

fn default_cooldown_ms() -> u64 {
    1_000
}

fn default_idempotency_ttl_hours() -> i64 {
    24
}

fn default_retention_days() -> i64 {
    7
}

fn default_janitor_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database_path: None,
            bus_url: default_bus_url(),
            bus_token: None,
            tenants: Vec::new(),
            default_tenant_id: default_tenant_id(),
            event_types: Vec::new(),
            batch_size: default_batch_size(),
            max_retry_attempts: default_max_retry_attempts(),
            sleep_busy_ms: default_sleep_busy_ms(),
            sleep_idle_ms: default_sleep_idle_ms(),
            sleep_idle_max_ms: default_sleep_idle_max_ms(),
            claim_ttl_secs: default_claim_ttl_secs(),
            cooldown_ms: default_cooldown_ms(),
            idempotency_ttl_hours: default_idempotency_ttl_hours(),
            retention_days: default_retention_days(),
            janitor_interval_secs: default_janitor_interval_secs(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the standard location, falling back to
    /// defaults when no file exists.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the standard location.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("OUTPOST_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(bus_url) = std::env::var("OUTPOST_BUS_URL") {
            self.bus_url = bus_url;
        }
        if let Ok(bus_token) = std::env::var("OUTPOST_BUS_TOKEN") {
            self.bus_token = Some(bus_token);
        }
    }

    /// Get the bus endpoint as a parsed URL.
    pub fn bus_url(&self) -> ConfigResult<Url> {
        Url::parse(&self.bus_url).map_err(ConfigError::from)
    }

    /// Tenants the daemon should run projectors for.
    ///
    /// An empty `tenants` list means the daemon serves only the default
    /// tenant.
    pub fn effective_tenants(&self) -> Vec<String> {
        if self.tenants.is_empty() {
            vec![self.default_tenant_id.clone()]
        } else {
            self.tenants.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.bus_url, DEFAULT_BUS_URL);
        assert_eq!(config.default_tenant_id, DEFAULT_TENANT_ID);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.claim_ttl_secs, 30);
        assert_eq!(config.idempotency_ttl_hours, 24);
        assert_eq!(config.retention_days, 7);
        assert!(config.tenants.is_empty());
        assert!(config.event_types.is_empty());
        assert!(config.bus_token.is_none());
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_config_load_from_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "tenants": ["alpha", "beta"],
            "batch_size": 50
        }"#;

        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.tenants, vec!["alpha", "beta"]);
        assert_eq!(config.batch_size, 50);
        // untouched keys keep their defaults
        assert_eq!(config.bus_url, DEFAULT_BUS_URL);
        assert_eq!(config.max_retry_attempts, 5);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.batch_size = 25;
        config.tenants = vec!["acme".to_string()];
        config.retention_days = 14;

        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.batch_size, 25);
        assert_eq!(loaded.tenants, vec!["acme"]);
        assert_eq!(loaded.retention_days, 14);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.default_tenant_id, DEFAULT_TENANT_ID);
    }

    #[test]
    fn test_config_bus_url_parse() {
        let config = Config::default();
        let url = config.bus_url().unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), "/events");
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.bus_url = "not a valid url".to_string();

        let result = config.bus_url();
        assert!(result.is_err());
    }

    #[test]
    fn test_effective_tenants_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(config.effective_tenants(), vec![DEFAULT_TENANT_ID]);

        let mut named = Config::default();
        named.tenants = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(named.effective_tenants(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("OUTPOST_LOG_LEVEL", "trace");
        std::env::set_var("OUTPOST_BUS_URL", "http://bus.internal:9000/events");
        std::env::set_var("OUTPOST_BUS_TOKEN", "secret");

        let config = Config::new();
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.bus_url, "http://bus.internal:9000/events");
        assert_eq!(config.bus_token.as_deref(), Some("secret"));

        std::env::remove_var("OUTPOST_LOG_LEVEL");
        std::env::remove_var("OUTPOST_BUS_URL");
        std::env::remove_var("OUTPOST_BUS_TOKEN");
    }

    #[test]
    fn test_default_constants() {
        assert!(!DEFAULT_LOG_LEVEL.is_empty());
        assert!(!DEFAULT_BUS_URL.is_empty());
        assert!(DEFAULT_BUS_URL.starts_with("http"));
        assert!(!DEFAULT_TENANT_ID.is_empty());
    }
}
