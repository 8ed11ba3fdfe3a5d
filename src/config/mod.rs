//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod announcer;
mod server;
mod storage;

pub use announcer::AnnouncerConfig;
pub use server::ServerConfig;
pub use storage::{StorageConfig, StorageType, DEFAULT_DATABASE};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REFERRAL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REFERRAL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REFERRAL_LOG";
/// Legacy environment variables for the storage connection string, in lookup order.
pub const LEGACY_URI_ENV_VARS: [&str; 2] = ["MONGO_URI", "DATABASE_URL"];

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("No connection string for {0} storage (set storage.uri, REFERRAL__STORAGE__URI or MONGO_URI)")]
    MissingConnectionString(StorageType),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Announcement worker configuration.
    pub announcer: AnnouncerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. `MONGO_URI` / `DATABASE_URL`, only when no storage URI was set above
    ///
    /// The result is validated: a missing connection string is an error.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;
        config.apply_legacy_uri(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill an empty storage URI from the legacy variables.
    pub fn apply_legacy_uri<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if !self.storage.uri.is_empty() {
            return;
        }
        if let Some(uri) = LEGACY_URI_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .find(|uri| !uri.is_empty())
        {
            self.storage.uri = uri;
        }
    }

    /// Check that the configuration is usable for startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.storage_type.requires_uri() && self.storage.uri.trim().is_empty() {
            return Err(ConfigError::MissingConnectionString(
                self.storage.storage_type,
            ));
        }
        Ok(())
    }

    /// Create config for testing (in-memory storage).
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::memory(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_default_requires_uri() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingConnectionString(StorageType::Mongodb))
        ));
    }

    #[test]
    fn test_config_for_test_is_valid() {
        let config = Config::for_test();
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_uri_fills_empty_uri() {
        let mut config = Config::default();
        config.apply_legacy_uri(|name| match name {
            "DATABASE_URL" => Some("mongodb://db:27017".to_string()),
            _ => None,
        });
        assert_eq!(config.storage.uri, "mongodb://db:27017");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_uri_prefers_mongo_uri() {
        let mut config = Config::default();
        config.apply_legacy_uri(|name| Some(format!("mongodb://{}", name.to_lowercase())));
        assert_eq!(config.storage.uri, "mongodb://mongo_uri");
    }

    #[test]
    fn test_legacy_uri_does_not_override() {
        let mut config = Config::default();
        config.storage.uri = "mongodb://configured".to_string();
        config.apply_legacy_uri(|_| Some("mongodb://legacy".to_string()));
        assert_eq!(config.storage.uri, "mongodb://configured");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
server:
  port: 8080
storage:
  type: sqlite
  uri: "sqlite::memory:"
announcer:
  enabled: true
  webhook_url: "http://hooks.local/announce"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert!(config.announcer.enabled);
        assert_eq!(config.announcer.interval_secs, 60);
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("REFERRAL__STORAGE__TYPE", "memory");
        std::env::set_var("REFERRAL__SERVER__PORT", "6100");
        let config = Config::load(None);
        std::env::remove_var("REFERRAL__STORAGE__TYPE");
        std::env::remove_var("REFERRAL__SERVER__PORT");

        let config = config.unwrap();
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.server.port, 6100);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("referral.yaml");
        std::fs::write(&path, "storage:\n  type: sqlite\n  uri: \"sqlite::memory:\"\n").unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(config.storage.uri, "sqlite::memory:");
    }
}
