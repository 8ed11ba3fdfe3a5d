//! Storage configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default database name, shared with the announcement bot.
pub const DEFAULT_DATABASE: &str = "reclaim";

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Mongodb,
    Sqlite,
    Memory,
}

impl StorageType {
    /// Whether this backend needs a connection string.
    pub fn requires_uri(self) -> bool {
        !matches!(self, StorageType::Memory)
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageType::Mongodb => "mongodb",
            StorageType::Sqlite => "sqlite",
            StorageType::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Connection string. No default: must come from the config file or
    /// the environment.
    pub uri: String,
    /// Database name (MongoDB only).
    pub database: String,
    /// Seconds to wait for the server on each connection attempt (MongoDB
    /// server selection and connect timeout).
    pub connect_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Mongodb,
            uri: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            connect_timeout_secs: 5,
        }
    }
}

impl StorageConfig {
    /// In-memory storage, for tests.
    pub fn memory() -> Self {
        Self {
            storage_type: StorageType::Memory,
            ..Self::default()
        }
    }

    /// Per-attempt connection timeout, at least one second.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// SQLite storage at the given connection string.
    pub fn sqlite(uri: impl Into<String>) -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            uri: uri.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Mongodb);
        assert!(storage.uri.is_empty());
        assert_eq!(storage.database, "reclaim");
    }

    #[test]
    fn test_memory_does_not_require_uri() {
        assert!(!StorageType::Memory.requires_uri());
        assert!(StorageType::Sqlite.requires_uri());
        assert!(StorageType::Mongodb.requires_uri());
    }

    #[test]
    fn test_storage_type_from_yaml() {
        let config: StorageConfig = serde_yaml::from_str("type: sqlite\nuri: \"sqlite::memory:\"").unwrap();
        assert_eq!(config.storage_type, StorageType::Sqlite);
        assert_eq!(config.uri, "sqlite::memory:");
        assert_eq!(config.database, "reclaim");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_connect_timeout_from_yaml() {
        let config: StorageConfig =
            serde_yaml::from_str("type: mongodb\nuri: \"mongodb://db:27017\"\nconnect_timeout_secs: 2")
                .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));

        let zero: StorageConfig = serde_yaml::from_str("connect_timeout_secs: 0").unwrap();
        assert_eq!(zero.connect_timeout(), Duration::from_secs(1));
    }
}
