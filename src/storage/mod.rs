//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};

pub mod memory;
mod referral_store;

#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mongodb")]
pub mod mongodb;

pub use memory::MemoryReferralStore;
pub use referral_store::{ReferralStore, Result, StorageError};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteReferralStore;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoReferralStore;

/// Initialize storage based on configuration.
///
/// Connects, creates tables/indexes where the backend needs them, and
/// returns the store behind the `ReferralStore` interface.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn ReferralStore>> {
    info!(storage_type = %config.storage_type, "initializing storage");

    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryReferralStore::new())),
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let store = SqliteReferralStore::connect(&config.uri).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::Unavailable(
                "sqlite feature not enabled".to_string(),
            ))
        }
        #[cfg(feature = "mongodb")]
        StorageType::Mongodb => {
            // The driver connects lazily; index creation is the first
            // round-trip and is bounded by these timeouts.
            let mut options = ::mongodb::options::ClientOptions::parse(&config.uri).await?;
            options.server_selection_timeout = Some(config.connect_timeout());
            options.connect_timeout = Some(config.connect_timeout());
            let client = ::mongodb::Client::with_options(options)?;
            let store = MongoReferralStore::new(&client, &config.database).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "mongodb"))]
        StorageType::Mongodb => {
            tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
            Err(StorageError::Unavailable(
                "mongodb feature not enabled".to_string(),
            ))
        }
    }
}
