//! referral-server: HTTP referral tracking API
//!
//! Connects to storage (with a short bounded retry) before binding the
//! listener. Any startup failure is logged and the process exits with
//! status 1.
//!
//! ## Configuration
//! - `config.yaml`, a path given as the first argument, or `REFERRAL_CONFIG`
//! - `REFERRAL__SERVER__PORT`, `REFERRAL__STORAGE__TYPE`, `REFERRAL__STORAGE__URI`, ...
//! - `MONGO_URI` / `DATABASE_URL` when no storage URI is configured
//! - `REFERRAL_LOG` for log filtering (default: info)

use std::sync::Arc;

use tracing::{error, info};

use referral_service::announcer::{self, AnnouncementWorker};
use referral_service::api;
use referral_service::config::Config;
use referral_service::service::ReferralService;
use referral_service::storage::init_storage;
use referral_service::utils::bootstrap::{
    connect_with_retry, init_tracing, shutdown_signal, RetryPolicy, StartupError,
};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        error!(error = %e, "referral server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let announcer = if config.announcer.enabled {
        Some(announcer::from_config(&config.announcer)?)
    } else {
        None
    };

    let storage_name = config.storage.storage_type.to_string();
    let store = connect_with_retry(&storage_name, RetryPolicy::default(), || {
        init_storage(&config.storage)
    })
    .await?;

    let service = Arc::new(ReferralService::new(store));

    let worker = announcer.map(|announcer| {
        AnnouncementWorker::new(service.clone(), announcer)
            .with_interval(config.announcer.interval())
            .spawn()
    });

    let result = api::serve(service, &config.server.bind_address(), shutdown_signal()).await;

    if let Some(worker) = worker {
        worker.shutdown().await;
    }
    info!("referral server stopped");

    Ok(result?)
}
