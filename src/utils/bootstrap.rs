//! Startup helpers for the referral server.

use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::announcer::AnnounceError;
use crate::config::{ConfigError, LOG_ENV_VAR};
use crate::storage::StorageError;

/// Fatal startup failures. The binary logs these and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Announcer setup failed: {0}")]
    Announcer(#[from] AnnounceError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Initialize tracing from `REFERRAL_LOG`, defaulting to "info".
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Retry schedule for [`connect_with_retry`].
///
/// The default gives up after about three seconds of backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Run `connect` until it succeeds or `policy.max_attempts` is reached,
/// doubling the delay between attempts up to `policy.max_delay`.
///
/// Returns the last error when every attempt fails.
pub async fn connect_with_retry<T, E, F, Fut>(
    target: &str,
    policy: RetryPolicy,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(value) => {
                info!(target_name = target, attempt, "connected");
                return Ok(value);
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    target_name = target,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    retry_in = ?delay,
                    "connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => {
                error!(
                    target_name = target,
                    attempts = attempt,
                    error = %e,
                    "giving up on connection"
                );
                return Err(e);
            }
        }
    }
}

/// Resolves on ctrl-c, or on SIGTERM where available.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
