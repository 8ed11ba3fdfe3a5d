//! Referral announcements.
//!
//! Verified referrals are surfaced publicly by an [`Announcer`]. The
//! [`AnnouncementWorker`] polls pending announcements, hands each to the
//! announcer and marks it announced once the announcer accepts it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::AnnouncerConfig;
use crate::model::Referral;

mod webhook;
mod worker;

pub use webhook::{WebhookAnnouncer, WebhookConfig};
pub use worker::{AnnouncementWorker, WorkerHandle};

/// Errors from announcement delivery.
#[derive(Debug, thiserror::Error)]
pub enum AnnounceError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a retryable status (429 or 5xx).
    #[error("Announcement endpoint unavailable: {0}")]
    Unavailable(String),

    /// Endpoint refused the announcement.
    #[error("Announcement rejected: {0}")]
    Rejected(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Sink that publicly surfaces a verified referral.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Announce one referral. An error leaves the referral pending.
    async fn announce(&self, referral: &Referral) -> Result<(), AnnounceError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Human-readable announcement text.
pub fn announcement_text(referral: &Referral) -> String {
    format!(
        "New Referral!\nReferrer: {}\nReferred: {}",
        referral.referrer, referral.referred_user
    )
}

/// Announcer that only logs.
#[derive(Debug, Default)]
pub struct LogAnnouncer;

#[async_trait]
impl Announcer for LogAnnouncer {
    async fn announce(&self, referral: &Referral) -> Result<(), AnnounceError> {
        info!(
            id = %referral.id,
            referrer = %referral.referrer,
            referred_user = %referral.referred_user,
            "new referral announced"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Build the announcer described by `config`: webhook if a URL is set, log otherwise.
pub fn from_config(config: &AnnouncerConfig) -> Result<Arc<dyn Announcer>, AnnounceError> {
    match &config.webhook_url {
        Some(url) if !url.is_empty() => {
            let webhook = WebhookAnnouncer::new(
                WebhookConfig::default()
                    .with_url(url.clone())
                    .with_timeout(config.timeout()),
            )?;
            Ok(Arc::new(webhook))
        }
        _ => Ok(Arc::new(LogAnnouncer)),
    }
}
