//! Announcement worker configuration.

use std::time::Duration;

use serde::Deserialize;

/// Announcement worker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnouncerConfig {
    /// Run the background announcement worker.
    pub enabled: bool,
    /// Seconds between polls of pending announcements.
    pub interval_secs: u64,
    /// Webhook to POST announcements to. Announcements are only logged when unset.
    pub webhook_url: Option<String>,
    /// Webhook request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 60,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

impl AnnouncerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
