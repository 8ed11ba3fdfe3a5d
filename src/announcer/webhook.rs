//! Webhook announcer.
//!
//! POSTs `{"text": ..., "referral": {...}}` to a configured endpoint, e.g. a
//! chat bot relay.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use super::{announcement_text, AnnounceError, Announcer};
use crate::model::Referral;

/// Webhook announcer configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Endpoint URL.
    pub url: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum delivery attempts after the first failure.
    pub max_retries: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

impl WebhookConfig {
    /// Set the endpoint URL.
    pub fn with_url(mut self, url: String) -> Self {
        self.url = url;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }
}

#[derive(Serialize)]
struct AnnouncementPayload<'a> {
    text: String,
    referral: &'a Referral,
}

/// Announcer that posts to a webhook with retry.
pub struct WebhookAnnouncer {
    client: Client,
    config: WebhookConfig,
}

impl WebhookAnnouncer {
    pub fn new(config: WebhookConfig) -> Result<Self, AnnounceError> {
        if config.url.is_empty() {
            return Err(AnnounceError::Config(
                "webhook URL not configured".to_string(),
            ));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Backoff configuration for retries.
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(self.config.max_retries)
            .with_jitter()
    }

    fn is_retryable(err: &AnnounceError) -> bool {
        match err {
            AnnounceError::Http(e) => e.is_timeout() || e.is_connect(),
            AnnounceError::Unavailable(_) => true,
            _ => false,
        }
    }

    async fn post(&self, referral: &Referral) -> Result<(), AnnounceError> {
        let payload = AnnouncementPayload {
            text: announcement_text(referral),
            referral,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.config.url, id = %referral.id, "announcement posted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!(
            "HTTP {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        );

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            warn!(url = %self.config.url, status = %status, "announcement endpoint returned retryable status");
            Err(AnnounceError::Unavailable(detail))
        } else {
            Err(AnnounceError::Rejected(detail))
        }
    }
}

#[async_trait]
impl Announcer for WebhookAnnouncer {
    async fn announce(&self, referral: &Referral) -> Result<(), AnnounceError> {
        (|| async { self.post(referral).await })
            .retry(self.backoff())
            .when(Self::is_retryable)
            .await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 3);
        assert!(config.url.is_empty());
    }

    #[test]
    fn test_empty_url_rejected() {
        let result = WebhookAnnouncer::new(WebhookConfig::default());
        assert!(matches!(result, Err(AnnounceError::Config(_))));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(WebhookAnnouncer::is_retryable(&AnnounceError::Unavailable(
            "HTTP 503".into()
        )));
        assert!(!WebhookAnnouncer::is_retryable(&AnnounceError::Rejected(
            "HTTP 400".into()
        )));
    }

    #[tokio::test]
    async fn test_announce_to_unreachable_endpoint_fails() {
        let announcer = WebhookAnnouncer::new(
            WebhookConfig::default()
                .with_url("http://127.0.0.1:9/announce".to_string())
                .with_timeout(Duration::from_millis(200))
                .with_max_retries(0),
        )
        .unwrap();

        let referral = Referral::new("alice", "bob");
        assert!(announcer.announce(&referral).await.is_err());
    }

    #[tokio::test]
    async fn test_announce_posts_payload() {
        use std::sync::Arc;

        use axum::routing::post;
        use axum::{Json, Router};
        use tokio::sync::Mutex;

        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let sink = received.clone();
        let app = Router::new().route(
            "/announce",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().await.push(body);
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let announcer = WebhookAnnouncer::new(
            WebhookConfig::default().with_url(format!("http://{addr}/announce")),
        )
        .unwrap();

        let referral = Referral::new("alice", "bob");
        announcer.announce(&referral).await.unwrap();

        let received = received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["referral"]["referredUser"], "bob");
        assert!(received[0]["text"].as_str().unwrap().contains("alice"));
    }
}
