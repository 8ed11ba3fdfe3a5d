//! HTTP JSON API.
//!
//! Endpoints:
//! - `GET /`: liveness text
//! - `GET /api/ping`: storage round-trip
//! - `POST /api/track-referral`: record a referral
//! - `GET /api/referrals/:referrer`: referrals made by a referrer
//! - `GET /api/referrals/:referrer/count`: verified referral count
//! - `GET /api/balance/:wallet`: wallet balance (0 when unknown)
//! - `POST /api/verify-referral`: verify by referred user
//! - `POST /api/referral/:id/verify`: verify by referral id
//! - `GET /api/pending-announcements`: verified, not yet announced
//! - `POST /api/mark-announced`: announce by referred user
//! - `POST /api/referral/:id/announce`: announce by referral id
//! - `GET /api/leaderboard`: top referrers by verified count

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::ReferralService;

pub mod error;
pub mod handlers;


pub use error::{ApiError, FailureBody};

/// Shared state for axum handlers.
pub type AppState = Arc<ReferralService>;

/// Build the axum router (separated for testing).
pub fn router(service: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/ping", get(handlers::ping))
        .route("/api/track-referral", post(handlers::track_referral))
        .route("/api/referrals/:referrer", get(handlers::referrals_by_referrer))
        .route("/api/referrals/:referrer/count", get(handlers::referral_count))
        .route("/api/balance/:wallet", get(handlers::balance))
        .route("/api/verify-referral", post(handlers::verify_referral))
        .route("/api/referral/:id/verify", post(handlers::verify_referral_by_id))
        .route(
            "/api/pending-announcements",
            get(handlers::pending_announcements),
        )
        .route("/api/mark-announced", post(handlers::mark_announced))
        .route("/api/referral/:id/announce", post(handlers::mark_announced_by_id))
        .route("/api/leaderboard", get(handlers::leaderboard))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve<F>(service: AppState, addr: &str, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "referral API listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}
