//! HTTP handlers.
//!
//! Each handler makes one service call and wraps the result in the
//! `{success, ...}` envelope existing clients expect.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;
use crate::model::{LeaderboardEntry, Referral};

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReferralRequest {
    pub referrer: Option<String>,
    pub referred_user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferredUserRequest {
    pub referred_user: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub success: bool,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackReferralResponse {
    pub success: bool,
    pub message: String,
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferralsResponse {
    pub success: bool,
    pub referrals: Vec<Referral>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCountResponse {
    pub success: bool,
    pub referrer: String,
    pub verified_referrals: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub success: bool,
    pub balance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAnnouncementsResponse {
    pub success: bool,
    pub pending_referrals: Vec<Referral>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    pub leaderboard: Vec<LeaderboardEntry>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn root() -> &'static str {
    "server running"
}

pub async fn ping(State(service): State<AppState>) -> ApiResult<PingResponse> {
    let data = service.ping().await?;
    Ok(Json(PingResponse {
        success: true,
        message: "Storage connection is healthy".to_string(),
        data,
    }))
}

pub async fn track_referral(
    State(service): State<AppState>,
    body: Result<Json<TrackReferralRequest>, JsonRejection>,
) -> ApiResult<TrackReferralResponse> {
    let Json(request) = body?;
    let referral = service
        .track_referral(request.referrer.as_deref(), request.referred_user.as_deref())
        .await?;

    Ok(Json(TrackReferralResponse {
        success: true,
        message: "Referral tracked successfully.".to_string(),
        id: referral.id,
    }))
}

pub async fn referrals_by_referrer(
    State(service): State<AppState>,
    Path(referrer): Path<String>,
) -> ApiResult<ReferralsResponse> {
    let referrals = service.referrals_by_referrer(&referrer).await?;
    Ok(Json(ReferralsResponse {
        success: true,
        referrals,
    }))
}

pub async fn referral_count(
    State(service): State<AppState>,
    Path(referrer): Path<String>,
) -> ApiResult<ReferralCountResponse> {
    let verified_referrals = service.verified_referral_count(&referrer).await?;
    Ok(Json(ReferralCountResponse {
        success: true,
        referrer,
        verified_referrals,
    }))
}

pub async fn balance(
    State(service): State<AppState>,
    Path(wallet): Path<String>,
) -> ApiResult<BalanceResponse> {
    let balance = service.balance(&wallet).await?;
    Ok(Json(BalanceResponse {
        success: true,
        balance,
    }))
}

pub async fn verify_referral(
    State(service): State<AppState>,
    body: Result<Json<ReferredUserRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = body?;
    service
        .verify_referral(request.referred_user.as_deref())
        .await?;
    Ok(MessageResponse::ok("Referral verified successfully."))
}

pub async fn verify_referral_by_id(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    service.verify_referral_by_id(&id).await?;
    Ok(MessageResponse::ok("Referral verified successfully."))
}

pub async fn pending_announcements(
    State(service): State<AppState>,
) -> ApiResult<PendingAnnouncementsResponse> {
    let pending_referrals = service.pending_announcements().await?;
    Ok(Json(PendingAnnouncementsResponse {
        success: true,
        pending_referrals,
    }))
}

pub async fn mark_announced(
    State(service): State<AppState>,
    body: Result<Json<ReferredUserRequest>, JsonRejection>,
) -> ApiResult<MessageResponse> {
    let Json(request) = body?;
    service
        .mark_announced(request.referred_user.as_deref())
        .await?;
    Ok(MessageResponse::ok("Referral marked as announced."))
}

pub async fn mark_announced_by_id(
    State(service): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MessageResponse> {
    service.mark_announced_by_id(&id).await?;
    Ok(MessageResponse::ok("Referral marked as announced."))
}

pub async fn leaderboard(State(service): State<AppState>) -> ApiResult<LeaderboardResponse> {
    let leaderboard = service.leaderboard().await?;
    Ok(Json(LeaderboardResponse {
        success: true,
        leaderboard,
    }))
}
