//! Referral service.
//!
//! Owns the referral lifecycle (track, verify, announce), the leaderboard
//! and balance lookups. The storage client is injected; until one is
//! attached every operation fails with `StorageError::NotReady`.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::model::{LeaderboardEntry, Referral, ReferralFlag, TransitionOutcome};
use crate::storage::{ReferralStore, StorageError};


/// Errors surfaced by service operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Referral lifecycle, leaderboard and balance operations over a store.
#[derive(Default)]
pub struct ReferralService {
    store: OnceCell<Arc<dyn ReferralStore>>,
}

impl ReferralService {
    /// Create a service with its store attached.
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self {
            store: OnceCell::new_with(Some(store)),
        }
    }

    /// Create a service with no store yet. Requests fail until [`attach`](Self::attach).
    pub fn pending() -> Self {
        Self::default()
    }

    /// Attach the store. Returns false if one was already attached.
    pub fn attach(&self, store: Arc<dyn ReferralStore>) -> bool {
        let attached = self.store.set(store).is_ok();
        if attached {
            info!("referral store attached");
        }
        attached
    }

    /// Whether a store is attached.
    pub fn is_ready(&self) -> bool {
        self.store.initialized()
    }

    fn store(&self) -> std::result::Result<&dyn ReferralStore, StorageError> {
        self.store
            .get()
            .map(|store| store.as_ref())
            .ok_or(StorageError::NotReady)
    }

    /// Round-trip the store.
    pub async fn ping(&self) -> Result<serde_json::Value> {
        Ok(self.store()?.ping().await?)
    }

    /// Record that `referrer` referred `referred_user`.
    ///
    /// Both identifiers must be present and non-blank; nothing is written
    /// otherwise. Duplicate calls create duplicate referrals.
    pub async fn track_referral(
        &self,
        referrer: Option<&str>,
        referred_user: Option<&str>,
    ) -> Result<Referral> {
        let (Some(referrer), Some(referred_user)) = (present(referrer), present(referred_user))
        else {
            return Err(ServiceError::Validation(
                "Missing referrer or referredUser".to_string(),
            ));
        };

        let referral = Referral::new(referrer, referred_user);
        self.store()?.insert(&referral).await?;

        info!(
            id = %referral.id,
            referrer = %referral.referrer,
            referred_user = %referral.referred_user,
            "referral tracked"
        );
        Ok(referral)
    }

    /// Mark the newest unverified referral of `referred_user` as verified.
    pub async fn verify_referral(&self, referred_user: Option<&str>) -> Result<Referral> {
        let referred_user = require_referred_user(referred_user)?;
        let outcome = self
            .store()?
            .set_flag_for_referred_user(referred_user, ReferralFlag::Verified)
            .await?;
        finish_transition(outcome, ReferralFlag::Verified)
    }

    /// Mark the newest unannounced referral of `referred_user` as announced.
    ///
    /// Does not require the referral to be verified.
    pub async fn mark_announced(&self, referred_user: Option<&str>) -> Result<Referral> {
        let referred_user = require_referred_user(referred_user)?;
        let outcome = self
            .store()?
            .set_flag_for_referred_user(referred_user, ReferralFlag::Announced)
            .await?;
        finish_transition(outcome, ReferralFlag::Announced)
    }

    /// Mark the referral with this id as verified.
    pub async fn verify_referral_by_id(&self, id: &str) -> Result<Referral> {
        let outcome = self
            .store()?
            .set_flag_by_id(id, ReferralFlag::Verified)
            .await?;
        finish_transition(outcome, ReferralFlag::Verified)
    }

    /// Mark the referral with this id as announced.
    pub async fn mark_announced_by_id(&self, id: &str) -> Result<Referral> {
        let outcome = self
            .store()?
            .set_flag_by_id(id, ReferralFlag::Announced)
            .await?;
        finish_transition(outcome, ReferralFlag::Announced)
    }

    /// Every referral made by `referrer`, unbounded.
    pub async fn referrals_by_referrer(&self, referrer: &str) -> Result<Vec<Referral>> {
        let referrals = self.store()?.find_by_referrer(referrer).await?;
        debug!(referrer, count = referrals.len(), "fetched referrals");
        Ok(referrals)
    }

    /// Verified referrals that have not been announced yet.
    pub async fn pending_announcements(&self) -> Result<Vec<Referral>> {
        Ok(self.store()?.find_pending_announcements().await?)
    }

    /// Number of verified referrals made by `referrer`.
    pub async fn verified_referral_count(&self, referrer: &str) -> Result<u64> {
        Ok(self.store()?.count_verified(referrer).await?)
    }

    /// Top referrers by verified referral count.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(self.store()?.leaderboard().await?)
    }

    /// Balance for `wallet`, or 0 when the user is unknown.
    pub async fn balance(&self, wallet: &str) -> Result<f64> {
        Ok(self.store()?.balance(wallet).await?.unwrap_or(0.0))
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn require_referred_user(referred_user: Option<&str>) -> Result<&str> {
    present(referred_user)
        .ok_or_else(|| ServiceError::Validation("Missing referredUser".to_string()))
}

fn finish_transition(outcome: TransitionOutcome, flag: ReferralFlag) -> Result<Referral> {
    match outcome {
        TransitionOutcome::Applied(referral) => {
            info!(
                id = %referral.id,
                referrer = %referral.referrer,
                referred_user = %referral.referred_user,
                flag = flag.field(),
                "referral updated"
            );
            Ok(referral)
        }
        TransitionOutcome::AlreadySet => Err(ServiceError::NotFound(match flag {
            ReferralFlag::Verified => "Referral already verified".to_string(),
            ReferralFlag::Announced => "Referral already announced".to_string(),
        })),
        TransitionOutcome::NotFound => Err(ServiceError::NotFound("Referral not found".to_string())),
    }
}
