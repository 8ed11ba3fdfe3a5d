//! ReferralStore trait and storage errors.

use async_trait::async_trait;

use crate::model::{LeaderboardEntry, Referral, ReferralFlag, TransitionOutcome};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage not ready")]
    NotReady,

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for referrals and read access to user balances.
///
/// Implementations:
/// - `MemoryReferralStore`: in-process, for tests and local runs
/// - `SqliteReferralStore`: SQLite via sqlx
/// - `MongoReferralStore`: MongoDB `referrals` / `users` collections
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Short backend name used in logs and ping responses.
    fn backend(&self) -> &'static str;

    /// Round-trip the backend and describe it.
    async fn ping(&self) -> Result<serde_json::Value>;

    /// Insert a new referral. No deduplication.
    async fn insert(&self, referral: &Referral) -> Result<()>;

    /// All referrals whose referrer matches exactly.
    async fn find_by_referrer(&self, referrer: &str) -> Result<Vec<Referral>>;

    /// All referrals with `verified=1` and `announced=0`.
    async fn find_pending_announcements(&self) -> Result<Vec<Referral>>;

    /// Set `flag` on the most recent referral for `referred_user` that does not
    /// have it set yet.
    async fn set_flag_for_referred_user(
        &self,
        referred_user: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome>;

    /// Set `flag` on the referral with the given id.
    async fn set_flag_by_id(&self, id: &str, flag: ReferralFlag) -> Result<TransitionOutcome>;

    /// Top referrers by verified referral count, ranked and truncated.
    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>>;

    /// Number of verified referrals made by `referrer`.
    async fn count_verified(&self, referrer: &str) -> Result<u64>;

    /// Balance of the user with this wallet, if the user exists.
    async fn balance(&self, wallet: &str) -> Result<Option<f64>>;
}
