//! Referral data model and wire types.
//!
//! Field names on the wire are camelCase to stay compatible with existing
//! clients (`referredUser`, `totalReferrals`, `pendingReferrals`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of entries returned by the leaderboard.
pub const LEADERBOARD_LIMIT: usize = 10;

/// Flag value for an unset `verified`/`announced` state.
pub const FLAG_UNSET: i32 = 0;
/// Flag value for a set `verified`/`announced` state.
pub const FLAG_SET: i32 = 1;

/// One referral event: `referrer` referred `referred_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: String,
    pub referrer: String,
    pub referred_user: String,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
    pub verified: i32,
    pub announced: i32,
}

impl Referral {
    /// Create a fresh referral: new id, current time, unverified, unannounced.
    pub fn new(referrer: impl Into<String>, referred_user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            referrer: referrer.into(),
            referred_user: referred_user.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            verified: FLAG_UNSET,
            announced: FLAG_UNSET,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified == FLAG_SET
    }

    pub fn is_announced(&self) -> bool {
        self.announced == FLAG_SET
    }

    /// Verified but not yet announced.
    pub fn is_pending_announcement(&self) -> bool {
        self.is_verified() && !self.is_announced()
    }
}

/// Which state flag a transition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralFlag {
    Verified,
    Announced,
}

impl ReferralFlag {
    /// Column / document field name.
    pub fn field(self) -> &'static str {
        match self {
            ReferralFlag::Verified => "verified",
            ReferralFlag::Announced => "announced",
        }
    }

    pub fn is_set(self, referral: &Referral) -> bool {
        match self {
            ReferralFlag::Verified => referral.is_verified(),
            ReferralFlag::Announced => referral.is_announced(),
        }
    }

    pub fn set(self, referral: &mut Referral) {
        match self {
            ReferralFlag::Verified => referral.verified = FLAG_SET,
            ReferralFlag::Announced => referral.announced = FLAG_SET,
        }
    }
}

/// Result of a verify/announce transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The flag moved 0 -> 1 on this referral.
    Applied(Referral),
    /// Matching referrals exist but every one already has the flag set.
    AlreadySet,
    /// No referral matched.
    NotFound,
}

/// Ranked referrer with its confirmed referral count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub referrer: String,
    pub total_referrals: u64,
}

/// Sort by count descending, referrer ascending, and keep the top entries.
pub fn rank_leaderboard(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| {
        b.total_referrals
            .cmp(&a.total_referrals)
            .then_with(|| a.referrer.cmp(&b.referrer))
    });
    entries.truncate(LEADERBOARD_LIMIT);
    entries
}
