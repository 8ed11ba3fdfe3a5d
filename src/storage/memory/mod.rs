//! In-memory ReferralStore implementation.
//!
//! Used by unit tests and for running the service without a database.
//! Referrals are kept in insertion order, which is also the order queries
//! return them in.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{rank_leaderboard, LeaderboardEntry, Referral, ReferralFlag, TransitionOutcome};
use crate::storage::{ReferralStore, Result, StorageError};

/// In-memory referral store.
#[derive(Default)]
pub struct MemoryReferralStore {
    referrals: RwLock<Vec<Referral>>,
    balances: RwLock<HashMap<String, f64>>,
    fail: RwLock<bool>,
}

impl MemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StorageError::Unavailable`.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Seed a user balance. Balances are owned by another service in
    /// production; this only exists so tests can populate them.
    pub async fn put_balance(&self, wallet: &str, balance: f64) {
        self.balances
            .write()
            .await
            .insert(wallet.to_string(), balance);
    }

    /// Number of stored referrals.
    pub async fn len(&self) -> usize {
        self.referrals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.referrals.read().await.is_empty()
    }

    async fn check_available(&self) -> Result<()> {
        if *self.fail.read().await {
            return Err(StorageError::Unavailable("memory store failure injected".to_string()));
        }
        Ok(())
    }
}

/// Apply `flag` to the newest referral among `candidates` lacking it.
///
/// `candidates` are indices into `referrals`; newest means highest timestamp,
/// with insertion order breaking ties.
fn apply_to_newest(
    referrals: &mut [Referral],
    candidates: Vec<usize>,
    flag: ReferralFlag,
) -> TransitionOutcome {
    if candidates.is_empty() {
        return TransitionOutcome::NotFound;
    }

    let target = candidates
        .into_iter()
        .filter(|&idx| !flag.is_set(&referrals[idx]))
        .max_by_key(|&idx| (referrals[idx].timestamp, idx));

    match target {
        Some(idx) => {
            flag.set(&mut referrals[idx]);
            TransitionOutcome::Applied(referrals[idx].clone())
        }
        None => TransitionOutcome::AlreadySet,
    }
}

#[async_trait]
impl ReferralStore for MemoryReferralStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<serde_json::Value> {
        self.check_available().await?;
        Ok(serde_json::json!({ "ok": 1, "backend": self.backend() }))
    }

    async fn insert(&self, referral: &Referral) -> Result<()> {
        self.check_available().await?;
        self.referrals.write().await.push(referral.clone());
        Ok(())
    }

    async fn find_by_referrer(&self, referrer: &str) -> Result<Vec<Referral>> {
        self.check_available().await?;
        let referrals = self.referrals.read().await;
        Ok(referrals
            .iter()
            .filter(|r| r.referrer == referrer)
            .cloned()
            .collect())
    }

    async fn find_pending_announcements(&self) -> Result<Vec<Referral>> {
        self.check_available().await?;
        let referrals = self.referrals.read().await;
        Ok(referrals
            .iter()
            .filter(|r| r.is_pending_announcement())
            .cloned()
            .collect())
    }

    async fn set_flag_for_referred_user(
        &self,
        referred_user: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome> {
        self.check_available().await?;
        let mut referrals = self.referrals.write().await;
        let candidates = referrals
            .iter()
            .enumerate()
            .filter(|(_, r)| r.referred_user == referred_user)
            .map(|(idx, _)| idx)
            .collect();
        Ok(apply_to_newest(&mut referrals, candidates, flag))
    }

    async fn set_flag_by_id(&self, id: &str, flag: ReferralFlag) -> Result<TransitionOutcome> {
        self.check_available().await?;
        let mut referrals = self.referrals.write().await;
        let candidates = referrals
            .iter()
            .position(|r| r.id == id)
            .into_iter()
            .collect();
        Ok(apply_to_newest(&mut referrals, candidates, flag))
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        self.check_available().await?;
        let referrals = self.referrals.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for referral in referrals.iter().filter(|r| r.is_verified()) {
            *counts.entry(referral.referrer.as_str()).or_insert(0) += 1;
        }

        let entries = counts
            .into_iter()
            .map(|(referrer, total_referrals)| LeaderboardEntry {
                referrer: referrer.to_string(),
                total_referrals,
            })
            .collect();
        Ok(rank_leaderboard(entries))
    }

    async fn count_verified(&self, referrer: &str) -> Result<u64> {
        self.check_available().await?;
        let referrals = self.referrals.read().await;
        Ok(referrals
            .iter()
            .filter(|r| r.referrer == referrer && r.is_verified())
            .count() as u64)
    }

    async fn balance(&self, wallet: &str) -> Result<Option<f64>> {
        self.check_available().await?;
        Ok(self.balances.read().await.get(wallet).copied())
    }
}
