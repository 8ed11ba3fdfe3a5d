//! ReferralStore interface tests.
//!
//! Every test works on identifiers with a random suffix so the suite can run
//! against a shared database without cleanup between tests.

use uuid::Uuid;

use referral_service::model::{Referral, ReferralFlag, TransitionOutcome, LEADERBOARD_LIMIT};
use referral_service::storage::ReferralStore;

/// Identifier unique to this test run.
pub fn unique(prefix: &str) -> String {
    format!("test_{}_{}", prefix, Uuid::new_v4().simple())
}

/// A referral created `age_ms` milliseconds ago.
pub fn make_referral(referrer: &str, referred_user: &str, age_ms: i64) -> Referral {
    let mut referral = Referral::new(referrer, referred_user);
    referral.timestamp -= age_ms;
    referral
}

// =============================================================================
// insert / find_by_referrer
// =============================================================================

pub async fn test_insert_and_find<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("find");
    let referral = make_referral(&referrer, "bob", 0);

    store.insert(&referral).await.expect("insert should succeed");

    let found = store
        .find_by_referrer(&referrer)
        .await
        .expect("find should succeed");
    assert_eq!(found, vec![referral]);
}

pub async fn test_find_unknown_referrer_is_empty<S: ReferralStore + ?Sized>(store: &S) {
    let found = store
        .find_by_referrer(&unique("nobody"))
        .await
        .expect("find should succeed");
    assert!(found.is_empty());
}

pub async fn test_duplicates_are_kept<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("dup");
    store.insert(&make_referral(&referrer, "bob", 0)).await.unwrap();
    store.insert(&make_referral(&referrer, "bob", 0)).await.unwrap();

    let found = store.find_by_referrer(&referrer).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_ne!(found[0].id, found[1].id);
}

pub async fn test_find_matches_exactly<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("exact");
    store.insert(&make_referral(&referrer, "bob", 0)).await.unwrap();

    let upper = store
        .find_by_referrer(&referrer.to_uppercase())
        .await
        .unwrap();
    assert!(upper.is_empty(), "referrer match is case-sensitive");
}

// =============================================================================
// set_flag_for_referred_user
// =============================================================================

pub async fn test_verify_once<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("verify");
    let referred = unique("referred");
    store.insert(&make_referral(&referrer, &referred, 0)).await.unwrap();

    let outcome = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Verified)
        .await
        .unwrap();
    match outcome {
        TransitionOutcome::Applied(referral) => {
            assert!(referral.is_verified());
            assert!(!referral.is_announced());
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    let second = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Verified)
        .await
        .unwrap();
    assert_eq!(second, TransitionOutcome::AlreadySet);
}

pub async fn test_verify_unknown_is_not_found<S: ReferralStore + ?Sized>(store: &S) {
    let outcome = store
        .set_flag_for_referred_user(&unique("ghost"), ReferralFlag::Verified)
        .await
        .unwrap();
    assert_eq!(outcome, TransitionOutcome::NotFound);
}

pub async fn test_verify_newest_first<S: ReferralStore + ?Sized>(store: &S) {
    let referred = unique("twice");
    let older = make_referral(&unique("old"), &referred, 5_000);
    let newer = make_referral(&unique("new"), &referred, 0);
    store.insert(&older).await.unwrap();
    store.insert(&newer).await.unwrap();

    let first = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Verified)
        .await
        .unwrap();
    assert!(matches!(first, TransitionOutcome::Applied(ref r) if r.id == newer.id));

    let second = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Verified)
        .await
        .unwrap();
    assert!(matches!(second, TransitionOutcome::Applied(ref r) if r.id == older.id));

    let third = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Verified)
        .await
        .unwrap();
    assert_eq!(third, TransitionOutcome::AlreadySet);
}

pub async fn test_announce_without_verify<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("announce");
    let referred = unique("referred");
    store.insert(&make_referral(&referrer, &referred, 0)).await.unwrap();

    let outcome = store
        .set_flag_for_referred_user(&referred, ReferralFlag::Announced)
        .await
        .unwrap();
    match outcome {
        TransitionOutcome::Applied(referral) => {
            assert!(referral.is_announced());
            assert!(!referral.is_verified());
        }
        other => panic!("expected Applied, got {other:?}"),
    }

    let stored = store.find_by_referrer(&referrer).await.unwrap();
    assert_eq!(stored[0].verified, 0);
    assert_eq!(stored[0].announced, 1);
}

// =============================================================================
// set_flag_by_id
// =============================================================================

pub async fn test_flag_by_id<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("byid");
    let first = make_referral(&referrer, "same-user", 0);
    let second = make_referral(&referrer, "same-user", 0);
    store.insert(&first).await.unwrap();
    store.insert(&second).await.unwrap();

    let outcome = store
        .set_flag_by_id(&first.id, ReferralFlag::Verified)
        .await
        .unwrap();
    assert!(matches!(outcome, TransitionOutcome::Applied(ref r) if r.id == first.id));

    let again = store
        .set_flag_by_id(&first.id, ReferralFlag::Verified)
        .await
        .unwrap();
    assert_eq!(again, TransitionOutcome::AlreadySet);

    let stored = store.find_by_referrer(&referrer).await.unwrap();
    let untouched = stored.iter().find(|r| r.id == second.id).unwrap();
    assert!(!untouched.is_verified());

    let missing = store
        .set_flag_by_id(&unique("missing"), ReferralFlag::Verified)
        .await
        .unwrap();
    assert_eq!(missing, TransitionOutcome::NotFound);
}

// =============================================================================
// find_pending_announcements
// =============================================================================

pub async fn test_pending_announcements<S: ReferralStore + ?Sized>(store: &S) {
    let referrer = unique("pending");
    let verified = make_referral(&referrer, &unique("v"), 0);
    let unverified = make_referral(&referrer, &unique("u"), 0);
    let announced = make_referral(&referrer, &unique("a"), 0);
    for referral in [&verified, &unverified, &announced] {
        store.insert(referral).await.unwrap();
    }
    store.set_flag_by_id(&verified.id, ReferralFlag::Verified).await.unwrap();
    store.set_flag_by_id(&announced.id, ReferralFlag::Verified).await.unwrap();
    store.set_flag_by_id(&announced.id, ReferralFlag::Announced).await.unwrap();

    let pending: Vec<String> = store
        .find_pending_announcements()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.referrer == referrer)
        .map(|r| r.id)
        .collect();
    assert_eq!(pending, vec![verified.id]);
}

// =============================================================================
// leaderboard / count_verified
// =============================================================================

pub async fn test_leaderboard_ranking<S: ReferralStore + ?Sized>(store: &S) {
    let top = unique("top");
    let runner_up = unique("runner");
    let unverified_only = unique("none");
    let has_room = store.leaderboard().await.unwrap().len() + 2 <= LEADERBOARD_LIMIT;

    for (referrer, verified) in [(&top, 3), (&runner_up, 2)] {
        for _ in 0..verified {
            let referral = make_referral(referrer, &unique("r"), 0);
            store.insert(&referral).await.unwrap();
            store.set_flag_by_id(&referral.id, ReferralFlag::Verified).await.unwrap();
        }
    }
    store
        .insert(&make_referral(&unverified_only, &unique("r"), 0))
        .await
        .unwrap();

    let leaderboard = store.leaderboard().await.unwrap();
    assert!(leaderboard.len() <= LEADERBOARD_LIMIT);
    assert!(leaderboard
        .windows(2)
        .all(|w| w[0].total_referrals >= w[1].total_referrals));
    assert!(leaderboard.iter().all(|e| e.referrer != unverified_only));

    let position = |name: &str| leaderboard.iter().position(|e| e.referrer == name);
    if has_room {
        // Room for both new referrers, so neither can be cut by the limit.
        assert!(position(&top).is_some(), "{top} missing from leaderboard");
        assert!(position(&runner_up).is_some(), "{runner_up} missing from leaderboard");
    }
    if let (Some(a), Some(b)) = (position(&top), position(&runner_up)) {
        assert!(a < b);
        assert_eq!(leaderboard[a].total_referrals, 3);
        assert_eq!(leaderboard[b].total_referrals, 2);
    }

    assert_eq!(store.count_verified(&top).await.unwrap(), 3);
    assert_eq!(store.count_verified(&runner_up).await.unwrap(), 2);
    assert_eq!(store.count_verified(&unverified_only).await.unwrap(), 0);
}

// =============================================================================
// balance / ping
// =============================================================================

pub async fn test_balance_unknown_wallet<S: ReferralStore + ?Sized>(store: &S) {
    let balance = store.balance(&unique("wallet")).await.unwrap();
    assert_eq!(balance, None);
}

pub async fn test_ping<S: ReferralStore + ?Sized>(store: &S) {
    let reply = store.ping().await.expect("ping should succeed");
    assert_eq!(reply["ok"], 1);
    assert_eq!(reply["backend"], store.backend());
}

/// Run all ReferralStore tests against a store implementation.
#[macro_export]
macro_rules! run_referral_store_tests {
    ($store:expr) => {
        use $crate::store::referral_store_tests::*;

        // insert / find tests
        test_insert_and_find($store).await;
        println!("  test_insert_and_find: PASSED");

        test_find_unknown_referrer_is_empty($store).await;
        println!("  test_find_unknown_referrer_is_empty: PASSED");

        test_duplicates_are_kept($store).await;
        println!("  test_duplicates_are_kept: PASSED");

        test_find_matches_exactly($store).await;
        println!("  test_find_matches_exactly: PASSED");

        // transition tests
        test_verify_once($store).await;
        println!("  test_verify_once: PASSED");

        test_verify_unknown_is_not_found($store).await;
        println!("  test_verify_unknown_is_not_found: PASSED");

        test_verify_newest_first($store).await;
        println!("  test_verify_newest_first: PASSED");

        test_announce_without_verify($store).await;
        println!("  test_announce_without_verify: PASSED");

        test_flag_by_id($store).await;
        println!("  test_flag_by_id: PASSED");

        // query tests
        test_pending_announcements($store).await;
        println!("  test_pending_announcements: PASSED");

        test_leaderboard_ranking($store).await;
        println!("  test_leaderboard_ranking: PASSED");

        test_balance_unknown_wallet($store).await;
        println!("  test_balance_unknown_wallet: PASSED");

        test_ping($store).await;
        println!("  test_ping: PASSED");
    };
}
