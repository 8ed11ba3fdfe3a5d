//! MongoDB implementation of the referral store.

mod referral_store;

pub use referral_store::MongoReferralStore;

/// Collection names.
pub(crate) const REFERRALS_COLLECTION: &str = "referrals";
pub(crate) const USERS_COLLECTION: &str = "users";
