//! SQLite implementation of the referral store.

mod referral_store;

pub use referral_store::SqliteReferralStore;
