//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Referrals table schema.
#[derive(Iden, Clone, Copy)]
pub enum Referrals {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "referrer"]
    Referrer,
    #[iden = "referred_user"]
    ReferredUser,
    #[iden = "timestamp"]
    Timestamp,
    #[iden = "verified"]
    Verified,
    #[iden = "announced"]
    Announced,
    /// Implicit SQLite row id; preserves insertion order.
    #[iden = "rowid"]
    Rowid,
}

/// Users table schema. Owned by the balance service; read-only here.
#[derive(Iden)]
pub enum Users {
    Table,
    #[iden = "wallet"]
    Wallet,
    #[iden = "balance"]
    Balance,
}

/// SQL for creating the referrals table.
pub const CREATE_REFERRALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS referrals (
    id TEXT PRIMARY KEY,
    referrer TEXT NOT NULL,
    referred_user TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    announced INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_referrals_referrer ON referrals(referrer);
CREATE INDEX IF NOT EXISTS idx_referrals_referred_user ON referrals(referred_user);
CREATE INDEX IF NOT EXISTS idx_referrals_state ON referrals(verified, announced);
"#;

/// SQL for creating the users table.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    wallet TEXT PRIMARY KEY,
    balance REAL NOT NULL DEFAULT 0
);
"#;
