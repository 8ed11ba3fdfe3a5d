//! SQLite ReferralStore implementation.

use std::str::FromStr;

use async_trait::async_trait;
use sea_query::{Alias, Expr, Order, Query, SelectStatement, SqliteQueryBuilder};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::model::{
    LeaderboardEntry, Referral, ReferralFlag, TransitionOutcome, FLAG_SET, FLAG_UNSET,
    LEADERBOARD_LIMIT,
};
use crate::storage::schema::{Referrals, Users, CREATE_REFERRALS_TABLE, CREATE_USERS_TABLE};
use crate::storage::{ReferralStore, Result, StorageError};

const REFERRAL_COLUMNS: [Referrals; 6] = [
    Referrals::Id,
    Referrals::Referrer,
    Referrals::ReferredUser,
    Referrals::Timestamp,
    Referrals::Verified,
    Referrals::Announced,
];

/// SQLite implementation of ReferralStore.
pub struct SqliteReferralStore {
    pool: SqlitePool,
}

impl SqliteReferralStore {
    /// Create a new SQLite referral store over an existing pool.
    ///
    /// Call [`init`](Self::init) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `uri`, creating the database file if missing, and initialize tables.
    ///
    /// In-memory databases are pinned to a single long-lived connection since
    /// each SQLite connection would otherwise see its own empty database.
    pub async fn connect(uri: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(uri)?.create_if_missing(true);

        let pool_options = if uri.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self::new(pool);
        store.init().await?;
        Ok(store)
    }

    /// Create tables and indexes if they don't exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_REFERRALS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::raw_sql(CREATE_USERS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Underlying pool, for tests that seed the `users` table.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn select_referrals() -> SelectStatement {
        Query::select()
            .columns(REFERRAL_COLUMNS)
            .from(Referrals::Table)
            .to_owned()
    }

    fn referral_from_row(row: &SqliteRow) -> Result<Referral> {
        Ok(Referral {
            id: row.try_get("id")?,
            referrer: row.try_get("referrer")?,
            referred_user: row.try_get("referred_user")?,
            timestamp: row.try_get("timestamp")?,
            verified: row.try_get("verified")?,
            announced: row.try_get("announced")?,
        })
    }

    async fn fetch_referrals(&self, sql: String) -> Result<Vec<Referral>> {
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::referral_from_row).collect()
    }

    /// Set `flag` on the newest row matching `key = value` that lacks it,
    /// on a connection that is already inside a transaction.
    async fn apply_flag(
        conn: &mut SqliteConnection,
        key: Referrals,
        value: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome> {
        let flag_column = flag_column(flag);

        let candidate = Self::select_referrals()
            .and_where(Expr::col(key).eq(value))
            .and_where(Expr::col(flag_column).eq(FLAG_UNSET))
            .order_by(Referrals::Timestamp, Order::Desc)
            .order_by(Referrals::Rowid, Order::Desc)
            .limit(1)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&candidate).fetch_optional(&mut *conn).await?;

        let Some(row) = row else {
            let existing = Query::select()
                .expr(Expr::col(Referrals::Id).count())
                .from(Referrals::Table)
                .and_where(Expr::col(key).eq(value))
                .to_string(SqliteQueryBuilder);
            let count: i64 = sqlx::query(&existing)
                .fetch_one(&mut *conn)
                .await?
                .try_get(0)?;

            return Ok(if count > 0 {
                TransitionOutcome::AlreadySet
            } else {
                TransitionOutcome::NotFound
            });
        };

        let mut referral = Self::referral_from_row(&row)?;

        let update = Query::update()
            .table(Referrals::Table)
            .value(flag_column, FLAG_SET)
            .and_where(Expr::col(Referrals::Id).eq(referral.id.as_str()))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&update).execute(&mut *conn).await?;

        flag.set(&mut referral);
        Ok(TransitionOutcome::Applied(referral))
    }

    async fn transition(
        &self,
        key: Referrals,
        value: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome> {
        let pool = self.pool.clone();
        let value = value.to_string();

        // Runs on its own task: a dropped request future must not leave the
        // pooled connection between BEGIN and COMMIT. The transaction rolls
        // back on drop if the task itself fails.
        let task = tokio::spawn(async move {
            // BEGIN IMMEDIATE takes the write lock upfront so the candidate
            // selected below cannot be flagged by a concurrent request first.
            let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
            let outcome = Self::apply_flag(&mut tx, key, &value, flag).await?;
            tx.commit().await?;
            Ok::<_, StorageError>(outcome)
        });

        task.await.map_err(|e| {
            warn!(error = %e, "sqlite transition task failed");
            StorageError::Unavailable(format!("transition task failed: {e}"))
        })?
    }
}

fn flag_column(flag: ReferralFlag) -> Referrals {
    match flag {
        ReferralFlag::Verified => Referrals::Verified,
        ReferralFlag::Announced => Referrals::Announced,
    }
}

#[async_trait]
impl ReferralStore for SqliteReferralStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<serde_json::Value> {
        let ok: i64 = sqlx::query("SELECT 1").fetch_one(&self.pool).await?.try_get(0)?;
        Ok(serde_json::json!({ "ok": ok, "backend": self.backend() }))
    }

    async fn insert(&self, referral: &Referral) -> Result<()> {
        let query = Query::insert()
            .into_table(Referrals::Table)
            .columns(REFERRAL_COLUMNS)
            .values_panic([
                referral.id.as_str().into(),
                referral.referrer.as_str().into(),
                referral.referred_user.as_str().into(),
                referral.timestamp.into(),
                referral.verified.into(),
                referral.announced.into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_referrer(&self, referrer: &str) -> Result<Vec<Referral>> {
        let query = Self::select_referrals()
            .and_where(Expr::col(Referrals::Referrer).eq(referrer))
            .order_by(Referrals::Rowid, Order::Asc)
            .to_string(SqliteQueryBuilder);
        self.fetch_referrals(query).await
    }

    async fn find_pending_announcements(&self) -> Result<Vec<Referral>> {
        let query = Self::select_referrals()
            .and_where(Expr::col(Referrals::Verified).eq(FLAG_SET))
            .and_where(Expr::col(Referrals::Announced).eq(FLAG_UNSET))
            .order_by(Referrals::Rowid, Order::Asc)
            .to_string(SqliteQueryBuilder);
        self.fetch_referrals(query).await
    }

    async fn set_flag_for_referred_user(
        &self,
        referred_user: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome> {
        self.transition(Referrals::ReferredUser, referred_user, flag)
            .await
    }

    async fn set_flag_by_id(&self, id: &str, flag: ReferralFlag) -> Result<TransitionOutcome> {
        self.transition(Referrals::Id, id, flag).await
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let total = Alias::new("total_referrals");
        let query = Query::select()
            .column(Referrals::Referrer)
            .expr_as(Expr::col(Referrals::Id).count(), total.clone())
            .from(Referrals::Table)
            .and_where(Expr::col(Referrals::Verified).eq(FLAG_SET))
            .group_by_col(Referrals::Referrer)
            .order_by(total, Order::Desc)
            .order_by(Referrals::Referrer, Order::Asc)
            .limit(LEADERBOARD_LIMIT as u64)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<LeaderboardEntry> {
                let total: i64 = row.try_get("total_referrals")?;
                Ok(LeaderboardEntry {
                    referrer: row.try_get("referrer")?,
                    total_referrals: total as u64,
                })
            })
            .collect()
    }

    async fn count_verified(&self, referrer: &str) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Referrals::Id).count())
            .from(Referrals::Table)
            .and_where(Expr::col(Referrals::Referrer).eq(referrer))
            .and_where(Expr::col(Referrals::Verified).eq(FLAG_SET))
            .to_string(SqliteQueryBuilder);

        let count: i64 = sqlx::query(&query).fetch_one(&self.pool).await?.try_get(0)?;
        Ok(count as u64)
    }

    async fn balance(&self, wallet: &str) -> Result<Option<f64>> {
        let query = Query::select()
            .column(Users::Balance)
            .from(Users::Table)
            .and_where(Expr::col(Users::Wallet).eq(wallet))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(Some(row.try_get("balance")?)),
            None => Ok(None),
        }
    }
}
