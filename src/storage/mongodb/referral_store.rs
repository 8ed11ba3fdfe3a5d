//! MongoDB ReferralStore implementation.
//!
//! Documents keep the field names used by existing deployments
//! (`referredUser`, `timestamp`, `verified`, `announced`). Referrals written
//! before the `id` field existed are addressed by their `_id` hex string.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use mongodb::{Client, Collection, Cursor, Database, IndexModel};

use crate::model::{
    LeaderboardEntry, Referral, ReferralFlag, TransitionOutcome, FLAG_SET, LEADERBOARD_LIMIT,
};
use crate::storage::{ReferralStore, Result, StorageError};

use super::{REFERRALS_COLLECTION, USERS_COLLECTION};

/// MongoDB implementation of ReferralStore.
pub struct MongoReferralStore {
    database: Database,
    referrals: Collection<Document>,
    users: Collection<Document>,
}

impl MongoReferralStore {
    /// Create a new MongoDB referral store.
    pub async fn new(client: &Client, database_name: &str) -> Result<Self> {
        let database = client.database(database_name);
        let referrals = database.collection(REFERRALS_COLLECTION);
        let users = database.collection(USERS_COLLECTION);

        let store = Self {
            database,
            referrals,
            users,
        };
        store.init().await?;

        Ok(store)
    }

    /// Initialize indexes for the lookups this service performs.
    async fn init(&self) -> Result<()> {
        let indexes = [
            doc! { "referrer": 1 },
            doc! { "referredUser": 1, "timestamp": -1 },
            doc! { "verified": 1, "announced": 1 },
            doc! { "id": 1 },
        ];

        for keys in indexes {
            let index = IndexModel::builder().keys(keys).build();
            self.referrals.create_index(index).await?;
        }

        Ok(())
    }

    async fn collect_referrals(mut cursor: Cursor<Document>) -> Result<Vec<Referral>> {
        let mut referrals = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            referrals.push(referral_from_document(&doc)?);
        }
        Ok(referrals)
    }

    async fn find_referrals(&self, filter: Document) -> Result<Vec<Referral>> {
        // Natural `_id` order matches insertion order.
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.referrals.find(filter).with_options(options).await?;
        Self::collect_referrals(cursor).await
    }

    /// Set `flag` on the newest document matching `selector` that lacks it.
    async fn transition(&self, selector: Document, flag: ReferralFlag) -> Result<TransitionOutcome> {
        let field = flag.field();

        let mut filter = selector.clone();
        filter.insert(field, doc! { "$ne": FLAG_SET });

        let options = FindOneAndUpdateOptions::builder()
            .sort(doc! { "timestamp": -1, "_id": -1 })
            .return_document(ReturnDocument::After)
            .build();

        let updated = self
            .referrals
            .find_one_and_update(filter, doc! { "$set": { field: FLAG_SET } })
            .with_options(options)
            .await?;

        match updated {
            Some(doc) => Ok(TransitionOutcome::Applied(referral_from_document(&doc)?)),
            None => {
                let existing = self.referrals.count_documents(selector).await?;
                Ok(if existing > 0 {
                    TransitionOutcome::AlreadySet
                } else {
                    TransitionOutcome::NotFound
                })
            }
        }
    }
}

/// Read a numeric field that may have been written as int32, int64, double or date.
fn get_number(doc: &Document, key: &str) -> Option<f64> {
    match doc.get(key)? {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::DateTime(v) => Some(v.timestamp_millis() as f64),
        _ => None,
    }
}

fn get_string(doc: &Document, key: &str) -> Result<String> {
    doc.get_str(key)
        .map(str::to_string)
        .map_err(|e| StorageError::Serialization(format!("field {key}: {e}")))
}

fn referral_from_document(doc: &Document) -> Result<Referral> {
    let id = match doc.get_str("id") {
        Ok(id) => id.to_string(),
        Err(_) => doc
            .get_object_id("_id")
            .map(|oid| oid.to_hex())
            .map_err(|e| StorageError::Serialization(format!("field _id: {e}")))?,
    };

    Ok(Referral {
        id,
        referrer: get_string(doc, "referrer")?,
        referred_user: get_string(doc, "referredUser")?,
        timestamp: get_number(doc, "timestamp").unwrap_or(0.0) as i64,
        verified: get_number(doc, "verified").unwrap_or(0.0) as i32,
        announced: get_number(doc, "announced").unwrap_or(0.0) as i32,
    })
}

fn referral_to_document(referral: &Referral) -> Document {
    doc! {
        "id": &referral.id,
        "referrer": &referral.referrer,
        "referredUser": &referral.referred_user,
        "timestamp": referral.timestamp,
        "verified": referral.verified,
        "announced": referral.announced,
    }
}

/// Match a referral by `id`, or by `_id` for documents that predate `id`.
fn id_selector(id: &str) -> Document {
    match ObjectId::parse_str(id) {
        Ok(oid) => doc! { "$or": [ { "id": id }, { "_id": oid } ] },
        Err(_) => doc! { "id": id },
    }
}

#[async_trait]
impl ReferralStore for MongoReferralStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<serde_json::Value> {
        let reply = self.database.run_command(doc! { "ping": 1 }).await?;
        let ok = get_number(&reply, "ok").unwrap_or(0.0);
        Ok(serde_json::json!({
            "ok": ok as i64,
            "backend": self.backend(),
            "database": self.database.name(),
        }))
    }

    async fn insert(&self, referral: &Referral) -> Result<()> {
        self.referrals
            .insert_one(referral_to_document(referral))
            .await?;
        Ok(())
    }

    async fn find_by_referrer(&self, referrer: &str) -> Result<Vec<Referral>> {
        self.find_referrals(doc! { "referrer": referrer }).await
    }

    async fn find_pending_announcements(&self) -> Result<Vec<Referral>> {
        self.find_referrals(doc! { "verified": FLAG_SET, "announced": { "$ne": FLAG_SET } })
            .await
    }

    async fn set_flag_for_referred_user(
        &self,
        referred_user: &str,
        flag: ReferralFlag,
    ) -> Result<TransitionOutcome> {
        self.transition(doc! { "referredUser": referred_user }, flag)
            .await
    }

    async fn set_flag_by_id(&self, id: &str, flag: ReferralFlag) -> Result<TransitionOutcome> {
        self.transition(id_selector(id), flag).await
    }

    async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let pipeline = vec![
            doc! { "$match": { "verified": FLAG_SET } },
            doc! { "$group": { "_id": "$referrer", "totalReferrals": { "$sum": 1 } } },
            doc! { "$sort": { "totalReferrals": -1, "_id": 1 } },
            doc! { "$limit": LEADERBOARD_LIMIT as i64 },
        ];

        let mut cursor = self.referrals.aggregate(pipeline).await?;

        let mut entries = Vec::new();
        while cursor.advance().await? {
            let doc = cursor.deserialize_current()?;
            if let Some(Bson::String(referrer)) = doc.get("_id") {
                entries.push(LeaderboardEntry {
                    referrer: referrer.clone(),
                    total_referrals: get_number(&doc, "totalReferrals").unwrap_or(0.0) as u64,
                });
            }
        }

        Ok(entries)
    }

    async fn count_verified(&self, referrer: &str) -> Result<u64> {
        let count = self
            .referrals
            .count_documents(doc! { "referrer": referrer, "verified": FLAG_SET })
            .await?;
        Ok(count)
    }

    async fn balance(&self, wallet: &str) -> Result<Option<f64>> {
        let user = self.users.find_one(doc! { "wallet": wallet }).await?;
        Ok(user.map(|doc| get_number(&doc, "balance").unwrap_or(0.0)))
    }
}
