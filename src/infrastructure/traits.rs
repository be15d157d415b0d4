//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities::{EntitlementRecord, Message, MessageRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Any store failure, timeouts included. The coordinator maps this to a
/// denial: entitlement can't be verified, so nothing is admitted.
#[derive(Debug, thiserror::Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(#[from] pub sqlx::Error);

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<EntitlementRecord>, StoreError>;

    /// Inserts the record for a first-ever admission (count 1, window anchored
    /// at `now`). Returns `None` if a concurrent insert got there first.
    async fn insert_fresh(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<EntitlementRecord>, StoreError>;

    /// Applies an admission guarded by the observed counter state. Returns
    /// `None` if the row no longer matches `observed` (a concurrent admission
    /// landed in between); the caller re-reads and re-evaluates.
    async fn compare_and_set_admission(
        &self,
        observed: &EntitlementRecord,
        new_count: i64,
        new_reset_date: DateTime<Utc>,
    ) -> Result<Option<EntitlementRecord>, StoreError>;

    async fn set_subscription(
        &self,
        user_id: Uuid,
        is_subscribed: bool,
        ends: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MessageLedger: Send + Sync {
    /// Appends one message, assigning its id and timestamp.
    async fn append(
        &self,
        owner: Option<Uuid>,
        role: MessageRole,
        content: String,
    ) -> Result<Message, StoreError>;

    /// Lists messages in insertion order. The anonymous bucket is capped to
    /// the most recent entries; authenticated owners are not capped here.
    async fn list(&self, owner: Option<Uuid>) -> Result<Vec<Message>, StoreError>;

    /// Deletes every message in one owner's bucket, returning the count.
    async fn clear(&self, owner: Option<Uuid>) -> Result<u64, StoreError>;
}
