//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{EntitlementRecord, Message, MessageRole};
use crate::infrastructure::traits::{EntitlementStore, MessageLedger, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use di::{injectable, Ref};
use uuid::Uuid;

/// The shared anonymous bucket only ever serves back this many messages.
pub const ANONYMOUS_HISTORY_CAP: i64 = 50;

#[injectable(EntitlementStore)]
pub struct DbEntitlementStore {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl EntitlementStore for DbEntitlementStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<EntitlementRecord>, StoreError> {
        let record = sqlx::query_as("SELECT * FROM entitlements WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&**self.connection)
            .await?;
        Ok(record)
    }

    async fn insert_fresh(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        // ON CONFLICT DO NOTHING yields no row when another request created
        // the record first; the coordinator then retries against it.
        let record = sqlx::query_as(
            "INSERT INTO entitlements \
             (user_id, weekly_message_count, weekly_reset_date, is_subscribed, subscription_ends) \
             VALUES (?, 1, ?, FALSE, NULL) \
             ON CONFLICT(user_id) DO NOTHING \
             RETURNING *",
        )
        .bind(user_id)
        .bind(now)
        .fetch_optional(&**self.connection)
        .await?;
        Ok(record)
    }

    async fn compare_and_set_admission(
        &self,
        observed: &EntitlementRecord,
        new_count: i64,
        new_reset_date: DateTime<Utc>,
    ) -> Result<Option<EntitlementRecord>, StoreError> {
        // Single conditional UPDATE: the write only lands if the counter state
        // still matches what the evaluator saw. Anything else in between
        // (another admission, a window rollover) makes this a no-op.
        let record = sqlx::query_as(
            "UPDATE entitlements \
             SET weekly_message_count = ?, weekly_reset_date = ? \
             WHERE user_id = ? AND weekly_message_count = ? AND weekly_reset_date = ? \
             RETURNING *",
        )
        .bind(new_count)
        .bind(new_reset_date)
        .bind(observed.user_id)
        .bind(observed.weekly_message_count)
        .bind(observed.weekly_reset_date)
        .fetch_optional(&**self.connection)
        .await?;
        Ok(record)
    }

    async fn set_subscription(
        &self,
        user_id: Uuid,
        is_subscribed: bool,
        ends: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO entitlements \
             (user_id, weekly_message_count, weekly_reset_date, is_subscribed, subscription_ends) \
             VALUES (?, 0, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
             is_subscribed = excluded.is_subscribed, \
             subscription_ends = excluded.subscription_ends",
        )
        .bind(user_id)
        .bind(Utc::now())
        .bind(is_subscribed)
        .bind(ends)
        .execute(&**self.connection)
        .await?;
        Ok(())
    }
}

#[injectable(MessageLedger)]
pub struct DbMessageLedger {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl MessageLedger for DbMessageLedger {
    async fn append(
        &self,
        owner: Option<Uuid>,
        role: MessageRole,
        content: String,
    ) -> Result<Message, StoreError> {
        let message = sqlx::query_as(
            "INSERT INTO messages (owner, role, content, created_at) \
             VALUES (?, ?, ?, ?) RETURNING *",
        )
        .bind(owner)
        .bind(role)
        .bind(content)
        .bind(Utc::now())
        .fetch_one(&**self.connection)
        .await?;
        Ok(message)
    }

    async fn list(&self, owner: Option<Uuid>) -> Result<Vec<Message>, StoreError> {
        let messages = match owner {
            Some(owner) => {
                sqlx::query_as("SELECT * FROM messages WHERE owner = ? ORDER BY id ASC")
                    .bind(owner)
                    .fetch_all(&**self.connection)
                    .await?
            }
            None => {
                // Most recent slice of the shared bucket, still returned in
                // insertion order.
                sqlx::query_as(
                    "SELECT * FROM \
                     (SELECT * FROM messages WHERE owner IS NULL ORDER BY id DESC LIMIT ?) \
                     ORDER BY id ASC",
                )
                .bind(ANONYMOUS_HISTORY_CAP)
                .fetch_all(&**self.connection)
                .await?
            }
        };
        Ok(messages)
    }

    async fn clear(&self, owner: Option<Uuid>) -> Result<u64, StoreError> {
        let result = match owner {
            Some(owner) => {
                sqlx::query("DELETE FROM messages WHERE owner = ?")
                    .bind(owner)
                    .execute(&**self.connection)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM messages WHERE owner IS NULL")
                    .execute(&**self.connection)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }
}
