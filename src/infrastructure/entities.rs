//! Database entities

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-identity quota and subscription state. One row per authenticated user,
/// created on first admission (or when a subscription is set) and never
/// deleted by the engine.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EntitlementRecord {
    pub user_id: Uuid,
    pub weekly_message_count: i64,
    pub weekly_reset_date: DateTime<Utc>,
    pub is_subscribed: bool,
    pub subscription_ends: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[repr(u8)]
pub enum MessageRole {
    User = 1,
    Assistant = 2,
}

/// Ledger entry. Ids are assigned by the store and are monotonic by
/// insertion. `owner = None` is the shared anonymous bucket.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Message {
    pub id: i64,
    pub owner: Option<Uuid>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
