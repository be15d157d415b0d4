//! DI "Interfaces"

use crate::core::error::ServiceError;
use crate::core::quota::{DenyReason, Identity};
use crate::infrastructure::entities::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Outcome of one admission attempt. Denial is a normal, typed outcome that
/// carries enough context for an upgrade prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// `remaining` is `None` for unmetered (subscribed) admissions.
    Admitted { remaining: Option<i64> },
    Denied {
        reason: DenyReason,
        used: i64,
        limit: i64,
        /// When the rolling window rolls over, for authenticated identities.
        resets_at: Option<DateTime<Utc>>,
    },
}

/// Outcome of one chat turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        user_message: Message,
        assistant_message: Message,
        remaining: Option<i64>,
    },
    /// Admission succeeded and the user message persisted, but no assistant
    /// reply was produced. The consumed quota unit is not refunded; the turn
    /// may be retried without a second admission.
    GenerationFailed { user_message: Message },
    Denied {
        reason: DenyReason,
        used: i64,
        limit: i64,
        resets_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuotaStatus {
    pub subscribed: bool,
    pub unlimited: bool,
    pub used: i64,
    pub limit: i64,
    /// `None` when unlimited.
    pub remaining: Option<i64>,
    pub window_ends: Option<DateTime<Utc>>,
}

/// The admission coordinator: the only component that mutates entitlement
/// state. Check and increment are one guarded unit per identity.
#[async_trait]
pub trait AdmissionService: Send + Sync {
    /// Decides "may this identity send one more message right now" and, on
    /// admit, records it. `Err` means the store could not be consulted; the
    /// caller must treat that as a denial (fail closed).
    async fn try_admit(&self, identity: &Identity) -> Result<Admission, ServiceError>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    /// Runs one full turn: admission, user message, generation, reply.
    async fn turn(&self, identity: &Identity, content: String)
        -> Result<TurnOutcome, ServiceError>;

    /// Regenerates the reply for an already-admitted user message. Never
    /// calls admission; the quota unit was consumed by the original turn.
    ///
    /// Returns `Err(NotRetryable)` unless `user_message_id` names the
    /// caller's most recent message and no reply has landed after it.
    async fn retry_turn(
        &self,
        identity: &Identity,
        user_message_id: i64,
    ) -> Result<TurnOutcome, ServiceError>;

    /// Lists the caller's messages in insertion order.
    async fn history(&self, identity: &Identity) -> Result<Vec<Message>, ServiceError>;

    /// Deletes the caller's messages, returning how many were removed.
    /// Entitlement state is untouched.
    async fn clear_history(&self, identity: &Identity) -> Result<u64, ServiceError>;

    async fn quota_status(&self, identity: &Identity) -> Result<QuotaStatus, ServiceError>;

    /// Flips the subscription flag for a user. Activation runs to 30 days
    /// out; cancellation ends it now. Payment handling lives elsewhere.
    async fn set_subscription(&self, user_id: Uuid, subscribed: bool)
        -> Result<(), ServiceError>;
}
