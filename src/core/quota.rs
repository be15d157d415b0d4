//! Quota policy: identity tiers, limits, and the pure admission evaluator.

use crate::infrastructure::entities::EntitlementRecord;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Messages a signed-in user may send per rolling window without a
/// subscription.
pub const WEEKLY_MESSAGE_LIMIT: i64 = 20;

/// Advisory ceiling for unauthenticated callers. Enforced against a
/// caller-held counter, so it is a friction device, not a security boundary.
pub const GUEST_MESSAGE_LIMIT: u32 = 5;

/// Length of the rolling counting window, anchored at `weekly_reset_date`.
pub fn reset_window() -> Duration {
    Duration::days(7)
}

/// Caller identity as resolved by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// No credentials; `messages_sent` is the client's own advisory count.
    Guest { messages_sent: u32 },
    Authenticated(Uuid),
}

impl Identity {
    /// Ledger bucket for this identity (`None` = the anonymous bucket).
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            Identity::Guest { .. } => None,
            Identity::Authenticated(user_id) => Some(*user_id),
        }
    }
}

/// How an admission may proceed. The coordinator turns this into the matching
/// store write (or no write at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// No record yet: insert one with count 1 and the window anchored now.
    FirstMessage,
    /// The window rolled over: count back to 1, window re-anchored now.
    WindowRollover,
    /// Active subscription: admit without touching the counter.
    Unmetered,
    /// Under the limit: increment the counter.
    WithinQuota,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    QuotaExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit(Admit),
    Deny(DenyReason),
}

/// Decides whether one more message may be admitted for the state in
/// `record` at time `now`. Pure; all store access and mutation belongs to
/// the coordinator, which runs this inside its guarded read-evaluate-write.
///
/// A subscription that expired mid-window falls through to the counter rule
/// with whatever count the record holds; expiry alone never resets it.
pub fn evaluate(record: Option<&EntitlementRecord>, now: DateTime<Utc>) -> Decision {
    let Some(record) = record else {
        return Decision::Admit(Admit::FirstMessage);
    };

    if now - record.weekly_reset_date >= reset_window() {
        return Decision::Admit(Admit::WindowRollover);
    }

    if record.is_subscribed && record.subscription_ends.map_or(true, |ends| ends > now) {
        return Decision::Admit(Admit::Unmetered);
    }

    if record.weekly_message_count < WEEKLY_MESSAGE_LIMIT {
        Decision::Admit(Admit::WithinQuota)
    } else {
        Decision::Deny(DenyReason::QuotaExceeded)
    }
}

/// Messages left in the current window; `None` means unlimited.
pub fn remaining(record: Option<&EntitlementRecord>, now: DateTime<Utc>) -> Option<i64> {
    match evaluate(record, now) {
        Decision::Admit(Admit::Unmetered) => None,
        Decision::Admit(Admit::FirstMessage) | Decision::Admit(Admit::WindowRollover) => {
            Some(WEEKLY_MESSAGE_LIMIT)
        }
        Decision::Admit(Admit::WithinQuota) => record
            .map(|r| WEEKLY_MESSAGE_LIMIT - r.weekly_message_count)
            .or(Some(WEEKLY_MESSAGE_LIMIT)),
        Decision::Deny(_) => Some(0),
    }
}

/// When the current window ends and the counter resets.
pub fn window_ends(record: &EntitlementRecord) -> DateTime<Utc> {
    record.weekly_reset_date + reset_window()
}
