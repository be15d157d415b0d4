//! Unit tests for the pure quota evaluator

use chrono::{DateTime, Duration, Utc};
use metered_chat_api::core::quota::{
    evaluate, remaining, window_ends, Admit, Decision, DenyReason, WEEKLY_MESSAGE_LIMIT,
};
use metered_chat_api::infrastructure::entities::EntitlementRecord;
use uuid::Uuid;

fn record(
    count: i64,
    reset_date: DateTime<Utc>,
    subscribed: bool,
    ends: Option<DateTime<Utc>>,
) -> EntitlementRecord {
    EntitlementRecord {
        user_id: Uuid::new_v4(),
        weekly_message_count: count,
        weekly_reset_date: reset_date,
        is_subscribed: subscribed,
        subscription_ends: ends,
    }
}

#[test]
fn test_first_message_always_admits() {
    let now = Utc::now();
    assert_eq!(evaluate(None, now), Decision::Admit(Admit::FirstMessage));
    assert_eq!(remaining(None, now), Some(WEEKLY_MESSAGE_LIMIT));
}

#[test]
fn test_under_limit_admits() {
    let now = Utc::now();
    let r = record(WEEKLY_MESSAGE_LIMIT - 1, now - Duration::days(1), false, None);
    assert_eq!(evaluate(Some(&r), now), Decision::Admit(Admit::WithinQuota));
    assert_eq!(remaining(Some(&r), now), Some(1));
}

#[test]
fn test_at_limit_denies() {
    let now = Utc::now();
    let r = record(WEEKLY_MESSAGE_LIMIT, now - Duration::days(1), false, None);
    assert_eq!(
        evaluate(Some(&r), now),
        Decision::Deny(DenyReason::QuotaExceeded)
    );
    assert_eq!(remaining(Some(&r), now), Some(0));
}

#[test]
fn test_rollover_admits_regardless_of_count() {
    let now = Utc::now();
    let r = record(WEEKLY_MESSAGE_LIMIT, now - Duration::days(8), false, None);
    assert_eq!(
        evaluate(Some(&r), now),
        Decision::Admit(Admit::WindowRollover)
    );
    assert_eq!(remaining(Some(&r), now), Some(WEEKLY_MESSAGE_LIMIT));
}

#[test]
fn test_rollover_boundary_is_inclusive() {
    let now = Utc::now();
    let exactly_seven = record(WEEKLY_MESSAGE_LIMIT, now - Duration::days(7), false, None);
    assert_eq!(
        evaluate(Some(&exactly_seven), now),
        Decision::Admit(Admit::WindowRollover)
    );

    let just_under = record(
        WEEKLY_MESSAGE_LIMIT,
        now - Duration::days(7) + Duration::seconds(1),
        false,
        None,
    );
    assert_eq!(
        evaluate(Some(&just_under), now),
        Decision::Deny(DenyReason::QuotaExceeded)
    );
}

#[test]
fn test_active_subscription_is_unmetered() {
    let now = Utc::now();
    let r = record(
        WEEKLY_MESSAGE_LIMIT,
        now - Duration::days(1),
        true,
        Some(now + Duration::days(10)),
    );
    assert_eq!(evaluate(Some(&r), now), Decision::Admit(Admit::Unmetered));
    assert_eq!(remaining(Some(&r), now), None);
}

#[test]
fn test_subscription_without_end_date_is_unmetered() {
    let now = Utc::now();
    let r = record(WEEKLY_MESSAGE_LIMIT, now - Duration::days(1), true, None);
    assert_eq!(evaluate(Some(&r), now), Decision::Admit(Admit::Unmetered));
}

#[test]
fn test_expired_subscription_falls_back_to_counter() {
    let now = Utc::now();
    // Flag still set, end date in the past: lazy expiry, no external job.
    let under = record(
        5,
        now - Duration::days(1),
        true,
        Some(now - Duration::hours(1)),
    );
    assert_eq!(
        evaluate(Some(&under), now),
        Decision::Admit(Admit::WithinQuota)
    );

    let exhausted = record(
        WEEKLY_MESSAGE_LIMIT,
        now - Duration::days(1),
        true,
        Some(now - Duration::hours(1)),
    );
    assert_eq!(
        evaluate(Some(&exhausted), now),
        Decision::Deny(DenyReason::QuotaExceeded)
    );
}

#[test]
fn test_expiry_does_not_restore_quota_mid_window() {
    let now = Utc::now();
    // Whatever count sits in the record stands; only a rollover resets it.
    let r = record(
        WEEKLY_MESSAGE_LIMIT,
        now - Duration::days(3),
        true,
        Some(now - Duration::minutes(1)),
    );
    assert_eq!(
        evaluate(Some(&r), now),
        Decision::Deny(DenyReason::QuotaExceeded)
    );
    // The same record admits again once the window rolls over.
    let later = now + Duration::days(5);
    assert_eq!(
        evaluate(Some(&r), later),
        Decision::Admit(Admit::WindowRollover)
    );
}

#[test]
fn test_window_ends_is_reset_date_plus_window() {
    let now = Utc::now();
    let r = record(3, now, false, None);
    assert_eq!(window_ends(&r), now + Duration::days(7));
}
