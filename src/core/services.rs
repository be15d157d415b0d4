//! Implementations for the services the app needs.

use crate::core::error::ServiceError;
use crate::core::generator::{ChatMessage, ResponseGenerator, SYSTEM_PROMPT};
use crate::core::quota::{
    self, evaluate, Admit, Decision, DenyReason, Identity, GUEST_MESSAGE_LIMIT,
    WEEKLY_MESSAGE_LIMIT,
};
use crate::core::traits::{Admission, AdmissionService, ChatService, QuotaStatus, TurnOutcome};
use crate::infrastructure::entities::{Message, MessageRole};
use crate::infrastructure::traits::{EntitlementStore, MessageLedger};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use di::{injectable, Ref};
use log::{debug, warn};
use uuid::Uuid;

/// Upper bound on compare-and-set retries for one admission. Each lost race
/// means another admission committed, so contention this deep on a single
/// identity is indistinguishable from a store problem.
const ADMISSION_CAS_RETRIES: usize = 16;

/// How many ledger messages are replayed into the generator prompt.
const PROMPT_HISTORY_WINDOW: usize = 10;

#[injectable(AdmissionService)]
pub struct QuotaAdmissionService {
    store: Ref<dyn EntitlementStore>,
}

#[async_trait]
impl AdmissionService for QuotaAdmissionService {
    async fn try_admit(&self, identity: &Identity) -> Result<Admission, ServiceError> {
        let user_id = match identity {
            Identity::Guest { messages_sent } => {
                // Guests are metered by their own advisory counter; the store
                // is never consulted and nothing durable is written.
                return Ok(if *messages_sent < GUEST_MESSAGE_LIMIT {
                    Admission::Admitted {
                        remaining: Some(i64::from(GUEST_MESSAGE_LIMIT - messages_sent - 1)),
                    }
                } else {
                    Admission::Denied {
                        reason: DenyReason::QuotaExceeded,
                        used: i64::from(*messages_sent),
                        limit: i64::from(GUEST_MESSAGE_LIMIT),
                        resets_at: None,
                    }
                });
            }
            Identity::Authenticated(user_id) => *user_id,
        };

        // Optimistic read-evaluate-write: the evaluator decides on a
        // snapshot, the write is guarded by that snapshot, and a lost race
        // starts over. Two requests racing for the last slot cannot both
        // land their increment.
        for _ in 0..ADMISSION_CAS_RETRIES {
            let now = Utc::now();
            let snapshot = self.store.get(user_id).await?;
            let decision = evaluate(snapshot.as_ref(), now);

            let applied = match (&snapshot, decision) {
                (_, Decision::Deny(reason)) => {
                    let (used, resets_at) = match snapshot.as_ref() {
                        Some(record) => {
                            (record.weekly_message_count, Some(quota::window_ends(record)))
                        }
                        None => (0, None),
                    };
                    return Ok(Admission::Denied {
                        reason,
                        used,
                        limit: WEEKLY_MESSAGE_LIMIT,
                        resets_at,
                    });
                }
                (_, Decision::Admit(Admit::Unmetered)) => {
                    // Active subscription: admit without touching the counter.
                    return Ok(Admission::Admitted { remaining: None });
                }
                (None, Decision::Admit(_)) => self.store.insert_fresh(user_id, now).await?,
                (Some(record), Decision::Admit(Admit::WindowRollover)) => {
                    self.store
                        .compare_and_set_admission(record, 1, now)
                        .await?
                }
                (Some(record), Decision::Admit(Admit::WithinQuota)) => {
                    self.store
                        .compare_and_set_admission(
                            record,
                            record.weekly_message_count + 1,
                            record.weekly_reset_date,
                        )
                        .await?
                }
                // The evaluator only says FirstMessage when no record exists.
                (Some(_), Decision::Admit(Admit::FirstMessage)) => None,
            };

            if let Some(record) = applied {
                return Ok(Admission::Admitted {
                    remaining: quota::remaining(Some(&record), now),
                });
            }

            debug!("admission raced for user {user_id}, re-evaluating");
        }

        warn!("admission retries exhausted for user {user_id}");
        Err(ServiceError::AdmissionContention(user_id))
    }
}

#[injectable(ChatService)]
pub struct MeteredChatService {
    admission: Ref<dyn AdmissionService>,
    store: Ref<dyn EntitlementStore>,
    ledger: Ref<dyn MessageLedger>,
    generator: Ref<dyn ResponseGenerator>,
}

impl MeteredChatService {
    fn prompt_from_history(history: Vec<Message>) -> Vec<ChatMessage> {
        let skip = history.len().saturating_sub(PROMPT_HISTORY_WINDOW);
        let mut prompt = Vec::with_capacity(PROMPT_HISTORY_WINDOW + 1);
        prompt.push(ChatMessage::system(SYSTEM_PROMPT));
        prompt.extend(history.into_iter().skip(skip).map(ChatMessage::from));
        prompt
    }

    /// Post-admission remaining count for responses that did not go through
    /// a fresh admission (retries).
    async fn current_remaining(&self, identity: &Identity) -> Result<Option<i64>, ServiceError> {
        match identity {
            Identity::Guest { messages_sent } => Ok(Some(
                (i64::from(GUEST_MESSAGE_LIMIT) - i64::from(*messages_sent)).max(0),
            )),
            Identity::Authenticated(user_id) => {
                let record = self.store.get(*user_id).await?;
                Ok(quota::remaining(record.as_ref(), Utc::now()))
            }
        }
    }
}

#[async_trait]
impl ChatService for MeteredChatService {
    async fn turn(
        &self,
        identity: &Identity,
        content: String,
    ) -> Result<TurnOutcome, ServiceError> {
        // Admission strictly precedes any ledger write. A denial leaves both
        // the store and the ledger untouched.
        let remaining = match self.admission.try_admit(identity).await? {
            Admission::Admitted { remaining } => remaining,
            Admission::Denied {
                reason,
                used,
                limit,
                resets_at,
            } => {
                return Ok(TurnOutcome::Denied {
                    reason,
                    used,
                    limit,
                    resets_at,
                })
            }
        };

        let owner = identity.owner();
        let user_message = self.ledger.append(owner, MessageRole::User, content).await?;

        // The quota unit is committed from here on. A failed generation (or
        // the caller going away) keeps the user message and the consumed
        // unit; only the assistant half is withheld.
        let prompt = Self::prompt_from_history(self.ledger.list(owner).await?);
        match self.generator.generate(&prompt).await {
            Ok(reply) => {
                let assistant_message = self
                    .ledger
                    .append(owner, MessageRole::Assistant, reply)
                    .await?;
                Ok(TurnOutcome::Completed {
                    user_message,
                    assistant_message,
                    remaining,
                })
            }
            Err(err) => {
                warn!("generation failed for message {}: {err}", user_message.id);
                Ok(TurnOutcome::GenerationFailed { user_message })
            }
        }
    }

    async fn retry_turn(
        &self,
        identity: &Identity,
        user_message_id: i64,
    ) -> Result<TurnOutcome, ServiceError> {
        let owner = identity.owner();
        let history = self.ledger.list(owner).await?;

        // Only the most recent message is retryable, and only while it is a
        // user message without a reply. Anything else would duplicate an
        // assistant turn.
        let retryable = history
            .last()
            .filter(|m| m.id == user_message_id && m.role == MessageRole::User)
            .cloned();
        let Some(user_message) = retryable else {
            return Err(ServiceError::NotRetryable(user_message_id));
        };

        let prompt = Self::prompt_from_history(history);
        match self.generator.generate(&prompt).await {
            Ok(reply) => {
                let assistant_message = self
                    .ledger
                    .append(owner, MessageRole::Assistant, reply)
                    .await?;
                let remaining = self.current_remaining(identity).await?;
                Ok(TurnOutcome::Completed {
                    user_message,
                    assistant_message,
                    remaining,
                })
            }
            Err(err) => {
                warn!(
                    "retried generation failed for message {}: {err}",
                    user_message.id
                );
                Ok(TurnOutcome::GenerationFailed { user_message })
            }
        }
    }

    async fn history(&self, identity: &Identity) -> Result<Vec<Message>, ServiceError> {
        Ok(self.ledger.list(identity.owner()).await?)
    }

    async fn clear_history(&self, identity: &Identity) -> Result<u64, ServiceError> {
        Ok(self.ledger.clear(identity.owner()).await?)
    }

    async fn quota_status(&self, identity: &Identity) -> Result<QuotaStatus, ServiceError> {
        match identity {
            Identity::Guest { messages_sent } => {
                let used = i64::from(*messages_sent);
                let limit = i64::from(GUEST_MESSAGE_LIMIT);
                Ok(QuotaStatus {
                    subscribed: false,
                    unlimited: false,
                    used,
                    limit,
                    remaining: Some((limit - used).max(0)),
                    window_ends: None,
                })
            }
            Identity::Authenticated(user_id) => {
                let now = Utc::now();
                let record = self.store.get(*user_id).await?;
                let unlimited =
                    matches!(evaluate(record.as_ref(), now), Decision::Admit(Admit::Unmetered));
                // A window that already rolled over reads as unused.
                let used = match record.as_ref() {
                    Some(r) if now - r.weekly_reset_date < quota::reset_window() => {
                        r.weekly_message_count
                    }
                    _ => 0,
                };
                Ok(QuotaStatus {
                    subscribed: unlimited,
                    unlimited,
                    used,
                    limit: WEEKLY_MESSAGE_LIMIT,
                    remaining: if unlimited {
                        None
                    } else {
                        Some((WEEKLY_MESSAGE_LIMIT - used).max(0))
                    },
                    window_ends: record.as_ref().map(quota::window_ends),
                })
            }
        }
    }

    async fn set_subscription(
        &self,
        user_id: Uuid,
        subscribed: bool,
    ) -> Result<(), ServiceError> {
        // Activation runs 30 days out; cancellation ends the subscription
        // now, which the evaluator picks up on the very next admission.
        let ends = if subscribed {
            Some(Utc::now() + Duration::days(30))
        } else {
            Some(Utc::now())
        };
        Ok(self.store.set_subscription(user_id, subscribed, ends).await?)
    }
}
