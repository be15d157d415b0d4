//! Chat endpoints: turns, history, quota status, subscription.

use crate::api::ExtractIdentity;
use crate::core::error::ServiceError;
use crate::core::quota::{DenyReason, Identity};
use crate::core::traits::{ChatService, TurnOutcome};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use di_axum::Inject;
use log::error;

pub fn router() -> Router {
    Router::new()
        .route("/turns", post(post_turn))
        .route("/turns/:id/retry", post(retry_turn))
        .route("/history", get(get_history).delete(delete_history))
        .route("/status", get(get_status))
        .route("/subscription", put(put_subscription))
}

async fn post_turn(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
    Json(create_turn): Json<schemas::CreateTurn>,
) -> Response {
    match chat_service.turn(&identity, create_turn.content).await {
        Ok(outcome) => turn_response(outcome),
        Err(err) => error_response(err),
    }
}

async fn retry_turn(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
    Path(message_id): Path<i64>,
) -> Response {
    match chat_service.retry_turn(&identity, message_id).await {
        Ok(outcome) => turn_response(outcome),
        Err(err) => error_response(err),
    }
}

async fn get_history(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
) -> Response {
    match chat_service.history(&identity).await {
        Ok(messages) => (
            StatusCode::OK,
            Json(schemas::MessagesList {
                messages: messages.into_iter().map(schemas::Message::from).collect(),
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_history(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
) -> Response {
    match chat_service.clear_history(&identity).await {
        Ok(deleted) => (StatusCode::OK, Json(schemas::Cleared { deleted })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_status(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
) -> Response {
    match chat_service.quota_status(&identity).await {
        Ok(status) => (StatusCode::OK, Json(schemas::QuotaStatus::from(status))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn put_subscription(
    Inject(chat_service): Inject<dyn ChatService>,
    ExtractIdentity(identity): ExtractIdentity,
    Json(update): Json<schemas::UpdateSubscription>,
) -> Response {
    let Identity::Authenticated(user_id) = identity else {
        return (
            StatusCode::BAD_REQUEST,
            Json(schemas::ErrorResponse {
                error: "subscription requires a signed-in user".to_owned(),
            }),
        )
            .into_response();
    };

    match chat_service
        .set_subscription(user_id, update.subscribed)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(schemas::SubscriptionResponse {
                subscribed: update.subscribed,
            }),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

fn turn_response(outcome: TurnOutcome) -> Response {
    match outcome {
        TurnOutcome::Completed {
            user_message,
            assistant_message,
            remaining,
        } => (
            StatusCode::OK,
            Json(schemas::TurnResponse {
                admitted: true,
                user_message: Some(user_message.into()),
                assistant_message: Some(assistant_message.into()),
                remaining,
                reason: None,
                used: None,
                limit: None,
                resets_at: None,
            }),
        )
            .into_response(),
        TurnOutcome::GenerationFailed { user_message } => (
            // The user message is persisted and the turn is retryable; the
            // generator is the part that failed.
            StatusCode::BAD_GATEWAY,
            Json(schemas::TurnResponse {
                admitted: true,
                user_message: Some(user_message.into()),
                assistant_message: None,
                remaining: None,
                reason: Some("generation_failed"),
                used: None,
                limit: None,
                resets_at: None,
            }),
        )
            .into_response(),
        TurnOutcome::Denied {
            reason: DenyReason::QuotaExceeded,
            used,
            limit,
            resets_at,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(schemas::TurnResponse {
                admitted: false,
                user_message: None,
                assistant_message: None,
                remaining: Some(0),
                reason: Some("quota_exceeded"),
                used: Some(used),
                limit: Some(limit),
                resets_at,
            }),
        )
            .into_response(),
    }
}

fn error_response(err: ServiceError) -> Response {
    match err {
        ServiceError::StoreUnavailable(_) | ServiceError::AdmissionContention(_) => {
            error!("{err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(schemas::ErrorResponse {
                    error: "service unavailable, please retry".to_owned(),
                }),
            )
                .into_response()
        }
        ServiceError::NotRetryable(message_id) => (
            StatusCode::CONFLICT,
            Json(schemas::ErrorResponse {
                error: format!("message {message_id} is not retryable"),
            }),
        )
            .into_response(),
    }
}

pub mod schemas {
    use crate::core::traits;
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Deserialize, Debug)]
    pub struct CreateTurn {
        pub content: String,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    pub enum MessageRole {
        User,
        Assistant,
    }

    impl From<entities::MessageRole> for MessageRole {
        fn from(role: entities::MessageRole) -> Self {
            match role {
                entities::MessageRole::User => MessageRole::User,
                entities::MessageRole::Assistant => MessageRole::Assistant,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct Message {
        pub id: i64,
        pub owner: Option<Uuid>,
        pub role: MessageRole,
        pub content: String,
        pub created_at: DateTime<Utc>,
    }

    impl From<entities::Message> for Message {
        fn from(message: entities::Message) -> Self {
            Message {
                id: message.id,
                owner: message.owner,
                role: message.role.into(),
                content: message.content,
                created_at: message.created_at,
            }
        }
    }

    #[derive(Serialize, Debug, Default)]
    pub struct MessagesList {
        pub messages: Vec<Message>,
    }

    #[derive(Serialize, Debug)]
    pub struct Cleared {
        pub deleted: u64,
    }

    #[derive(Serialize, Debug)]
    pub struct TurnResponse {
        pub admitted: bool,
        pub user_message: Option<Message>,
        pub assistant_message: Option<Message>,
        pub remaining: Option<i64>,
        pub reason: Option<&'static str>,
        pub used: Option<i64>,
        pub limit: Option<i64>,
        pub resets_at: Option<DateTime<Utc>>,
    }

    #[derive(Serialize, Debug)]
    pub struct QuotaStatus {
        pub subscribed: bool,
        pub unlimited: bool,
        pub used: i64,
        pub limit: i64,
        pub remaining: Option<i64>,
        pub window_ends: Option<DateTime<Utc>>,
    }

    impl From<traits::QuotaStatus> for QuotaStatus {
        fn from(status: traits::QuotaStatus) -> Self {
            QuotaStatus {
                subscribed: status.subscribed,
                unlimited: status.unlimited,
                used: status.used,
                limit: status.limit,
                remaining: status.remaining,
                window_ends: status.window_ends,
            }
        }
    }

    #[derive(Deserialize, Debug)]
    pub struct UpdateSubscription {
        pub subscribed: bool,
    }

    #[derive(Serialize, Debug)]
    pub struct SubscriptionResponse {
        pub subscribed: bool,
    }

    #[derive(Serialize, Debug)]
    pub struct ErrorResponse {
        pub error: String,
    }
}
