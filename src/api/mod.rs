use crate::core::quota::Identity;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use std::str::FromStr;
use uuid::Uuid;

pub mod chat;

const X_USER_ID: &str = "X-User-ID";
const X_GUEST_MESSAGES: &str = "X-Guest-Messages";

/// Resolves the caller's identity from headers. A `X-User-ID` UUID means an
/// authenticated caller; without it the caller is a guest, optionally
/// reporting its own message count in `X-Guest-Messages` (absent = 0).
#[derive(Debug)]
pub struct ExtractIdentity(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractIdentity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(user_id) = parts.headers.get(X_USER_ID) {
            let user_id = user_id
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            let user_id = Uuid::from_str(user_id)
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid user id"))?;
            return Ok(ExtractIdentity(Identity::Authenticated(user_id)));
        }

        let messages_sent = match parts.headers.get(X_GUEST_MESSAGES) {
            Some(count) => count
                .to_str()
                .ok()
                .and_then(|count| u32::from_str(count).ok())
                .ok_or((StatusCode::BAD_REQUEST, "invalid guest message count"))?,
            None => 0,
        };

        Ok(ExtractIdentity(Identity::Guest { messages_sent }))
    }
}
