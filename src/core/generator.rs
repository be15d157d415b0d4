//! Response generation seam.
//!
//! The engine only needs a text-in/text-out collaborator that is invoked
//! strictly after admission. The default responder is a deterministic
//! stand-in with the same contract a hosted model client would have.

use crate::infrastructure::entities;
use async_trait::async_trait;
use di::{inject, injectable};

pub const SYSTEM_PROMPT: &str = "You are a supportive, empathetic chat assistant. \
Your responses are compassionate, non-judgmental, professional but warm, and concise. \
Never provide medical advice or diagnoses; direct anyone in immediate danger to \
professional emergency services.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::System,
            content: content.into(),
        }
    }
}

impl From<entities::Message> for ChatMessage {
    fn from(m: entities::Message) -> Self {
        ChatMessage {
            role: match m.role {
                entities::MessageRole::User => Role::User,
                entities::MessageRole::Assistant => Role::Assistant,
            },
            content: m.content,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("response generation failed: {0}")]
pub struct GenerationError(pub String);

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produces the assistant's reply for the given prompt transcript.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

/// Canned supportive responder used when no model backend is wired in.
pub struct SupportiveResponder;

#[injectable(ResponseGenerator)]
impl SupportiveResponder {
    #[inject]
    pub fn create() -> SupportiveResponder {
        SupportiveResponder
    }
}

#[async_trait]
impl ResponseGenerator for SupportiveResponder {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| GenerationError("no user message in prompt".to_owned()))?;

        let opener = if messages.iter().filter(|m| m.role == Role::User).count() > 1 {
            "Thank you for sharing more with me."
        } else {
            "Thank you for reaching out."
        };

        Ok(format!(
            "{opener} I hear you say: \"{}\". That sounds important. \
             Would you like to tell me more about how that makes you feel?",
            last_user.content.trim()
        ))
    }
}
