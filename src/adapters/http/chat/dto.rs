//! HTTP DTOs for the chat endpoint.

use serde::{Deserialize, Serialize};

use crate::ports::MessageRole;

/// Request body for `POST /api/chat`.
///
/// Two shapes are accepted: the thread shape carries the conversation so far
/// plus an optional thread id to continue, and the bare shape carries a
/// single message for a one-shot completion reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatRequest {
    Thread {
        messages: Vec<TurnMessageDto>,
        #[serde(default)]
        thread_id: Option<String>,
    },
    Completion {
        message: String,
    },
}

impl ChatRequest {
    /// The user message for this turn: the last element of `messages`, or
    /// the bare message. Not yet trimmed or checked for emptiness.
    pub fn user_message(&self) -> Option<&str> {
        match self {
            ChatRequest::Thread { messages, .. } => {
                messages.last().map(|m| m.content.as_str())
            }
            ChatRequest::Completion { message } => Some(message.as_str()),
        }
    }

    /// The caller-supplied thread id, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            ChatRequest::Thread { thread_id, .. } => thread_id.as_deref(),
            ChatRequest::Completion { .. } => None,
        }
    }
}

/// One prior turn as sent by the browser client.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnMessageDto {
    pub role: MessageRole,
    pub content: String,
}

/// Response body for the one-shot completion shape.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReply {
    pub reply: String,
}

/// Response body for `GET /api/chat`.
///
/// Booleans only; secret values are never echoed.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub ok: bool,
    pub api_key_configured: bool,
    pub assistant_configured: bool,
}
