//! HTTP DTOs for the assistant endpoint.

use serde::{Deserialize, Serialize};

use crate::ports::ThreadId;

/// Request body for `POST /api/assistant`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    /// The user's message for this turn.
    #[serde(default)]
    pub message: Option<String>,
    /// Thread to continue; omitted on the first turn.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Response body for a successful turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantReply {
    pub thread_id: ThreadId,
    pub text: String,
}
