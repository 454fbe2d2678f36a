//! HTTP handlers for the assistant endpoint.

use axum::extract::{Json, State};

use super::super::{ApiError, ProxyState};
use super::dto::{AssistantReply, AssistantRequest};

/// POST /api/assistant - one conversation turn, polled to completion.
///
/// Appends the message to the resolved thread, starts a run, polls until
/// the run is terminal, then returns the latest assistant message.
///
/// # Errors
/// - 400: empty or missing message, malformed thread id
/// - 500: missing configuration, malformed upstream payload, run failure
/// - 502: upstream non-OK or unreachable
/// - 504: run outlived the poll deadline
pub async fn post_assistant(
    State(state): State<ProxyState>,
    Json(request): Json<AssistantRequest>,
) -> Result<Json<AssistantReply>, ApiError> {
    state.check_configured()?;

    let message = request.message.as_deref().unwrap_or_default();
    let reply = state
        .turns
        .run_turn(request.thread_id.as_deref(), message)
        .await?;

    Ok(Json(AssistantReply {
        thread_id: reply.thread_id,
        text: reply.text,
    }))
}
