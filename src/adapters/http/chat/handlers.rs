//! HTTP handlers for the chat endpoint.

use axum::body::{Body, Bytes};
use axum::extract::{Json, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;

use crate::application::text_deltas;

use super::super::{ApiError, ProxyState};
use super::dto::{ChatRequest, CompletionReply, HealthView};

/// Response header carrying the thread id for the next turn.
pub const THREAD_ID_HEADER: &str = "x-thread-id";

/// GET /api/chat - health probe.
///
/// Reports whether credentials are configured, as booleans only.
pub async fn chat_health(State(state): State<ProxyState>) -> Json<HealthView> {
    Json(HealthView {
        ok: true,
        api_key_configured: state.api_key_configured,
        assistant_configured: state.assistant_configured,
    })
}

/// POST /api/chat - one conversation turn.
///
/// The thread shape gets a streamed `text/plain` reply with the thread id
/// echoed in the `x-thread-id` header; deltas are piped to the body as they
/// arrive, unbuffered. The bare `{ message }` shape gets a synchronous
/// `{ reply }` JSON body instead.
///
/// # Errors
/// - 400: empty or missing user message
/// - 500: missing configuration, malformed upstream payload, run failure
/// - 502: upstream non-OK or unreachable
/// - 504: run outlived the poll deadline
pub async fn post_chat(
    State(state): State<ProxyState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    state.check_configured()?;

    let message = request
        .user_message()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No message provided".to_string()))?
        .to_string();

    match request {
        ChatRequest::Thread { .. } => {
            let (thread_id, events) = state
                .turns
                .open_stream(request.thread_id(), &message)
                .await?;

            let body = Body::from_stream(text_deltas(events).map(|delta| delta.map(Bytes::from)));

            Response::builder()
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CACHE_CONTROL, "no-cache")
                .header(THREAD_ID_HEADER, thread_id.as_str())
                .body(body)
                .map_err(|e| ApiError::Internal(e.to_string()))
        }
        ChatRequest::Completion { .. } => {
            let reply = state.turns.run_turn(None, &message).await?;
            Ok(Json(CompletionReply { reply: reply.text }).into_response())
        }
    }
}
