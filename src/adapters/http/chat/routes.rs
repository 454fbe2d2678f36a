//! Axum routes for the chat endpoint.

use axum::routing::get;
use axum::Router;

use super::super::ProxyState;
use super::handlers::{chat_health, post_chat};

/// Creates routes for the chat endpoint.
///
/// - GET /api/chat - health probe
/// - POST /api/chat - one conversation turn (streamed or one-shot)
pub fn chat_routes() -> Router<ProxyState> {
    Router::new().route("/chat", get(chat_health).post(post_chat))
}
