//! Axum routes for the assistant endpoint.

use axum::routing::post;
use axum::Router;

use super::super::ProxyState;
use super::handlers::post_assistant;

/// Creates routes for the assistant endpoint.
///
/// - POST /api/assistant - synchronous (poll-mode) conversation turn
pub fn assistant_routes() -> Router<ProxyState> {
    Router::new().route("/assistant", post(post_assistant))
}
