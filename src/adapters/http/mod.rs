//! HTTP adapters - the assistant proxy's REST surface.
//!
//! Two endpoint modules share one state: `chat` (streaming mode plus the
//! health probe) and `assistant` (poll mode). The gateway behind the state
//! is constructed once at process start and injected here.

pub mod assistant;
pub mod chat;
mod error;

pub use error::{ApiError, ErrorBody};

use axum::Router;
use std::sync::Arc;

use crate::application::TurnService;

/// Shared state for the proxy endpoints.
///
/// The configuration booleans exist for the health probe and the
/// per-request configuration guard; secret values themselves never leave
/// the gateway.
#[derive(Clone)]
pub struct ProxyState {
    pub turns: Arc<TurnService>,
    pub api_key_configured: bool,
    pub assistant_configured: bool,
}

impl ProxyState {
    /// Creates the proxy state.
    pub fn new(turns: Arc<TurnService>, api_key_configured: bool, assistant_configured: bool) -> Self {
        Self {
            turns,
            api_key_configured,
            assistant_configured,
        }
    }

    /// Per-request configuration guard: 500 before any upstream call.
    pub fn check_configured(&self) -> Result<(), ApiError> {
        if !self.api_key_configured {
            return Err(ApiError::Configuration("OPENAI_API_KEY".to_string()));
        }
        if !self.assistant_configured {
            return Err(ApiError::Configuration("ASSISTANT_ID".to_string()));
        }
        Ok(())
    }
}

/// Combined router with all proxy routes under `/api`.
pub fn api_router(state: ProxyState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(chat::chat_routes())
                .merge(assistant::assistant_routes()),
        )
        .with_state(state)
}
