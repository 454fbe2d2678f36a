//! Chat endpoint - streaming proxy mode and the health probe.

mod dto;
mod handlers;
mod routes;

pub use dto::{ChatRequest, CompletionReply, HealthView, TurnMessageDto};
pub use handlers::{chat_health, post_chat};
pub use routes::chat_routes;
