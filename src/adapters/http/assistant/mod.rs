//! Assistant endpoint - poll-based proxy mode.

mod dto;
mod handlers;
mod routes;

pub use dto::{AssistantReply, AssistantRequest};
pub use handlers::post_assistant;
pub use routes::assistant_routes;
