//! OpenAI Assistants API adapter.

mod gateway;

pub use gateway::OpenAiAssistantGateway;
