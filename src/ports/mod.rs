//! Ports - interfaces between the application core and the outside world.

mod assistant_gateway;

pub use assistant_gateway::{
    AssistantGateway, ContentPart, EventStream, GatewayError, IdKind, MessageRole, Run, RunId,
    RunStatus, RunStreamEvent, ThreadId, ThreadMessage,
};
