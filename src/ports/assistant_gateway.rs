//! Assistant Gateway Port - interface to the hosted conversation store.
//!
//! The external service owns threads, messages and run execution; this
//! process keeps no conversation state of its own. The port covers exactly
//! one turn's worth of operations: create or reuse a thread, append one user
//! message, start a run, then either poll the run to a terminal state or
//! consume its token-delta stream.
//!
//! # Design
//!
//! - Thread and run identifiers live in distinct namespaces (`thread_…` vs
//!   `run_…`). The newtypes refuse to parse a value from the wrong
//!   namespace, so a swapped pair from a malformed upstream payload is
//!   caught before it is ever used for polling.
//! - Stream events are a tagged union; anything that is not a text delta is
//!   the `Other` variant and is ignored by construction rather than by
//!   shape-probing.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

/// Stream of incremental run events, boxed for trait-object use.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RunStreamEvent, GatewayError>> + Send>>;

/// Port for the hosted Assistants API.
///
/// Implementations are constructed once at process start (holding the
/// credentials and the assistant id) and shared across requests.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    /// Create a new conversation thread, returning its identifier.
    async fn create_thread(&self) -> Result<ThreadId, GatewayError>;

    /// Append one message to a thread.
    ///
    /// Content must be non-empty after trimming; violating that is a
    /// [`GatewayError::Validation`] and no upstream call is made.
    async fn append_message(
        &self,
        thread: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), GatewayError>;

    /// Start a run of the configured assistant against a thread.
    ///
    /// The returned run carries validated identifiers; a payload whose run
    /// or thread id is malformed (or swapped) is reported as an error that
    /// includes the raw payload for diagnosis.
    async fn start_run(&self, thread: &ThreadId) -> Result<Run, GatewayError>;

    /// Single-shot status check for a run.
    async fn poll_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, GatewayError>;

    /// Start a run and open its event stream.
    ///
    /// The stream ends when the upstream transport closes; it is not
    /// restartable, a new stream must be opened per turn.
    async fn stream_run(&self, thread: &ThreadId) -> Result<EventStream, GatewayError>;

    /// Fetch the most recent message on a thread.
    ///
    /// Returns `None` when the thread has no messages.
    async fn latest_message(
        &self,
        thread: &ThreadId,
    ) -> Result<Option<ThreadMessage>, GatewayError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// Identifiers
// ════════════════════════════════════════════════════════════════════════════════

/// Opaque thread identifier owned by the conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Namespace prefix for thread identifiers.
    pub const PREFIX: &'static str = "thread_";

    /// Parse a thread id, rejecting values outside the `thread_` namespace.
    pub fn parse(value: impl Into<String>) -> Result<Self, GatewayError> {
        let value = value.into();
        if value.starts_with(Self::PREFIX) && value.len() > Self::PREFIX.len() {
            Ok(Self(value))
        } else {
            Err(GatewayError::malformed_id(IdKind::Thread, value, ""))
        }
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque run identifier owned by the conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Namespace prefix for run identifiers.
    pub const PREFIX: &'static str = "run_";

    /// Parse a run id, rejecting values outside the `run_` namespace.
    ///
    /// Thread ids are the usual impostor here: a thread-shaped value where a
    /// run id was expected means the upstream payload was misread, and
    /// polling with it would query a nonexistent run forever.
    pub fn parse(value: impl Into<String>) -> Result<Self, GatewayError> {
        let value = value.into();
        if value.starts_with(Self::PREFIX) && value.len() > Self::PREFIX.len() {
            Ok(Self(value))
        } else {
            Err(GatewayError::malformed_id(IdKind::Run, value, ""))
        }
    }

    /// The raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which identifier namespace a malformed value failed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Thread,
    Run,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::Thread => f.write_str("thread"),
            IdKind::Run => f.write_str("run"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Run model
// ════════════════════════════════════════════════════════════════════════════════

/// One assistant invocation against a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: RunId,
    pub thread_id: ThreadId,
    pub status: RunStatus,
}

impl Run {
    /// True once the run will make no further progress.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Run lifecycle state.
///
/// `RequiresAction` (tool invocation) is modelled so it can be named in
/// logs, but the proxy has no tool-call protocol; such a run never
/// completes on its own and is cut off by the poll deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
    RequiresAction,
    /// Any status this proxy does not model.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// True for states the run cannot leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired
        )
    }

    /// Status name as it appears on the wire and in error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Expired => "expired",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Messages
// ════════════════════════════════════════════════════════════════════════════════

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// A message stored on a thread, as returned by the conversation store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ThreadMessage {
    /// Concatenate all text segments, newline-separated and trimmed.
    ///
    /// Non-text segments contribute an empty string, matching the observable
    /// reply text of the proxy contract.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => text.as_str(),
                ContentPart::Other => "",
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

/// One segment of a message's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Image or any other non-text segment.
    Other,
}

// ════════════════════════════════════════════════════════════════════════════════
// Stream events
// ════════════════════════════════════════════════════════════════════════════════

/// Incremental event from a streamed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStreamEvent {
    /// New text for the in-flight assistant message.
    MessageDelta(String),
    /// Upstream signalled the end of the stream.
    Done,
    /// Any event type the proxy does not extract text from.
    Other,
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

/// Gateway error taxonomy.
///
/// Nothing here is retried automatically: configuration errors are fatal,
/// validation errors are the caller's to correct, and upstream failures are
/// surfaced with best-effort detail.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Missing credential or assistant id.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Empty or malformed client input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Non-2xx response from the conversation store.
    #[error("upstream returned {status}: {detail}")]
    Upstream {
        status: u16,
        detail: String,
    },

    /// An identifier in an upstream payload was outside its namespace.
    #[error("unexpected {kind} id returned: {value}")]
    MalformedId {
        kind: IdKind,
        value: String,
        /// Raw upstream payload, kept for diagnosis.
        payload: String,
    },

    /// Run reached a terminal failure state.
    #[error("run {status}")]
    RunFailed { status: RunStatus },

    /// Run did not reach a terminal state before the deadline.
    #[error("run did not complete within {deadline_secs}s")]
    Timeout { deadline_secs: u64 },

    /// Transport-level failure talking to the conversation store.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream response could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),
}

impl GatewayError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an upstream error from a status code and body.
    pub fn upstream(status: u16, detail: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            detail: detail.into(),
        }
    }

    /// Creates a malformed-id error carrying the raw payload.
    pub fn malformed_id(
        kind: IdKind,
        value: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::MalformedId {
            kind,
            value: value.into(),
            payload: payload.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }
}
