//! OpenAI Assistants Gateway - implementation of AssistantGateway against
//! the hosted Assistants API (v2).
//!
//! One authenticated `reqwest` client is built at construction and reused
//! for every call. Streaming runs are consumed as Server-Sent Events; only
//! `thread.message.delta` events contribute text, everything else maps to
//! the `Other` variant and is dropped upstream of the response body.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::OpenAiConfig;
use crate::ports::{
    AssistantGateway, ContentPart, EventStream, GatewayError, IdKind, MessageRole, Run, RunId,
    RunStatus, RunStreamEvent, ThreadId, ThreadMessage,
};

/// Assistants API gateway over HTTPS.
#[derive(Debug)]
pub struct OpenAiAssistantGateway {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
    assistant_id: String,
}

impl OpenAiAssistantGateway {
    /// Build the gateway from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` when the API key or assistant
    /// id is absent, or when the HTTP client cannot be constructed.
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::configuration("missing API key"))?;
        let assistant_id = config
            .assistant_id
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| GatewayError::configuration("missing assistant id"))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: Secret::new(api_key),
            assistant_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Builds a request with auth and the assistants beta header applied.
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Converts transport failures into gateway errors.
    fn transport_error(e: reqwest::Error) -> GatewayError {
        if e.is_timeout() {
            GatewayError::network(format!("request timed out: {e}"))
        } else if e.is_connect() {
            GatewayError::network(format!("connection failed: {e}"))
        } else {
            GatewayError::network(e.to_string())
        }
    }

    /// Surfaces a non-2xx response as an upstream error with its body.
    async fn fail_for_status(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(GatewayError::upstream(status.as_u16(), detail))
    }
}

/// Streaming runs keep the response open well past the plain client timeout,
/// so they get a generous overall cap instead.
const STREAM_TIMEOUT: Duration = Duration::from_secs(600);

#[async_trait]
impl AssistantGateway for OpenAiAssistantGateway {
    async fn create_thread(&self) -> Result<ThreadId, GatewayError> {
        let response = self
            .request(reqwest::Method::POST, "/threads")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::fail_for_status(response).await?;

        let raw = response.text().await.map_err(Self::transport_error)?;
        let thread: ThreadObject = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::parse(format!("thread payload: {e}")))?;
        ThreadId::parse(thread.id).map_err(|e| attach_payload(e, &raw))
    }

    async fn append_message(
        &self,
        thread: &ThreadId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), GatewayError> {
        if content.trim().is_empty() {
            return Err(GatewayError::validation("message content is empty"));
        }

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/threads/{}/messages", thread),
            )
            .json(&CreateMessageRequest { role, content })
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::fail_for_status(response).await?;
        Ok(())
    }

    async fn start_run(&self, thread: &ThreadId) -> Result<Run, GatewayError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{}/runs", thread))
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: None,
            })
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::fail_for_status(response).await?;

        let raw = response.text().await.map_err(Self::transport_error)?;
        run_from_payload(&raw, thread)
    }

    async fn poll_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{}/runs/{}", thread, run),
            )
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::fail_for_status(response).await?;

        let raw = response.text().await.map_err(Self::transport_error)?;
        run_from_payload(&raw, thread)
    }

    async fn stream_run(&self, thread: &ThreadId) -> Result<EventStream, GatewayError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{}/runs", thread))
            .timeout(STREAM_TIMEOUT)
            .json(&CreateRunRequest {
                assistant_id: &self.assistant_id,
                stream: Some(true),
            })
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::fail_for_status(response).await?;

        let mut parser = SseParser::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => parser.push(&bytes).into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(GatewayError::network(format!("stream error: {e}")))],
            })
            .flat_map(stream::iter);

        Ok(Box::pin(events))
    }

    async fn latest_message(
        &self,
        thread: &ThreadId,
    ) -> Result<Option<ThreadMessage>, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{}/messages?order=desc&limit=1", thread),
            )
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::fail_for_status(response).await?;

        let list: MessageList = response
            .json()
            .await
            .map_err(|e| GatewayError::parse(format!("message list: {e}")))?;
        Ok(list.data.into_iter().next().map(ThreadMessage::from))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Run payload validation
// ════════════════════════════════════════════════════════════════════════════════

/// Decodes a run payload, validating both identifiers against their
/// namespaces before either is used for polling.
///
/// `fallback_thread` covers the payload omitting `thread_id`; the caller's
/// thread id is authoritative in that case.
fn run_from_payload(raw: &str, fallback_thread: &ThreadId) -> Result<Run, GatewayError> {
    let wire: RunObject = serde_json::from_str(raw)
        .map_err(|e| GatewayError::parse(format!("run payload: {e}")))?;

    let id = RunId::parse(wire.id.unwrap_or_default()).map_err(|e| attach_payload(e, raw))?;
    let thread_id = match wire.thread_id {
        Some(value) => ThreadId::parse(value).map_err(|e| attach_payload(e, raw))?,
        None => fallback_thread.clone(),
    };

    Ok(Run {
        id,
        thread_id,
        status: wire.status,
    })
}

/// Attaches the raw upstream payload to a malformed-id error for diagnosis.
fn attach_payload(err: GatewayError, raw: &str) -> GatewayError {
    match err {
        GatewayError::MalformedId { kind, value, .. } => {
            GatewayError::malformed_id(kind, value, raw)
        }
        other => other,
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SSE parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Incremental Server-Sent-Events parser for run streams.
///
/// Transport chunks can split lines arbitrarily, so the parser buffers
/// partial lines across `push` calls. Event dispatch is by event name: only
/// `thread.message.delta` is decoded, the terminal `done` event (or a
/// `[DONE]` data marker) maps to `Done`, and every other event name maps to
/// `Other` without touching its payload.
struct SseParser {
    buffer: String,
    event_name: Option<String>,
}

impl SseParser {
    fn new() -> Self {
        Self {
            buffer: String::new(),
            event_name: None,
        }
    }

    /// Feed raw bytes, returning the events completed by this chunk.
    fn push(&mut self, bytes: &[u8]) -> Vec<RunStreamEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                self.event_name = None;
            } else if let Some(name) = line.strip_prefix("event: ") {
                self.event_name = Some(name.to_string());
            } else if let Some(data) = line.strip_prefix("data: ") {
                events.extend(self.dispatch(data));
            }
        }
        events
    }

    fn dispatch(&self, data: &str) -> Vec<RunStreamEvent> {
        if data == "[DONE]" {
            return vec![RunStreamEvent::Done];
        }
        match self.event_name.as_deref() {
            Some("thread.message.delta") => match serde_json::from_str::<MessageDeltaEvent>(data) {
                Ok(event) => event
                    .delta
                    .content
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|part| match part {
                        DeltaContentPart::Text { text } => text.value.filter(|v| !v.is_empty()),
                        DeltaContentPart::Other => None,
                    })
                    .map(RunStreamEvent::MessageDelta)
                    .collect(),
                // A delta that fails to decode carries no text we can relay.
                Err(_) => vec![RunStreamEvent::Other],
            },
            Some("done") => vec![RunStreamEvent::Done],
            _ => vec![RunStreamEvent::Other],
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wire types
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: MessageRole,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: Option<String>,
    thread_id: Option<String>,
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: MessageRole,
    #[serde(default)]
    content: Vec<WireContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentPart {
    Text { text: WireText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireText {
    value: String,
}

impl From<MessageObject> for ThreadMessage {
    fn from(wire: MessageObject) -> Self {
        ThreadMessage {
            role: wire.role,
            content: wire
                .content
                .into_iter()
                .map(|part| match part {
                    WireContentPart::Text { text } => ContentPart::Text(text.value),
                    WireContentPart::Other => ContentPart::Other,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    content: Option<Vec<DeltaContentPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeltaContentPart {
    Text { text: DeltaText },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaText {
    value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread() -> ThreadId {
        ThreadId::parse("thread_fallback").unwrap()
    }

    // ── run payload validation ──────────────────────────────────────────────

    #[test]
    fn run_payload_decodes() {
        let raw = r#"{"id":"run_abc","thread_id":"thread_xyz","status":"queued"}"#;
        let run = run_from_payload(raw, &thread()).unwrap();
        assert_eq!(run.id.as_str(), "run_abc");
        assert_eq!(run.thread_id.as_str(), "thread_xyz");
        assert_eq!(run.status, RunStatus::Queued);
    }

    #[test]
    fn run_payload_falls_back_to_caller_thread() {
        let raw = r#"{"id":"run_abc","status":"in_progress"}"#;
        let run = run_from_payload(raw, &thread()).unwrap();
        assert_eq!(run.thread_id.as_str(), "thread_fallback");
    }

    #[test]
    fn run_payload_detects_swapped_ids() {
        let raw = r#"{"id":"thread_abc","thread_id":"run_xyz","status":"queued"}"#;
        let err = run_from_payload(raw, &thread()).unwrap_err();
        match err {
            GatewayError::MalformedId { kind, value, payload } => {
                assert_eq!(kind, IdKind::Run);
                assert_eq!(value, "thread_abc");
                assert_eq!(payload, raw);
            }
            other => panic!("expected MalformedId, got {other:?}"),
        }
    }

    #[test]
    fn run_payload_missing_id_is_malformed() {
        let raw = r#"{"thread_id":"thread_xyz","status":"queued"}"#;
        let err = run_from_payload(raw, &thread()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::MalformedId { kind: IdKind::Run, .. }
        ));
    }

    #[test]
    fn run_payload_bad_thread_id_is_malformed() {
        let raw = r#"{"id":"run_abc","thread_id":"garbage","status":"queued"}"#;
        let err = run_from_payload(raw, &thread()).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::MalformedId { kind: IdKind::Thread, .. }
        ));
    }

    #[test]
    fn run_payload_invalid_json_is_parse_error() {
        let err = run_from_payload("not json", &thread()).unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    // ── SSE parsing ─────────────────────────────────────────────────────────

    fn delta_frame(value: &str) -> String {
        format!(
            "event: thread.message.delta\ndata: {{\"id\":\"msg_1\",\"delta\":{{\"content\":[{{\"index\":0,\"type\":\"text\",\"text\":{{\"value\":\"{value}\"}}}}]}}}}\n\n"
        )
    }

    #[test]
    fn parses_message_delta_event() {
        let mut parser = SseParser::new();
        let events = parser.push(delta_frame("Hello").as_bytes());
        assert_eq!(events, vec![RunStreamEvent::MessageDelta("Hello".to_string())]);
    }

    #[test]
    fn ignores_other_event_types() {
        let mut parser = SseParser::new();
        let frame = "event: thread.run.step.created\ndata: {\"id\":\"step_1\"}\n\n";
        let events = parser.push(frame.as_bytes());
        assert_eq!(events, vec![RunStreamEvent::Other]);
    }

    #[test]
    fn handles_frames_split_across_chunks() {
        let frame = delta_frame("Hello");
        let (first, second) = frame.split_at(frame.len() / 2);

        let mut parser = SseParser::new();
        let mut events = parser.push(first.as_bytes());
        events.extend(parser.push(second.as_bytes()));

        assert_eq!(events, vec![RunStreamEvent::MessageDelta("Hello".to_string())]);
    }

    #[test]
    fn done_marker_ends_stream() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: done\ndata: [DONE]\n\n");
        assert_eq!(events, vec![RunStreamEvent::Done]);
    }

    #[test]
    fn multiple_deltas_in_one_chunk() {
        let chunk = format!("{}{}", delta_frame("Hel"), delta_frame("lo"));
        let mut parser = SseParser::new();
        let events = parser.push(chunk.as_bytes());
        assert_eq!(
            events,
            vec![
                RunStreamEvent::MessageDelta("Hel".to_string()),
                RunStreamEvent::MessageDelta("lo".to_string()),
            ]
        );
    }

    #[test]
    fn empty_delta_values_are_dropped() {
        let mut parser = SseParser::new();
        let events = parser.push(delta_frame("").as_bytes());
        assert!(events.is_empty());
    }

    #[test]
    fn non_text_delta_parts_are_ignored() {
        let frame = "event: thread.message.delta\ndata: {\"delta\":{\"content\":[{\"index\":0,\"type\":\"image_file\",\"image_file\":{\"file_id\":\"file_1\"}}]}}\n\n";
        let mut parser = SseParser::new();
        let events = parser.push(frame.as_bytes());
        assert!(events.is_empty());
    }

    // ── wire message decoding ───────────────────────────────────────────────

    #[test]
    fn message_list_decodes_text_and_other_parts() {
        let raw = r#"{"data":[{"id":"msg_1","role":"assistant","content":[
            {"type":"text","text":{"value":"See the show plan.","annotations":[]}},
            {"type":"image_file","image_file":{"file_id":"file_1"}}
        ]}]}"#;
        let list: MessageList = serde_json::from_str(raw).unwrap();
        let message = ThreadMessage::from(list.data.into_iter().next().unwrap());

        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.joined_text(), "See the show plan.");
    }

    // ── construction ────────────────────────────────────────────────────────

    #[test]
    fn from_config_requires_credentials() {
        let config = OpenAiConfig::default();
        let err = OpenAiAssistantGateway::from_config(&config).unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
    }

    #[test]
    fn from_config_builds_with_credentials() {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            assistant_id: Some("asst_abc".to_string()),
            ..Default::default()
        };
        let gateway = OpenAiAssistantGateway::from_config(&config).unwrap();
        assert_eq!(gateway.url("/threads"), "https://api.openai.com/v1/threads");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let config = OpenAiConfig {
            api_key: Some("sk-test".to_string()),
            assistant_id: Some("asst_abc".to_string()),
            base_url: "https://api.openai.com/v1/".to_string(),
            ..Default::default()
        };
        let gateway = OpenAiAssistantGateway::from_config(&config).unwrap();
        assert_eq!(gateway.url("/threads"), "https://api.openai.com/v1/threads");
    }
}
