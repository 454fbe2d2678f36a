//! One conversation turn against the hosted conversation store.
//!
//! Both endpoint modes funnel through here: resolve the thread (reuse the
//! caller's id or create one), append exactly one user message, start a run,
//! then either poll the run to a terminal state and fetch the reply, or hand
//! the run's event stream back to the caller.
//!
//! The poll loop is bounded. It starts at the configured interval, backs off
//! exponentially up to a cap, and gives up at an overall deadline with a
//! `Timeout` error instead of waiting on a run that will never finish (a
//! `requires_action` run, for instance, which this proxy has no tool-call
//! protocol for).

use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::ports::{
    AssistantGateway, EventStream, GatewayError, MessageRole, RunStatus, RunStreamEvent, ThreadId,
};

/// Reply text when the assistant's message carried no text segments.
const NO_TEXT_PLACEHOLDER: &str = "(No text returned)";

/// Stream of reply-text fragments, boxed for handler use.
pub type TextDeltaStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// Outcome of a completed (non-streaming) turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// Thread the turn ran on; the caller echoes this back next turn.
    pub thread_id: ThreadId,
    /// Assembled reply text, never empty.
    pub text: String,
}

/// Drives one conversation turn per invocation.
///
/// Holds no state across turns beyond the shared gateway; overlapping turns
/// on the same thread are not coordinated here, matching the upstream
/// store's own semantics.
pub struct TurnService {
    gateway: Arc<dyn AssistantGateway>,
    poll_interval: Duration,
    max_poll_interval: Duration,
    run_deadline: Duration,
}

impl TurnService {
    /// Creates a turn service with default polling parameters.
    pub fn new(gateway: Arc<dyn AssistantGateway>) -> Self {
        Self {
            gateway,
            poll_interval: Duration::from_millis(800),
            max_poll_interval: Duration::from_secs(5),
            run_deadline: Duration::from_secs(120),
        }
    }

    /// Sets the initial poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the poll interval cap reached via backoff.
    pub fn with_max_poll_interval(mut self, cap: Duration) -> Self {
        self.max_poll_interval = cap;
        self
    }

    /// Sets the overall run-completion deadline.
    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = deadline;
        self
    }

    /// Runs a full poll-mode turn: append, run, poll, fetch reply.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty message or malformed supplied thread id,
    ///   before any gateway call.
    /// - `RunFailed` naming the terminal status for failed/cancelled/expired
    ///   runs; the appended user message is not rolled back.
    /// - `Timeout` when the run outlives the deadline.
    pub async fn run_turn(
        &self,
        supplied_thread: Option<&str>,
        message: &str,
    ) -> Result<TurnReply, GatewayError> {
        let message = validated_message(message)?;
        let thread_id = self.resolve_thread(supplied_thread).await?;

        self.gateway
            .append_message(&thread_id, MessageRole::User, message)
            .await?;

        let run = self.gateway.start_run(&thread_id).await?;
        tracing::debug!(run = %run.id, thread = %run.thread_id, "run started");

        // The run payload's thread id is authoritative from here on.
        let thread_id = run.thread_id;
        self.await_completion(&thread_id, &run.id, run.status).await?;

        let text = self
            .gateway
            .latest_message(&thread_id)
            .await?
            .map(|message| message.joined_text())
            .unwrap_or_default();
        let text = if text.is_empty() {
            NO_TEXT_PLACEHOLDER.to_string()
        } else {
            text
        };

        Ok(TurnReply { thread_id, text })
    }

    /// Runs a stream-mode turn: append, then open the run's event stream.
    ///
    /// Returns the resolved thread id alongside the stream so the handler
    /// can echo it before the first delta arrives.
    pub async fn open_stream(
        &self,
        supplied_thread: Option<&str>,
        message: &str,
    ) -> Result<(ThreadId, EventStream), GatewayError> {
        let message = validated_message(message)?;
        let thread_id = self.resolve_thread(supplied_thread).await?;

        self.gateway
            .append_message(&thread_id, MessageRole::User, message)
            .await?;

        let events = self.gateway.stream_run(&thread_id).await?;
        Ok((thread_id, events))
    }

    /// Reuses the supplied thread id, or creates a fresh thread.
    ///
    /// A supplied value outside the thread namespace is the caller's mistake,
    /// reported as `Validation` rather than the upstream's.
    async fn resolve_thread(&self, supplied: Option<&str>) -> Result<ThreadId, GatewayError> {
        match supplied.filter(|s| !s.is_empty()) {
            Some(value) => ThreadId::parse(value)
                .map_err(|_| GatewayError::validation(format!("invalid thread id: {value}"))),
            None => self.gateway.create_thread().await,
        }
    }

    /// Polls the run until terminal, bounded by backoff and deadline.
    async fn await_completion(
        &self,
        thread_id: &ThreadId,
        run_id: &crate::ports::RunId,
        initial_status: RunStatus,
    ) -> Result<(), GatewayError> {
        let deadline = Instant::now() + self.run_deadline;
        let mut interval = self.poll_interval;
        let mut status = initial_status;
        let mut warned_requires_action = false;

        loop {
            match status {
                RunStatus::Completed => return Ok(()),
                RunStatus::Failed | RunStatus::Cancelled | RunStatus::Expired => {
                    return Err(GatewayError::RunFailed { status });
                }
                RunStatus::RequiresAction if !warned_requires_action => {
                    // No tool-call protocol; the deadline will cut this off.
                    tracing::warn!(run = %run_id, "run requires_action is unsupported");
                    warned_requires_action = true;
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout {
                    deadline_secs: self.run_deadline.as_secs(),
                });
            }

            sleep(interval).await;
            interval = (interval * 2).min(self.max_poll_interval);

            status = self.gateway.poll_run(thread_id, run_id).await?.status;
        }
    }
}

/// Rejects empty-after-trim input before any gateway call is made.
fn validated_message(message: &str) -> Result<&str, GatewayError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::validation("message must not be empty"));
    }
    Ok(trimmed)
}

/// Filters a run event stream down to its text deltas.
///
/// `Other` and `Done` events vanish by construction; errors pass through so
/// the response body aborts instead of silently truncating.
pub fn text_deltas(events: EventStream) -> TextDeltaStream {
    Box::pin(events.filter_map(|event| async move {
        match event {
            Ok(RunStreamEvent::MessageDelta(text)) => Some(Ok(text)),
            Ok(RunStreamEvent::Done) | Ok(RunStreamEvent::Other) => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ContentPart, Run, RunId, ThreadMessage};
    use async_trait::async_trait;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted gateway: pops run statuses in order, counts calls.
    struct ScriptedGateway {
        statuses: Mutex<VecDeque<RunStatus>>,
        reply: Mutex<Option<ThreadMessage>>,
        stream_events: Mutex<Vec<Result<RunStreamEvent, GatewayError>>>,
        create_thread_calls: Mutex<u32>,
        append_calls: Mutex<u32>,
        poll_calls: Mutex<u32>,
    }

    impl ScriptedGateway {
        fn new(statuses: Vec<RunStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                reply: Mutex::new(Some(ThreadMessage {
                    role: MessageRole::Assistant,
                    content: vec![ContentPart::Text("Our drones can do that.".to_string())],
                })),
                stream_events: Mutex::new(Vec::new()),
                create_thread_calls: Mutex::new(0),
                append_calls: Mutex::new(0),
                poll_calls: Mutex::new(0),
            }
        }

        fn with_reply(self, message: Option<ThreadMessage>) -> Self {
            *self.reply.lock().unwrap() = message;
            self
        }

        fn with_stream_events(self, events: Vec<Result<RunStreamEvent, GatewayError>>) -> Self {
            *self.stream_events.lock().unwrap() = events;
            self
        }

        fn create_thread_calls(&self) -> u32 {
            *self.create_thread_calls.lock().unwrap()
        }

        fn append_calls(&self) -> u32 {
            *self.append_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AssistantGateway for ScriptedGateway {
        async fn create_thread(&self) -> Result<ThreadId, GatewayError> {
            *self.create_thread_calls.lock().unwrap() += 1;
            ThreadId::parse("thread_new")
        }

        async fn append_message(
            &self,
            _thread: &ThreadId,
            _role: MessageRole,
            content: &str,
        ) -> Result<(), GatewayError> {
            assert!(!content.trim().is_empty());
            *self.append_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn start_run(&self, thread: &ThreadId) -> Result<Run, GatewayError> {
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RunStatus::InProgress);
            Ok(Run {
                id: RunId::parse("run_1").unwrap(),
                thread_id: thread.clone(),
                status,
            })
        }

        async fn poll_run(&self, thread: &ThreadId, run: &RunId) -> Result<Run, GatewayError> {
            *self.poll_calls.lock().unwrap() += 1;
            let status = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RunStatus::InProgress);
            Ok(Run {
                id: run.clone(),
                thread_id: thread.clone(),
                status,
            })
        }

        async fn stream_run(&self, _thread: &ThreadId) -> Result<EventStream, GatewayError> {
            let events = std::mem::take(&mut *self.stream_events.lock().unwrap());
            Ok(Box::pin(stream::iter(events)))
        }

        async fn latest_message(
            &self,
            _thread: &ThreadId,
        ) -> Result<Option<ThreadMessage>, GatewayError> {
            Ok(self.reply.lock().unwrap().clone())
        }
    }

    fn fast_service(gateway: Arc<ScriptedGateway>) -> TurnService {
        TurnService::new(gateway)
            .with_poll_interval(Duration::from_millis(1))
            .with_max_poll_interval(Duration::from_millis(2))
            .with_run_deadline(Duration::from_millis(250))
    }

    #[tokio::test]
    async fn empty_message_never_reaches_gateway() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let service = fast_service(gateway.clone());

        let err = service.run_turn(None, "   ").await.unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(gateway.create_thread_calls(), 0);
        assert_eq!(gateway.append_calls(), 0);
    }

    #[tokio::test]
    async fn successful_turn_returns_thread_and_text() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::Completed,
        ]));
        let service = fast_service(gateway.clone());

        let reply = service.run_turn(None, "Can you fly indoors?").await.unwrap();

        assert_eq!(reply.thread_id.as_str(), "thread_new");
        assert_eq!(reply.text, "Our drones can do that.");
        assert_eq!(gateway.append_calls(), 1);
    }

    #[tokio::test]
    async fn supplied_thread_id_is_reused() {
        let gateway = Arc::new(ScriptedGateway::new(vec![RunStatus::Completed]));
        let service = fast_service(gateway.clone());

        let reply = service
            .run_turn(Some("thread_existing"), "Follow-up question")
            .await
            .unwrap();

        assert_eq!(reply.thread_id.as_str(), "thread_existing");
        assert_eq!(gateway.create_thread_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_supplied_thread_id_is_client_error() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let service = fast_service(gateway.clone());

        let err = service.run_turn(Some("run_notathread"), "hi").await.unwrap_err();

        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(gateway.append_calls(), 0);
    }

    #[tokio::test]
    async fn failed_run_names_status() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            RunStatus::InProgress,
            RunStatus::Failed,
        ]));
        let service = fast_service(gateway);

        let err = service.run_turn(None, "hello").await.unwrap_err();

        match err {
            GatewayError::RunFailed { status } => assert_eq!(status, RunStatus::Failed),
            other => panic!("expected RunFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_and_expired_runs_fail() {
        for terminal in [RunStatus::Cancelled, RunStatus::Expired] {
            let gateway = Arc::new(ScriptedGateway::new(vec![terminal]));
            let service = fast_service(gateway);

            let err = service.run_turn(None, "hello").await.unwrap_err();
            match err {
                GatewayError::RunFailed { status } => assert_eq!(status, terminal),
                other => panic!("expected RunFailed, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn run_outliving_deadline_times_out() {
        // Status queue stays empty, so every poll reports in_progress.
        let gateway = Arc::new(ScriptedGateway::new(vec![]));
        let service = fast_service(gateway);

        let err = service.run_turn(None, "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn requires_action_run_times_out_instead_of_hanging() {
        let gateway = Arc::new(ScriptedGateway::new(vec![
            RunStatus::RequiresAction,
            RunStatus::RequiresAction,
        ]));
        let service = fast_service(gateway);

        let err = service.run_turn(None, "hello").await.unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn empty_reply_becomes_placeholder() {
        let gateway = Arc::new(
            ScriptedGateway::new(vec![RunStatus::Completed]).with_reply(Some(ThreadMessage {
                role: MessageRole::Assistant,
                content: vec![ContentPart::Other],
            })),
        );
        let service = fast_service(gateway);

        let reply = service.run_turn(None, "hello").await.unwrap();
        assert_eq!(reply.text, "(No text returned)");
    }

    #[tokio::test]
    async fn missing_reply_becomes_placeholder() {
        let gateway =
            Arc::new(ScriptedGateway::new(vec![RunStatus::Completed]).with_reply(None));
        let service = fast_service(gateway);

        let reply = service.run_turn(None, "hello").await.unwrap();
        assert_eq!(reply.text, "(No text returned)");
    }

    #[tokio::test]
    async fn open_stream_appends_then_streams() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]).with_stream_events(vec![
            Ok(RunStreamEvent::MessageDelta("Dr".to_string())),
            Ok(RunStreamEvent::Other),
            Ok(RunStreamEvent::MessageDelta("ones".to_string())),
            Ok(RunStreamEvent::Done),
        ]));
        let service = fast_service(gateway.clone());

        let (thread_id, events) = service.open_stream(None, "hello").await.unwrap();
        assert_eq!(thread_id.as_str(), "thread_new");
        assert_eq!(gateway.append_calls(), 1);

        let deltas: Vec<String> = text_deltas(events)
            .map(|d| d.unwrap())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(deltas, vec!["Dr".to_string(), "ones".to_string()]);
    }

    #[tokio::test]
    async fn stream_errors_pass_through_text_deltas() {
        let gateway = Arc::new(ScriptedGateway::new(vec![]).with_stream_events(vec![
            Ok(RunStreamEvent::MessageDelta("partial".to_string())),
            Err(GatewayError::network("connection reset")),
        ]));
        let service = fast_service(gateway);

        let (_, events) = service.open_stream(None, "hello").await.unwrap();
        let collected: Vec<Result<String, GatewayError>> = text_deltas(events).collect().await;

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].as_ref().unwrap(), "partial");
        assert!(collected[1].is_err());
    }
}
