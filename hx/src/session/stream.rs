//! Stream session - drives one chat exchange at a time
//!
//! A send appends the user message and an empty open assistant message, then
//! pulls fragments one by one, classifies each, and applies the result to the
//! transcript or the sequence slot before pulling the next. Nothing is
//! processed in parallel: later replacements depend on the exact prior state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::SessionError;
use super::events::{EventBus, SessionEvent, SessionStatus};
use crate::config::Config;
use crate::decoder::{ControlEvent, classify};
use crate::source::{ChatRequest, FragmentSource, FragmentStream, HttpFragmentSource, TransportError};
use crate::transcript::{Message, SequenceChannel, TranscriptState};

/// How a send ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The source signalled end of stream
    Completed,
    /// Cancellation was requested; the open message keeps its content
    Cancelled,
    /// Empty input; nothing was sent
    Skipped,
}

/// Identity carried into every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// State shared between the session (sole writer) and its handles (readers)
#[derive(Debug)]
struct Shared {
    transcript: watch::Sender<TranscriptState>,
    sequence: watch::Sender<SequenceChannel>,
    events: EventBus,
    streaming: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Read and cancel access for UI collaborators
///
/// Cheap to clone. Cannot start a stream or mutate state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Request cancellation of the current stream
    ///
    /// No-op when idle. The session stops before its next pull and discards any
    /// fragment that was already on its way.
    pub fn cancel(&self) {
        let token = self.shared.cancel.lock().ok().and_then(|slot| slot.clone());
        match token {
            Some(token) => {
                info!("SessionHandle::cancel: cancelling stream");
                token.cancel();
            }
            None => debug!("SessionHandle::cancel: idle, nothing to cancel"),
        }
    }

    /// Busy flag: true between the start and end of a send
    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Current transcript, in order
    pub fn snapshot(&self) -> Vec<Message> {
        self.shared.transcript.borrow().snapshot()
    }

    /// Latest sequence payload
    pub fn current_sequence(&self) -> Option<String> {
        self.shared.sequence.borrow().get().map(str::to_string)
    }

    /// Latest-value receiver for the transcript
    pub fn transcript(&self) -> watch::Receiver<TranscriptState> {
        self.shared.transcript.subscribe()
    }

    /// Latest-value receiver for the sequence slot
    pub fn sequence(&self) -> watch::Receiver<SequenceChannel> {
        self.shared.sequence.subscribe()
    }

    /// Ordered event stream
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }
}

/// Returns the session to idle however the send future ends, including drop
struct BusyGuard<'a> {
    shared: &'a Shared,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.shared.transcript.send_if_modified(|t| {
            let was_open = t.open_index().is_some();
            t.close();
            was_open
        });
        if let Ok(mut slot) = self.shared.cancel.lock() {
            *slot = None;
        }
        self.shared.streaming.store(false, Ordering::SeqCst);
        self.shared.events.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Idle,
        });
        debug!("BusyGuard::drop: session idle");
    }
}

/// Decoder for one conversation
pub struct StreamSession {
    source: Arc<dyn FragmentSource>,
    context: SessionContext,
    idle_timeout: Option<Duration>,
    handle: SessionHandle,
}

impl StreamSession {
    /// Create an idle session over `source`
    pub fn new(source: Arc<dyn FragmentSource>, context: SessionContext) -> Self {
        debug!(user_id = %context.user_id, "StreamSession::new: called");
        let (transcript, _) = watch::channel(TranscriptState::new());
        let (sequence, _) = watch::channel(SequenceChannel::new());
        Self {
            source,
            context,
            idle_timeout: None,
            handle: SessionHandle {
                shared: Arc::new(Shared {
                    transcript,
                    sequence,
                    events: EventBus::with_default_capacity(),
                    streaming: AtomicBool::new(false),
                    cancel: Mutex::new(None),
                }),
            },
        }
    }

    /// Create a session talking HTTP to the configured server
    pub fn from_config(config: &Config) -> Result<Self, TransportError> {
        debug!("StreamSession::from_config: called");
        let source = HttpFragmentSource::from_config(&config.server)?;
        Ok(Self::new(Arc::new(source), SessionContext::new(config.session.user_id.clone()))
            .with_idle_timeout(config.session.idle_timeout()))
    }

    /// Fail a stream when no fragment arrives within `timeout`
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Handle for readers and for cancelling from another task
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_streaming(&self) -> bool {
        self.handle.is_streaming()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.handle.snapshot()
    }

    pub fn current_sequence(&self) -> Option<String> {
        self.handle.current_sequence()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.handle.subscribe()
    }

    /// Send `text` and decode the response stream to its end
    ///
    /// Rejected with [`SessionError::InvalidState`] while another send is in
    /// progress; nothing is appended in that case. A transport failure ends the
    /// stream as failed and is returned as [`SessionError::Transport`]; the open
    /// message keeps whatever content it had.
    pub async fn send(&self, text: &str) -> Result<StreamOutcome, SessionError> {
        debug!(len = text.len(), "StreamSession::send: called");
        if text.is_empty() {
            debug!("StreamSession::send: empty input, skipping");
            return Ok(StreamOutcome::Skipped);
        }

        let shared = &*self.handle.shared;
        if shared
            .streaming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("StreamSession::send: rejected, a stream is already in progress");
            return Err(SessionError::InvalidState("a stream is already in progress".to_string()));
        }

        let token = CancellationToken::new();
        if let Ok(mut slot) = shared.cancel.lock() {
            *slot = Some(token.clone());
        }
        let _guard = BusyGuard { shared };

        self.append_exchange(text);
        shared.events.emit(SessionEvent::StatusChanged {
            status: SessionStatus::Streaming,
        });
        info!(user_id = %self.context.user_id, "StreamSession::send: streaming");

        let request = ChatRequest::new(self.context.user_id.clone(), text);
        let result = self.pump(&request, &token).await;

        let status = match &result {
            Ok(StreamOutcome::Cancelled) => SessionStatus::Cancelled,
            Ok(_) => SessionStatus::Completed,
            Err(e) => {
                warn!(error = %e, "StreamSession::send: stream failed");
                shared.events.emit(SessionEvent::Failed { error: e.to_string() });
                SessionStatus::Failed
            }
        };
        info!(?status, "StreamSession::send: finished");
        shared.events.emit(SessionEvent::StatusChanged { status });

        result
    }

    /// Clear transcript and sequence
    ///
    /// Only allowed while idle; cancel first.
    pub fn reset(&self) -> Result<(), SessionError> {
        debug!("StreamSession::reset: called");
        let shared = &*self.handle.shared;
        if shared
            .streaming
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("StreamSession::reset: rejected, a stream is in progress");
            return Err(SessionError::InvalidState(
                "cannot reset while a stream is in progress".to_string(),
            ));
        }

        shared.transcript.send_modify(TranscriptState::clear);
        shared.sequence.send_modify(SequenceChannel::clear);
        shared.events.emit(SessionEvent::TranscriptCleared);
        shared.events.emit(SessionEvent::SequenceChanged { sequence: None });
        shared.streaming.store(false, Ordering::SeqCst);

        info!("StreamSession::reset: transcript and sequence cleared");
        Ok(())
    }

    /// Pull and apply fragments until the stream ends, fails or is cancelled
    async fn pump(&self, request: &ChatRequest, token: &CancellationToken) -> Result<StreamOutcome, SessionError> {
        let mut stream = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("StreamSession::pump: cancelled before open");
                return Ok(StreamOutcome::Cancelled);
            }
            opened = self.source.open(request) => opened?,
        };

        let mut accumulator = String::new();
        let mut count = 0usize;

        loop {
            if token.is_cancelled() {
                debug!(count, "StreamSession::pump: cancelled before pull");
                return Ok(StreamOutcome::Cancelled);
            }

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(count, "StreamSession::pump: cancelled while waiting");
                    return Ok(StreamOutcome::Cancelled);
                }
                next = self.next_fragment(&mut stream) => next?,
            };

            let Some(fragment) = next else {
                debug!(count, "StreamSession::pump: end of stream");
                return Ok(StreamOutcome::Completed);
            };

            // Arrived after cancellation: discard unapplied
            if token.is_cancelled() {
                debug!(count, "StreamSession::pump: discarding fragment after cancel");
                return Ok(StreamOutcome::Cancelled);
            }

            count += 1;
            let event = classify(&fragment);
            trace!(count, event = event.name(), "StreamSession::pump: applying");
            self.apply(event, &mut accumulator)?;
        }
    }

    async fn next_fragment(&self, stream: &mut FragmentStream) -> Result<Option<String>, TransportError> {
        let next = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => stream.next().await,
        };
        next.transpose()
    }

    /// Apply one classified fragment
    ///
    /// Status markers replace the open message outright and start a fresh text
    /// run, so text that follows a marker is not glued to text before it.
    fn apply(&self, event: ControlEvent, accumulator: &mut String) -> Result<(), SessionError> {
        match event {
            ControlEvent::Generating => {
                accumulator.clear();
                self.replace_open(Message::generating())
            }
            ControlEvent::Editing => {
                accumulator.clear();
                self.replace_open(Message::editing())
            }
            ControlEvent::DeletingStep => {
                accumulator.clear();
                self.replace_open(Message::deleting_step())
            }
            ControlEvent::SequenceData(payload) => {
                self.set_sequence(payload);
                Ok(())
            }
            ControlEvent::TextDelta(text) => {
                accumulator.push_str(&text);
                self.replace_open(Message::assistant(accumulator.clone()))
            }
            ControlEvent::Ignored => Ok(()),
        }
    }

    fn append_exchange(&self, text: &str) {
        let shared = &self.handle.shared;
        let mut appended = Vec::with_capacity(2);
        shared.transcript.send_modify(|t| {
            let user = Message::user(text);
            let open = Message::assistant("");
            appended.push((t.append(user.clone()), user));
            appended.push((t.append_open(open.clone()), open));
        });
        for (index, message) in appended {
            shared.events.emit(SessionEvent::TranscriptChanged { index, message });
        }
    }

    fn replace_open(&self, message: Message) -> Result<(), SessionError> {
        let shared = &self.handle.shared;
        let mut result = Ok(0);
        let replacement = message.clone();
        shared.transcript.send_if_modified(|t| match t.replace_last(replacement) {
            Ok(()) => {
                result = Ok(t.len() - 1);
                true
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        let index = result?;
        shared.events.emit(SessionEvent::TranscriptChanged { index, message });
        Ok(())
    }

    fn set_sequence(&self, payload: String) {
        let shared = &self.handle.shared;
        shared.sequence.send_modify(|s| s.set(payload.clone()));
        shared.events.emit(SessionEvent::SequenceChanged {
            sequence: Some(payload),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ScriptedSource;
    use crate::transcript::{MessageKind, Role};

    fn session_with(fragments: &[&str]) -> StreamSession {
        let source = ScriptedSource::new(fragments.iter().copied());
        StreamSession::new(Arc::new(source), SessionContext::new("user123"))
    }

    #[tokio::test]
    async fn test_send_appends_user_and_assistant() {
        let session = session_with(&["data: Hello", "data: there"]);
        let outcome = session.send("hi").await.unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        let transcript = session.snapshot();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0], Message::user("hi"));
        assert_eq!(transcript[1].role, Role::Assistant);
        assert_eq!(transcript[1].content, "Hellothere");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_empty_send_is_skipped() {
        let session = session_with(&["data: x"]);
        assert_eq!(session.send("").await.unwrap(), StreamOutcome::Skipped);
        assert!(session.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_marker_resets_text_run() {
        let session = session_with(&["data: ab", "data: [GENERATING_SEQUENCE]", "data: cd"]);
        session.send("hi").await.unwrap();

        let last = session.snapshot().pop().unwrap();
        assert_eq!(last.content, "cd");
        assert_eq!(last.kind, MessageKind::Normal);
    }

    #[tokio::test]
    async fn test_marker_sets_kind() {
        let session = session_with(&["data: [EDITING_SEQUENCE]\n\n"]);
        session.send("make it casual").await.unwrap();

        let last = session.snapshot().pop().unwrap();
        assert_eq!(last.content, "Editing sequence...");
        assert_eq!(last.kind, MessageKind::EditingSequence);
    }

    #[tokio::test]
    async fn test_sequence_data_leaves_open_message() {
        let session = session_with(&["data: x", "data: [SEQUENCE_DATA]plan\n\n"]);
        session.send("hi").await.unwrap();

        assert_eq!(session.snapshot()[1].content, "x");
        assert_eq!(session.current_sequence().as_deref(), Some("plan"));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_partial_content() {
        let source = ScriptedSource::new(["data: partial"]).failing_after(502, "bad gateway");
        let session = StreamSession::new(Arc::new(source), SessionContext::new("u"));

        let err = session.send("hi").await.unwrap_err();
        assert_eq!(err.transport().and_then(|e| e.status()), Some(502));
        assert_eq!(session.snapshot()[1].content, "partial");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn test_open_failure_keeps_empty_open_message() {
        let source = ScriptedSource::new(Vec::<String>::new()).failing_on_open(500, "down");
        let session = StreamSession::new(Arc::new(source), SessionContext::new("u"));

        assert!(session.send("hi").await.is_err());
        let transcript = session.snapshot();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "");
    }

    #[tokio::test]
    async fn test_request_carries_context() {
        let source = Arc::new(ScriptedSource::new(["data: ok"]));
        let session = StreamSession::new(source.clone(), SessionContext::new("recruiter-1"));
        session.send("find me a designer").await.unwrap();

        let requests = source.requests();
        assert_eq!(requests, vec![ChatRequest::new("recruiter-1", "find me a designer")]);
    }

    #[tokio::test]
    async fn test_open_message_closed_after_stream() {
        let session = session_with(&["data: done"]);
        session.send("hi").await.unwrap();
        assert_eq!(session.handle().transcript().borrow().open_index(), None);
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let session = session_with(&["data: [SEQUENCE_DATA]plan", "data: ok"]);
        session.send("hi").await.unwrap();
        assert!(session.current_sequence().is_some());

        session.reset().unwrap();
        assert!(session.snapshot().is_empty());
        assert_eq!(session.current_sequence(), None);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let session = session_with(&["data: a"]);
        session.cancel();
        assert_eq!(session.send("hi").await.unwrap(), StreamOutcome::Completed);
    }

    #[tokio::test]
    async fn test_idle_timeout_fails_stream() {
        let source = ScriptedSource::new(["data: slow"]).with_delay(Duration::from_millis(200));
        let session = StreamSession::new(Arc::new(source), SessionContext::new("u"))
            .with_idle_timeout(Some(Duration::from_millis(20)));

        let err = session.send("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Timeout(_))));
        assert!(!session.is_streaming());
    }
}
