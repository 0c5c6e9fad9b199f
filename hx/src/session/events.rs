//! Session events for UI observers
//!
//! Every transcript and sequence mutation is published here in the order the
//! underlying fragments were classified, so a subscriber sees transcript and
//! sequence updates interleaved exactly as they happened. Latest-value
//! snapshots are available separately through `watch` receivers on the handle.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use crate::transcript::Message;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Lifecycle of a session
///
/// `Completed`, `Cancelled` and `Failed` are published once at the end of a
/// stream, immediately followed by `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Failed
        )
    }
}

/// Something observable changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Session moved to a new status
    StatusChanged { status: SessionStatus },

    /// Message at `index` was appended or replaced
    TranscriptChanged { index: usize, message: Message },

    /// Transcript was emptied by a reset
    TranscriptCleared,

    /// New sequence payload (`None` after a reset)
    SequenceChanged { sequence: Option<String> },

    /// Stream ended with a transport failure
    Failed { error: String },
}

impl SessionEvent {
    /// Event type name for logs
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::StatusChanged { .. } => "status_changed",
            SessionEvent::TranscriptChanged { .. } => "transcript_changed",
            SessionEvent::TranscriptCleared => "transcript_cleared",
            SessionEvent::SequenceChanged { .. } => "sequence_changed",
            SessionEvent::Failed { .. } => "failed",
        }
    }
}

/// Broadcast bus for one session's events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped. A subscriber
    /// that falls more than the capacity behind sees `Lagged`.
    pub fn emit(&self, event: SessionEvent) {
        trace!(event_type = event.event_type(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
