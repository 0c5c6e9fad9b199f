//! Transcript and sequence containers
//!
//! [`TranscriptState`] tracks the single replaceable ("open") message by index
//! instead of by reference, so the invariant is checkable on its own: at most
//! one open message, and it is always the last one.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use super::types::{Message, Role};

/// Separator between steps of a generated sequence
pub const STEP_SEPARATOR: &str = "---";

/// Rejected transcript mutations
///
/// The transcript is left untouched when any of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Cannot replace last message: transcript is empty")]
    Empty,

    #[error("Cannot replace last message: message {index} is closed")]
    Closed { index: usize },

    #[error("Cannot replace {expected:?} message with a {actual:?} message")]
    RoleMismatch { expected: Role, actual: Role },
}

/// Ordered list of messages with an optional open tail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptState {
    messages: Vec<Message>,
    open_index: Option<usize>,
}

impl TranscriptState {
    /// Create an empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed message
    ///
    /// Any open message is superseded and becomes immutable.
    pub fn append(&mut self, message: Message) -> usize {
        self.close();
        self.messages.push(message);
        let index = self.messages.len() - 1;
        debug!(index, role = ?self.messages[index].role, "TranscriptState::append");
        index
    }

    /// Append a message and mark it as the open message
    pub fn append_open(&mut self, message: Message) -> usize {
        let index = self.append(message);
        self.open_index = Some(index);
        debug!(index, "TranscriptState::append_open");
        index
    }

    /// Replace the open last message in place
    pub fn replace_last(&mut self, message: Message) -> Result<(), TranscriptError> {
        let Some(last) = self.messages.len().checked_sub(1) else {
            debug!("TranscriptState::replace_last: empty transcript");
            return Err(TranscriptError::Empty);
        };
        if self.open_index != Some(last) {
            debug!(index = last, "TranscriptState::replace_last: last message is closed");
            return Err(TranscriptError::Closed { index: last });
        }
        let current = &mut self.messages[last];
        if current.role != message.role {
            return Err(TranscriptError::RoleMismatch {
                expected: current.role,
                actual: message.role,
            });
        }
        trace!(index = last, kind = ?message.kind, "TranscriptState::replace_last");
        *current = message;
        Ok(())
    }

    /// Close the open message, if any
    pub fn close(&mut self) {
        if let Some(index) = self.open_index.take() {
            debug!(index, "TranscriptState::close");
        }
    }

    /// Drop every message
    pub fn clear(&mut self) {
        debug!(len = self.messages.len(), "TranscriptState::clear");
        self.messages.clear();
        self.open_index = None;
    }

    /// Order-preserving copy for readers
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn open_index(&self) -> Option<usize> {
        self.open_index
    }

    /// The open message, if one exists
    pub fn open_message(&self) -> Option<&Message> {
        self.open_index.and_then(|i| self.messages.get(i))
    }
}

/// Latest-value slot for the out-of-band sequence payload
///
/// Overwritten on every set; nothing is appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceChannel {
    payload: Option<String>,
}

impl SequenceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current payload
    pub fn set(&mut self, payload: impl Into<String>) {
        let payload = payload.into();
        debug!(len = payload.len(), "SequenceChannel::set");
        self.payload = Some(payload);
    }

    pub fn get(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn clear(&mut self) {
        self.payload = None;
    }

    /// Steps of the current sequence, split on `---`
    pub fn steps(&self) -> Vec<&str> {
        self.payload.as_deref().map(split_steps).unwrap_or_default()
    }
}

/// Split a sequence into its non-empty, trimmed steps
pub fn split_steps(sequence: &str) -> Vec<&str> {
    sequence
        .split(STEP_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::MessageKind;

    #[test]
    fn test_replace_last_on_empty_transcript() {
        let mut t = TranscriptState::new();
        assert_eq!(t.replace_last(Message::assistant("x")), Err(TranscriptError::Empty));
        assert!(t.is_empty());
    }

    #[test]
    fn test_replace_last_requires_open_message() {
        let mut t = TranscriptState::new();
        t.append(Message::user("hi"));
        let err = t.replace_last(Message::user("changed")).unwrap_err();
        assert_eq!(err, TranscriptError::Closed { index: 0 });
        assert_eq!(t.messages()[0].content, "hi");
    }

    #[test]
    fn test_replace_last_keeps_role() {
        let mut t = TranscriptState::new();
        t.append_open(Message::assistant(""));
        let err = t.replace_last(Message::user("nope")).unwrap_err();
        assert!(matches!(err, TranscriptError::RoleMismatch { .. }));
        assert_eq!(t.last().unwrap().content, "");
    }

    #[test]
    fn test_single_open_message() {
        let mut t = TranscriptState::new();
        t.append(Message::user("hi"));
        t.append_open(Message::assistant(""));
        assert_eq!(t.open_index(), Some(1));

        t.replace_last(Message::generating()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.open_message().unwrap().kind, MessageKind::GeneratingSequence);

        // A later append supersedes the open message
        t.append(Message::user("next"));
        assert_eq!(t.open_index(), None);
        assert!(t.replace_last(Message::user("x")).is_err());
        assert_eq!(t.messages()[1].content, "Generating sequence...");
    }

    #[test]
    fn test_snapshot_is_stable() {
        let mut t = TranscriptState::new();
        t.append(Message::user("hi"));
        t.append_open(Message::assistant("hello"));
        let a = t.snapshot();
        let b = t.snapshot();
        assert_eq!(a, b);
        assert_eq!(a[0].role, Role::User);
        assert_eq!(a[1].content, "hello");
    }

    #[test]
    fn test_clear() {
        let mut t = TranscriptState::new();
        t.append_open(Message::assistant("x"));
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.open_index(), None);
    }

    #[test]
    fn test_sequence_last_write_wins() {
        let mut s = SequenceChannel::new();
        assert_eq!(s.get(), None);
        s.set("first");
        s.set("second");
        assert_eq!(s.get(), Some("second"));
        s.clear();
        assert_eq!(s.get(), None);
    }

    #[test]
    fn test_split_steps() {
        let seq = "Hi Jane,\nintro\n---\nFollow-up one\n---\n\n---\nFinal note ";
        assert_eq!(split_steps(seq), vec!["Hi Jane,\nintro", "Follow-up one", "Final note"]);

        let mut s = SequenceChannel::new();
        assert!(s.steps().is_empty());
        s.set(seq);
        assert_eq!(s.steps().len(), 3);
    }
}
