//! Session error types

use thiserror::Error;

use crate::source::TransportError;
use crate::transcript::TranscriptError;

/// Errors returned by session operations
///
/// Cancellation is not an error; see [`super::StreamOutcome::Cancelled`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation not allowed in the current state; nothing was changed
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Rejected transcript mutation; nothing was changed
    #[error("Invalid state: {0}")]
    Transcript(#[from] TranscriptError),

    /// The fragment source failed; the stream ended as failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    /// Contract violation by the caller (as opposed to a transport failure)
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SessionError::InvalidState(_) | SessionError::Transcript(_))
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            SessionError::Transport(e) => Some(e),
            _ => None,
        }
    }
}
