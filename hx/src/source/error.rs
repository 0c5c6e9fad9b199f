//! Transport error types

use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening or pulling from a fragment source
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("No fragment received within {0:?}")]
    Timeout(Duration),

    #[error("Stream closed: {0}")]
    Closed(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// Whether a caller-side retry could reasonably succeed
    ///
    /// Diagnostic only; sessions never retry on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(_) => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            TransportError::Timeout(_) => true,
            TransportError::Closed(_) => false,
            TransportError::Json(_) => false,
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
