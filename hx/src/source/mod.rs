//! Fragment sources
//!
//! A [`FragmentSource`] opens one request and hands back a lazy, finite stream
//! of text fragments. Fragment boundaries are whatever the transport delivers;
//! nothing here aligns them to markers. Dropping the stream aborts the request.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

mod error;
mod http;
mod scripted;

pub use error::TransportError;
pub use http::{HttpFragmentSource, ResetClient, Utf8Decoder};
pub use scripted::{ChannelSource, FragmentSender, ScriptedSource};

/// Stream of fragments for one request
pub type FragmentStream = BoxStream<'static, Result<String, TransportError>>;

/// Body of a chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

impl ChatRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
        }
    }
}

/// Opens fragment streams for chat requests
///
/// Implementations must be cheap to call repeatedly: a session opens one
/// stream per send.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Open the stream for one request
    ///
    /// Errors here mean the request never produced a body (connection refused,
    /// non-success status).
    async fn open(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError>;
}
