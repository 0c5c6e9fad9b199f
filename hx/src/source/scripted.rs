//! In-memory fragment sources
//!
//! [`ScriptedSource`] replays a fixed script on every open and backs the
//! `replay` command. [`ChannelSource`] lets a caller push fragments one at a
//! time, which is how late-arriving fragments are modelled.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ChatRequest, FragmentSource, FragmentStream, TransportError};

/// Replays the same fragments for every request
#[derive(Debug, Default)]
pub struct ScriptedSource {
    fragments: Vec<String>,
    /// Status and body of an error yielded after the last fragment
    fail_after: Option<(u16, String)>,
    /// Status and body of an error returned from `open`
    fail_on_open: Option<(u16, String)>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedSource {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fragments: Vec<String> = fragments.into_iter().map(Into::into).collect();
        debug!(fragment_count = fragments.len(), "ScriptedSource::new: called");
        Self {
            fragments,
            ..Default::default()
        }
    }

    /// End the stream with a status error after the scripted fragments
    pub fn failing_after(mut self, status: u16, body: impl Into<String>) -> Self {
        self.fail_after = Some((status, body.into()));
        self
    }

    /// Refuse to open at all
    pub fn failing_on_open(mut self, status: u16, body: impl Into<String>) -> Self {
        self.fail_on_open = Some((status, body.into()));
        self
    }

    /// Sleep before each fragment
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FragmentSource for ScriptedSource {
    async fn open(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError> {
        debug!(user_id = %request.user_id, "ScriptedSource::open: called");
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some((status, body)) = &self.fail_on_open {
            debug!(status, "ScriptedSource::open: scripted open failure");
            return Err(TransportError::Status {
                status: *status,
                body: body.clone(),
            });
        }

        let mut items: Vec<Result<String, TransportError>> = self.fragments.iter().cloned().map(Ok).collect();
        if let Some((status, body)) = &self.fail_after {
            items.push(Err(TransportError::Status {
                status: *status,
                body: body.clone(),
            }));
        }

        let delay = self.delay;
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(stream.boxed())
    }
}

/// Pushes fragments into a [`ChannelSource`]
pub type FragmentSender = mpsc::UnboundedSender<Result<String, TransportError>>;

/// Single-use source fed through a channel
///
/// The stream ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelSource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String, TransportError>>>>,
}

impl ChannelSource {
    pub fn new() -> (Self, FragmentSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx: Mutex::new(Some(rx)) }, tx)
    }
}

#[async_trait]
impl FragmentSource for ChannelSource {
    async fn open(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError> {
        debug!(user_id = %request.user_id, "ChannelSource::open: called");
        let rx = self
            .rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| TransportError::Closed("channel source already opened".to_string()))?;

        let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(stream.boxed())
    }
}
