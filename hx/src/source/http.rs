//! HTTP transport for the chat endpoint
//!
//! The server answers `POST /chat` with a `text/event-stream` body and flushes
//! once per yielded event. Each received body chunk becomes one fragment.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ChatRequest, FragmentSource, FragmentStream, TransportError};
use crate::config::ServerConfig;

/// Streams chat fragments from the Helix server
#[derive(Debug, Clone)]
pub struct HttpFragmentSource {
    http: Client,
    chat_url: String,
}

impl HttpFragmentSource {
    /// Create a source from server configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        debug!(?config, "HttpFragmentSource::from_config: called");
        let http = build_client(config)?;
        Ok(Self {
            http,
            chat_url: config.chat_url(),
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl FragmentSource for HttpFragmentSource {
    async fn open(&self, request: &ChatRequest) -> Result<FragmentStream, TransportError> {
        debug!(url = %self.chat_url, user_id = %request.user_id, "HttpFragmentSource::open: called");
        let response = self
            .http
            .post(&self.chat_url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "HttpFragmentSource::open: non-success status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), "HttpFragmentSource::open: streaming body");
        let body = response.bytes_stream().fuse().boxed();
        let fragments = futures::stream::unfold((body, Utf8Decoder::new()), |(mut body, mut decoder)| async move {
            loop {
                match body.next().await {
                    Some(Ok(bytes)) => {
                        let text = decoder.decode(&bytes);
                        // Chunk held back entirely as an incomplete character
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), (body, decoder)));
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "HttpFragmentSource: body error");
                        return Some((Err(TransportError::Network(e)), (body, decoder)));
                    }
                    None => {
                        let rest = decoder.finish();
                        if rest.is_empty() {
                            return None;
                        }
                        return Some((Ok(rest), (body, decoder)));
                    }
                }
            }
        });

        Ok(fragments.boxed())
    }
}

/// Calls the server's reset endpoint
#[derive(Debug, Clone)]
pub struct ResetClient {
    http: Client,
    reset_url: String,
}

#[derive(Debug, Deserialize)]
struct ResetResponse {
    message: String,
}

impl ResetClient {
    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        debug!(?config, "ResetClient::from_config: called");
        Ok(Self {
            http: build_client(config)?,
            reset_url: config.reset_url(),
        })
    }

    /// Drop the server-side history for `user_id`
    ///
    /// Returns the server's confirmation message.
    pub async fn reset(&self, user_id: &str) -> Result<String, TransportError> {
        debug!(url = %self.reset_url, %user_id, "ResetClient::reset: called");
        let response = self
            .http
            .post(&self.reset_url)
            .json(&serde_json::json!({ "user_id": user_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: ResetResponse = serde_json::from_str(&text)?;
        debug!(message = %parsed.message, "ResetClient::reset: done");
        Ok(parsed.message)
    }
}

fn build_client(config: &ServerConfig) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .build()
        .map_err(TransportError::Network)
}

/// Incremental UTF-8 decoder for body chunks
///
/// A multi-byte character split across chunks is held until its remaining
/// bytes arrive. Invalid bytes decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any held tail) as is complete
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut consumed = 0;

        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(s) => {
                    out.push_str(s);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[consumed..consumed + valid]));
                    consumed += valid;
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += len;
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => break,
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is still held, lossily
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
