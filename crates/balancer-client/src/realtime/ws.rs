//! WebSocket transport feeding the [`EventHub`].
//!
//! The server sends text frames shaped `{"event": "...", "data": ...}`.
//! Each one is published to the hub under its event name. The connection
//! is re-established with capped exponential backoff until cancelled.

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::hub::EventHub;
use crate::constants::{WS_RECONNECT_BASE, WS_RECONNECT_MAX};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("invalid bearer token")]
    InvalidToken,
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Split a text frame into event name and payload.
pub fn parse_frame(text: &str) -> Option<(String, Value)> {
    match serde_json::from_str::<Frame>(text) {
        Ok(frame) => Some((frame.event, frame.data)),
        Err(e) => {
            warn!("ignoring malformed realtime frame: {e}");
            None
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based).
pub fn backoff(attempt: u32) -> Duration {
    WS_RECONNECT_BASE
        .checked_mul(1u32 << attempt.min(16))
        .map_or(WS_RECONNECT_MAX, |d| d.min(WS_RECONNECT_MAX))
}

pub struct WsTransport {
    url: String,
    token: Option<String>,
    hub: EventHub,
    cancel: CancellationToken,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, hub: EventHub) -> Self {
        Self { url: url.into(), token: None, hub, cancel: CancellationToken::new() }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    /// Token that stops the transport when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the connect/read/reconnect loop on a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub async fn run(self) {
        let mut attempt = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.connect_and_read() => result,
            };
            match result {
                Ok(()) => {
                    info!(url = %self.url, "realtime connection closed by server");
                    attempt = 0;
                }
                Err(e) => warn!(url = %self.url, attempt, "realtime connection failed: {e}"),
            }

            let delay = backoff(attempt);
            attempt = attempt.saturating_add(1);
            debug!(?delay, "reconnecting");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        debug!(url = %self.url, "realtime transport stopped");
    }

    async fn connect_and_read(&self) -> Result<(), TransportError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| TransportError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut stream, _) = tokio_tungstenite::connect_async(request).await?;
        info!(url = %self.url, "realtime connected");

        while let Some(message) = stream.next().await {
            match message? {
                Message::Text(text) => {
                    if let Some((event, data)) = parse_frame(text.as_str()) {
                        let delivered = self.hub.publish(&event, &data);
                        trace!(%event, delivered, "realtime event");
                    }
                }
                Message::Close(frame) => {
                    debug!(?frame, "close frame");
                    break;
                }
                _ => {}
            }
        }
        Ok(())
    }
}
