//! Errors from talking to the backend.

use balancer_types::ApiError;
use thiserror::Error;

/// A failed fetch or mutation against the backend.
///
/// These are recoverable: orchestrators catch them at the operation boundary
/// and turn them into toasts.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with an error body.
    #[error("{error} (HTTP {status})")]
    Server { status: u16, error: ApiError },

    /// The response body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The call needs a bearer credential and none is set.
    #[error("not signed in")]
    NotAuthenticated,
}

impl ClientError {
    /// Decoded `{ message, code }` to show the user.
    pub fn api_error(&self) -> ApiError {
        match self {
            ClientError::Server { error, .. } => error.clone(),
            other => ApiError::new(other.to_string()),
        }
    }

    pub fn server(status: u16, raw: &str) -> Self {
        ClientError::Server { status, error: ApiError::decode(raw) }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}
