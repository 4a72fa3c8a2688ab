//! Server error convention and the API error log entries.
//!
//! The backend reports failures as a single string. That string is either a
//! plain human message or a JSON object carrying a machine-readable code next
//! to the message:
//!
//! ```text
//! "Invalid credentials"                                   -> code: None
//! "{\"message\":\"IP already listed\",\"code\":\"ip_01\"}" -> code: Some("ip_01")
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Record;

/// A decoded server error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Shape of the encoded form. Codes arrive as strings or integers.
#[derive(Deserialize)]
struct EncodedError {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), code: None }
    }

    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { message: message.into(), code: Some(code.into()) }
    }

    /// Decode the server's error string into `{ message, code }`.
    ///
    /// Anything that is not an encoded object becomes the message, with
    /// surrounding whitespace trimmed.
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(encoded) = serde_json::from_str::<EncodedError>(trimmed) {
                let code = encoded.code.and_then(|c| match c {
                    serde_json::Value::String(s) if !s.is_empty() => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                return Self { message: encoded.message, code };
            }
        }
        Self::new(trimmed)
    }
}

/// An error the backend recorded while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorRecord {
    pub id: u64,
    /// Route or subsystem that produced the error.
    pub origin: String,
    /// Encoded error string, see [`ApiError::decode`].
    pub error: String,
    /// Unique identifier of the request that failed, when known.
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub created_at: u64,
}

impl ApiErrorRecord {
    pub fn decoded(&self) -> ApiError {
        ApiError::decode(&self.error)
    }
}

impl Record for ApiErrorRecord {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_message() {
        let err = ApiError::decode("Invalid credentials");
        assert_eq!(err.message, "Invalid credentials");
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_decode_plain_message_is_trimmed() {
        let err = ApiError::decode("  Invalid credentials \n");
        assert_eq!(err.message, "Invalid credentials");
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_decode_encoded_string_code() {
        let err = ApiError::decode(r#"{"message":"IP already listed","code":"ip_01"}"#);
        assert_eq!(err, ApiError::with_code("IP already listed", "ip_01"));
    }

    #[test]
    fn test_decode_numeric_code() {
        let err = ApiError::decode(r#" {"message":"Too many requests","code":429} "#);
        assert_eq!(err.code.as_deref(), Some("429"));
        assert_eq!(err.to_string(), "Too many requests");
    }

    #[test]
    fn test_decode_malformed_object_is_message() {
        let raw = r#"{"msg":"nope"}"#;
        let err = ApiError::decode(raw);
        assert_eq!(err.message, raw);
        assert_eq!(err.code, None);
    }

    #[test]
    fn test_record_decodes_its_error() {
        let record = ApiErrorRecord {
            id: 7,
            origin: "position.increase".into(),
            error: r#"{"message":"Balance too low","code":"pos_12"}"#.into(),
            uid: None,
            created_at: 0,
        };
        assert_eq!(record.decoded().code.as_deref(), Some("pos_12"));
        assert_eq!(record.key(), 7);
    }
}
