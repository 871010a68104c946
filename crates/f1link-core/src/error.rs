// ── Core error types ──
//
// Three tiers, matching how each failure reaches the consumer:
// `CoreError` is returned synchronously from API calls, `ConnectionError`
// is published through the observable `last_error` field, and `DecodeError`
// never leaves the controller (it is counted and logged).

use thiserror::Error;

use crate::transport::TransportError;

/// Errors returned synchronously from client construction and `connect()`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Construction errors ──────────────────────────────────────────
    #[error("Invalid server identity: {field} {reason}")]
    InvalidIdentity { field: &'static str, reason: String },

    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Cannot connect while a disconnect is in progress")]
    Disconnecting,

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// A transport-level failure, observed through the client's `last_error` field.
///
/// These never surface as `Err` from an API call; the caller sees the state
/// fall back to `NotConnected` and decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Cannot connect to {endpoint}: {reason}")]
    Refused { endpoint: String, reason: String },

    #[error("Connection dropped: {reason}")]
    Dropped { reason: String },

    #[error("Subscription to {topic} failed: {reason}")]
    SubscribeFailed { topic: String, reason: String },
}

impl ConnectionError {
    pub(crate) fn refused(endpoint: &url::Url, err: &TransportError) -> Self {
        Self::Refused {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

/// A topic update that could not be applied to the telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Unknown topic: {path}")]
    UnknownTopic { path: String },

    #[error("Payload for {topic} is not valid UTF-8")]
    NotUtf8 { topic: &'static str },

    #[error("Malformed payload for {topic}: {reason}")]
    Malformed { topic: &'static str, reason: String },

    #[error("Value {value} for {topic} is outside [{min}, {max}]")]
    OutOfRange {
        topic: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Button state count {got} does not match {expected} known button names")]
    ButtonCountMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_error_message() {
        let err = CoreError::InvalidIdentity {
            field: "root_topic_path",
            reason: "must not be empty".into(),
        };
        insta::assert_snapshot!(err.to_string(), @"Invalid server identity: root_topic_path must not be empty");
    }

    #[test]
    fn out_of_range_message() {
        let err = DecodeError::OutOfRange {
            topic: "Steering",
            value: 1.5,
            min: -1.0,
            max: 1.0,
        };
        insta::assert_snapshot!(err.to_string(), @"Value 1.5 for Steering is outside [-1, 1]");
    }
}
