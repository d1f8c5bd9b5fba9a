//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering encoding and decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a message.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a message.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A byte payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),

    /// The response payload did not have the shape the caller expected.
    #[error("unexpected payload: expected {expected}")]
    UnexpectedPayload {
        /// Human-readable name of the expected payload kind.
        expected: &'static str,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<base64::DecodeError> for ProtocolError {
    fn from(err: base64::DecodeError) -> Self {
        ProtocolError::InvalidBase64(err.to_string())
    }
}
