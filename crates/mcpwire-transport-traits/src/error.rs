//! Transport error types.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::message::RequestId;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Wire codes placed in `error.code` of synthesized JSON-RPC error responses.
pub mod codes {
    /// Generic transport failure (I/O, connect, timeout, internal).
    pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
    /// Non-success HTTP status.
    pub const HTTP_ERROR: &str = "HTTP_ERROR";
    /// A JSON response body exceeded the configured ceiling.
    pub const HTTP_BODY_TOO_LARGE: &str = "HTTP_BODY_TOO_LARGE";
    /// An SSE event or the SSE buffer exceeded the configured ceiling.
    pub const SSE_EVENT_DATA_TOO_LARGE: &str = "SSE_EVENT_DATA_TOO_LARGE";
    /// An SSE event carried data that is not a JSON object.
    pub const INVALID_SSE_EVENT_DATA: &str = "INVALID_SSE_EVENT_DATA";
    /// The SSE stream could not be resumed within the reconnect budget.
    pub const SSE_RECONNECTS_EXCEEDED: &str = "SSE_RECONNECTS_EXCEEDED";
    /// The server no longer knows the session id we sent.
    pub const MCP_SESSION_NOT_FOUND: &str = "MCP_SESSION_NOT_FOUND";
    /// The response could not be interpreted as a JSON-RPC message.
    pub const INVALID_RESPONSE: &str = "INVALID_RESPONSE";
}

/// Represents errors that can occur during transport operations.
///
/// The first group of variants are caller-usage errors and are returned
/// synchronously. The second group describes peer or network failures; for a
/// tracked request these are turned into a synthetic JSON-RPC error response
/// with [`synthetic_error_response`].
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// `send_message` was called before `start`.
    #[error("Transport not started")]
    NotStarted,

    /// The transport has been closed.
    #[error("Transport closed")]
    Closed,

    /// An argument supplied by the caller was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The outbound message cannot be framed for this transport.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A request with this id is already in flight.
    #[error("Request id {0} is already in flight")]
    DuplicateRequestId(RequestId),

    /// A non-initialize message was sent before the protocol version was negotiated.
    #[error("Protocol version not set; call set_protocol_version after initialize")]
    ProtocolVersionMissing,

    /// The operation is not implemented by this transport.
    #[error("Operation not supported by this transport: {0}")]
    Unsupported(&'static str),

    /// The child process could not be spawned.
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The operation did not complete within the configured timeout.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The request was cancelled before it completed.
    #[error("Request cancelled")]
    Cancelled,

    /// The server answered with a non-success status.
    #[error("HTTP error: status {status}")]
    Http {
        /// The HTTP status code.
        status: u16,
    },

    /// The server rejected the session id.
    #[error("MCP session not found: {0}")]
    SessionNotFound(String),

    /// The response body exceeded the configured ceiling.
    #[error("Response body ({size} bytes so far) exceeds maximum allowed ({max} bytes)")]
    BodyTooLarge {
        /// Bytes received before the ceiling was hit.
        size: usize,
        /// The configured ceiling in bytes.
        max: usize,
    },

    /// An SSE event, or the unconsumed SSE buffer, exceeded its ceiling.
    #[error("SSE data too large: {0}")]
    SseEventTooLarge(String),

    /// An SSE event did not decode to a JSON-RPC object.
    #[error("Invalid SSE event data: {0}")]
    InvalidSseEventData(String),

    /// The SSE stream could not be resumed.
    #[error("SSE reconnect attempts exceeded ({0})")]
    SseReconnectsExceeded(u32),

    /// The response was not a JSON-RPC message.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Returns the wire code used when this error is reported as a JSON-RPC error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http { .. } => codes::HTTP_ERROR,
            Self::SessionNotFound(_) => codes::MCP_SESSION_NOT_FOUND,
            Self::BodyTooLarge { .. } => codes::HTTP_BODY_TOO_LARGE,
            Self::SseEventTooLarge(_) => codes::SSE_EVENT_DATA_TOO_LARGE,
            Self::InvalidSseEventData(_) => codes::INVALID_SSE_EVENT_DATA,
            Self::SseReconnectsExceeded(_) => codes::SSE_RECONNECTS_EXCEEDED,
            Self::InvalidResponse(_) => codes::INVALID_RESPONSE,
            _ => codes::TRANSPORT_ERROR,
        }
    }

    /// Returns `true` for errors caused by how the transport was called.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotStarted
                | Self::Closed
                | Self::InvalidArgument(_)
                | Self::InvalidMessage(_)
                | Self::DuplicateRequestId(_)
                | Self::ProtocolVersionMissing
                | Self::Unsupported(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

/// Builds the JSON-RPC error response delivered in place of a real answer for `id`.
pub fn synthetic_error_response(id: &RequestId, err: &TransportError) -> Map<String, Value> {
    let mut error = Map::new();
    error.insert("code".to_string(), Value::from(err.error_code()));
    error.insert("message".to_string(), Value::from(err.to_string()));
    if let TransportError::Http { status } = err {
        error.insert("data".to_string(), json!({ "status": status }));
    }

    let mut response = Map::new();
    response.insert("jsonrpc".to_string(), Value::from("2.0"));
    response.insert("id".to_string(), id.to_value());
    response.insert("error".to_string(), Value::Object(error));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransportError::Http { status: 500 }.error_code(), "HTTP_ERROR");
        assert_eq!(
            TransportError::SessionNotFound("abc".into()).error_code(),
            "MCP_SESSION_NOT_FOUND"
        );
        assert_eq!(
            TransportError::BodyTooLarge { size: 10, max: 5 }.error_code(),
            "HTTP_BODY_TOO_LARGE"
        );
        assert_eq!(
            TransportError::SseReconnectsExceeded(3).error_code(),
            "SSE_RECONNECTS_EXCEEDED"
        );
        assert_eq!(
            TransportError::Io("broken pipe".into()).error_code(),
            "TRANSPORT_ERROR"
        );
    }

    #[test]
    fn test_usage_errors() {
        assert!(TransportError::NotStarted.is_usage_error());
        assert!(TransportError::DuplicateRequestId(RequestId::from(1)).is_usage_error());
        assert!(!TransportError::Http { status: 404 }.is_usage_error());
    }

    #[test]
    fn test_synthetic_error_response() {
        let response =
            synthetic_error_response(&RequestId::from("req-7"), &TransportError::Http { status: 502 });
        assert_eq!(
            Value::Object(response),
            json!({
                "jsonrpc": "2.0",
                "id": "req-7",
                "error": {
                    "code": "HTTP_ERROR",
                    "message": "HTTP error: status 502",
                    "data": { "status": 502 }
                }
            })
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        assert!(matches!(TransportError::from(io_err), TransportError::Io(_)));
    }
}
