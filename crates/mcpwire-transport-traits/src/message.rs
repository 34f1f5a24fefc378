//! JSON-RPC message helpers.
//!
//! Transports treat messages as opaque JSON objects and only look at `id` and
//! `method` for bookkeeping.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{TransportError, TransportResult};

/// An outbound or inbound JSON-RPC document.
pub type Message = Map<String, Value>;

/// The `id` of a JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id, kept exactly as written (integers beyond `i64`, floats).
    Number(Number),
    /// String id.
    String(String),
}

impl RequestId {
    /// Reads an id from a JSON value. `null` and non-scalar shapes are not ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// Converts the id back into the JSON value it was read from.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// How a transport should treat an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Has both `id` and `method`; exactly one response is expected.
    Request {
        /// The request id.
        id: RequestId,
        /// The method name.
        method: String,
    },
    /// Has a `method` but no `id`.
    Notification {
        /// The method name.
        method: String,
    },
    /// Has an `id` but no `method`: our answer to a server-initiated request.
    Response {
        /// The id being answered.
        id: RequestId,
    },
    /// Neither field is usable.
    Unknown,
}

impl MessageKind {
    /// Classifies a message by its `id` and `method` fields.
    ///
    /// An `id` that is present but neither a number nor a string (including
    /// `null`) is a [`TransportError::InvalidMessage`].
    pub fn of(message: &Message) -> TransportResult<Self> {
        let id = match message.get("id") {
            None => None,
            Some(value) => Some(RequestId::from_value(value).ok_or_else(|| {
                TransportError::InvalidMessage(format!(
                    "\"id\" must be a number or a string, got {value}"
                ))
            })?),
        };
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(match (id, method) {
            (Some(id), Some(method)) => Self::Request { id, method },
            (None, Some(method)) => Self::Notification { method },
            (Some(id), None) => Self::Response { id },
            (None, None) => Self::Unknown,
        })
    }

    /// The method name, if any.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method } => Some(method),
            _ => None,
        }
    }
}

/// Returns `true` if `message` answers request `id` (same id and a `result` or `error`).
pub fn is_response_to(message: &Message, id: &RequestId) -> bool {
    let same_id = message
        .get("id")
        .and_then(RequestId::from_value)
        .is_some_and(|candidate| &candidate == id);
    same_id && (message.contains_key("result") || message.contains_key("error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(value: Value) -> Message {
        match value {
            Value::Object(map) => map,
            _ => panic!("test message must be an object"),
        }
    }

    #[test]
    fn test_request_id_from_value() {
        assert_eq!(RequestId::from_value(&json!(42)), Some(RequestId::from(42)));
        assert_eq!(
            RequestId::from_value(&json!("abc")),
            Some(RequestId::String("abc".into()))
        );
        assert_eq!(RequestId::from_value(&json!(null)), None);
        assert_eq!(RequestId::from_value(&json!([1])), None);
        assert_eq!(
            RequestId::from_value(&json!(1.5)).map(|id| id.to_value()),
            Some(json!(1.5))
        );
    }

    #[test]
    fn test_request_id_beyond_i64_is_kept() {
        let message = msg(json!({"jsonrpc": "2.0", "id": u64::MAX, "method": "tools/list"}));
        let kind = MessageKind::of(&message).unwrap();
        assert_eq!(
            kind,
            MessageKind::Request {
                id: RequestId::Number(u64::MAX.into()),
                method: "tools/list".into()
            }
        );

        let id = RequestId::Number(u64::MAX.into());
        assert_eq!(id.to_value(), json!(u64::MAX));
        assert_eq!(id.to_string(), "18446744073709551615");
        assert_ne!(id, RequestId::from(-1));
    }

    #[test]
    fn test_message_kind_rejects_malformed_id() {
        for id in [json!(null), json!(true), json!({"n": 1}), json!([1])] {
            let message = msg(json!({"jsonrpc": "2.0", "id": id, "method": "tools/list"}));
            assert!(matches!(
                MessageKind::of(&message),
                Err(TransportError::InvalidMessage(_))
            ));
        }
    }

    #[test]
    fn test_request_id_serde_untagged() {
        let id: RequestId = serde_json::from_value(json!("x-1")).unwrap();
        assert_eq!(id, RequestId::from("x-1"));
        assert_eq!(serde_json::to_value(RequestId::from(9)).unwrap(), json!(9));
    }

    #[test]
    fn test_message_kind() {
        let request = msg(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
        assert_eq!(
            MessageKind::of(&request).unwrap(),
            MessageKind::Request {
                id: RequestId::from(1),
                method: "tools/list".into()
            }
        );

        let notification = msg(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert_eq!(
            MessageKind::of(&notification).unwrap().method(),
            Some("notifications/initialized")
        );

        let response = msg(json!({"jsonrpc": "2.0", "id": "s-1", "result": {}}));
        assert_eq!(
            MessageKind::of(&response).unwrap(),
            MessageKind::Response {
                id: RequestId::from("s-1")
            }
        );
    }

    #[test]
    fn test_is_response_to() {
        let id = RequestId::from(3);
        assert!(is_response_to(&msg(json!({"id": 3, "result": {}})), &id));
        assert!(is_response_to(&msg(json!({"id": 3, "error": {"code": -1}})), &id));
        assert!(!is_response_to(&msg(json!({"id": 4, "result": {}})), &id));
        assert!(!is_response_to(
            &msg(json!({"method": "notifications/progress"})),
            &id
        ));
        assert!(!is_response_to(&msg(json!({"id": "3", "result": {}})), &id));
    }
}
