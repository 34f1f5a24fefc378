//! Transport configuration types shared by the concrete transports.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size ceilings applied to inbound data.
///
/// Every ceiling is enforced by aborting the current response with a
/// distinct error; nothing is truncated silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a single `application/json` response body.
    pub max_response_bytes: usize,

    /// Maximum accumulated `data:` size of one Server-Sent Event.
    pub max_sse_event_bytes: usize,

    /// Maximum unconsumed bytes held by the event-stream parser.
    pub max_sse_buffer_bytes: usize,

    /// Maximum length of one line read from a child process.
    pub max_line_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_response_bytes: 10 * 1024 * 1024,   // 10MB
            max_sse_event_bytes: 4 * 1024 * 1024,   // 4MB
            max_sse_buffer_bytes: 8 * 1024 * 1024,  // 8MB
            max_line_bytes: 10 * 1024 * 1024,       // 10MB
        }
    }
}

/// Network timeouts for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect: Duration,

    /// Total timeout for a non-streaming request.
    /// `None` = no timeout
    pub request: Option<Duration>,

    /// Maximum gap between two chunks of a streaming response.
    /// `None` = no timeout
    pub read: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            request: Some(Duration::from_secs(60)),
            read: Some(Duration::from_secs(300)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_config_default() {
        let config = LimitsConfig::default();
        assert_eq!(config.max_response_bytes, 10 * 1024 * 1024);
        assert!(config.max_sse_buffer_bytes >= config.max_sse_event_bytes);
    }

    #[test]
    fn test_timeout_config_default() {
        let config = TimeoutConfig::default();
        assert_eq!(config.connect, Duration::from_secs(30));
        assert_eq!(config.request, Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: LimitsConfig =
            serde_json::from_str(r#"{"max_response_bytes": 2048}"#).unwrap();
        assert_eq!(config.max_response_bytes, 2048);
        assert_eq!(config.max_sse_event_bytes, LimitsConfig::default().max_sse_event_bytes);
    }
}
