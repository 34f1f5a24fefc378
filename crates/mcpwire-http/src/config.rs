//! Streamable HTTP client configuration.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mcpwire_transport_traits::{LimitsConfig, TimeoutConfig, TransportResult};
use serde::{Deserialize, Serialize};

/// Default SSE resume schedule. The last entry repeats.
pub const DEFAULT_RECONNECT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Default number of SSE resume attempts per request.
pub const DEFAULT_MAX_SSE_RECONNECTS: u32 = 3;

/// Streamable HTTP client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamableHttpConfig {
    /// MCP endpoint URL (e.g., <https://api.example.com/mcp>)
    pub url: String,

    /// Static headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Network timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Size limits for responses and SSE events
    #[serde(default)]
    pub limits: LimitsConfig,

    /// SSE resume attempts allowed per request
    #[serde(default = "default_max_sse_reconnects")]
    pub max_sse_reconnects: u32,

    /// Delay before each resume attempt when the server sent no `retry:`.
    /// Attempts past the end reuse the last value.
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: Vec<Duration>,

    /// User agent string (set to None to disable User-Agent header)
    #[serde(default = "default_user_agent")]
    pub user_agent: Option<String>,
}

fn default_max_sse_reconnects() -> u32 {
    DEFAULT_MAX_SSE_RECONNECTS
}

fn default_reconnect_backoff() -> Vec<Duration> {
    DEFAULT_RECONNECT_BACKOFF.to_vec()
}

fn default_user_agent() -> Option<String> {
    Some(format!("mcpwire/{}", env!("CARGO_PKG_VERSION")))
}

impl StreamableHttpConfig {
    /// Creates a configuration for `url` with default timeouts and limits.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            max_sse_reconnects: DEFAULT_MAX_SSE_RECONNECTS,
            reconnect_backoff: default_reconnect_backoff(),
            user_agent: default_user_agent(),
        }
    }

    /// Adds a static header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replaces the size limits.
    #[must_use]
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the SSE resume budget.
    #[must_use]
    pub fn with_max_sse_reconnects(mut self, attempts: u32) -> Self {
        self.max_sse_reconnects = attempts;
        self
    }

    /// Replaces the resume backoff schedule.
    #[must_use]
    pub fn with_reconnect_backoff(mut self, schedule: Vec<Duration>) -> Self {
        self.reconnect_backoff = schedule;
        self
    }

    /// Sets or clears the User-Agent header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Delay before resume attempt `attempt` (1-based), absent a server hint.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let index = usize::try_from(attempt.saturating_sub(1)).unwrap_or(usize::MAX);
        self.reconnect_backoff
            .get(index)
            .or_else(|| self.reconnect_backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Supplies headers computed at request time, such as short-lived bearer tokens.
///
/// Resolved headers are applied over the static ones. A failure aborts the
/// request it was resolved for.
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Returns the headers for the next request.
    async fn resolve(&self) -> TransportResult<HashMap<String, String>>;
}

/// Shared handle to a header provider.
pub type SharedHeaderProvider = std::sync::Arc<dyn HeaderProvider>;

/// A provider that returns a fixed bearer token.
#[derive(Clone)]
pub struct BearerToken(String);

impl BearerToken {
    /// Creates a provider for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[async_trait]
impl HeaderProvider for BearerToken {
    async fn resolve(&self) -> TransportResult<HashMap<String, String>> {
        Ok(HashMap::from([(
            "Authorization".to_string(),
            format!("Bearer {}", self.0),
        )]))
    }
}
