//! # mcpwire
//!
//! Client-side transports for the Model Context Protocol. Both transports
//! implement [`Transport`], so callers pick one at runtime from a
//! [`ServerConfig`] and drive it through the same interface.
//!
//! ## Transports
//!
//! - **stdio** (feature `stdio`): spawns the server and exchanges newline-delimited JSON
//! - **http** (feature `http`): Streamable HTTP with JSON or SSE responses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcpwire::{ChannelHandler, ServerConfig, build_transport};
//!
//! let config = ServerConfig::from_json(r#"{"type": "stdio", "command": "my-server"}"#)?;
//! let transport = build_transport(config)?;
//! let (handler, mut inbound) = ChannelHandler::new();
//! transport.set_handler(Arc::new(handler));
//! transport.start().await?;
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

#[cfg(not(any(feature = "stdio", feature = "http")))]
compile_error!("enable at least one of the `stdio` or `http` features");

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use mcpwire_transport_traits::{
    ChannelHandler, InboundEvent, InboundHandler, LimitsConfig, Message, MessageKind, NoopHandler,
    RequestId, SharedHandler, TimeoutConfig, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType, codes,
};

#[cfg(feature = "stdio")]
#[cfg_attr(docsrs, doc(cfg(feature = "stdio")))]
pub use mcpwire_stdio::{StdioConfig, StdioTransport};

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use mcpwire_http::{
    BearerToken, HeaderProvider, SharedHeaderProvider, StreamableHttpConfig,
    StreamableHttpTransport, sse,
};

/// How to reach an MCP server.
///
/// Serialized with a `type` tag:
///
/// ```json
/// { "type": "stdio", "command": "npx", "args": ["-y", "server-everything"] }
/// { "type": "http", "url": "https://example.com/mcp" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
#[non_exhaustive]
pub enum ServerConfig {
    /// Spawn the server as a child process.
    #[cfg(feature = "stdio")]
    Stdio(StdioConfig),
    /// Connect to a Streamable HTTP endpoint.
    #[cfg(feature = "http")]
    Http(StreamableHttpConfig),
}

impl ServerConfig {
    /// Parses a configuration document.
    pub fn from_json(json: &str) -> TransportResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TransportError::InvalidArgument(format!("invalid server config: {e}")))
    }

    /// The kind of transport this configuration builds.
    pub fn transport_type(&self) -> TransportType {
        match self {
            #[cfg(feature = "stdio")]
            Self::Stdio(_) => TransportType::Stdio,
            #[cfg(feature = "http")]
            Self::Http(_) => TransportType::Http,
        }
    }
}

/// Builds an unstarted transport for `config`.
pub fn build_transport(config: ServerConfig) -> TransportResult<Box<dyn Transport>> {
    debug!(transport = %config.transport_type(), "Building transport");
    match config {
        #[cfg(feature = "stdio")]
        ServerConfig::Stdio(config) => Ok(Box::new(StdioTransport::new(config))),
        #[cfg(feature = "http")]
        ServerConfig::Http(config) => Ok(Box::new(StreamableHttpTransport::new(config)?)),
    }
}
