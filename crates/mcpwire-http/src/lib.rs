//! # mcpwire HTTP Transport
//!
//! Streamable HTTP client transport for MCP: every message is POSTed to one
//! endpoint, and each request's answer comes back as JSON or as a
//! Server-Sent Events stream.
//!
//! ## Features
//!
//! - **Single Endpoint Design**: requests, notifications and responses all POST to the configured URL
//! - **Ordered Dispatch**: one worker sends queued messages in submission order
//! - **Session Management**: `Mcp-Session-Id` captured from `initialize` and sent on every later request
//! - **Protocol Version Header**: `MCP-Protocol-Version` required after `initialize`
//! - **Last-Event-ID Resumability**: streams that end before the response are resumed with a GET
//! - **Size Limits**: response bodies and SSE events are capped
//! - **Synthetic Errors**: every accepted request gets exactly one response, real or synthesized
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mcpwire_http::{StreamableHttpConfig, StreamableHttpTransport};
//! use mcpwire_transport_traits::{ChannelHandler, Transport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (handler, mut inbound) = ChannelHandler::new();
//!     let transport = StreamableHttpTransport::with_handler(
//!         StreamableHttpConfig::new("http://localhost:8080/mcp"),
//!         Arc::new(handler),
//!     )?;
//!     transport.start().await?;
//!     // send initialize, read the result from `inbound`, then
//!     transport.set_protocol_version("2025-06-18")?;
//!     transport.close(Duration::from_secs(2)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Flow
//!
//! 1. `initialize` is POSTed without session headers; the server may return `Mcp-Session-Id`
//! 2. The caller sets the negotiated protocol version
//! 3. Later POSTs carry `Mcp-Session-Id` and `MCP-Protocol-Version`
//! 4. A 404 on a request that carried a session means the session expired
//! 5. `close` terminates the session with DELETE

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

mod config;
pub mod sse;
mod transport;

pub use config::{
    BearerToken, DEFAULT_MAX_SSE_RECONNECTS, DEFAULT_RECONNECT_BACKOFF, HeaderProvider,
    SharedHeaderProvider, StreamableHttpConfig,
};
pub use transport::StreamableHttpTransport;

// Re-export common types for convenience
pub use mcpwire_transport_traits::{
    LimitsConfig, Message, TimeoutConfig, Transport, TransportError, TransportMetrics,
    TransportResult, TransportState, TransportType,
};
