//! # mcpwire STDIO Transport
//!
//! Process-pipe transport for MCP clients: spawns the server as a child
//! process and speaks newline-delimited JSON over its standard streams.
//!
//! ## Framing
//!
//! - **Newline-delimited JSON**: one compact JSON document per line, written with `LinesCodec`
//! - **No embedded newlines**: messages whose serialization contains `\n` or `\r` are rejected
//! - **UTF-8 only**: invalid lines from the child are reported, not delivered
//! - **stderr is diagnostics**: every child stderr line goes to `on_stderr_line`
//!
//! ## Shutdown
//!
//! `close(timeout)` closes stdin, then waits for the child, escalating to
//! SIGTERM and finally SIGKILL, each stage bounded by `timeout`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mcpwire_stdio::{StdioConfig, StdioTransport};
//! use mcpwire_transport_traits::{ChannelHandler, Transport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (handler, mut inbound) = ChannelHandler::new();
//!     let transport = StdioTransport::with_handler(
//!         StdioConfig::new("npx").with_args(["-y", "@modelcontextprotocol/server-everything"]),
//!         Arc::new(handler),
//!     );
//!     transport.start().await?;
//!     // send_message(...) and read from `inbound`
//!     transport.close(Duration::from_secs(2)).await;
//!     Ok(())
//! }
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

mod config;
mod process;
mod reader;
mod transport;

pub use config::StdioConfig;
pub use transport::{StdioTransport, encode_line};

// Re-export common types for convenience
pub use mcpwire_transport_traits::{
    Message, Transport, TransportError, TransportMetrics, TransportResult, TransportState,
    TransportType,
};
