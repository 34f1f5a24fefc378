//! # mcpwire Transport Traits
//!
//! Core transport contract and shared types for the mcpwire MCP client
//! transports. The concrete transports live in `mcpwire-stdio` and
//! `mcpwire-http`.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Trait**: [`Transport`]
//! - **Callbacks**: [`InboundHandler`], [`ChannelHandler`], [`HandlerSlot`]
//! - **Messages**: [`Message`], [`RequestId`], [`MessageKind`]
//! - **Errors**: [`TransportError`], [`TransportResult`], [`synthetic_error_response`]
//! - **Config**: [`LimitsConfig`], [`TimeoutConfig`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcpwire_transport_traits::{ChannelHandler, Transport};
//!
//! let (handler, mut inbound) = ChannelHandler::new();
//! transport.set_handler(Arc::new(handler));
//! transport.start().await?;
//! transport.send_message(message).await?;
//! while let Some(event) = inbound.recv().await { /* ... */ }
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
mod error;
mod handler;
mod message;
mod metrics;
mod token;
mod traits;
mod types;

pub use config::{LimitsConfig, TimeoutConfig};
pub use error::{TransportError, TransportResult, codes, synthetic_error_response};
pub use handler::{
    ChannelHandler, HandlerSlot, InboundEvent, InboundHandler, NoopHandler, SharedHandler,
};
pub use message::{Message, MessageKind, RequestId, is_response_to};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use token::RequestToken;
pub use traits::Transport;
pub use types::{TransportState, TransportType};
