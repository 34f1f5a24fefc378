//! The client transport contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::handler::SharedHandler;
use crate::message::{Message, RequestId};
use crate::metrics::TransportMetrics;
use crate::types::{TransportState, TransportType};

/// A bidirectional channel for JSON-RPC messages between a client and one server.
///
/// Outbound messages go through [`send_message`](Transport::send_message).
/// Everything inbound, including synthetic error responses the transport
/// produces when a request cannot be answered, is delivered to the registered
/// [`InboundHandler`](crate::InboundHandler).
///
/// A transport is single-use: `Unstarted -> Started -> Closed`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Returns the type of this transport.
    fn transport_type(&self) -> TransportType;

    /// Returns the current lifecycle state.
    fn state(&self) -> TransportState;

    /// Registers the inbound handler. May be called at any time; callbacks
    /// issued after the call go to the new handler.
    fn set_handler(&self, handler: SharedHandler);

    /// Prepares the transport to carry messages.
    ///
    /// Calling `start` on a started transport is a no-op; on a closed one it fails.
    async fn start(&self) -> TransportResult<()>;

    /// Transmits one JSON-RPC message.
    ///
    /// Returns once the message has been written or queued. Usage errors are
    /// returned here; peer failures of a request surface later as a
    /// synthetic error response.
    async fn send_message(&self, message: Message) -> TransportResult<()>;

    /// Shuts the transport down, waiting at most roughly `timeout` for
    /// background work to end. Idempotent.
    async fn close(&self, timeout: Duration);

    /// Cancels an in-flight request. Returns `true` if the id was known.
    fn cancel_request(&self, id: &RequestId, reason: Option<String>) -> TransportResult<bool> {
        let _ = (id, reason);
        Err(TransportError::Unsupported("cancel_request"))
    }

    /// Records the protocol version negotiated during initialization.
    fn set_protocol_version(&self, version: &str) -> TransportResult<()> {
        let _ = version;
        Err(TransportError::Unsupported("set_protocol_version"))
    }

    /// The session id assigned by the server, if any.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Returns a snapshot of the transport's counters.
    fn metrics(&self) -> TransportMetrics;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NoopHandler;
    use std::sync::Arc;

    // The trait must stay object safe.
    fn _test_transport_object(_t: &dyn Transport) {}
    fn _test_boxed_transport(_t: Box<dyn Transport>) {}

    #[derive(Debug)]
    struct Minimal;

    #[async_trait]
    impl Transport for Minimal {
        fn transport_type(&self) -> TransportType {
            TransportType::Stdio
        }

        fn state(&self) -> TransportState {
            TransportState::Unstarted
        }

        fn set_handler(&self, _handler: SharedHandler) {}

        async fn start(&self) -> TransportResult<()> {
            Ok(())
        }

        async fn send_message(&self, _message: Message) -> TransportResult<()> {
            Err(TransportError::NotStarted)
        }

        async fn close(&self, _timeout: Duration) {}

        fn metrics(&self) -> TransportMetrics {
            TransportMetrics::default()
        }
    }

    #[test]
    fn test_optional_capabilities_are_unsupported() {
        let transport: Box<dyn Transport> = Box::new(Minimal);
        transport.set_handler(Arc::new(NoopHandler));

        assert!(matches!(
            transport.cancel_request(&RequestId::from(1), None),
            Err(TransportError::Unsupported("cancel_request"))
        ));
        assert!(matches!(
            transport.set_protocol_version("2025-06-18"),
            Err(TransportError::Unsupported("set_protocol_version"))
        ));
        assert_eq!(transport.session_id(), None);
    }
}
