//! Inbound callbacks.
//!
//! A transport reports everything it receives through an [`InboundHandler`]:
//! serialized JSON-RPC messages on `on_stdout_line`, diagnostics on
//! `on_stderr_line`. Handlers are called from the transport's background
//! tasks and must not block.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Receives inbound traffic from a transport.
pub trait InboundHandler: Send + Sync {
    /// One serialized JSON-RPC message.
    fn on_stdout_line(&self, line: &str);

    /// One line of diagnostic text (child stderr, background faults).
    fn on_stderr_line(&self, line: &str) {
        let _ = line;
    }
}

/// Shared handle to a handler.
pub type SharedHandler = Arc<dyn InboundHandler>;

/// A handler that discards everything. Used until one is registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl InboundHandler for NoopHandler {
    fn on_stdout_line(&self, _line: &str) {}
}

/// Replaceable handler shared between a transport and its background tasks.
#[derive(Clone)]
pub struct HandlerSlot {
    inner: Arc<RwLock<SharedHandler>>,
}

impl HandlerSlot {
    /// Creates a slot holding `handler`.
    pub fn new(handler: SharedHandler) -> Self {
        Self {
            inner: Arc::new(RwLock::new(handler)),
        }
    }

    /// Replaces the handler; later callbacks go to the new one.
    pub fn set(&self, handler: SharedHandler) {
        *self.inner.write() = handler;
    }

    /// The current handler.
    pub fn get(&self) -> SharedHandler {
        Arc::clone(&self.inner.read())
    }
}

impl Default for HandlerSlot {
    fn default() -> Self {
        Self::new(Arc::new(NoopHandler))
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandlerSlot(<dyn InboundHandler>)")
    }
}

impl InboundHandler for HandlerSlot {
    fn on_stdout_line(&self, line: &str) {
        self.get().on_stdout_line(line);
    }

    fn on_stderr_line(&self, line: &str) {
        self.get().on_stderr_line(line);
    }
}

/// An inbound item, as produced by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A serialized JSON-RPC message.
    Message(String),
    /// A diagnostic line.
    Diagnostic(String),
}

impl InboundEvent {
    /// Parses a `Message` into a JSON value; `None` for diagnostics or invalid JSON.
    pub fn as_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Message(line) => serde_json::from_str(line).ok(),
            Self::Diagnostic(_) => None,
        }
    }
}

/// Forwards callbacks into an unbounded channel for async consumers.
#[derive(Clone)]
pub struct ChannelHandler {
    sender: mpsc::UnboundedSender<InboundEvent>,
}

impl ChannelHandler {
    /// Creates a handler and the receiver its events arrive on.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl fmt::Debug for ChannelHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandler")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl InboundHandler for ChannelHandler {
    fn on_stdout_line(&self, line: &str) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.sender.send(InboundEvent::Message(line.to_string()));
    }

    fn on_stderr_line(&self, line: &str) {
        let _ = self.sender.send(InboundEvent::Diagnostic(line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_handler() {
        let (handler, mut receiver) = ChannelHandler::new();

        handler.on_stdout_line(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
        handler.on_stderr_line("server booting");

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.as_json().unwrap()["id"], 1);
        assert_eq!(
            receiver.recv().await.unwrap(),
            InboundEvent::Diagnostic("server booting".to_string())
        );
    }

    #[tokio::test]
    async fn test_handler_slot_swap() {
        let slot = HandlerSlot::default();
        slot.on_stdout_line("dropped by the noop handler");

        let (handler, mut receiver) = ChannelHandler::new();
        slot.set(Arc::new(handler));
        slot.on_stdout_line("{}");

        assert_eq!(
            receiver.recv().await.unwrap(),
            InboundEvent::Message("{}".to_string())
        );
    }

    #[test]
    fn test_channel_handler_after_receiver_dropped() {
        let (handler, receiver) = ChannelHandler::new();
        drop(receiver);
        handler.on_stdout_line("{}");
        handler.on_stderr_line("ignored");
    }
}
