//! Transport metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a transport's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Total number of bytes written to the peer.
    pub bytes_sent: u64,

    /// Total number of bytes read from the peer.
    pub bytes_received: u64,

    /// Total number of messages written to the peer.
    pub messages_sent: u64,

    /// Total number of messages delivered to the inbound handler.
    pub messages_received: u64,

    /// Synthetic error responses produced by the transport itself.
    pub synthesized_errors: u64,

    /// SSE resume attempts (HTTP only).
    pub sse_reconnects: u64,
}

/// Lock-free counters updated from the transport's background tasks.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes sent (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total messages sent (atomic counter).
    pub messages_sent: AtomicU64,

    /// Total messages received (atomic counter).
    pub messages_received: AtomicU64,

    /// Synthetic error responses (atomic counter).
    pub synthesized_errors: AtomicU64,

    /// SSE reconnect attempts (atomic counter).
    pub sse_reconnects: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outbound message of `size` bytes.
    pub fn record_sent(&self, size: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Records one inbound message of `size` bytes.
    pub fn record_received(&self, size: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Creates a serializable snapshot from the current values.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            synthesized_errors: self.synthesized_errors.load(Ordering::Relaxed),
            sse_reconnects: self.sse_reconnects.load(Ordering::Relaxed),
        }
    }
}
