//! Per-request cancellation state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Advisory cancellation for one in-flight request.
///
/// Shared between the in-flight table and the worker processing the request.
/// Cancelling does not interrupt work by itself; the worker checks the token
/// (or races it) at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct RequestToken {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl RequestToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is also cancelled whenever `parent` is.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::default(),
        }
    }

    /// Marks the request cancelled. The first reason recorded wins.
    pub fn cancel(&self, reason: Option<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() && !self.token.is_cancelled() {
                *slot = reason;
            }
        }
        self.token.cancel();
    }

    /// Returns `true` once the request was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason given to [`cancel`](Self::cancel), if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Returns `true` if both handles belong to the same request.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.reason, &other.reason)
    }

    /// Resolves when the request is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}
