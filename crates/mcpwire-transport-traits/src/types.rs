//! Core transport types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumerates the transports this workspace provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// A spawned child process, newline-delimited JSON over its pipes.
    Stdio,
    /// Streamable HTTP: POST/GET with JSON or Server-Sent Events responses.
    Http,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Lifecycle of a transport instance: `Unstarted -> Started -> Closed`.
///
/// `Closed` is terminal; a closed transport cannot be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransportState {
    /// Constructed, `start` not yet called.
    #[default]
    Unstarted,
    /// `start` succeeded; messages may be sent.
    Started,
    /// `close` was called.
    Closed,
}

impl TransportState {
    /// Checks that a message may be sent in this state.
    pub fn ensure_sendable(self) -> crate::TransportResult<()> {
        match self {
            Self::Started => Ok(()),
            Self::Unstarted => Err(crate::TransportError::NotStarted),
            Self::Closed => Err(crate::TransportError::Closed),
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Started => write!(f, "started"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
