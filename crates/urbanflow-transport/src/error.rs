//! Error types for the streaming transport.

use std::time::Duration;

/// Errors surfaced by connectors, connections, and the [`crate::Transport`].
///
/// Connection-level variants never escape the reconnect loop on their
/// own; they are logged, counted against the attempt cap, and retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The endpoint URL is unusable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Opening the connection failed (refused, DNS, handshake).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Opening the connection did not finish in time.
    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),

    /// An open connection failed while reading or writing.
    #[error("connection error: {0}")]
    Io(String),

    /// No connection is open; outbound frames are dropped.
    #[error("not connected")]
    NotConnected,

    /// `disconnect()` was called while a connect was in progress.
    #[error("disconnected by client")]
    Disconnected,

    /// The reconnect cap was reached.
    #[error("gave up after {attempts} reconnection attempts")]
    Exhausted {
        /// Reconnect attempts made after the last successful open.
        attempts: u32,
    },
}

impl From<url::ParseError> for TransportError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidEndpoint(e.to_string())
    }
}
