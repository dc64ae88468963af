use std::net::SocketAddr;
use std::time::Duration;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to resolve the peer address.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream contains an invalid message magic number.
    #[error("invalid message magic (expected 0x4953 \"IS\")")]
    InvalidMagic,

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The peer went away in the middle of a message.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// No peer became ready within the wait bound.
    #[error("peer not ready after {waited:?}")]
    Timeout { waited: Duration },

    /// A sent message was never acknowledged.
    #[error("no confirmation detected even after {waited:?}, communication is broken")]
    AckTimeout { waited: Duration },

    /// The peer answered with something other than an acknowledgment.
    #[error("wrong confirmation detected ({received} bytes), communication is broken")]
    BrokenAck { received: usize },

    /// The session has been closed.
    #[error("session closed")]
    Closed,
}

impl TransportError {
    /// Whether this error is a bounded-wait expiry rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

impl From<TransportError> for std::io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(io) => io,
            other => std::io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
