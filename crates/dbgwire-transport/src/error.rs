//! Transport error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur in the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO error outside a transfer (socket options, addresses).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Host name did not resolve.
    #[error("failed to resolve {target}: {source}")]
    Resolve {
        target: String,
        #[source]
        source: io::Error,
    },

    /// No address of the target accepted the connection.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// No active peer.
    #[error("not connected")]
    NotConnected,

    /// A transfer failed and the peer was dropped.
    #[error("peer lost during {operation}: {source}")]
    Disconnected {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Buffer exceeds the 30-bit length of the command header.
    #[error("payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: u32 },

    /// Outgoing buffer is not finalized (its prefix disagrees with its size).
    #[error("invalid buffer: {reason}")]
    InvalidBuffer { reason: String },

    /// Incoming header announced a payload shorter than its own prefix.
    #[error("invalid command header: payload length {len}")]
    InvalidCommand { len: u32 },
}

impl TransportError {
    /// Creates an invalid buffer error.
    pub fn invalid_buffer(reason: impl Into<String>) -> Self {
        Self::InvalidBuffer {
            reason: reason.into(),
        }
    }

    /// True if this error left the connection without a peer.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. }
                | Self::NotConnected
                | Self::InvalidCommand { .. }
                | Self::PayloadTooLarge { .. }
        )
    }
}
