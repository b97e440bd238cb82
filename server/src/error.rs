//! Error types for the lobby server

use std::io;
use thiserror::Error;

/// Failures that stop the server process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Session coordinator stopped unexpectedly")]
    SessionStopped,
}

/// Why one outbound message did not reach one player.
///
/// Never propagated past the broadcaster; the connection's own disconnect
/// handling is the only recovery.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("outbox full")]
    Full,
}
