//! pushd error types.
//!
//! Mirrors the error kinds named in the error handling design: these are
//! kinds the broker and the session/peer actors use to decide policy
//! (close the session, mark a peer suspect, count and continue), not a
//! generic catch-all.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushdError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol malformed: {0}")]
    ProtocolMalformed(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("not subscribed to {0}")]
    NotSubscribed(String),

    #[error("no peer reachable for {0}")]
    PeerUnreachable(String),

    #[error("backpressure drop on session {0}")]
    BackpressureDrop(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("handshake timeout after {0:?}")]
    HandshakeTimeout(std::time::Duration),

    #[error("session closed")]
    SessionClosed,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PushdError>;

impl PushdError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolMalformed(msg.into())
    }

    /// Whether the caller should retry the operation rather than tear down
    /// the connection it came from.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Whether this error means the underlying connection is gone and the
    /// session/peer it belongs to should be scheduled for close.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::SessionClosed | Self::HandshakeTimeout(_) | Self::AuthFailed
        )
    }
}
