//! Crate-wide error taxonomy.
//!
//! Mirrors the five error categories described by the STOMP client
//! contract: protocol violations, undecodable bytes, transport failures,
//! cancelled waits, and exclusivity conflicts.

use std::io;

/// The single error type returned by every fallible operation in this crate.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StompError {
    /// The broker or caller violated STOMP semantics: unknown command for
    /// the negotiated version, a missing required header, a malformed
    /// heart-beat header, a receipt for an unknown id, or an ack/nack
    /// referencing an inactive transaction.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The parser could not decode the byte stream.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The transport failed to open, closed unexpectedly, or a required
    /// send failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// An awaited event did not arrive within its timeout, or was aborted
    /// by connection loss.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Caller requested an exclusive operation (connect/disconnect) while
    /// one was already in progress.
    #[error("already running: {0}")]
    AlreadyRunning(String),
}

impl StompError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        StompError::Protocol(msg.into())
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        StompError::InvalidFrame(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        StompError::Connection(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        StompError::Cancelled(msg.into())
    }

    pub fn already_running(msg: impl Into<String>) -> Self {
        StompError::AlreadyRunning(msg.into())
    }
}

impl From<io::Error> for StompError {
    fn from(err: io::Error) -> Self {
        StompError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StompError>;
