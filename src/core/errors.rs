// src/core/errors.rs

//! Defines the primary error type for the entire application.

use thiserror::Error;
use uuid::Uuid;

/// The main error enum, representing all possible failures within the hub.
///
/// Every error falls into one of three retry classes: permanent (the client
/// must not retry with the same configuration), temporary (the client may
/// retry later), or not-found (expected absence, not a fault). The connection
/// manager uses the class to pick between a soft and a hard deny.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("unexpected {0} packet during handshake")]
    UnexpectedPacket(String),

    #[error("unsupported protocol version {client}.x, server speaks {supported}.x")]
    UnsupportedVersion { client: u64, supported: u64 },

    #[error("malformed message body: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("device {0} is banned")]
    Banned(Uuid),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("temporary failure: {0}")]
    Temporary(String),

    #[error("{0} deadline exceeded")]
    DeadlineExceeded(&'static str),
}

impl FleetError {
    /// Protocol, version, framing and identity-persistence violations are
    /// never retried; the connection is always closed with a hard deny.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            FleetError::CorruptFrame(_)
                | FleetError::UnexpectedPacket(_)
                | FleetError::UnsupportedVersion { .. }
                | FleetError::Decode(_)
                | FleetError::Banned(_)
                | FleetError::Registry(_)
        )
    }

    /// Transient I/O, capacity and deadline failures; the client may retry.
    pub fn is_temporary(&self) -> bool {
        matches!(
            self,
            FleetError::Io(_) | FleetError::Temporary(_) | FleetError::DeadlineExceeded(_)
        )
    }

    /// Expected absence of a record, handled by the caller.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FleetError::NotFound(_))
    }
}
