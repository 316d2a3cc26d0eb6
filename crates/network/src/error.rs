//! Error types for the network engine.

use thiserror::Error;

/// Network failures. Peer-scoped errors disconnect that peer; the node
/// continues.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A frame violated the wire format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The payload checksum did not match its content.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The peer spoke a different network's magic.
    #[error("wrong network magic: 0x{0:08x}")]
    WrongMagic(u32),

    /// The handshake broke protocol order.
    #[error("handshake failure: {0}")]
    HandshakeFailure(String),

    /// The peer misbehaved badly enough to be dropped.
    #[error("peer misbehavior: {0}")]
    PeerMisbehavior(String),

    /// The connection died.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Forwarded socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Forwarded serialization failure.
    #[error(transparent)]
    Serialization(#[from] oxneo_io::IoError),
}

/// Result alias used throughout this crate.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
