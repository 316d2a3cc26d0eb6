//! Error types for the storage layer.

use thiserror::Error;

/// Storage failures. I/O errors here are fatal to the current pipeline;
/// logical errors reject the single operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Adding a key that already exists.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// A lookup required the key to be present.
    #[error("key not found")]
    NotFound,

    /// The backing store failed; the node must shut down cleanly.
    #[error("store I/O failure: {0}")]
    IoFailure(String),

    /// A stored value failed to decode.
    #[error(transparent)]
    InvalidFormat(#[from] oxneo_io::IoError),
}

/// Result alias used throughout this crate.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
