//! Error types for binary serialization.

use thiserror::Error;

/// Errors produced while encoding or decoding binary data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The reader ran out of bytes before the requested amount was consumed.
    #[error("end of stream: needed {needed} more byte(s) at position {position}")]
    EndOfStream { needed: usize, position: usize },

    /// A variable-length quantity exceeded the bound supplied by the caller.
    #[error("overflow: value {value} exceeds maximum {max}")]
    Overflow { value: u64, max: u64 },

    /// The bytes were well-framed but their content is not a valid encoding.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A structured payload violated its declared format.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Serializing a value graph that references itself.
    #[error("circular reference detected during serialization")]
    CircularReference,
}

impl IoError {
    /// Shorthand for an [`IoError::InvalidData`] with a formatted message.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        IoError::InvalidData(msg.into())
    }

    /// Shorthand for an [`IoError::InvalidFormat`] with a formatted message.
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        IoError::InvalidFormat(msg.into())
    }
}

/// Result alias used throughout this crate.
pub type IoResult<T> = std::result::Result<T, IoError>;
