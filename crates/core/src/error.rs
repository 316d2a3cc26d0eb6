//! Error types for core payloads.

use thiserror::Error;

/// Errors raised while constructing or validating core payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A binary encoding violated the payload layout.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A hex or address string could not be parsed.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A transaction failed a structural rule.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Arithmetic on a fixed-point amount overflowed.
    #[error("fixed-point overflow")]
    Overflow,

    /// Forwarded serialization failure.
    #[error(transparent)]
    Io(#[from] oxneo_io::IoError),
}

/// Result alias used throughout this crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
