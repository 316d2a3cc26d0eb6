//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors produced by key handling and signing.
///
/// Verification failures are not errors: `verify_*` functions return `false`
/// for any invalid encoding or mismatched signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A private key was not a valid scalar for the curve.
    #[error("invalid private key")]
    InvalidPrivateKey,

    /// A public key encoding could not be decoded as a curve point.
    #[error("invalid public key encoding")]
    InvalidPublicKey,

    /// Signing failed inside the backend.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// An address string failed Base58Check decoding.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Result alias used throughout this crate.
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
