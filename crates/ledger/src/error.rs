//! Error types for the ledger.

use crate::verify_result::VerifyResult;
use thiserror::Error;

/// Why a block was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidBlockReason {
    /// The block (or its height) is already persisted.
    Duplicate,
    /// The header does not extend the current tip.
    HeaderMismatch(String),
    /// The body violates a structural rule.
    BadBody(String),
    /// The quorum witness failed verification.
    WitnessFailure(String),
}

/// Ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Block rejected before any state was touched.
    #[error("invalid block: {0:?}")]
    InvalidBlock(InvalidBlockReason),

    /// Transaction rejected by verification.
    #[error("invalid transaction: {0:?}")]
    InvalidTransaction(VerifyResult),

    /// A serialized payload violated its format.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A required entity is not in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Forwarded serialization failure.
    #[error(transparent)]
    Io(#[from] oxneo_io::IoError),

    /// Forwarded core payload failure.
    #[error(transparent)]
    Core(#[from] oxneo_core::CoreError),

    /// Forwarded storage failure; fatal to the pipeline.
    #[error(transparent)]
    Storage(#[from] oxneo_persistence::StorageError),

    /// Forwarded contract execution failure.
    #[error(transparent)]
    Contract(#[from] oxneo_smart_contract::ContractError),
}

/// Result alias used throughout this crate.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
