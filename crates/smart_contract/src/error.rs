//! Error types for contract execution.

use thiserror::Error;

/// Failures raised outside the VM fault path: building engines, resolving
/// contracts, native-contract bookkeeping.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract is deployed at the given hash.
    #[error("contract not found: {0}")]
    ContractNotFound(String),

    /// A native-contract invariant was violated.
    #[error("native contract failure: {0}")]
    NativeFailure(String),

    /// An account's balance cannot cover a debit.
    #[error("insufficient balance: needed {needed}, have {available}")]
    InsufficientBalance { needed: i64, available: i64 },

    /// Forwarded VM fault.
    #[error(transparent)]
    Vm(#[from] oxneo_vm::VmError),

    /// Forwarded serialization failure.
    #[error(transparent)]
    Io(#[from] oxneo_io::IoError),

    /// Forwarded core payload failure.
    #[error(transparent)]
    Core(#[from] oxneo_core::CoreError),
}

/// Result alias used throughout this crate.
pub type ContractResult<T> = std::result::Result<T, ContractError>;
