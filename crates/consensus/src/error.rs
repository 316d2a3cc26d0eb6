//! Error types for the consensus engine.

use thiserror::Error;

/// Consensus failures. Message-level errors drop the offending payload;
/// the state machine itself never aborts.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A payload failed structural or signature validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A payload arrived for a height or view this context is past.
    #[error("stale payload: height {height}, view {view}")]
    StalePayload { height: u32, view: u8 },

    /// This node is not a validator for the current set.
    #[error("node is not a validator")]
    NotValidator,

    /// The validator wallet is missing or unusable.
    #[error("signing failure: {0}")]
    SigningFailure(String),

    /// Forwarded serialization failure.
    #[error(transparent)]
    Io(#[from] oxneo_io::IoError),

    /// Forwarded core payload failure.
    #[error(transparent)]
    Core(#[from] oxneo_core::CoreError),

    /// Forwarded ledger failure.
    #[error(transparent)]
    Ledger(#[from] oxneo_ledger::LedgerError),

    /// Forwarded contract failure (validator set resolution).
    #[error(transparent)]
    Contract(#[from] oxneo_smart_contract::ContractError),
}

/// Result alias used throughout this crate.
pub type ConsensusResult<T> = std::result::Result<T, ConsensusError>;
