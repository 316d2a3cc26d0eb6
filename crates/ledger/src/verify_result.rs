//! Transaction verification outcomes.

/// Result of admitting a transaction to the pool or a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// Accepted.
    Succeed,
    /// Already persisted in a block.
    AlreadyExists,
    /// Already in the memory pool.
    AlreadyInPool,
    /// Pool is full and the fee does not displace anything.
    OutOfMemory,
    /// Structural (state-independent) rule violated.
    Invalid,
    /// Outside its validity window.
    Expired,
    /// Sender cannot cover the declared fees.
    InsufficientFunds,
    /// Rejected by policy (blocked account, fee floor).
    PolicyFail,
    /// A witness failed to verify.
    WitnessFailure,
    /// Lost a conflict against a pooled transaction.
    Conflict,
}

impl VerifyResult {
    /// Whether the transaction was accepted.
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyResult::Succeed)
    }
}
