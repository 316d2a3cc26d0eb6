//! Error types for the execution engine.

use thiserror::Error;

/// Faults raised during script execution.
///
/// Any of these transitions the engine to the `Fault` state; they never
/// propagate past the engine boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// The byte at the instruction pointer is not a defined opcode.
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// An instruction's operand ran past the end of the script.
    #[error("truncated operand: {0}")]
    TruncatedOperand(String),

    /// An operation needed more stack items than were present.
    #[error("stack underflow: needed {needed}, have {available}")]
    StackUnderflow { needed: usize, available: usize },

    /// The reference counter exceeded the stack size limit.
    #[error("stack overflow: {count} items exceed limit {limit}")]
    StackOverflow { count: usize, limit: usize },

    /// An invocation exceeded the invocation stack limit.
    #[error("invocation stack overflow")]
    InvocationOverflow,

    /// An operand or stack value was outside its permitted domain.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    /// A stack item had the wrong type for the operation.
    #[error("invalid type: expected {expected}, found {found}")]
    InvalidType {
        expected: &'static str,
        found: &'static str,
    },

    /// An integer result exceeded the configured width.
    #[error("integer overflow: {0} bytes exceed maximum")]
    IntegerOverflow(usize),

    /// An item exceeded the maximum item size.
    #[error("item size {size} exceeds limit {limit}")]
    ItemTooLarge { size: usize, limit: usize },

    /// A script THROW (or ABORT/failed ASSERT) left the engine with no
    /// matching catch block.
    #[error("unhandled exception: {0}")]
    UnhandledException(String),

    /// Gas consumed would exceed the gas limit.
    #[error("out of gas: consumed {consumed} + {cost} exceeds limit {limit}")]
    OutOfGas { consumed: i64, cost: i64, limit: i64 },

    /// A syscall was invoked without the call flags it requires.
    #[error("missing call flags for syscall 0x{0:08x}")]
    MissingCallFlags(u32),

    /// A syscall id has no registered handler.
    #[error("unknown syscall 0x{0:08x}")]
    UnknownSyscall(u32),

    /// Host-side failure surfaced through a syscall.
    #[error("interop failure: {0}")]
    InteropFailure(String),
}

/// Result alias used throughout this crate.
pub type VmResult<T> = std::result::Result<T, VmError>;
