//! Capability flags restricting what a context's syscalls may do.

use bitflags::bitflags;

bitflags! {
    /// The capability set attached to an execution context. A syscall
    /// declares the flags it requires; the current context's flags must be
    /// a superset or the engine faults.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        /// Read chain state.
        const READ_STATES = 0b0000_0001;
        /// Mutate chain state.
        const WRITE_STATES = 0b0000_0010;
        /// Call other contracts.
        const ALLOW_CALL = 0b0000_0100;
        /// Emit notifications.
        const ALLOW_NOTIFY = 0b0000_1000;

        /// Read and write chain state.
        const STATES = Self::READ_STATES.bits() | Self::WRITE_STATES.bits();
        /// Read state and call contracts.
        const READ_ONLY = Self::READ_STATES.bits() | Self::ALLOW_CALL.bits();
        /// Every capability.
        const ALL = Self::STATES.bits() | Self::ALLOW_CALL.bits() | Self::ALLOW_NOTIFY.bits();
    }
}

impl CallFlags {
    /// No capabilities.
    pub const NONE: CallFlags = CallFlags::empty();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_everything() {
        assert!(CallFlags::ALL.contains(CallFlags::READ_STATES));
        assert!(CallFlags::ALL.contains(CallFlags::WRITE_STATES));
        assert!(CallFlags::ALL.contains(CallFlags::ALLOW_CALL));
        assert!(CallFlags::ALL.contains(CallFlags::ALLOW_NOTIFY));
    }

    #[test]
    fn read_only_excludes_writes() {
        assert!(!CallFlags::READ_ONLY.contains(CallFlags::WRITE_STATES));
    }
}
