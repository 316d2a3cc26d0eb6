//! Witness scopes: where a signer's witness is valid.

use bitflags::bitflags;

bitflags! {
    /// Restricts the contexts in which a signer's witness answers
    /// `CheckWitness`.
    ///
    /// `NONE` admits only fee payment; `GLOBAL` must not be combined with
    /// any other flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WitnessScope: u8 {
        /// Witness valid only in the entry-script context.
        const CALLED_BY_ENTRY = 0x01;
        /// Witness valid when the calling contract is in `allowed_contracts`.
        const CUSTOM_CONTRACTS = 0x10;
        /// Witness valid when the calling contract's group is in
        /// `allowed_groups`.
        const CUSTOM_GROUPS = 0x20;
        /// Witness validity decided by the signer's witness rules.
        const WITNESS_RULES = 0x40;
        /// Witness valid everywhere.
        const GLOBAL = 0x80;
    }
}

impl WitnessScope {
    /// Fee-only scope: the witness authorizes nothing beyond the payment.
    pub const NONE: WitnessScope = WitnessScope::empty();

    /// Whether the bit combination is well-formed.
    pub fn is_valid(&self) -> bool {
        if self.contains(WitnessScope::GLOBAL) {
            return *self == WitnessScope::GLOBAL;
        }
        true
    }

    /// Decodes a scope byte, rejecting unknown bits and invalid mixes.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let scope = WitnessScope::from_bits(byte)?;
        scope.is_valid().then_some(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_must_be_sole_flag() {
        assert!(WitnessScope::from_byte(0x80).is_some());
        assert!(WitnessScope::from_byte(0x81).is_none());
    }

    #[test]
    fn unknown_bits_rejected() {
        assert!(WitnessScope::from_byte(0x02).is_none());
        assert!(WitnessScope::from_byte(0x08).is_none());
    }

    #[test]
    fn combinations_round_trip() {
        let scope = WitnessScope::CALLED_BY_ENTRY | WitnessScope::CUSTOM_CONTRACTS;
        assert_eq!(WitnessScope::from_byte(scope.bits()), Some(scope));
    }
}
