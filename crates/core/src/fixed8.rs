//! Signed 64-bit fixed-point amount with eight decimal places.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const DECIMALS: i64 = 100_000_000;

/// A signed amount scaled by 10^8, the GAS/fee unit.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Debug,
)]
pub struct Fixed8(i64);

impl Fixed8 {
    /// Zero amount.
    pub const ZERO: Fixed8 = Fixed8(0);
    /// One whole unit (10^8 raw).
    pub const ONE: Fixed8 = Fixed8(DECIMALS);

    /// Wraps a raw scaled value.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Converts whole units, failing on overflow.
    pub fn from_units(units: i64) -> CoreResult<Self> {
        units
            .checked_mul(DECIMALS)
            .map(Self)
            .ok_or(CoreError::Overflow)
    }

    /// The raw scaled value.
    pub fn raw(&self) -> i64 {
        self.0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Self) -> CoreResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(CoreError::Overflow)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Self) -> CoreResult<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(CoreError::Overflow)
    }

    /// Whether the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:08}",
            abs / DECIMALS as u64,
            abs % DECIMALS as u64
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Fixed8::from_raw(150_000_000).to_string(), "1.50000000");
        assert_eq!(Fixed8::from_raw(-1).to_string(), "-0.00000001");
        assert_eq!(Fixed8::ZERO.to_string(), "0.00000000");
    }

    #[test]
    fn checked_arithmetic() {
        let one = Fixed8::ONE;
        assert_eq!(one.checked_add(one).unwrap(), Fixed8::from_raw(2 * 100_000_000));
        assert!(Fixed8::from_raw(i64::MAX).checked_add(Fixed8::ONE).is_err());
    }

    #[test]
    fn from_units_overflow() {
        assert!(Fixed8::from_units(i64::MAX).is_err());
        assert_eq!(Fixed8::from_units(2).unwrap().raw(), 200_000_000);
    }
}
