//! 256-bit hash.

use crate::error::{CoreError, CoreResult};
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte width of a [`UInt256`].
pub const UINT256_SIZE: usize = 32;

/// A 256-bit hash identifying a block or transaction.
///
/// Stored and serialized in little-endian byte order; displayed as
/// big-endian hex with a `0x` prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UInt256([u8; UINT256_SIZE]);

impl UInt256 {
    /// The all-zero hash.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Wraps a raw little-endian byte array.
    pub fn from_bytes(bytes: [u8; UINT256_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copies from a slice, failing unless it is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| CoreError::InvalidEncoding(format!("UInt256 from {} bytes", bytes.len())))
    }

    /// The little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; UINT256_SIZE] {
        &self.0
    }

    /// Double SHA-256 of `data`, the canonical content hash.
    pub fn hash256(data: &[u8]) -> Self {
        Self(oxneo_cryptography::hash::hash256(data))
    }

    /// Parses big-endian hex with an optional `0x` prefix.
    pub fn parse(value: &str) -> CoreResult<Self> {
        let hex_str = value.strip_prefix("0x").unwrap_or(value);
        if hex_str.len() != UINT256_SIZE * 2 {
            return Err(CoreError::InvalidEncoding(format!(
                "UInt256 hex length {}",
                hex_str.len()
            )));
        }
        let mut bytes: [u8; UINT256_SIZE] = hex::decode(hex_str)
            .map_err(|e| CoreError::InvalidEncoding(e.to_string()))?
            .try_into()
            .expect("length checked");
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        UINT256_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<UINT256_SIZE>()?))
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let text = "0x0102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20";
        let hash = UInt256::parse(text).unwrap();
        assert_eq!(hash.to_string(), text);
        assert_eq!(hash.as_bytes()[0], 0x20);
    }

    #[test]
    fn hash256_matches_crypto_helper() {
        let hash = UInt256::hash256(b"");
        assert_eq!(
            *hash.as_bytes(),
            oxneo_cryptography::hash::hash256(b"")
        );
    }

    #[test]
    fn ordering_is_byte_lexicographic() {
        let a = UInt256::from_bytes([0u8; 32]);
        let mut high = [0u8; 32];
        high[0] = 1;
        let b = UInt256::from_bytes(high);
        assert!(a < b);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(UInt256::parse("0x1234").is_err());
        assert!(UInt256::parse("zz").is_err());
    }
}
