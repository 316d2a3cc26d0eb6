//! 160-bit script hash.

use crate::error::{CoreError, CoreResult};
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte width of a [`UInt160`].
pub const UINT160_SIZE: usize = 20;

/// A 160-bit hash identifying an account or contract by its script.
///
/// Stored and serialized in little-endian byte order; displayed as
/// big-endian hex with a `0x` prefix, matching the reference protocol.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UInt160([u8; UINT160_SIZE]);

impl UInt160 {
    /// The all-zero hash.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Wraps a raw little-endian byte array.
    pub fn from_bytes(bytes: [u8; UINT160_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copies from a slice, failing unless it is exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> CoreResult<Self> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| CoreError::InvalidEncoding(format!("UInt160 from {} bytes", bytes.len())))
    }

    /// The little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; UINT160_SIZE] {
        &self.0
    }

    /// Computes the script hash of a verification script.
    pub fn from_script(script: &[u8]) -> Self {
        Self(oxneo_cryptography::hash::hash160(script))
    }

    /// Parses big-endian hex with an optional `0x` prefix.
    pub fn parse(value: &str) -> CoreResult<Self> {
        let hex_str = value.strip_prefix("0x").unwrap_or(value);
        if hex_str.len() != UINT160_SIZE * 2 {
            return Err(CoreError::InvalidEncoding(format!(
                "UInt160 hex length {}",
                hex_str.len()
            )));
        }
        let mut bytes: [u8; UINT160_SIZE] = hex::decode(hex_str)
            .map_err(|e| CoreError::InvalidEncoding(e.to_string()))?
            .try_into()
            .expect("length checked");
        bytes.reverse();
        Ok(Self(bytes))
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        UINT160_SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<UINT160_SIZE>()?))
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UInt160 {
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
        let text = "0x0102030405060708090a0b0c0d0e0f1011121314";
        let hash = UInt160::parse(text).unwrap();
        assert_eq!(hash.to_string(), text);
        // Display is big-endian; storage is little-endian.
        assert_eq!(hash.as_bytes()[0], 0x14);
    }

    #[test]
    fn parse_without_prefix() {
        let hash = UInt160::parse("0102030405060708090a0b0c0d0e0f1011121314").unwrap();
        assert!(!hash.is_zero());
    }

    #[test]
    fn parse_rejects_bad_length() {
        assert!(UInt160::parse("0xabcd").is_err());
    }

    #[test]
    fn serialization_is_byte_exact() {
        let hash = UInt160::from_bytes([7u8; 20]);
        let bytes = hash.to_bytes().unwrap();
        assert_eq!(bytes, vec![7u8; 20]);
        assert_eq!(UInt160::from_bytes(bytes.try_into().unwrap()), hash);
    }
}
