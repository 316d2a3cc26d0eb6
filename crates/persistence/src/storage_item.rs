//! Contract storage values.

use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// A stored value. A thin wrapper today; it exists so the cache and the
/// native contracts share one type for values and their (de)serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageItem {
    /// The raw value bytes.
    pub value: Vec<u8>,
}

impl StorageItem {
    /// Wraps value bytes.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Interprets the value as a little-endian signed integer. Used by the
    /// native token balances and policy parameters.
    pub fn as_i64(&self) -> Option<i64> {
        if self.value.len() > 8 {
            return None;
        }
        let mut bytes = [0u8; 8];
        // Sign-extend from the stored minimal encoding.
        let negative = self.value.last().map(|b| b & 0x80 != 0).unwrap_or(false);
        if negative {
            bytes = [0xff; 8];
        }
        bytes[..self.value.len()].copy_from_slice(&self.value);
        Some(i64::from_le_bytes(bytes))
    }

    /// Encodes an integer as a minimal little-endian value.
    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            return Self::new(Vec::new());
        }
        let bytes = value.to_le_bytes();
        // Trim redundant sign bytes while keeping the sign bit intact.
        let mut len = 8;
        if value > 0 {
            while len > 1 && bytes[len - 1] == 0 && bytes[len - 2] & 0x80 == 0 {
                len -= 1;
            }
        } else {
            while len > 1 && bytes[len - 1] == 0xff && bytes[len - 2] & 0x80 != 0 {
                len -= 1;
            }
        }
        Self::new(bytes[..len].to_vec())
    }
}

impl Serializable for StorageItem {
    fn size(&self) -> usize {
        self.value.len()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.value);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            value: reader.read_to_end(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_round_trip() {
        for value in [0i64, 1, -1, 127, 128, -128, 255, i64::MAX, i64::MIN] {
            let item = StorageItem::from_i64(value);
            assert_eq!(item.as_i64(), Some(value), "value {value}");
        }
    }

    #[test]
    fn zero_encodes_empty() {
        assert!(StorageItem::from_i64(0).value.is_empty());
    }

    #[test]
    fn oversized_integer_rejected() {
        let item = StorageItem::new(vec![0u8; 9]);
        assert_eq!(item.as_i64(), None);
    }
}
