//! Contract storage keys.

use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// A contract-scoped storage key: the contract's id plus its own key
/// bytes. Keys sort lexicographically within a contract id, so range
/// scans stay inside one contract's space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Owning contract id.
    pub id: i32,
    /// Contract-chosen key bytes.
    pub key: Vec<u8>,
}

impl StorageKey {
    /// Creates a key.
    pub fn new(id: i32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }

    /// The raw store encoding: little-endian id, then the key bytes.
    /// (The chain layout prepends its section prefix separately.)
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(4 + self.key.len());
        raw.extend_from_slice(&self.id.to_le_bytes());
        raw.extend_from_slice(&self.key);
        raw
    }

    /// Decodes a raw store key.
    pub fn from_raw(raw: &[u8]) -> Option<Self> {
        if raw.len() < 4 {
            return None;
        }
        let id = i32::from_le_bytes(raw[..4].try_into().ok()?);
        Some(Self {
            id,
            key: raw[4..].to_vec(),
        })
    }

    /// The raw prefix shared by every key of a contract.
    pub fn prefix_for(id: i32) -> Vec<u8> {
        id.to_le_bytes().to_vec()
    }
}

impl Serializable for StorageKey {
    fn size(&self) -> usize {
        4 + self.key.len()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_i32(self.id);
        writer.write_bytes(&self.key);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let id = reader.read_i32()?;
        let key = reader.read_to_end();
        Ok(Self { id, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip() {
        let key = StorageKey::new(7, b"balance".to_vec());
        let raw = key.to_raw();
        assert_eq!(StorageKey::from_raw(&raw), Some(key));
    }

    #[test]
    fn keys_sort_within_contract() {
        let a = StorageKey::new(1, b"a".to_vec());
        let b = StorageKey::new(1, b"b".to_vec());
        assert!(a < b);
    }

    #[test]
    fn short_raw_rejected() {
        assert!(StorageKey::from_raw(&[1, 2]).is_none());
    }
}
