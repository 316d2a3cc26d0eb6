//! Inventory advertisement payloads.

use oxneo_core::UInt256;
use oxneo_io::serializable::var_int_size;
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum hashes per `inv`/`getdata` message.
pub const MAX_INV_HASHES: usize = 500;

/// What kind of object an inventory hash names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InventoryType {
    Transaction = 0x2b,
    Block = 0x2c,
    Extensible = 0x2e,
}

impl InventoryType {
    /// Decodes an inventory type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x2b => Some(Self::Transaction),
            0x2c => Some(Self::Block),
            0x2e => Some(Self::Extensible),
            _ => None,
        }
    }
}

/// The `inv`/`getdata`/`notfound` payload: a type and its hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvPayload {
    pub inventory_type: InventoryType,
    pub hashes: Vec<UInt256>,
}

impl InvPayload {
    /// Builds a payload, truncating to the protocol bound.
    pub fn new(inventory_type: InventoryType, mut hashes: Vec<UInt256>) -> Self {
        hashes.truncate(MAX_INV_HASHES);
        Self {
            inventory_type,
            hashes,
        }
    }
}

impl Serializable for InvPayload {
    fn size(&self) -> usize {
        1 + var_int_size(self.hashes.len() as u64) + self.hashes.len() * 32
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.inventory_type as u8);
        writer.write_serializable_list(&self.hashes)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        let inventory_type = InventoryType::from_byte(type_byte).ok_or_else(|| {
            IoError::invalid_format(format!("unknown inventory type 0x{type_byte:02x}"))
        })?;
        let hashes = reader.read_serializable_list::<UInt256>(MAX_INV_HASHES)?;
        if hashes.is_empty() {
            return Err(IoError::invalid_format("empty inventory"));
        }
        Ok(Self {
            inventory_type,
            hashes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let payload = InvPayload::new(
            InventoryType::Block,
            vec![UInt256::from_bytes([1u8; 32]), UInt256::from_bytes([2u8; 32])],
        );
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), payload.size());
        assert_eq!(InvPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn empty_inventory_rejected() {
        let payload = InvPayload {
            inventory_type: InventoryType::Transaction,
            hashes: Vec::new(),
        };
        let bytes = payload.to_bytes().unwrap();
        assert!(InvPayload::from_bytes(&bytes).is_err());
    }

    #[test]
    fn oversized_list_truncated_on_build() {
        let hashes = vec![UInt256::zero(); MAX_INV_HASHES + 10];
        let payload = InvPayload::new(InventoryType::Transaction, hashes);
        assert_eq!(payload.hashes.len(), MAX_INV_HASHES);
    }
}
