//! Extensible payload: the envelope for consensus and service messages.

use crate::error::CoreResult;
use crate::uint160::UInt160;
use crate::uint256::UInt256;
use crate::witness::Witness;
use oxneo_io::serializable::{var_bytes_size, var_int_size};
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Maximum category string length.
pub const MAX_CATEGORY_LENGTH: usize = 32;
/// Maximum embedded data length.
pub const MAX_EXTENSIBLE_DATA: usize = 0xffff;

/// A signed, height-bounded envelope the P2P layer relays without
/// interpreting; the `category` string routes it to a subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensiblePayload {
    /// Routing key, e.g. `"dBFT"`.
    pub category: String,
    /// First block height at which the payload is valid.
    pub valid_block_start: u32,
    /// Height at which the payload expires (exclusive).
    pub valid_block_end: u32,
    /// Account whose witness signs the payload.
    pub sender: UInt160,
    /// Subsystem-specific bytes.
    pub data: Vec<u8>,
    /// Proof for `sender`.
    pub witness: Witness,
}

impl ExtensiblePayload {
    /// Serializes the portion covered by the hash and the witness.
    pub fn unsigned_data(&self) -> CoreResult<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The payload hash: double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> CoreResult<UInt256> {
        Ok(UInt256::hash256(&self.unsigned_data()?))
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_string(&self.category);
        writer.write_u32(self.valid_block_start);
        writer.write_u32(self.valid_block_end);
        self.sender.serialize(writer)?;
        writer.write_var_bytes(&self.data);
        Ok(())
    }
}

impl Serializable for ExtensiblePayload {
    fn size(&self) -> usize {
        var_bytes_size(self.category.len())
            + 4
            + 4
            + 20
            + var_bytes_size(self.data.len())
            + var_int_size(1)
            + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        writer.write_var_int(1);
        self.witness.serialize(writer)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let category = reader.read_var_string(MAX_CATEGORY_LENGTH)?;
        let valid_block_start = reader.read_u32()?;
        let valid_block_end = reader.read_u32()?;
        if valid_block_start >= valid_block_end {
            return Err(oxneo_io::IoError::invalid_format(
                "extensible payload validity window is empty",
            ));
        }
        let sender = UInt160::deserialize(reader)?;
        let data = reader.read_var_bytes(MAX_EXTENSIBLE_DATA)?;
        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(oxneo_io::IoError::invalid_format(
                "extensible payload must carry exactly one witness",
            ));
        }
        let witness = Witness::deserialize(reader)?;
        Ok(Self {
            category,
            valid_block_start,
            valid_block_end,
            sender,
            data,
            witness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ExtensiblePayload {
        ExtensiblePayload {
            category: "dBFT".to_string(),
            valid_block_start: 10,
            valid_block_end: 20,
            sender: UInt160::from_bytes([3u8; 20]),
            data: vec![1, 2, 3, 4],
            witness: Witness::new(vec![0x0c], vec![0x11]),
        }
    }

    #[test]
    fn round_trip() {
        let payload = sample();
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), payload.size());
        assert_eq!(ExtensiblePayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn empty_validity_window_rejected() {
        let mut payload = sample();
        payload.valid_block_end = payload.valid_block_start;
        let bytes = payload.to_bytes().unwrap();
        assert!(ExtensiblePayload::from_bytes(&bytes).is_err());
    }

    #[test]
    fn hash_excludes_witness() {
        let mut payload = sample();
        let before = payload.hash().unwrap();
        payload.witness.invocation_script = vec![0xff];
        assert_eq!(payload.hash().unwrap(), before);
    }
}
