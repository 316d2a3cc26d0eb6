//! SPV filter payloads.

use oxneo_core::{Header, UInt256};
use oxneo_cryptography::bloom_filter::{MAX_FILTER_SIZE, MAX_HASH_FUNCTIONS};
use oxneo_io::serializable::{var_bytes_size, var_int_size};
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// The `filterload` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadPayload {
    pub filter: Vec<u8>,
    pub hash_functions: u8,
    pub tweak: u32,
}

impl Serializable for FilterLoadPayload {
    fn size(&self) -> usize {
        var_bytes_size(self.filter.len()) + 1 + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.filter);
        writer.write_u8(self.hash_functions);
        writer.write_u32(self.tweak);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let filter = reader.read_var_bytes(MAX_FILTER_SIZE)?;
        let hash_functions = reader.read_u8()?;
        if hash_functions as u32 > MAX_HASH_FUNCTIONS {
            return Err(IoError::invalid_format("too many filter hash functions"));
        }
        Ok(Self {
            filter,
            hash_functions,
            tweak: reader.read_u32()?,
        })
    }
}

/// The `filteradd` payload: one element to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterAddPayload {
    pub data: Vec<u8>,
}

impl Serializable for FilterAddPayload {
    fn size(&self) -> usize {
        var_bytes_size(self.data.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.data);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            data: reader.read_var_bytes(520)?,
        })
    }
}

/// The `merkleblock` payload: a header, the total transaction count, the
/// proof hashes and the traversal flag bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockPayload {
    pub header: Header,
    pub transaction_count: u32,
    pub hashes: Vec<UInt256>,
    pub flags: Vec<u8>,
}

impl Serializable for MerkleBlockPayload {
    fn size(&self) -> usize {
        self.header.size()
            + var_int_size(self.transaction_count as u64)
            + var_int_size(self.hashes.len() as u64)
            + self.hashes.len() * 32
            + var_bytes_size(self.flags.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.header.serialize(writer)?;
        writer.write_var_int(self.transaction_count as u64);
        writer.write_serializable_list(&self.hashes)?;
        writer.write_var_bytes(&self.flags);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            header: Header::deserialize(reader)?,
            transaction_count: reader.read_var_int(u32::MAX as u64)? as u32,
            hashes: reader.read_serializable_list::<UInt256>(0xffff)?,
            flags: reader.read_var_bytes(0xffff)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filterload_round_trip() {
        let payload = FilterLoadPayload {
            filter: vec![0xaa; 32],
            hash_functions: 5,
            tweak: 99,
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(bytes.len(), payload.size());
        assert_eq!(FilterLoadPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn excessive_hash_functions_rejected() {
        let payload = FilterLoadPayload {
            filter: vec![0xaa; 8],
            hash_functions: 200,
            tweak: 0,
        };
        let bytes = payload.to_bytes().unwrap();
        assert!(FilterLoadPayload::from_bytes(&bytes).is_err());
    }

    #[test]
    fn filteradd_round_trip() {
        let payload = FilterAddPayload {
            data: b"element".to_vec(),
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(FilterAddPayload::from_bytes(&bytes).unwrap(), payload);
    }
}
