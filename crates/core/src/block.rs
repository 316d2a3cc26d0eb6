//! Block and header layouts.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use crate::uint160::UInt160;
use crate::uint256::UInt256;
use crate::witness::Witness;
use oxneo_config::MAX_TRANSACTIONS_PER_BLOCK;
use oxneo_cryptography::merkle::merkle_root;
use oxneo_io::serializable::list_size;
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use std::collections::HashSet;

/// A block header. The hash covers everything except the witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Layout version; only 0 exists.
    pub version: u32,
    /// Hash of the predecessor; zero only for the genesis block.
    pub prev_hash: UInt256,
    /// Merkle root of the block's transaction hashes.
    pub merkle_root: UInt256,
    /// Milliseconds since the Unix epoch; strictly increases along the chain.
    pub timestamp: u64,
    /// Consensus nonce supplied by the primary.
    pub nonce: u64,
    /// Height: predecessor's index plus one.
    pub index: u32,
    /// Index of the validator that proposed this block.
    pub primary_index: u8,
    /// Script hash of the next round's validator multisig.
    pub next_consensus: UInt160,
    /// Validator-quorum witness.
    pub witness: Witness,
}

impl Header {
    /// Serializes the portion covered by the hash and by commit signatures.
    pub fn unsigned_data(&self) -> CoreResult<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The block hash: double SHA-256 of the unsigned header.
    pub fn hash(&self) -> CoreResult<UInt256> {
        Ok(UInt256::hash256(&self.unsigned_data()?))
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.version);
        self.prev_hash.serialize(writer)?;
        self.merkle_root.serialize(writer)?;
        writer.write_u64(self.timestamp);
        writer.write_u64(self.nonce);
        writer.write_u32(self.index);
        writer.write_u8(self.primary_index);
        self.next_consensus.serialize(writer)?;
        Ok(())
    }
}

impl Serializable for Header {
    fn size(&self) -> usize {
        4 + 32 + 32 + 8 + 8 + 4 + 1 + 20 + 1 + self.witness.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        // Exactly one witness, encoded as a counted list.
        writer.write_var_int(1);
        self.witness.serialize(writer)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u32()?;
        if version != 0 {
            return Err(IoError::invalid_format(format!(
                "unsupported block version {version}"
            )));
        }
        let prev_hash = UInt256::deserialize(reader)?;
        let merkle_root = UInt256::deserialize(reader)?;
        let timestamp = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_u8()?;
        let next_consensus = UInt160::deserialize(reader)?;
        let witness_count = reader.read_var_int(1)?;
        if witness_count != 1 {
            return Err(IoError::invalid_format(format!(
                "header must carry exactly one witness, got {witness_count}"
            )));
        }
        let witness = Witness::deserialize(reader)?;
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
        })
    }
}

/// A full block: header plus transactions in inclusion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> CoreResult<UInt256> {
        self.header.hash()
    }

    /// The block height.
    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Hashes of the contained transactions, in order.
    pub fn transaction_hashes(&self) -> CoreResult<Vec<UInt256>> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Recomputes the Merkle root over the contained transactions.
    pub fn compute_merkle_root(&self) -> CoreResult<UInt256> {
        let hashes: Vec<[u8; 32]> = self
            .transaction_hashes()?
            .iter()
            .map(|h| *h.as_bytes())
            .collect();
        Ok(UInt256::from_bytes(merkle_root(&hashes)))
    }

    /// Structural block rules: distinct transactions and a Merkle root that
    /// matches the body.
    pub fn verify_structure(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for tx in &self.transactions {
            if !seen.insert(tx.hash()?) {
                return Err(CoreError::InvalidFormat(
                    "duplicate transaction in block".into(),
                ));
            }
        }
        let computed = self.compute_merkle_root()?;
        if computed != self.header.merkle_root {
            return Err(CoreError::InvalidFormat(format!(
                "merkle root mismatch: header {} computed {}",
                self.header.merkle_root, computed
            )));
        }
        Ok(())
    }
}

impl Serializable for Block {
    fn size(&self) -> usize {
        self.header.size() + list_size(&self.transactions)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.header.serialize(writer)?;
        writer.write_serializable_list(&self.transactions)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let header = Header::deserialize(reader)?;
        let transactions =
            reader.read_serializable_list::<Transaction>(MAX_TRANSACTIONS_PER_BLOCK)?;
        Ok(Self {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp: 1_468_595_301_000,
            nonce: 2_083_236_893,
            index: 0,
            primary_index: 0,
            next_consensus: UInt160::zero(),
            witness: Witness::new(vec![], vec![0x11]),
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let bytes = header.to_bytes().unwrap();
        assert_eq!(bytes.len(), header.size());
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn hash_excludes_witness() {
        let mut header = sample_header();
        let before = header.hash().unwrap();
        header.witness.invocation_script = vec![0xaa; 4];
        assert_eq!(header.hash().unwrap(), before);
    }

    #[test]
    fn empty_block_round_trip() {
        let block = Block {
            header: sample_header(),
            transactions: vec![],
        };
        let bytes = block.to_bytes().unwrap();
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn structure_check_catches_bad_merkle_root() {
        let mut block = Block {
            header: sample_header(),
            transactions: vec![],
        };
        block.header.merkle_root = UInt256::from_bytes([1u8; 32]);
        assert!(block.verify_structure().is_err());
        block.header.merkle_root = block.compute_merkle_root().unwrap();
        assert!(block.verify_structure().is_ok());
    }
}
