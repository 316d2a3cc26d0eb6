//! The N3 transaction layout.

use crate::error::{CoreError, CoreResult};
use crate::signer::Signer;
use crate::transaction::attribute::TransactionAttribute;
use crate::uint160::UInt160;
use crate::uint256::UInt256;
use crate::witness::Witness;
use oxneo_config::{MAX_SCRIPT_LENGTH, MAX_TRANSACTION_SIZE};
use oxneo_io::serializable::{list_size, var_bytes_size};
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};
use std::collections::HashSet;

/// Maximum signers (and therefore witnesses) per transaction.
pub const MAX_TRANSACTION_SIGNERS: usize = 16;
/// Maximum attributes per transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// A signed script scheduled for on-chain execution.
///
/// The hash covers the unsigned encoding only; witnesses can be attached or
/// replaced without changing the transaction's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Layout version; only 0 exists.
    pub version: u8,
    /// Random salt distinguishing otherwise-identical transactions.
    pub nonce: u32,
    /// Execution budget in datoshi, consumed by the VM.
    pub system_fee: i64,
    /// Relay payment in datoshi, covering size and witness verification.
    pub network_fee: i64,
    /// Last block height at which this transaction may be included.
    pub valid_until_block: u32,
    /// Signing accounts; the first is the sender.
    pub signers: Vec<Signer>,
    /// Typed annotations.
    pub attributes: Vec<TransactionAttribute>,
    /// The script to execute.
    pub script: Vec<u8>,
    /// One witness per signer, in signer order.
    pub witnesses: Vec<Witness>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: 0,
            nonce: 0,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 0,
            signers: Vec::new(),
            attributes: Vec::new(),
            script: Vec::new(),
            witnesses: Vec::new(),
        }
    }
}

impl Transaction {
    /// The sender: the first signer's account.
    pub fn sender(&self) -> CoreResult<UInt160> {
        self.signers
            .first()
            .map(|s| s.account)
            .ok_or(CoreError::MissingField("signers"))
    }

    /// Serializes the unsigned portion (everything before the witnesses).
    pub fn unsigned_data(&self) -> CoreResult<Vec<u8>> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize_unsigned(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// The transaction hash: double SHA-256 of the unsigned encoding.
    pub fn hash(&self) -> CoreResult<UInt256> {
        Ok(UInt256::hash256(&self.unsigned_data()?))
    }

    /// Network fee divided by serialized size, the mempool ordering key.
    pub fn fee_per_byte(&self) -> i64 {
        let size = self.size() as i64;
        if size == 0 {
            0
        } else {
            self.network_fee / size
        }
    }

    /// Hashes listed in `Conflicts` attributes.
    pub fn conflicts(&self) -> Vec<UInt256> {
        self.attributes
            .iter()
            .filter_map(|a| match a {
                TransactionAttribute::Conflicts { hash } => Some(*hash),
                _ => None,
            })
            .collect()
    }

    fn serialize_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.version);
        writer.write_u32(self.nonce);
        writer.write_i64(self.system_fee);
        writer.write_i64(self.network_fee);
        writer.write_u32(self.valid_until_block);
        writer.write_serializable_list(&self.signers)?;
        writer.write_serializable_list(&self.attributes)?;
        writer.write_var_bytes(&self.script);
        Ok(())
    }

    /// Structural checks that need no chain state.
    ///
    /// Covers version, size bounds, fee signs, signer uniqueness, attribute
    /// duplication rules, and the witness/signer pairing.
    pub fn verify_state_independent(&self) -> CoreResult<()> {
        if self.version != 0 {
            return Err(CoreError::InvalidTransaction(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.size() > MAX_TRANSACTION_SIZE {
            return Err(CoreError::InvalidTransaction(format!(
                "size {} exceeds maximum {MAX_TRANSACTION_SIZE}",
                self.size()
            )));
        }
        if self.script.is_empty() {
            return Err(CoreError::InvalidTransaction("empty script".into()));
        }
        if self.script.len() > MAX_SCRIPT_LENGTH {
            return Err(CoreError::InvalidTransaction(format!(
                "script length {} exceeds maximum {MAX_SCRIPT_LENGTH}",
                self.script.len()
            )));
        }
        if self.system_fee < 0 {
            return Err(CoreError::InvalidTransaction("negative system fee".into()));
        }
        if self.network_fee < 0 {
            return Err(CoreError::InvalidTransaction("negative network fee".into()));
        }
        if self.signers.is_empty() {
            return Err(CoreError::InvalidTransaction("no signers".into()));
        }
        let mut accounts = HashSet::new();
        for signer in &self.signers {
            if !accounts.insert(signer.account) {
                return Err(CoreError::InvalidTransaction(format!(
                    "duplicate signer {}",
                    signer.account
                )));
            }
        }
        let mut attribute_types = HashSet::new();
        for attribute in &self.attributes {
            if !attribute.allow_multiple() && !attribute_types.insert(attribute.type_byte()) {
                return Err(CoreError::InvalidTransaction(format!(
                    "duplicate attribute type 0x{:02x}",
                    attribute.type_byte()
                )));
            }
        }
        if self.witnesses.len() != self.signers.len() {
            return Err(CoreError::InvalidTransaction(format!(
                "{} witnesses for {} signers",
                self.witnesses.len(),
                self.signers.len()
            )));
        }
        Ok(())
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        1 + 4
            + 8
            + 8
            + 4
            + list_size(&self.signers)
            + list_size(&self.attributes)
            + var_bytes_size(self.script.len())
            + list_size(&self.witnesses)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.serialize_unsigned(writer)?;
        writer.write_serializable_list(&self.witnesses)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u8()?;
        if version != 0 {
            return Err(IoError::invalid_format(format!(
                "unsupported transaction version {version}"
            )));
        }
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        let valid_until_block = reader.read_u32()?;
        let signers = reader.read_serializable_list::<Signer>(MAX_TRANSACTION_SIGNERS)?;
        if signers.is_empty() {
            return Err(IoError::invalid_format("transaction has no signers"));
        }
        let attributes =
            reader.read_serializable_list::<TransactionAttribute>(MAX_TRANSACTION_ATTRIBUTES)?;
        let script = reader.read_var_bytes(MAX_SCRIPT_LENGTH)?;
        if script.is_empty() {
            return Err(IoError::invalid_format("transaction has empty script"));
        }
        let witnesses = reader.read_serializable_list::<Witness>(MAX_TRANSACTION_SIGNERS)?;
        Ok(Self {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            nonce: 0xdeadbeef,
            system_fee: 100,
            network_fee: 200,
            valid_until_block: 1000,
            signers: vec![Signer::called_by_entry(UInt160::from_bytes([1u8; 20]))],
            attributes: vec![],
            script: vec![0x11],
            witnesses: vec![Witness::default()],
        }
    }

    #[test]
    fn round_trip() {
        let tx = sample_tx();
        let bytes = tx.to_bytes().unwrap();
        assert_eq!(bytes.len(), tx.size());
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn hash_excludes_witnesses() {
        let mut tx = sample_tx();
        let before = tx.hash().unwrap();
        tx.witnesses[0].invocation_script = vec![0xff; 8];
        assert_eq!(tx.hash().unwrap(), before);
    }

    #[test]
    fn state_independent_checks() {
        assert!(sample_tx().verify_state_independent().is_ok());

        let mut tx = sample_tx();
        tx.network_fee = -1;
        assert!(tx.verify_state_independent().is_err());

        let mut tx = sample_tx();
        tx.witnesses.clear();
        assert!(tx.verify_state_independent().is_err());

        let mut tx = sample_tx();
        tx.signers.push(tx.signers[0].clone());
        tx.witnesses.push(Witness::default());
        assert!(tx.verify_state_independent().is_err());
    }

    #[test]
    fn duplicate_attributes_only_for_conflicts() {
        let mut tx = sample_tx();
        tx.attributes = vec![
            TransactionAttribute::Conflicts {
                hash: UInt256::from_bytes([1u8; 32]),
            },
            TransactionAttribute::Conflicts {
                hash: UInt256::from_bytes([2u8; 32]),
            },
        ];
        assert!(tx.verify_state_independent().is_ok());

        tx.attributes = vec![
            TransactionAttribute::HighPriority,
            TransactionAttribute::HighPriority,
        ];
        assert!(tx.verify_state_independent().is_err());
    }

    #[test]
    fn sender_is_first_signer() {
        let tx = sample_tx();
        assert_eq!(tx.sender().unwrap(), UInt160::from_bytes([1u8; 20]));
    }
}
