//! Transaction signer with scoped witness validity.

use crate::uint160::UInt160;
use crate::witness_rule::WitnessRule;
use crate::witness_scope::WitnessScope;
use oxneo_io::serializable::list_size;
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum entries in each of the scope-specific lists.
pub const MAX_SUBITEMS: usize = 16;

/// An account that signed a transaction, with the scope its witness covers.
///
/// The first signer of a transaction is the sender and pays its fees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    /// The signing account's script hash.
    pub account: UInt160,
    /// Where the witness is valid.
    pub scopes: WitnessScope,
    /// Contracts the witness covers under `CUSTOM_CONTRACTS`.
    pub allowed_contracts: Vec<UInt160>,
    /// Group keys the witness covers under `CUSTOM_GROUPS`.
    pub allowed_groups: Vec<Vec<u8>>,
    /// Rules evaluated under `WITNESS_RULES`.
    pub rules: Vec<WitnessRule>,
}

impl Signer {
    /// A signer whose witness is valid only for the entry script.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::CALLED_BY_ENTRY,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// A signer whose witness is valid everywhere.
    pub fn global(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::GLOBAL,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = 20 + 1;
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            size += list_size(&self.allowed_contracts);
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            size += oxneo_io::serializable::var_int_size(self.allowed_groups.len() as u64)
                + self.allowed_groups.iter().map(Vec::len).sum::<usize>();
        }
        if self.scopes.contains(WitnessScope::WITNESS_RULES) {
            size += list_size(&self.rules);
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.account.serialize(writer)?;
        writer.write_u8(self.scopes.bits());
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            writer.write_serializable_list(&self.allowed_contracts)?;
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64);
            for group in &self.allowed_groups {
                writer.write_bytes(group);
            }
        }
        if self.scopes.contains(WitnessScope::WITNESS_RULES) {
            writer.write_serializable_list(&self.rules)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let account = UInt160::deserialize(reader)?;
        let scope_byte = reader.read_u8()?;
        let scopes = WitnessScope::from_byte(scope_byte).ok_or_else(|| {
            IoError::invalid_format(format!("invalid witness scope 0x{scope_byte:02x}"))
        })?;

        let allowed_contracts = if scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            let contracts = reader.read_serializable_list::<UInt160>(MAX_SUBITEMS)?;
            if contracts.is_empty() {
                return Err(IoError::invalid_format("empty allowed_contracts"));
            }
            contracts
        } else {
            Vec::new()
        };

        let allowed_groups = if scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            if count == 0 {
                return Err(IoError::invalid_format("empty allowed_groups"));
            }
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                groups.push(reader.read_bytes(33)?);
            }
            groups
        } else {
            Vec::new()
        };

        let rules = if scopes.contains(WitnessScope::WITNESS_RULES) {
            let rules = reader.read_serializable_list::<WitnessRule>(MAX_SUBITEMS)?;
            if rules.is_empty() {
                return Err(IoError::invalid_format("empty witness rules"));
            }
            rules
        } else {
            Vec::new()
        };

        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_signer_round_trip() {
        let signer = Signer::called_by_entry(UInt160::from_bytes([1u8; 20]));
        let bytes = signer.to_bytes().unwrap();
        assert_eq!(bytes.len(), signer.size());
        assert_eq!(Signer::from_bytes(&bytes).unwrap(), signer);
    }

    #[test]
    fn custom_contracts_round_trip() {
        let signer = Signer {
            account: UInt160::from_bytes([1u8; 20]),
            scopes: WitnessScope::CALLED_BY_ENTRY | WitnessScope::CUSTOM_CONTRACTS,
            allowed_contracts: vec![UInt160::from_bytes([2u8; 20])],
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        };
        let bytes = signer.to_bytes().unwrap();
        assert_eq!(Signer::from_bytes(&bytes).unwrap(), signer);
    }

    #[test]
    fn custom_contracts_scope_requires_entries() {
        let mut writer = BinaryWriter::new();
        UInt160::zero().serialize(&mut writer).unwrap();
        writer.write_u8(WitnessScope::CUSTOM_CONTRACTS.bits());
        writer.write_var_int(0);
        assert!(Signer::from_bytes(&writer.into_bytes()).is_err());
    }

    #[test]
    fn invalid_scope_byte_rejected() {
        let mut writer = BinaryWriter::new();
        UInt160::zero().serialize(&mut writer).unwrap();
        writer.write_u8(0x81);
        assert!(Signer::from_bytes(&writer.into_bytes()).is_err());
    }
}
