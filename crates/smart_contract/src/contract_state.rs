//! Deployed contract state.

use oxneo_core::UInt160;
use oxneo_io::serializable::{var_bytes_size, var_int_size};
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Maximum deployed script size.
pub const MAX_CONTRACT_SCRIPT: usize = 65_536;
/// Maximum methods listed in a contract's ABI.
pub const MAX_CONTRACT_METHODS: usize = 256;

/// One exported method of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractMethod {
    /// Method name.
    pub name: String,
    /// Entry offset into the script.
    pub offset: u32,
    /// Declared parameter count.
    pub parameter_count: u8,
    /// Whether the method declares no state mutation.
    pub safe: bool,
}

impl Serializable for ContractMethod {
    fn size(&self) -> usize {
        var_bytes_size(self.name.len()) + 4 + 1 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_string(&self.name);
        writer.write_u32(self.offset);
        writer.write_u8(self.parameter_count);
        writer.write_bool(self.safe);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            name: reader.read_var_string(64)?,
            offset: reader.read_u32()?,
            parameter_count: reader.read_u8()?,
            safe: reader.read_bool()?,
        })
    }
}

/// A deployed contract: id, script and the method table used by
/// `System.Contract.Call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    /// Chain-assigned id; negative ids are reserved for natives.
    pub id: i32,
    /// Update counter, bumped on each redeploy.
    pub update_counter: u16,
    /// The contract's script hash.
    pub hash: UInt160,
    /// The executable script.
    pub script: Vec<u8>,
    /// Exported methods.
    pub methods: Vec<ContractMethod>,
}

impl ContractState {
    /// Looks up a method by name and parameter count.
    pub fn method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameter_count as usize == parameter_count)
    }
}

impl Serializable for ContractState {
    fn size(&self) -> usize {
        4 + 2
            + 20
            + var_bytes_size(self.script.len())
            + var_int_size(self.methods.len() as u64)
            + self.methods.iter().map(Serializable::size).sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_i32(self.id);
        writer.write_u16(self.update_counter);
        self.hash.serialize(writer)?;
        writer.write_var_bytes(&self.script);
        writer.write_serializable_list(&self.methods)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            id: reader.read_i32()?,
            update_counter: reader.read_u16()?,
            hash: UInt160::deserialize(reader)?,
            script: reader.read_var_bytes(MAX_CONTRACT_SCRIPT)?,
            methods: reader.read_serializable_list(MAX_CONTRACT_METHODS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let state = ContractState {
            id: 5,
            update_counter: 1,
            hash: UInt160::from_bytes([9u8; 20]),
            script: vec![0x11, 0x40],
            methods: vec![ContractMethod {
                name: "main".into(),
                offset: 0,
                parameter_count: 2,
                safe: false,
            }],
        };
        let bytes = state.to_bytes().unwrap();
        assert_eq!(bytes.len(), state.size());
        assert_eq!(ContractState::from_bytes(&bytes).unwrap(), state);
    }

    #[test]
    fn method_lookup_matches_arity() {
        let state = ContractState {
            id: 1,
            update_counter: 0,
            hash: UInt160::zero(),
            script: vec![0x40],
            methods: vec![ContractMethod {
                name: "transfer".into(),
                offset: 0,
                parameter_count: 3,
                safe: false,
            }],
        };
        assert!(state.method("transfer", 3).is_some());
        assert!(state.method("transfer", 2).is_none());
        assert!(state.method("balanceOf", 1).is_none());
    }
}
