//! Witness: the (invocation, verification) script pair proving authority.

use crate::uint160::UInt160;
use oxneo_io::serializable::var_bytes_size;
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Maximum invocation script length accepted from the wire.
pub const MAX_INVOCATION_SCRIPT: usize = 1024;
/// Maximum verification script length accepted from the wire.
pub const MAX_VERIFICATION_SCRIPT: usize = 1024;

/// A proof attached to a signed payload.
///
/// The verification script hashes to the owning account; the invocation
/// script pushes the signatures (or other data) that satisfy it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    /// Script that pushes signature data onto the stack.
    pub invocation_script: Vec<u8>,
    /// Script that consumes the pushed data and leaves a truthy result.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Creates a witness from its two scripts.
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// The account this witness proves: the hash of its verification script.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_script(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        var_bytes_size(self.invocation_script.len())
            + var_bytes_size(self.verification_script.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
            verification_script: reader.read_var_bytes(MAX_VERIFICATION_SCRIPT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let witness = Witness::new(vec![0x0c, 0x40, 0xaa], vec![0x11]);
        let bytes = witness.to_bytes().unwrap();
        assert_eq!(bytes.len(), witness.size());
        assert_eq!(Witness::from_bytes(&bytes).unwrap(), witness);
    }

    #[test]
    fn script_hash_is_verification_hash160() {
        let witness = Witness::new(vec![], vec![0x11]);
        assert_eq!(witness.script_hash(), UInt160::from_script(&[0x11]));
    }

    #[test]
    fn oversized_scripts_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&vec![0u8; MAX_INVOCATION_SCRIPT + 1]);
        writer.write_var_bytes(&[]);
        assert!(Witness::from_bytes(&writer.into_bytes()).is_err());
    }
}
