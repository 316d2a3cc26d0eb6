//! The `version` handshake payload.

use oxneo_io::serializable::var_bytes_size;
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Maximum user-agent length.
const MAX_USER_AGENT: usize = 1024;

/// Announced at connection time by both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    /// Protocol version spoken.
    pub protocol_version: u32,
    /// Service bitmask (bit 0: full node).
    pub services: u64,
    /// Sender's clock, seconds since the epoch.
    pub timestamp: u32,
    /// Port the sender listens on (0 when not accepting).
    pub port: u16,
    /// Random per-node value; equal nonces mean a self-connection.
    pub nonce: u32,
    /// Software identification.
    pub user_agent: String,
    /// Sender's chain height.
    pub start_height: u32,
    /// Whether the sender wants relayed inventory.
    pub relay: bool,
}

impl VersionPayload {
    /// Service bit: serves full blocks.
    pub const SERVICE_FULL_NODE: u64 = 1;
}

impl Serializable for VersionPayload {
    fn size(&self) -> usize {
        4 + 8 + 4 + 2 + 4 + var_bytes_size(self.user_agent.len()) + 4 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.protocol_version);
        writer.write_u64(self.services);
        writer.write_u32(self.timestamp);
        writer.write_u16(self.port);
        writer.write_u32(self.nonce);
        writer.write_var_string(&self.user_agent);
        writer.write_u32(self.start_height);
        writer.write_bool(self.relay);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            protocol_version: reader.read_u32()?,
            services: reader.read_u64()?,
            timestamp: reader.read_u32()?,
            port: reader.read_u16()?,
            nonce: reader.read_u32()?,
            user_agent: reader.read_var_string(MAX_USER_AGENT)?,
            start_height: reader.read_u32()?,
            relay: reader.read_bool()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let version = VersionPayload {
            protocol_version: 0,
            services: VersionPayload::SERVICE_FULL_NODE,
            timestamp: 1_700_000_000,
            port: 10333,
            nonce: 0xdead_beef,
            user_agent: "/neo-oxide:0.1.0/".into(),
            start_height: 42,
            relay: true,
        };
        let bytes = version.to_bytes().unwrap();
        assert_eq!(bytes.len(), version.size());
        assert_eq!(VersionPayload::from_bytes(&bytes).unwrap(), version);
    }
}
