//! Keepalive payloads.

use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Carried by both `ping` and `pong`; advertises the sender's height so
/// keepalives double as lightweight sync hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPayload {
    /// Sender's chain height.
    pub last_block_index: u32,
    /// Seconds since the epoch.
    pub timestamp: u32,
    /// Matches a pong to its ping.
    pub nonce: u32,
}

impl Serializable for PingPayload {
    fn size(&self) -> usize {
        4 + 4 + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.last_block_index);
        writer.write_u32(self.timestamp);
        writer.write_u32(self.nonce);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            last_block_index: reader.read_u32()?,
            timestamp: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let ping = PingPayload {
            last_block_index: 100,
            timestamp: 1_700_000_000,
            nonce: 9,
        };
        let bytes = ping.to_bytes().unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(PingPayload::from_bytes(&bytes).unwrap(), ping);
    }
}
