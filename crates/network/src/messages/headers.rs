//! Header-first synchronization payloads.

use oxneo_core::{Header, UInt256};
use oxneo_io::serializable::var_int_size;
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Maximum headers served per `getheaders` request.
pub const MAX_HEADERS_PER_MESSAGE: usize = 2_000;

/// The `getheaders` payload: start hash plus a count (-1 for the
/// maximum).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersPayload {
    /// Hash of the last header the requester already has.
    pub hash_start: UInt256,
    /// Requested count; negative means "as many as allowed".
    pub count: i16,
}

impl GetHeadersPayload {
    /// The effective number of headers to serve.
    pub fn effective_count(&self) -> usize {
        if self.count < 0 {
            MAX_HEADERS_PER_MESSAGE
        } else {
            (self.count as usize).min(MAX_HEADERS_PER_MESSAGE)
        }
    }
}

impl Serializable for GetHeadersPayload {
    fn size(&self) -> usize {
        32 + 2
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.hash_start.serialize(writer)?;
        writer.write_i16(self.count);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            hash_start: UInt256::deserialize(reader)?,
            count: reader.read_i16()?,
        })
    }
}

/// The `getblocks` payload, same shape as `getheaders`.
pub type GetBlocksPayload = GetHeadersPayload;

/// The `headers` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersPayload {
    pub headers: Vec<Header>,
}

impl Serializable for HeadersPayload {
    fn size(&self) -> usize {
        var_int_size(self.headers.len() as u64)
            + self.headers.iter().map(Serializable::size).sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_serializable_list(&self.headers)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let headers = reader.read_serializable_list::<Header>(MAX_HEADERS_PER_MESSAGE)?;
        if headers.is_empty() {
            return Err(oxneo_io::IoError::invalid_format("empty headers message"));
        }
        Ok(Self { headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_core::Witness;

    #[test]
    fn getheaders_round_trip() {
        let payload = GetHeadersPayload {
            hash_start: UInt256::from_bytes([3u8; 32]),
            count: -1,
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(GetHeadersPayload::from_bytes(&bytes).unwrap(), payload);
        assert_eq!(payload.effective_count(), MAX_HEADERS_PER_MESSAGE);
    }

    #[test]
    fn headers_round_trip() {
        let header = Header {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp: 1,
            nonce: 2,
            index: 3,
            primary_index: 0,
            next_consensus: Default::default(),
            witness: Witness::new(Vec::new(), vec![0x11]),
        };
        let payload = HeadersPayload {
            headers: vec![header],
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(HeadersPayload::from_bytes(&bytes).unwrap(), payload);
    }

    #[test]
    fn empty_headers_rejected() {
        let payload = HeadersPayload { headers: vec![] };
        let bytes = payload.to_bytes().unwrap();
        assert!(HeadersPayload::from_bytes(&bytes).is_err());
    }
}
