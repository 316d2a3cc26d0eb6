//! Transaction attributes.

use crate::uint256::UInt256;
use oxneo_io::serializable::var_bytes_size;
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Maximum oracle response payload.
pub const MAX_ORACLE_RESULT_SIZE: usize = 0xffff;

/// Outcome of an oracle request, carried in an `OracleResponse` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OracleResponseCode {
    Success = 0x00,
    ProtocolNotSupported = 0x10,
    ConsensusUnreachable = 0x12,
    NotFound = 0x14,
    Timeout = 0x16,
    Forbidden = 0x18,
    ResponseTooLarge = 0x1a,
    InsufficientFunds = 0x1c,
    ContentTypeNotSupported = 0x1f,
    Error = 0xff,
}

impl OracleResponseCode {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Success),
            0x10 => Some(Self::ProtocolNotSupported),
            0x12 => Some(Self::ConsensusUnreachable),
            0x14 => Some(Self::NotFound),
            0x16 => Some(Self::Timeout),
            0x18 => Some(Self::Forbidden),
            0x1a => Some(Self::ResponseTooLarge),
            0x1c => Some(Self::InsufficientFunds),
            0x1f => Some(Self::ContentTypeNotSupported),
            0xff => Some(Self::Error),
            _ => None,
        }
    }
}

/// A typed annotation on a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAttribute {
    /// Places the transaction ahead of fee ordering; committee-gated.
    HighPriority,
    /// An oracle answer bound to request `id`.
    OracleResponse {
        id: u64,
        code: OracleResponseCode,
        result: Vec<u8>,
    },
    /// The transaction is invalid before the given height.
    NotValidBefore { height: u32 },
    /// The transaction conflicts with another by hash; the pool keeps only
    /// one of the pair.
    Conflicts { hash: UInt256 },
}

impl TransactionAttribute {
    const TYPE_HIGH_PRIORITY: u8 = 0x01;
    const TYPE_ORACLE_RESPONSE: u8 = 0x11;
    const TYPE_NOT_VALID_BEFORE: u8 = 0x20;
    const TYPE_CONFLICTS: u8 = 0x21;

    /// The attribute's wire type byte.
    pub fn type_byte(&self) -> u8 {
        match self {
            TransactionAttribute::HighPriority => Self::TYPE_HIGH_PRIORITY,
            TransactionAttribute::OracleResponse { .. } => Self::TYPE_ORACLE_RESPONSE,
            TransactionAttribute::NotValidBefore { .. } => Self::TYPE_NOT_VALID_BEFORE,
            TransactionAttribute::Conflicts { .. } => Self::TYPE_CONFLICTS,
        }
    }

    /// Whether a transaction may carry several attributes of this type.
    pub fn allow_multiple(&self) -> bool {
        matches!(self, TransactionAttribute::Conflicts { .. })
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self {
            TransactionAttribute::HighPriority => 0,
            TransactionAttribute::OracleResponse { result, .. } => 8 + 1 + var_bytes_size(result.len()),
            TransactionAttribute::NotValidBefore { .. } => 4,
            TransactionAttribute::Conflicts { .. } => 32,
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte());
        match self {
            TransactionAttribute::HighPriority => {}
            TransactionAttribute::OracleResponse { id, code, result } => {
                writer.write_u64(*id);
                writer.write_u8(*code as u8);
                writer.write_var_bytes(result);
            }
            TransactionAttribute::NotValidBefore { height } => writer.write_u32(*height),
            TransactionAttribute::Conflicts { hash } => hash.serialize(writer)?,
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        match reader.read_u8()? {
            Self::TYPE_HIGH_PRIORITY => Ok(TransactionAttribute::HighPriority),
            Self::TYPE_ORACLE_RESPONSE => {
                let id = reader.read_u64()?;
                let code_byte = reader.read_u8()?;
                let code = OracleResponseCode::from_byte(code_byte).ok_or_else(|| {
                    IoError::invalid_format(format!("unknown oracle code 0x{code_byte:02x}"))
                })?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(IoError::invalid_format(
                        "oracle failure response carries a result",
                    ));
                }
                Ok(TransactionAttribute::OracleResponse { id, code, result })
            }
            Self::TYPE_NOT_VALID_BEFORE => Ok(TransactionAttribute::NotValidBefore {
                height: reader.read_u32()?,
            }),
            Self::TYPE_CONFLICTS => Ok(TransactionAttribute::Conflicts {
                hash: UInt256::deserialize(reader)?,
            }),
            other => Err(IoError::invalid_format(format!(
                "unknown attribute type 0x{other:02x}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_variants() {
        let attrs = vec![
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 42,
                code: OracleResponseCode::Success,
                result: vec![1, 2, 3],
            },
            TransactionAttribute::NotValidBefore { height: 1000 },
            TransactionAttribute::Conflicts {
                hash: UInt256::from_bytes([5u8; 32]),
            },
        ];
        for attr in attrs {
            let bytes = attr.to_bytes().unwrap();
            assert_eq!(bytes.len(), attr.size());
            assert_eq!(TransactionAttribute::from_bytes(&bytes).unwrap(), attr);
        }
    }

    #[test]
    fn only_conflicts_allows_multiple() {
        assert!(TransactionAttribute::Conflicts {
            hash: UInt256::zero()
        }
        .allow_multiple());
        assert!(!TransactionAttribute::HighPriority.allow_multiple());
    }

    #[test]
    fn failed_oracle_response_must_be_empty() {
        let attr = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: vec![0xaa],
        };
        let bytes = attr.to_bytes().unwrap();
        assert!(TransactionAttribute::from_bytes(&bytes).is_err());
    }
}
