//! Consensus message types and their wire form.
//!
//! Every message travels inside an `ExtensiblePayload` under the `dBFT`
//! category: one type byte, the shared `(block_index, validator_index,
//! view_number)` header, then the variant body.

use oxneo_config::MAX_TRANSACTIONS_PER_BLOCK;
use oxneo_core::{ExtensiblePayload, UInt256};
use oxneo_io::serializable::{list_size, var_int_size};
use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// The extensible-payload category consensus traffic travels under.
pub const CONSENSUS_CATEGORY: &str = "dBFT";

/// Maximum payloads a recovery message may embed.
pub const MAX_RECOVERY_PAYLOADS: usize = 128;

/// Why a validator asked to change view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeViewReason {
    Timeout = 0x00,
    ChangeAgreement = 0x01,
    TxNotFound = 0x02,
    TxRejectedByPolicy = 0x03,
    TxInvalid = 0x04,
    BlockRejectedByPolicy = 0x05,
}

impl ChangeViewReason {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Timeout),
            0x01 => Some(Self::ChangeAgreement),
            0x02 => Some(Self::TxNotFound),
            0x03 => Some(Self::TxRejectedByPolicy),
            0x04 => Some(Self::TxInvalid),
            0x05 => Some(Self::BlockRejectedByPolicy),
            _ => None,
        }
    }
}

/// The variant body of a consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessageBody {
    /// The primary's proposal.
    PrepareRequest {
        version: u32,
        prev_hash: UInt256,
        timestamp: u64,
        nonce: u64,
        transaction_hashes: Vec<UInt256>,
    },
    /// A backup's acknowledgement, binding to the request payload hash.
    PrepareResponse { preparation_hash: UInt256 },
    /// A validator's signature over the proposed block hash.
    Commit { signature: [u8; 64] },
    /// A request to move to a higher view.
    ChangeView {
        new_view_number: u8,
        timestamp: u64,
        reason: ChangeViewReason,
    },
    /// A plea for current state.
    RecoveryRequest { timestamp: u64 },
    /// A bundle of the sender's known payloads; each is validated
    /// independently by the receiver.
    RecoveryMessage { payloads: Vec<ExtensiblePayload> },
}

impl ConsensusMessageBody {
    const TYPE_PREPARE_REQUEST: u8 = 0x00;
    const TYPE_PREPARE_RESPONSE: u8 = 0x01;
    const TYPE_COMMIT: u8 = 0x02;
    const TYPE_CHANGE_VIEW: u8 = 0x03;
    const TYPE_RECOVERY_REQUEST: u8 = 0x04;
    const TYPE_RECOVERY_MESSAGE: u8 = 0x05;

    fn type_byte(&self) -> u8 {
        match self {
            Self::PrepareRequest { .. } => Self::TYPE_PREPARE_REQUEST,
            Self::PrepareResponse { .. } => Self::TYPE_PREPARE_RESPONSE,
            Self::Commit { .. } => Self::TYPE_COMMIT,
            Self::ChangeView { .. } => Self::TYPE_CHANGE_VIEW,
            Self::RecoveryRequest { .. } => Self::TYPE_RECOVERY_REQUEST,
            Self::RecoveryMessage { .. } => Self::TYPE_RECOVERY_MESSAGE,
        }
    }
}

/// A complete consensus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusMessage {
    /// The height being decided.
    pub block_index: u32,
    /// Sender's position in the sorted validator list.
    pub validator_index: u8,
    /// The view this message belongs to.
    pub view_number: u8,
    /// The variant body.
    pub body: ConsensusMessageBody,
}

impl Serializable for ConsensusMessage {
    fn size(&self) -> usize {
        1 + 4
            + 1
            + 1
            + match &self.body {
                ConsensusMessageBody::PrepareRequest {
                    transaction_hashes, ..
                } => 4 + 32 + 8 + 8 + list_size(transaction_hashes),
                ConsensusMessageBody::PrepareResponse { .. } => 32,
                ConsensusMessageBody::Commit { .. } => 64,
                ConsensusMessageBody::ChangeView { .. } => 1 + 8 + 1,
                ConsensusMessageBody::RecoveryRequest { .. } => 8,
                ConsensusMessageBody::RecoveryMessage { payloads } => {
                    var_int_size(payloads.len() as u64)
                        + payloads.iter().map(Serializable::size).sum::<usize>()
                }
            }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.body.type_byte());
        writer.write_u32(self.block_index);
        writer.write_u8(self.validator_index);
        writer.write_u8(self.view_number);
        match &self.body {
            ConsensusMessageBody::PrepareRequest {
                version,
                prev_hash,
                timestamp,
                nonce,
                transaction_hashes,
            } => {
                writer.write_u32(*version);
                prev_hash.serialize(writer)?;
                writer.write_u64(*timestamp);
                writer.write_u64(*nonce);
                writer.write_serializable_list(transaction_hashes)?;
            }
            ConsensusMessageBody::PrepareResponse { preparation_hash } => {
                preparation_hash.serialize(writer)?;
            }
            ConsensusMessageBody::Commit { signature } => {
                writer.write_bytes(signature);
            }
            ConsensusMessageBody::ChangeView {
                new_view_number,
                timestamp,
                reason,
            } => {
                writer.write_u8(*new_view_number);
                writer.write_u64(*timestamp);
                writer.write_u8(*reason as u8);
            }
            ConsensusMessageBody::RecoveryRequest { timestamp } => {
                writer.write_u64(*timestamp);
            }
            ConsensusMessageBody::RecoveryMessage { payloads } => {
                writer.write_serializable_list(payloads)?;
            }
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let type_byte = reader.read_u8()?;
        let block_index = reader.read_u32()?;
        let validator_index = reader.read_u8()?;
        let view_number = reader.read_u8()?;
        let body = match type_byte {
            ConsensusMessageBody::TYPE_PREPARE_REQUEST => {
                ConsensusMessageBody::PrepareRequest {
                    version: reader.read_u32()?,
                    prev_hash: UInt256::deserialize(reader)?,
                    timestamp: reader.read_u64()?,
                    nonce: reader.read_u64()?,
                    transaction_hashes: reader
                        .read_serializable_list::<UInt256>(MAX_TRANSACTIONS_PER_BLOCK)?,
                }
            }
            ConsensusMessageBody::TYPE_PREPARE_RESPONSE => ConsensusMessageBody::PrepareResponse {
                preparation_hash: UInt256::deserialize(reader)?,
            },
            ConsensusMessageBody::TYPE_COMMIT => ConsensusMessageBody::Commit {
                signature: reader.read_array::<64>()?,
            },
            ConsensusMessageBody::TYPE_CHANGE_VIEW => {
                let new_view_number = reader.read_u8()?;
                let timestamp = reader.read_u64()?;
                let reason_byte = reader.read_u8()?;
                let reason = ChangeViewReason::from_byte(reason_byte).ok_or_else(|| {
                    IoError::invalid_format(format!(
                        "unknown change-view reason 0x{reason_byte:02x}"
                    ))
                })?;
                ConsensusMessageBody::ChangeView {
                    new_view_number,
                    timestamp,
                    reason,
                }
            }
            ConsensusMessageBody::TYPE_RECOVERY_REQUEST => ConsensusMessageBody::RecoveryRequest {
                timestamp: reader.read_u64()?,
            },
            ConsensusMessageBody::TYPE_RECOVERY_MESSAGE => ConsensusMessageBody::RecoveryMessage {
                payloads: reader
                    .read_serializable_list::<ExtensiblePayload>(MAX_RECOVERY_PAYLOADS)?,
            },
            other => {
                return Err(IoError::invalid_format(format!(
                    "unknown consensus message type 0x{other:02x}"
                )))
            }
        };
        Ok(Self {
            block_index,
            validator_index,
            view_number,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: ConsensusMessage) {
        let bytes = message.to_bytes().unwrap();
        assert_eq!(bytes.len(), message.size());
        assert_eq!(ConsensusMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn prepare_request_round_trip() {
        round_trip(ConsensusMessage {
            block_index: 7,
            validator_index: 2,
            view_number: 0,
            body: ConsensusMessageBody::PrepareRequest {
                version: 0,
                prev_hash: UInt256::from_bytes([1u8; 32]),
                timestamp: 123_456,
                nonce: 42,
                transaction_hashes: vec![UInt256::from_bytes([2u8; 32])],
            },
        });
    }

    #[test]
    fn commit_round_trip() {
        round_trip(ConsensusMessage {
            block_index: 7,
            validator_index: 0,
            view_number: 1,
            body: ConsensusMessageBody::Commit {
                signature: [9u8; 64],
            },
        });
    }

    #[test]
    fn change_view_round_trip() {
        round_trip(ConsensusMessage {
            block_index: 8,
            validator_index: 3,
            view_number: 0,
            body: ConsensusMessageBody::ChangeView {
                new_view_number: 1,
                timestamp: 55,
                reason: ChangeViewReason::Timeout,
            },
        });
    }

    #[test]
    fn recovery_request_round_trip() {
        round_trip(ConsensusMessage {
            block_index: 9,
            validator_index: 1,
            view_number: 2,
            body: ConsensusMessageBody::RecoveryRequest { timestamp: 99 },
        });
    }

    #[test]
    fn unknown_type_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_u8(0x77);
        writer.write_u32(1);
        writer.write_u8(0);
        writer.write_u8(0);
        assert!(ConsensusMessage::from_bytes(&writer.into_bytes()).is_err());
    }

    #[test]
    fn unknown_change_view_reason_rejected() {
        let message = ConsensusMessage {
            block_index: 8,
            validator_index: 3,
            view_number: 0,
            body: ConsensusMessageBody::ChangeView {
                new_view_number: 1,
                timestamp: 55,
                reason: ChangeViewReason::Timeout,
            },
        };
        let mut bytes = message.to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0x66;
        assert!(ConsensusMessage::from_bytes(&bytes).is_err());
    }
}
