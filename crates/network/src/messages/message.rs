//! The message frame.
//!
//! `magic(u32) | command(12 bytes) | length(u32) | checksum(u32) |
//! payload`; the checksum is the first four bytes of the double SHA-256
//! of the payload.

use crate::error::{NetworkError, NetworkResult};
use crate::messages::command::MessageCommand;
use oxneo_cryptography::hash::checksum;

/// Frame header size on the wire.
pub const FRAME_HEADER_SIZE: usize = 4 + 12 + 4 + 4;
/// Maximum accepted payload size.
pub const MAX_PAYLOAD_SIZE: usize = 0x0200_0000;

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Network magic; a mismatch disconnects the peer.
    pub magic: u32,
    /// The command.
    pub command: MessageCommand,
    /// Raw payload bytes, already framed-checked.
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a message.
    pub fn new(magic: u32, command: MessageCommand, payload: Vec<u8>) -> Self {
        Self {
            magic,
            command,
            payload,
        }
    }

    /// Serializes the full frame.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        wire.extend_from_slice(&self.magic.to_le_bytes());
        wire.extend_from_slice(&self.command.to_wire());
        wire.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        wire.extend_from_slice(&checksum(&self.payload).to_le_bytes());
        wire.extend_from_slice(&self.payload);
        wire
    }

    /// Parses a frame header, returning `(magic, command, payload_len,
    /// checksum)`.
    pub fn parse_header(header: &[u8; FRAME_HEADER_SIZE]) -> NetworkResult<(u32, MessageCommand, usize, u32)> {
        let magic = u32::from_le_bytes(header[0..4].try_into().expect("4 bytes"));
        let command_bytes: [u8; 12] = header[4..16].try_into().expect("12 bytes");
        let command = MessageCommand::from_wire(&command_bytes)?;
        let length = u32::from_le_bytes(header[16..20].try_into().expect("4 bytes")) as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::InvalidMessage(format!(
                "payload of {length} bytes exceeds limit"
            )));
        }
        let expected_checksum = u32::from_le_bytes(header[20..24].try_into().expect("4 bytes"));
        Ok((magic, command, length, expected_checksum))
    }

    /// Validates a payload against the header's checksum and wraps it.
    pub fn assemble(
        magic: u32,
        command: MessageCommand,
        expected_checksum: u32,
        payload: Vec<u8>,
    ) -> NetworkResult<Self> {
        if checksum(&payload) != expected_checksum {
            return Err(NetworkError::ChecksumMismatch);
        }
        Ok(Self {
            magic,
            command,
            payload,
        })
    }

    /// Parses a complete frame from a buffer (tests and offline tools).
    pub fn from_wire(wire: &[u8]) -> NetworkResult<Self> {
        if wire.len() < FRAME_HEADER_SIZE {
            return Err(NetworkError::InvalidMessage("frame too short".into()));
        }
        let header: [u8; FRAME_HEADER_SIZE] =
            wire[..FRAME_HEADER_SIZE].try_into().expect("checked");
        let (magic, command, length, expected_checksum) = Self::parse_header(&header)?;
        if wire.len() != FRAME_HEADER_SIZE + length {
            return Err(NetworkError::InvalidMessage(format!(
                "frame length {} does not match declared {length}",
                wire.len() - FRAME_HEADER_SIZE
            )));
        }
        Self::assemble(
            magic,
            command,
            expected_checksum,
            wire[FRAME_HEADER_SIZE..].to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let message = Message::new(0x334f_454e, MessageCommand::Ping, vec![1, 2, 3]);
        let wire = message.to_wire();
        assert_eq!(wire.len(), FRAME_HEADER_SIZE + 3);
        assert_eq!(Message::from_wire(&wire).unwrap(), message);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let message = Message::new(1, MessageCommand::Ping, vec![1, 2, 3]);
        let mut wire = message.to_wire();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;
        assert!(matches!(
            Message::from_wire(&wire),
            Err(NetworkError::ChecksumMismatch)
        ));
    }

    #[test]
    fn empty_payload_frame() {
        let message = Message::new(1, MessageCommand::Verack, Vec::new());
        let wire = message.to_wire();
        assert_eq!(wire.len(), FRAME_HEADER_SIZE);
        assert_eq!(Message::from_wire(&wire).unwrap(), message);
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let message = Message::new(1, MessageCommand::Ping, vec![0; 8]);
        let mut wire = message.to_wire();
        wire[16..20].copy_from_slice(&(u32::MAX).to_le_bytes());
        let header: [u8; FRAME_HEADER_SIZE] = wire[..FRAME_HEADER_SIZE].try_into().unwrap();
        assert!(Message::parse_header(&header).is_err());
    }
}
