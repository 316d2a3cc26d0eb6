//! Message commands: 12-byte zero-padded ASCII on the wire.

use crate::error::{NetworkError, NetworkResult};

/// Every command this node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCommand {
    Version,
    Verack,
    GetAddr,
    Addr,
    Ping,
    Pong,
    GetHeaders,
    Headers,
    GetBlocks,
    Inv,
    GetData,
    Block,
    Transaction,
    Mempool,
    FilterLoad,
    FilterAdd,
    FilterClear,
    MerkleBlock,
    Extensible,
    Reject,
    NotFound,
}

impl MessageCommand {
    /// The wire name.
    pub fn name(&self) -> &'static str {
        match self {
            MessageCommand::Version => "version",
            MessageCommand::Verack => "verack",
            MessageCommand::GetAddr => "getaddr",
            MessageCommand::Addr => "addr",
            MessageCommand::Ping => "ping",
            MessageCommand::Pong => "pong",
            MessageCommand::GetHeaders => "getheaders",
            MessageCommand::Headers => "headers",
            MessageCommand::GetBlocks => "getblocks",
            MessageCommand::Inv => "inv",
            MessageCommand::GetData => "getdata",
            MessageCommand::Block => "block",
            MessageCommand::Transaction => "tx",
            MessageCommand::Mempool => "mempool",
            MessageCommand::FilterLoad => "filterload",
            MessageCommand::FilterAdd => "filteradd",
            MessageCommand::FilterClear => "filterclear",
            MessageCommand::MerkleBlock => "merkleblock",
            MessageCommand::Extensible => "extensible",
            MessageCommand::Reject => "reject",
            MessageCommand::NotFound => "notfound",
        }
    }

    /// The zero-padded 12-byte wire form.
    pub fn to_wire(&self) -> [u8; 12] {
        let mut wire = [0u8; 12];
        let name = self.name().as_bytes();
        wire[..name.len()].copy_from_slice(name);
        wire
    }

    /// Parses the 12-byte wire form: ASCII name, zero-padded, with no
    /// bytes after the first NUL.
    pub fn from_wire(wire: &[u8; 12]) -> NetworkResult<Self> {
        let end = wire.iter().position(|&b| b == 0).unwrap_or(12);
        if wire[end..].iter().any(|&b| b != 0) {
            return Err(NetworkError::InvalidMessage(
                "command has bytes after padding".into(),
            ));
        }
        let name = std::str::from_utf8(&wire[..end])
            .map_err(|_| NetworkError::InvalidMessage("command is not ascii".into()))?;
        Self::from_name(name)
            .ok_or_else(|| NetworkError::InvalidMessage(format!("unknown command {name:?}")))
    }

    /// Parses a command name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "version" => MessageCommand::Version,
            "verack" => MessageCommand::Verack,
            "getaddr" => MessageCommand::GetAddr,
            "addr" => MessageCommand::Addr,
            "ping" => MessageCommand::Ping,
            "pong" => MessageCommand::Pong,
            "getheaders" => MessageCommand::GetHeaders,
            "headers" => MessageCommand::Headers,
            "getblocks" => MessageCommand::GetBlocks,
            "inv" => MessageCommand::Inv,
            "getdata" => MessageCommand::GetData,
            "block" => MessageCommand::Block,
            "tx" => MessageCommand::Transaction,
            "mempool" => MessageCommand::Mempool,
            "filterload" => MessageCommand::FilterLoad,
            "filteradd" => MessageCommand::FilterAdd,
            "filterclear" => MessageCommand::FilterClear,
            "merkleblock" => MessageCommand::MerkleBlock,
            "extensible" => MessageCommand::Extensible,
            "reject" => MessageCommand::Reject,
            "notfound" => MessageCommand::NotFound,
            _ => return None,
        })
    }

    /// Whether peers may send this before the handshake completes.
    pub fn allowed_before_handshake(&self) -> bool {
        matches!(self, MessageCommand::Version | MessageCommand::Verack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for command in [
            MessageCommand::Version,
            MessageCommand::Verack,
            MessageCommand::GetHeaders,
            MessageCommand::Extensible,
            MessageCommand::Transaction,
        ] {
            assert_eq!(MessageCommand::from_wire(&command.to_wire()).unwrap(), command);
        }
    }

    #[test]
    fn padding_is_zero_only() {
        let mut wire = MessageCommand::Ping.to_wire();
        wire[11] = 0x41;
        assert!(MessageCommand::from_wire(&wire).is_err());
    }

    #[test]
    fn unknown_command_rejected() {
        let mut wire = [0u8; 12];
        wire[..5].copy_from_slice(b"bogus");
        assert!(MessageCommand::from_wire(&wire).is_err());
    }
}
