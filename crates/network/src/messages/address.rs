//! Peer address gossip payloads.

use oxneo_io::serializable::var_int_size;
use oxneo_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// Maximum addresses per `addr` message.
pub const MAX_ADDRESSES_PER_MESSAGE: usize = 200;

/// One known peer endpoint with freshness and service bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkAddress {
    /// Seconds since the epoch when the peer was last seen.
    pub timestamp: u32,
    /// Service bitmask.
    pub services: u64,
    /// Address, stored IPv6-mapped.
    pub address: Ipv6Addr,
    /// TCP port, big-endian on the wire.
    pub port: u16,
}

impl NetworkAddress {
    /// Wraps a socket address.
    pub fn from_socket_addr(addr: SocketAddr, timestamp: u32, services: u64) -> Self {
        let address = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            timestamp,
            services,
            address,
            port: addr.port(),
        }
    }

    /// Converts back to a socket address, preferring IPv4 form.
    pub fn socket_addr(&self) -> SocketAddr {
        match self.address.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), self.port),
            None => SocketAddr::new(IpAddr::V6(self.address), self.port),
        }
    }
}

impl Serializable for NetworkAddress {
    fn size(&self) -> usize {
        4 + 8 + 16 + 2
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(self.timestamp);
        writer.write_u64(self.services);
        writer.write_bytes(&self.address.octets());
        // Port is big-endian, a convention inherited from Bitcoin.
        writer.write_bytes(&self.port.to_be_bytes());
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let timestamp = reader.read_u32()?;
        let services = reader.read_u64()?;
        let octets = reader.read_array::<16>()?;
        let port_bytes = reader.read_array::<2>()?;
        Ok(Self {
            timestamp,
            services,
            address: Ipv6Addr::from(octets),
            port: u16::from_be_bytes(port_bytes),
        })
    }
}

/// The `addr` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrPayload {
    pub addresses: Vec<NetworkAddress>,
}

impl Serializable for AddrPayload {
    fn size(&self) -> usize {
        var_int_size(self.addresses.len() as u64)
            + self.addresses.iter().map(Serializable::size).sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_serializable_list(&self.addresses)?;
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            addresses: reader
                .read_serializable_list::<NetworkAddress>(MAX_ADDRESSES_PER_MESSAGE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4_mapped() {
        let addr: SocketAddr = "10.0.0.7:10333".parse().unwrap();
        let address = NetworkAddress::from_socket_addr(addr, 1234, 1);
        let bytes = address.to_bytes().unwrap();
        let parsed = NetworkAddress::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.socket_addr(), addr);
    }

    #[test]
    fn addr_payload_round_trip() {
        let payload = AddrPayload {
            addresses: vec![NetworkAddress::from_socket_addr(
                "127.0.0.1:20333".parse().unwrap(),
                7,
                1,
            )],
        };
        let bytes = payload.to_bytes().unwrap();
        assert_eq!(AddrPayload::from_bytes(&bytes).unwrap(), payload);
    }
}
