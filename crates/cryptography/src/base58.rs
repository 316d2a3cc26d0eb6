//! Base58Check addresses.

use crate::error::{CryptoError, CryptoResult};
use crate::hash::hash256;

/// Address version byte for this protocol (`N`-prefixed addresses).
pub const ADDRESS_VERSION: u8 = 0x35;

/// Encodes `payload` with a 4-byte double-SHA checksum suffix.
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = hash256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decodes a Base58Check string, verifying the checksum.
pub fn base58check_decode(encoded: &str) -> CryptoResult<Vec<u8>> {
    let data = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
    if data.len() < 5 {
        return Err(CryptoError::InvalidAddress("too short".into()));
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    if hash256(payload)[..4] != *checksum {
        return Err(CryptoError::InvalidAddress("checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}

/// Renders a 20-byte script hash as an address string.
pub fn address_from_script_hash(script_hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(script_hash);
    base58check_encode(&payload)
}

/// Parses an address string back into a 20-byte script hash.
pub fn script_hash_from_address(address: &str) -> CryptoResult<[u8; 20]> {
    let payload = base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(CryptoError::InvalidAddress(format!(
            "payload length {}",
            payload.len()
        )));
    }
    if payload[0] != ADDRESS_VERSION {
        return Err(CryptoError::InvalidAddress(format!(
            "version byte 0x{:02x}",
            payload[0]
        )));
    }
    Ok(payload[1..].try_into().expect("20 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let script_hash = [0xabu8; 20];
        let address = address_from_script_hash(&script_hash);
        assert!(address.starts_with('N'));
        assert_eq!(script_hash_from_address(&address).unwrap(), script_hash);
    }

    #[test]
    fn corrupted_address_rejected() {
        let address = address_from_script_hash(&[1u8; 20]);
        let mut corrupted = address.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'1' { b'2' } else { b'1' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(script_hash_from_address(&corrupted).is_err());
    }

    #[test]
    fn garbage_rejected() {
        assert!(script_hash_from_address("not-an-address!").is_err());
        assert!(script_hash_from_address("").is_err());
    }
}
