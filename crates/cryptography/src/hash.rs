//! Hash helpers shared by every subsystem.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice. This is the block, transaction and checksum hash.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}

/// Plain RIPEMD-160.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD-160 of SHA-256. This is the script-hash function.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// First four bytes of `hash256`, used as the message frame checksum.
pub fn checksum(data: &[u8]) -> u32 {
    let h = hash256(data);
    u32::from_le_bytes([h[0], h[1], h[2], h[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_is_known_constant() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash256_empty_is_known_constant() {
        assert_eq!(
            hex::encode(hash256(b"")),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn hash160_length() {
        assert_eq!(hash160(b"script").len(), 20);
    }

    #[test]
    fn checksum_uses_first_four_bytes() {
        let h = hash256(b"payload");
        assert_eq!(
            checksum(b"payload"),
            u32::from_le_bytes([h[0], h[1], h[2], h[3]])
        );
    }
}
