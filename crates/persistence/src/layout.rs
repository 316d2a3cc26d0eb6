//! The chain's persistent key layout.
//!
//! Every datum the node persists lives under one of these one-byte
//! section prefixes. Keys sort lexicographically, so each section is a
//! contiguous, range-scannable region.

use crate::storage_key::StorageKey;
use oxneo_core::{UInt160, UInt256};

/// `0x01 | block_hash` → serialized block.
pub const PREFIX_BLOCK: u8 = 0x01;
/// `0x02 | block_hash` → serialized header.
pub const PREFIX_HEADER: u8 = 0x02;
/// `0x04 | u32_be index` → block hash.
pub const PREFIX_INDEX_TO_HASH: u8 = 0x04;
/// `0x05 | block_hash` → next block hash.
pub const PREFIX_NEXT_BLOCK: u8 = 0x05;
/// `0x0B | tag` → node-local service state (consensus commit replay).
pub const PREFIX_SERVICE_STATE: u8 = 0x0b;
/// `0x0C | contract_id | key` → storage item.
pub const PREFIX_STORAGE: u8 = 0x0c;
/// `0x0D` → next contract id.
pub const PREFIX_NEXT_CONTRACT_ID: u8 = 0x0d;
/// `0x0E | script_hash` → contract state.
pub const PREFIX_CONTRACT: u8 = 0x0e;
/// `0x0F` → current block index and hash.
pub const PREFIX_CURRENT_BLOCK: u8 = 0x0f;

/// Key for a block body.
pub fn block_key(hash: &UInt256) -> Vec<u8> {
    prefixed(PREFIX_BLOCK, hash.as_bytes())
}

/// Key for a block header.
pub fn header_key(hash: &UInt256) -> Vec<u8> {
    prefixed(PREFIX_HEADER, hash.as_bytes())
}

/// Key mapping a height to its block hash. Big-endian index keeps the
/// section ordered by height.
pub fn index_key(index: u32) -> Vec<u8> {
    prefixed(PREFIX_INDEX_TO_HASH, &index.to_be_bytes())
}

/// Key for the child pointer of a block.
pub fn next_block_key(hash: &UInt256) -> Vec<u8> {
    prefixed(PREFIX_NEXT_BLOCK, hash.as_bytes())
}

/// Key for a contract's storage entry.
pub fn storage_key(key: &StorageKey) -> Vec<u8> {
    prefixed(PREFIX_STORAGE, &key.to_raw())
}

/// Prefix of every storage entry of one contract.
pub fn storage_prefix(contract_id: i32) -> Vec<u8> {
    prefixed(PREFIX_STORAGE, &StorageKey::prefix_for(contract_id))
}

/// Key for a deployed contract's state.
pub fn contract_key(script_hash: &UInt160) -> Vec<u8> {
    prefixed(PREFIX_CONTRACT, script_hash.as_bytes())
}

/// Key for the next contract id counter.
pub fn next_contract_id_key() -> Vec<u8> {
    vec![PREFIX_NEXT_CONTRACT_ID]
}

/// Key for the current block pointer.
pub fn current_block_key() -> Vec<u8> {
    vec![PREFIX_CURRENT_BLOCK]
}

/// Key for a node-local service blob, e.g. the dBFT commit record.
pub fn service_state_key(tag: &str) -> Vec<u8> {
    prefixed(PREFIX_SERVICE_STATE, tag.as_bytes())
}

fn prefixed(prefix: u8, body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + body.len());
    key.push(prefix);
    key.extend_from_slice(body);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_keys_sort_by_height() {
        assert!(index_key(1) < index_key(2));
        assert!(index_key(255) < index_key(256));
        assert!(index_key(0x0100_0000) < index_key(0x0200_0000));
    }

    #[test]
    fn storage_keys_group_by_contract() {
        let a = storage_key(&StorageKey::new(1, b"z".to_vec()));
        let b = storage_key(&StorageKey::new(1, b"a".to_vec()));
        let prefix = storage_prefix(1);
        assert!(a.starts_with(&prefix));
        assert!(b.starts_with(&prefix));
    }

    #[test]
    fn sections_do_not_collide() {
        let hash = UInt256::zero();
        assert_ne!(block_key(&hash), header_key(&hash));
        assert_ne!(block_key(&hash), next_block_key(&hash));
    }
}
