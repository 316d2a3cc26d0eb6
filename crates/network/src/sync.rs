//! Header-first block synchronization.

use oxneo_core::{Block, Header, UInt256};
use oxneo_ledger::{Blockchain, HeaderCache, LedgerError};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Blocks requested but not yet received, bounded to keep memory flat.
const MAX_IN_FLIGHT: usize = 500;

/// Drives catching up: headers arrive in batches into the cache, bodies
/// are fetched in parallel, and application is strictly sequential by
/// index.
pub struct SyncManager {
    blockchain: Arc<Blockchain>,
    headers: HeaderCache,
    /// Bodies received ahead of the next index to apply.
    pending_blocks: BTreeMap<u32, Block>,
    /// Hashes currently asked for via `getdata`.
    in_flight: HashSet<UInt256>,
}

impl SyncManager {
    /// Creates a manager positioned at the chain's tip.
    pub fn new(blockchain: Arc<Blockchain>) -> Self {
        let headers = HeaderCache::new(blockchain.height());
        Self {
            blockchain,
            headers,
            pending_blocks: BTreeMap::new(),
            in_flight: HashSet::new(),
        }
    }

    /// Hash from which to request more headers.
    pub fn header_request_start(&self) -> UInt256 {
        self.headers
            .last_hash()
            .unwrap_or_else(|| self.blockchain.current_hash())
    }

    /// Whether more headers are wanted from peers at `peer_height`.
    pub fn wants_headers(&self, peer_height: u32) -> bool {
        self.headers.next_index() <= peer_height
    }

    /// Ingests a header batch; returns how many were accepted.
    pub fn add_headers(&mut self, headers: &[Header]) -> usize {
        let tip_hash = self.blockchain.current_hash();
        let accepted = self.headers.add_headers(headers, &tip_hash);
        if accepted > 0 {
            tracing::debug!(accepted, next = self.headers.next_index(), "headers cached");
        }
        accepted
    }

    /// Block hashes whose bodies should be fetched now.
    pub fn blocks_to_request(&mut self, limit: usize) -> Vec<UInt256> {
        let mut wanted = Vec::new();
        let next_to_apply = self.blockchain.height() + 1;
        let mut index = next_to_apply;
        while wanted.len() < limit && self.in_flight.len() + wanted.len() < MAX_IN_FLIGHT {
            let Some(header) = self.headers.get(index) else {
                break;
            };
            let Ok(hash) = header.hash() else {
                break;
            };
            if !self.pending_blocks.contains_key(&index) && !self.in_flight.contains(&hash) {
                wanted.push(hash);
            }
            index += 1;
        }
        for hash in &wanted {
            self.in_flight.insert(*hash);
        }
        wanted
    }

    /// Ingests a block body; applies every contiguous pending block and
    /// returns how many were persisted.
    pub fn on_block(&mut self, block: Block) -> usize {
        let Ok(hash) = block.hash() else {
            return 0;
        };
        self.in_flight.remove(&hash);
        let index = block.index();
        if index <= self.blockchain.height() {
            return 0;
        }
        self.pending_blocks.insert(index, block);
        self.apply_ready()
    }

    fn apply_ready(&mut self) -> usize {
        let mut applied = 0;
        loop {
            let next = self.blockchain.height() + 1;
            let Some(block) = self.pending_blocks.remove(&next) else {
                break;
            };
            match self.blockchain.persist_block(&block) {
                Ok(()) => {
                    applied += 1;
                    self.headers.prune_to(next);
                }
                Err(LedgerError::InvalidBlock(reason)) => {
                    tracing::warn!(index = next, ?reason, "synced block rejected");
                    // The cached chain beyond this point is suspect.
                    self.headers.reset(self.blockchain.height());
                    self.pending_blocks.clear();
                    self.in_flight.clear();
                    break;
                }
                Err(error) => {
                    tracing::error!(index = next, %error, "block persistence failed");
                    self.pending_blocks.insert(next, block);
                    break;
                }
            }
        }
        applied
    }

    /// Number of bodies waiting for a predecessor.
    pub fn pending_count(&self) -> usize {
        self.pending_blocks.len()
    }

    /// Whether this hash was requested by the sync path.
    pub fn is_in_flight(&self, hash: &UInt256) -> bool {
        self.in_flight.contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_config::ProtocolSettings;
    use oxneo_core::Witness;
    use oxneo_persistence::MemoryStore;

    fn chain() -> Arc<Blockchain> {
        Arc::new(Blockchain::new(Arc::new(MemoryStore::new()), ProtocolSettings::default()).unwrap())
    }

    fn make_blocks(blockchain: &Blockchain, count: u32) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut prev_hash = blockchain.current_hash();
        let mut prev_timestamp = blockchain
            .get_header(&prev_hash)
            .unwrap()
            .timestamp;
        for index in 1..=count {
            let mut block = Block {
                header: Header {
                    version: 0,
                    prev_hash,
                    merkle_root: UInt256::zero(),
                    timestamp: prev_timestamp + 1,
                    nonce: index as u64,
                    index,
                    primary_index: 0,
                    next_consensus: Default::default(),
                    witness: Witness::new(Vec::new(), vec![0x11]),
                },
                transactions: Vec::new(),
            };
            block.header.merkle_root = block.compute_merkle_root().unwrap();
            prev_hash = block.hash().unwrap();
            prev_timestamp = block.header.timestamp;
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn headers_then_bodies_in_order() {
        let blockchain = chain();
        let blocks = make_blocks(&blockchain, 3);
        let mut sync = SyncManager::new(blockchain.clone());

        let headers: Vec<Header> = blocks.iter().map(|b| b.header.clone()).collect();
        assert_eq!(sync.add_headers(&headers), 3);

        let wanted = sync.blocks_to_request(10);
        assert_eq!(wanted.len(), 3);

        // Bodies arrive out of order; application stays sequential.
        assert_eq!(sync.on_block(blocks[2].clone()), 0);
        assert_eq!(sync.on_block(blocks[0].clone()), 1);
        assert_eq!(sync.on_block(blocks[1].clone()), 2);
        assert_eq!(blockchain.height(), 3);
        assert_eq!(sync.pending_count(), 0);
    }

    #[test]
    fn duplicate_body_ignored() {
        let blockchain = chain();
        let blocks = make_blocks(&blockchain, 1);
        let mut sync = SyncManager::new(blockchain.clone());
        sync.add_headers(&[blocks[0].header.clone()]);
        sync.blocks_to_request(10);
        assert_eq!(sync.on_block(blocks[0].clone()), 1);
        assert_eq!(sync.on_block(blocks[0].clone()), 0);
        assert_eq!(blockchain.height(), 1);
    }

    #[test]
    fn wants_headers_tracks_peer_height() {
        let blockchain = chain();
        let sync = SyncManager::new(blockchain);
        assert!(sync.wants_headers(10));
        assert!(!sync.wants_headers(0));
    }
}
