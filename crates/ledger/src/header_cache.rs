//! Verified headers ahead of the block tip, feeding header-first sync.

use oxneo_core::{Header, UInt256};
use std::collections::VecDeque;

/// Maximum headers kept ahead of the tip.
pub const MAX_CACHED_HEADERS: usize = 10_000;

/// A bounded FIFO of headers whose bodies are still being fetched.
///
/// Headers enter in strict index order, each linking to its predecessor;
/// entries are pruned as their blocks persist.
pub struct HeaderCache {
    headers: VecDeque<Header>,
    /// Index of the first cached header.
    start_index: u32,
}

impl HeaderCache {
    /// Creates an empty cache starting after `tip_index`.
    pub fn new(tip_index: u32) -> Self {
        Self {
            headers: VecDeque::new(),
            start_index: tip_index + 1,
        }
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Index of the next header the cache will accept.
    pub fn next_index(&self) -> u32 {
        self.start_index + self.headers.len() as u32
    }

    /// The hash the next accepted header must link to, if known.
    pub fn last_hash(&self) -> Option<UInt256> {
        self.headers.back().and_then(|h| h.hash().ok())
    }

    /// Appends headers, requiring contiguous indices and correct
    /// predecessor linkage. Returns how many were accepted.
    pub fn add_headers(&mut self, headers: &[Header], tip_hash: &UInt256) -> usize {
        let mut accepted = 0;
        for header in headers {
            if self.headers.len() >= MAX_CACHED_HEADERS {
                break;
            }
            if header.index != self.next_index() {
                break;
            }
            let expected_prev = match self.last_hash() {
                Some(hash) => hash,
                None => *tip_hash,
            };
            if header.prev_hash != expected_prev {
                break;
            }
            self.headers.push_back(header.clone());
            accepted += 1;
        }
        accepted
    }

    /// The cached header at `index`.
    pub fn get(&self, index: u32) -> Option<&Header> {
        if index < self.start_index {
            return None;
        }
        self.headers.get((index - self.start_index) as usize)
    }

    /// Drops headers up to and including `persisted_index`.
    pub fn prune_to(&mut self, persisted_index: u32) {
        while let Some(front) = self.headers.front() {
            if front.index <= persisted_index {
                self.headers.pop_front();
                self.start_index += 1;
            } else {
                break;
            }
        }
        if self.headers.is_empty() {
            self.start_index = self.start_index.max(persisted_index + 1);
        }
    }

    /// Resets the cache to start after a new tip (e.g. after a reorg-free
    /// restart).
    pub fn reset(&mut self, tip_index: u32) {
        self.headers.clear();
        self.start_index = tip_index + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_core::Witness;

    fn header_at(index: u32, prev_hash: UInt256) -> Header {
        Header {
            version: 0,
            prev_hash,
            merkle_root: UInt256::zero(),
            timestamp: 1000 + index as u64,
            nonce: 0,
            index,
            primary_index: 0,
            next_consensus: Default::default(),
            witness: Witness::new(Vec::new(), vec![0x11]),
        }
    }

    fn chain_from(tip_hash: UInt256, start: u32, count: u32) -> Vec<Header> {
        let mut headers = Vec::new();
        let mut prev = tip_hash;
        for index in start..start + count {
            let header = header_at(index, prev);
            prev = header.hash().unwrap();
            headers.push(header);
        }
        headers
    }

    #[test]
    fn accepts_contiguous_linked_headers() {
        let tip_hash = UInt256::from_bytes([1u8; 32]);
        let mut cache = HeaderCache::new(0);
        let headers = chain_from(tip_hash, 1, 5);
        assert_eq!(cache.add_headers(&headers, &tip_hash), 5);
        assert_eq!(cache.next_index(), 6);
        assert!(cache.get(3).is_some());
        assert!(cache.get(6).is_none());
    }

    #[test]
    fn rejects_gap() {
        let tip_hash = UInt256::from_bytes([1u8; 32]);
        let mut cache = HeaderCache::new(0);
        let headers = chain_from(tip_hash, 2, 3);
        assert_eq!(cache.add_headers(&headers, &tip_hash), 0);
    }

    #[test]
    fn rejects_broken_linkage() {
        let tip_hash = UInt256::from_bytes([1u8; 32]);
        let mut cache = HeaderCache::new(0);
        let mut headers = chain_from(tip_hash, 1, 3);
        headers[1].prev_hash = UInt256::from_bytes([9u8; 32]);
        // The first header links fine; the rest stop at the break.
        assert_eq!(cache.add_headers(&headers, &tip_hash), 1);
    }

    #[test]
    fn prune_advances_start() {
        let tip_hash = UInt256::from_bytes([1u8; 32]);
        let mut cache = HeaderCache::new(0);
        cache.add_headers(&chain_from(tip_hash, 1, 5), &tip_hash);
        cache.prune_to(3);
        assert!(cache.get(3).is_none());
        assert!(cache.get(4).is_some());
        assert_eq!(cache.len(), 2);
    }
}
