//! The fee-ordered memory pool.

use crate::events::{MempoolEvent, RemovalReason};
use crate::verify_result::VerifyResult;
use oxneo_core::{Transaction, UInt256};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Default verified-partition capacity.
pub const DEFAULT_CAPACITY: usize = 50_000;
/// Default unverified-partition capacity.
pub const DEFAULT_UNVERIFIED_CAPACITY: usize = 5_000;
/// How long an unverified transaction may wait before expiry.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(30 * 60);

/// Verifies candidate transactions against current chain state. The
/// blockchain implements this; tests substitute stubs.
pub trait TransactionVerifier: Send + Sync {
    /// Full verification of `tx` at the current height.
    fn verify(&self, tx: &Transaction) -> VerifyResult;

    /// Whether `hash` is already persisted in a block.
    fn contains_transaction(&self, hash: &UInt256) -> bool;
}

/// Priority key: ordered ascending so the first element is the cheapest.
/// Iterating in reverse yields block-packing order (fee-per-byte, then
/// absolute fee, then hash ascending).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    fee_per_byte: i64,
    network_fee: i64,
    hash: Reverse<UInt256>,
}

struct PoolItem {
    transaction: Arc<Transaction>,
    key: PoolKey,
    added_at: Instant,
}

impl PoolItem {
    fn new(transaction: Arc<Transaction>, hash: UInt256) -> Self {
        let key = PoolKey {
            fee_per_byte: transaction.fee_per_byte(),
            network_fee: transaction.network_fee,
            hash: Reverse(hash),
        };
        Self {
            transaction,
            key,
            added_at: Instant::now(),
        }
    }
}

/// The dual-partition transaction pool.
///
/// Verified transactions are indexed by hash and by priority; unverified
/// transactions wait for lazy re-verification at lower standing. All
/// bounds hold across both partitions.
pub struct MemoryPool {
    capacity: usize,
    unverified_capacity: usize,
    expiry: Duration,
    verified: HashMap<UInt256, PoolItem>,
    verified_order: BTreeSet<PoolKey>,
    unverified: HashMap<UInt256, PoolItem>,
    unverified_order: BTreeSet<PoolKey>,
    /// Conflict target hash → pooled transactions declaring it.
    conflicts: HashMap<UInt256, HashSet<UInt256>>,
    events: broadcast::Sender<MempoolEvent>,
}

impl MemoryPool {
    /// Creates a pool with the given bounds.
    pub fn new(capacity: usize, unverified_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            capacity,
            unverified_capacity,
            expiry: DEFAULT_EXPIRY,
            verified: HashMap::new(),
            verified_order: BTreeSet::new(),
            unverified: HashMap::new(),
            unverified_order: BTreeSet::new(),
            conflicts: HashMap::new(),
            events,
        }
    }

    /// Subscribes to pool events.
    pub fn subscribe(&self) -> broadcast::Receiver<MempoolEvent> {
        self.events.subscribe()
    }

    /// Verified transaction count.
    pub fn verified_count(&self) -> usize {
        self.verified.len()
    }

    /// Unverified transaction count.
    pub fn unverified_count(&self) -> usize {
        self.unverified.len()
    }

    /// Total transaction count.
    pub fn len(&self) -> usize {
        self.verified.len() + self.unverified.len()
    }

    /// Whether the pool holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `hash` is pooled in either partition.
    pub fn contains(&self, hash: &UInt256) -> bool {
        self.verified.contains_key(hash) || self.unverified.contains_key(hash)
    }

    /// A pooled transaction by hash.
    pub fn get(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        self.verified
            .get(hash)
            .or_else(|| self.unverified.get(hash))
            .map(|item| Arc::clone(&item.transaction))
    }

    /// The verified transactions in block-packing order, up to `count`.
    pub fn take_for_block(&self, count: usize) -> Vec<Arc<Transaction>> {
        self.verified_order
            .iter()
            .rev()
            .take(count)
            .filter_map(|key| self.verified.get(&key.hash.0))
            .map(|item| Arc::clone(&item.transaction))
            .collect()
    }

    /// Every pooled verified transaction hash.
    pub fn verified_hashes(&self) -> Vec<UInt256> {
        self.verified.keys().copied().collect()
    }

    /// Admits a transaction: full verification, conflict resolution, then
    /// capacity enforcement.
    pub fn try_add(&mut self, tx: Transaction, verifier: &dyn TransactionVerifier) -> VerifyResult {
        let hash = match tx.hash() {
            Ok(hash) => hash,
            Err(_) => return VerifyResult::Invalid,
        };
        if self.contains(&hash) {
            return VerifyResult::AlreadyInPool;
        }
        if verifier.contains_transaction(&hash) {
            return VerifyResult::AlreadyExists;
        }
        if tx.verify_state_independent().is_err() {
            return VerifyResult::Invalid;
        }

        // Conflict resolution against the verified partition: the higher
        // fee-per-byte side stays.
        let rivals = self.conflicting_with(&tx, &hash);
        if !rivals.is_empty() {
            let challenger_fee = tx.fee_per_byte();
            if rivals.iter().any(|rival_hash| {
                self.verified
                    .get(rival_hash)
                    .map(|item| item.key.fee_per_byte >= challenger_fee)
                    .unwrap_or(false)
            }) {
                return VerifyResult::Conflict;
            }
            for rival_hash in rivals {
                self.remove_verified(&rival_hash, RemovalReason::Replaced);
            }
        }

        let tx = Arc::new(tx);
        match verifier.verify(&tx) {
            VerifyResult::Succeed => {
                self.insert_verified(hash, Arc::clone(&tx));
                let _ = self
                    .events
                    .send(MempoolEvent::TransactionAdded(Arc::clone(&tx)));
                self.enforce_capacity();
                if self.verified.contains_key(&hash) || self.unverified.contains_key(&hash) {
                    VerifyResult::Succeed
                } else {
                    VerifyResult::OutOfMemory
                }
            }
            // Deferred verification keeps the transaction at lower
            // standing rather than dropping it.
            VerifyResult::InsufficientFunds | VerifyResult::Expired => {
                self.insert_unverified(hash, tx);
                self.enforce_capacity();
                VerifyResult::Succeed
            }
            other => other,
        }
    }

    /// Re-verifies up to `batch_size` unverified transactions, promoting
    /// successes and expiring stale entries.
    pub fn reverify(&mut self, batch_size: usize, verifier: &dyn TransactionVerifier) {
        let candidates: Vec<UInt256> = self
            .unverified_order
            .iter()
            .rev()
            .take(batch_size)
            .map(|key| key.hash.0)
            .collect();
        for hash in candidates {
            let Some(item) = self.unverified.get(&hash) else {
                continue;
            };
            if item.added_at.elapsed() > self.expiry {
                self.remove_unverified(&hash, RemovalReason::Expired);
                continue;
            }
            let tx = Arc::clone(&item.transaction);
            match verifier.verify(&tx) {
                VerifyResult::Succeed => {
                    self.remove_unverified_silent(&hash);
                    self.insert_verified(hash, Arc::clone(&tx));
                    let _ = self.events.send(MempoolEvent::TransactionAdded(tx));
                }
                VerifyResult::InsufficientFunds | VerifyResult::Expired => {
                    // Still not admissible; keep waiting.
                }
                _ => {
                    self.remove_unverified(&hash, RemovalReason::PolicyFail);
                }
            }
        }
    }

    /// Drops every transaction included in a persisted block and demotes
    /// the remaining verified entries for lazy re-verification.
    pub fn on_block_persisted(&mut self, included: &[UInt256]) {
        for hash in included {
            if !self.remove_verified(hash, RemovalReason::Included) {
                self.remove_unverified(hash, RemovalReason::Included);
            }
        }
        // Chain state moved; what was verified is now merely plausible.
        let demote: Vec<UInt256> = self.verified.keys().copied().collect();
        for hash in demote {
            if let Some(item) = self.verified.remove(&hash) {
                self.verified_order.remove(&item.key);
                self.unverified_order.insert(item.key.clone());
                self.unverified.insert(hash, item);
            }
        }
        self.enforce_capacity();
    }

    fn conflicting_with(&self, tx: &Transaction, hash: &UInt256) -> Vec<UInt256> {
        let mut rivals = HashSet::new();
        // Pooled transactions that declared a conflict with this one.
        if let Some(declarers) = self.conflicts.get(hash) {
            rivals.extend(declarers.iter().copied());
        }
        // Pooled transactions this one declares a conflict with.
        for target in tx.conflicts() {
            if self.verified.contains_key(&target) {
                rivals.insert(target);
            }
        }
        rivals.retain(|rival| self.verified.contains_key(rival));
        rivals.into_iter().collect()
    }

    fn insert_verified(&mut self, hash: UInt256, tx: Arc<Transaction>) {
        for target in tx.conflicts() {
            self.conflicts.entry(target).or_default().insert(hash);
        }
        let item = PoolItem::new(tx, hash);
        self.verified_order.insert(item.key.clone());
        self.verified.insert(hash, item);
    }

    fn insert_unverified(&mut self, hash: UInt256, tx: Arc<Transaction>) {
        for target in tx.conflicts() {
            self.conflicts.entry(target).or_default().insert(hash);
        }
        let item = PoolItem::new(tx, hash);
        self.unverified_order.insert(item.key.clone());
        self.unverified.insert(hash, item);
    }

    fn unlink_conflicts(&mut self, hash: &UInt256, tx: &Transaction) {
        for target in tx.conflicts() {
            if let Some(declarers) = self.conflicts.get_mut(&target) {
                declarers.remove(hash);
                if declarers.is_empty() {
                    self.conflicts.remove(&target);
                }
            }
        }
    }

    fn remove_verified(&mut self, hash: &UInt256, reason: RemovalReason) -> bool {
        if let Some(item) = self.verified.remove(hash) {
            self.verified_order.remove(&item.key);
            self.unlink_conflicts(hash, &item.transaction);
            let _ = self.events.send(MempoolEvent::TransactionRemoved {
                hash: *hash,
                reason,
            });
            true
        } else {
            false
        }
    }

    fn remove_unverified(&mut self, hash: &UInt256, reason: RemovalReason) -> bool {
        if let Some(item) = self.unverified.remove(hash) {
            self.unverified_order.remove(&item.key);
            self.unlink_conflicts(hash, &item.transaction);
            let _ = self.events.send(MempoolEvent::TransactionRemoved {
                hash: *hash,
                reason,
            });
            true
        } else {
            false
        }
    }

    fn remove_unverified_silent(&mut self, hash: &UInt256) {
        if let Some(item) = self.unverified.remove(hash) {
            self.unverified_order.remove(&item.key);
            self.unlink_conflicts(hash, &item.transaction);
        }
    }

    /// Evicts the cheapest transactions while either partition exceeds its
    /// bound; the unverified partition yields first.
    fn enforce_capacity(&mut self) {
        while self.unverified.len() > self.unverified_capacity {
            let Some(cheapest) = self.unverified_order.iter().next().cloned() else {
                break;
            };
            self.remove_unverified(&cheapest.hash.0, RemovalReason::LowPriority);
        }
        while self.verified.len() > self.capacity {
            let Some(cheapest) = self.verified_order.iter().next().cloned() else {
                break;
            };
            self.remove_verified(&cheapest.hash.0, RemovalReason::LowPriority);
        }
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_UNVERIFIED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_core::{Signer, TransactionAttribute, UInt160, Witness};

    struct AcceptAll;

    impl TransactionVerifier for AcceptAll {
        fn verify(&self, _tx: &Transaction) -> VerifyResult {
            VerifyResult::Succeed
        }
        fn contains_transaction(&self, _hash: &UInt256) -> bool {
            false
        }
    }

    fn tx_with_fee(nonce: u32, network_fee: i64) -> Transaction {
        Transaction {
            nonce,
            network_fee,
            valid_until_block: 100,
            signers: vec![Signer::called_by_entry(UInt160::from_bytes([1u8; 20]))],
            script: vec![0x11],
            witnesses: vec![Witness::new(Vec::new(), vec![0x11])],
            ..Default::default()
        }
    }

    #[test]
    fn add_and_contains() {
        let mut pool = MemoryPool::default();
        let tx = tx_with_fee(1, 100_000);
        let hash = tx.hash().unwrap();
        assert_eq!(pool.try_add(tx, &AcceptAll), VerifyResult::Succeed);
        assert!(pool.contains(&hash));
        assert_eq!(pool.verified_count(), 1);
    }

    #[test]
    fn duplicates_rejected() {
        let mut pool = MemoryPool::default();
        let tx = tx_with_fee(1, 100_000);
        assert_eq!(pool.try_add(tx.clone(), &AcceptAll), VerifyResult::Succeed);
        assert_eq!(pool.try_add(tx, &AcceptAll), VerifyResult::AlreadyInPool);
    }

    #[test]
    fn block_packing_order_is_fee_descending() {
        let mut pool = MemoryPool::default();
        for (nonce, fee) in [(1u32, 50_000i64), (2, 300_000), (3, 100_000)] {
            assert_eq!(pool.try_add(tx_with_fee(nonce, fee), &AcceptAll), VerifyResult::Succeed);
        }
        let picked = pool.take_for_block(3);
        let fees: Vec<i64> = picked.iter().map(|tx| tx.network_fee).collect();
        assert_eq!(fees, vec![300_000, 100_000, 50_000]);
    }

    #[test]
    fn conflict_replacement_prefers_higher_fee() {
        let mut pool = MemoryPool::default();
        let a = tx_with_fee(1, 100_000);
        let a_hash = a.hash().unwrap();
        assert_eq!(pool.try_add(a, &AcceptAll), VerifyResult::Succeed);

        // B declares a conflict with A and pays double.
        let mut b = tx_with_fee(2, 200_000);
        b.attributes = vec![TransactionAttribute::Conflicts { hash: a_hash }];
        let mut events = pool.subscribe();
        assert_eq!(pool.try_add(b.clone(), &AcceptAll), VerifyResult::Succeed);

        assert!(!pool.contains(&a_hash));
        assert!(pool.contains(&b.hash().unwrap()));
        assert_eq!(pool.len(), 1);
        match events.try_recv().unwrap() {
            MempoolEvent::TransactionRemoved { hash, reason } => {
                assert_eq!(hash, a_hash);
                assert_eq!(reason, RemovalReason::Replaced);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn conflict_loses_against_better_fee() {
        let mut pool = MemoryPool::default();
        let a = tx_with_fee(1, 200_000);
        let a_hash = a.hash().unwrap();
        assert_eq!(pool.try_add(a, &AcceptAll), VerifyResult::Succeed);

        let mut b = tx_with_fee(2, 100_000);
        b.attributes = vec![TransactionAttribute::Conflicts { hash: a_hash }];
        assert_eq!(pool.try_add(b, &AcceptAll), VerifyResult::Conflict);
        assert!(pool.contains(&a_hash));
    }

    #[test]
    fn capacity_evicts_lowest_priority() {
        let mut pool = MemoryPool::new(2, 2);
        for (nonce, fee) in [(1u32, 300_000i64), (2, 200_000), (3, 100_000)] {
            pool.try_add(tx_with_fee(nonce, fee), &AcceptAll);
        }
        assert_eq!(pool.verified_count(), 2);
        // The cheapest fell out.
        let fees: Vec<i64> = pool
            .take_for_block(10)
            .iter()
            .map(|tx| tx.network_fee)
            .collect();
        assert_eq!(fees, vec![300_000, 200_000]);
    }

    #[test]
    fn block_persistence_drains_included() {
        let mut pool = MemoryPool::default();
        let a = tx_with_fee(1, 100_000);
        let a_hash = a.hash().unwrap();
        let b = tx_with_fee(2, 100_000);
        let b_hash = b.hash().unwrap();
        pool.try_add(a, &AcceptAll);
        pool.try_add(b, &AcceptAll);

        pool.on_block_persisted(&[a_hash]);
        assert!(!pool.contains(&a_hash));
        // The survivor was demoted for re-verification.
        assert_eq!(pool.verified_count(), 0);
        assert!(pool.contains(&b_hash));
        assert_eq!(pool.unverified_count(), 1);

        pool.reverify(10, &AcceptAll);
        assert_eq!(pool.verified_count(), 1);
    }

    #[test]
    fn capacity_invariant_holds() {
        let mut pool = MemoryPool::new(3, 2);
        for nonce in 0..20u32 {
            pool.try_add(tx_with_fee(nonce, 100_000 + nonce as i64), &AcceptAll);
        }
        assert!(pool.len() <= 3 + 2);
    }
}
