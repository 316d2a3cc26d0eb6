//! Deduplication cache for relayed inventory.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A bounded, time-limited set of recently seen keys. Relay paths consult
/// it so a flooded inventory item is forwarded at most once.
pub struct RelayCache<K> {
    entries: HashMap<K, Instant>,
    order: VecDeque<K>,
    capacity: usize,
    ttl: Duration,
}

impl<K: Clone + Eq + Hash> RelayCache<K> {
    /// Creates a cache holding up to `capacity` keys for `ttl`.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    /// Records a key; returns `true` when it was not already present (and
    /// so should be relayed).
    pub fn try_add(&mut self, key: K) -> bool {
        self.evict_expired();
        if self.contains(&key) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key.clone(), Instant::now());
        self.order.push_back(key);
        true
    }

    /// Whether a key is present and fresh.
    pub fn contains(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .map(|seen| seen.elapsed() <= self.ttl)
            .unwrap_or(false)
    }

    /// Number of (possibly stale) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        while let Some(front) = self.order.front() {
            let expired = self
                .entries
                .get(front)
                .map(|seen| seen.elapsed() > self.ttl)
                .unwrap_or(true);
            if expired {
                let key = self.order.pop_front().expect("front exists");
                self.entries.remove(&key);
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_add_wins_second_is_duplicate() {
        let mut cache = RelayCache::new(10, Duration::from_secs(60));
        assert!(cache.try_add("h1"));
        assert!(!cache.try_add("h1"));
        assert!(cache.try_add("h2"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = RelayCache::new(2, Duration::from_secs(60));
        cache.try_add(1);
        cache.try_add(2);
        cache.try_add(3);
        assert!(!cache.contains(&1));
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn expired_entries_can_be_readded() {
        let mut cache = RelayCache::new(10, Duration::from_millis(0));
        assert!(cache.try_add("h"));
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.try_add("h"));
    }
}
