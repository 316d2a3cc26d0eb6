//! In-memory store backend.

use crate::store::{SeekDirection, Snapshot, Store, StoreView};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A `BTreeMap`-backed store. The default engine for tests and private
/// chains; snapshots clone the map, which is acceptable at those sizes.
#[derive(Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn seek_map(
    entries: &BTreeMap<Vec<u8>, Vec<u8>>,
    key_or_prefix: &[u8],
    direction: SeekDirection,
) -> Vec<(Vec<u8>, Vec<u8>)> {
    match direction {
        SeekDirection::Forward => entries
            .range(key_or_prefix.to_vec()..)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        SeekDirection::Backward => entries
            .range(..=key_or_prefix.to_vec())
            .rev()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

impl StoreView for MemoryStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.read().get(key).cloned()
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        Box::new(seek_map(&self.entries.read(), key_or_prefix, direction).into_iter())
    }
}

impl Store for MemoryStore {
    fn snapshot(&self) -> Box<dyn Snapshot> {
        Box::new(MemorySnapshot {
            view: self.entries.read().clone(),
            writes: Vec::new(),
            store: Arc::clone(&self.entries),
        })
    }

    fn put_direct(&self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.write().insert(key, value);
    }
}

enum WriteOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A point-in-time view with a write batch.
struct MemorySnapshot {
    view: BTreeMap<Vec<u8>, Vec<u8>>,
    writes: Vec<WriteOp>,
    store: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl StoreView for MemorySnapshot {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.view.get(key).cloned()
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        Box::new(seek_map(&self.view, key_or_prefix, direction).into_iter())
    }
}

impl Snapshot for MemorySnapshot {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.push(WriteOp::Put(key, value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.writes.push(WriteOp::Delete(key.to_vec()));
    }

    fn commit(&mut self) {
        let mut store = self.store.write();
        for op in self.writes.drain(..) {
            match op {
                WriteOp::Put(key, value) => {
                    store.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    store.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let store = MemoryStore::new();
        store.put_direct(b"a".to_vec(), b"1".to_vec());
        assert_eq!(store.try_get(b"a"), Some(b"1".to_vec()));
        assert!(store.contains(b"a"));
        assert!(!store.contains(b"b"));
    }

    #[test]
    fn snapshot_isolation() {
        let store = MemoryStore::new();
        store.put_direct(b"a".to_vec(), b"1".to_vec());
        let snapshot = store.snapshot();
        store.put_direct(b"b".to_vec(), b"2".to_vec());
        // The snapshot does not see writes made after it was opened.
        assert!(snapshot.try_get(b"b").is_none());
        assert_eq!(snapshot.try_get(b"a"), Some(b"1".to_vec()));
    }

    #[test]
    fn snapshot_commit_is_atomic_batch() {
        let store = MemoryStore::new();
        store.put_direct(b"a".to_vec(), b"1".to_vec());
        let mut snapshot = store.snapshot();
        snapshot.put(b"b".to_vec(), b"2".to_vec());
        snapshot.delete(b"a");
        // Nothing visible before commit.
        assert!(store.contains(b"a"));
        assert!(!store.contains(b"b"));
        snapshot.commit();
        assert!(!store.contains(b"a"));
        assert_eq!(store.try_get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn seek_directions() {
        let store = MemoryStore::new();
        for key in [&b"aa"[..], b"ab", b"b", b"ca"] {
            store.put_direct(key.to_vec(), b"v".to_vec());
        }
        let forward: Vec<Vec<u8>> = store
            .seek(b"ab", SeekDirection::Forward)
            .map(|(k, _)| k)
            .collect();
        assert_eq!(forward, vec![b"ab".to_vec(), b"b".to_vec(), b"ca".to_vec()]);

        let backward: Vec<Vec<u8>> = store
            .seek(b"b", SeekDirection::Backward)
            .map(|(k, _)| k)
            .collect();
        assert_eq!(backward, vec![b"b".to_vec(), b"ab".to_vec(), b"aa".to_vec()]);
    }

    #[test]
    fn find_prefix_stops_at_boundary() {
        let store = MemoryStore::new();
        for key in [&b"aa"[..], b"ab", b"b"] {
            store.put_direct(key.to_vec(), b"v".to_vec());
        }
        let found: Vec<Vec<u8>> = store.find_prefix(b"a").map(|(k, _)| k).collect();
        assert_eq!(found, vec![b"aa".to_vec(), b"ab".to_vec()]);
    }
}
