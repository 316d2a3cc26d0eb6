//! The mutation-tracking cache over a snapshot.

use crate::error::{StorageError, StorageResult};
use crate::storage_item::StorageItem;
use crate::storage_key::StorageKey;
use crate::store::{SeekDirection, Snapshot, StoreView};
use std::collections::BTreeMap;

/// How a tracked entry differs from the base view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Read-cached, identical to the base.
    None,
    /// New key, absent from the base.
    Added,
    /// Present in the base with a different value.
    Changed,
    /// Present in the base, removed here.
    Deleted,
}

#[derive(Debug, Clone)]
struct TrackedEntry {
    /// `None` only when `state` is `Deleted`.
    value: Option<Vec<u8>>,
    state: TrackState,
}

enum CacheBase {
    /// The root cache writes into a store snapshot.
    Snapshot(Box<dyn Snapshot>),
    /// A nested cache writes into its parent, modeling a savepoint.
    Nested(Box<StoreCache>),
}

impl StoreView for CacheBase {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self {
            CacheBase::Snapshot(snapshot) => snapshot.try_get(key),
            CacheBase::Nested(parent) => parent.try_get(key),
        }
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        match self {
            CacheBase::Snapshot(snapshot) => snapshot.seek(key_or_prefix, direction),
            CacheBase::Nested(parent) => parent.seek(key_or_prefix, direction),
        }
    }
}

/// A write-tracking overlay. Reads prefer tracked entries and fall back to
/// the base; writes stay in the tracked map until [`StoreCache::commit`]
/// applies them as one unit.
///
/// Nesting: [`StoreCache::create_snapshot`] consumes the cache and returns
/// a child whose base is the parent. Committing the child folds its
/// changes into the parent; abandoning it discards them. Either way the
/// parent comes back out.
pub struct StoreCache {
    base: CacheBase,
    tracked: BTreeMap<Vec<u8>, TrackedEntry>,
}

impl StoreCache {
    /// Creates a cache over a store snapshot.
    pub fn new(snapshot: Box<dyn Snapshot>) -> Self {
        Self {
            base: CacheBase::Snapshot(snapshot),
            tracked: BTreeMap::new(),
        }
    }

    /// Creates a child cache with this cache as its base.
    pub fn create_snapshot(self) -> StoreCache {
        StoreCache {
            base: CacheBase::Nested(Box::new(self)),
            tracked: BTreeMap::new(),
        }
    }

    /// Discards this cache's changes and returns the parent. Fails on the
    /// root cache, which has no parent to return.
    pub fn abandon(self) -> Option<StoreCache> {
        match self.base {
            CacheBase::Nested(parent) => Some(*parent),
            CacheBase::Snapshot(_) => None,
        }
    }

    /// Number of tracked (dirty or read-cached) entries.
    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    /// Inserts a new key. Fails with [`StorageError::KeyAlreadyExists`]
    /// when the key is visible in this cache or its base.
    pub fn add(&mut self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<()> {
        match self.tracked.get_mut(&key) {
            Some(entry) if entry.state == TrackState::Deleted => {
                // Deleted then re-added within the same cache: the base
                // still holds the old value, so this is a change.
                entry.value = Some(value);
                entry.state = TrackState::Changed;
                Ok(())
            }
            Some(_) => Err(StorageError::KeyAlreadyExists),
            None => {
                if self.base.contains(&key) {
                    return Err(StorageError::KeyAlreadyExists);
                }
                self.tracked.insert(
                    key,
                    TrackedEntry {
                        value: Some(value),
                        state: TrackState::Added,
                    },
                );
                Ok(())
            }
        }
    }

    /// Writes a key unconditionally: `Added` when absent, `Changed` when
    /// present.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        match self.tracked.get_mut(&key) {
            Some(entry) => {
                entry.value = Some(value);
                entry.state = match entry.state {
                    TrackState::Added => TrackState::Added,
                    // A deleted base entry overwritten is a change.
                    _ => TrackState::Changed,
                };
            }
            None => {
                let state = if self.base.contains(&key) {
                    TrackState::Changed
                } else {
                    TrackState::Added
                };
                self.tracked.insert(
                    key,
                    TrackedEntry {
                        value: Some(value),
                        state,
                    },
                );
            }
        }
    }

    /// Returns the current value, materializing it for mutation: the entry
    /// is marked `Changed` (or created as `Added` via `factory` when
    /// absent).
    pub fn get_or_change(
        &mut self,
        key: Vec<u8>,
        factory: impl FnOnce() -> Vec<u8>,
    ) -> Vec<u8> {
        if let Some(entry) = self.tracked.get_mut(&key) {
            if entry.state == TrackState::Deleted {
                entry.value = Some(factory());
                entry.state = TrackState::Changed;
            } else if entry.state == TrackState::None {
                entry.state = TrackState::Changed;
            }
            return entry.value.clone().expect("non-deleted entry has value");
        }
        match self.base.try_get(&key) {
            Some(value) => {
                self.tracked.insert(
                    key,
                    TrackedEntry {
                        value: Some(value.clone()),
                        state: TrackState::Changed,
                    },
                );
                value
            }
            None => {
                let value = factory();
                self.tracked.insert(
                    key,
                    TrackedEntry {
                        value: Some(value.clone()),
                        state: TrackState::Added,
                    },
                );
                value
            }
        }
    }

    /// Removes a key: an `Added` entry vanishes entirely; anything else is
    /// recorded as `Deleted`.
    pub fn delete(&mut self, key: &[u8]) {
        match self.tracked.get_mut(key) {
            Some(entry) if entry.state == TrackState::Added => {
                self.tracked.remove(key);
            }
            Some(entry) => {
                entry.value = None;
                entry.state = TrackState::Deleted;
            }
            None => {
                if self.base.contains(key) {
                    self.tracked.insert(
                        key.to_vec(),
                        TrackedEntry {
                            value: None,
                            state: TrackState::Deleted,
                        },
                    );
                }
            }
        }
    }

    /// Applies every tracked mutation to the base as one unit and clears
    /// the tracked map. On the root cache this also commits the snapshot's
    /// batch to the backing store, making the block durable.
    pub fn commit(&mut self) {
        let tracked = std::mem::take(&mut self.tracked);
        match &mut self.base {
            CacheBase::Snapshot(snapshot) => {
                for (key, entry) in tracked {
                    match entry.state {
                        TrackState::Added | TrackState::Changed => {
                            snapshot.put(key, entry.value.expect("live entry has value"));
                        }
                        TrackState::Deleted => snapshot.delete(&key),
                        TrackState::None => {}
                    }
                }
                snapshot.commit();
            }
            CacheBase::Nested(parent) => {
                for (key, entry) in tracked {
                    match entry.state {
                        TrackState::Added | TrackState::Changed => {
                            parent.put(key, entry.value.expect("live entry has value"));
                        }
                        TrackState::Deleted => parent.delete(&key),
                        TrackState::None => {}
                    }
                }
            }
        }
    }

    /// Commits and unwraps a nested cache back to its parent.
    pub fn commit_to_parent(mut self) -> Option<StoreCache> {
        self.commit();
        self.abandon()
    }

    /// The dirty entries, as `(key, Some(value))` for live writes and
    /// `(key, None)` for deletions. Read-cached entries are excluded.
    /// Used to derive the per-block state root before commit.
    pub fn tracked_changes(&self) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        self.tracked
            .iter()
            .filter(|(_, entry)| entry.state != TrackState::None)
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    // ---- typed contract-storage helpers ----

    /// Reads a contract storage item.
    pub fn get_storage(&self, key: &StorageKey) -> Option<StorageItem> {
        self.try_get(&crate::layout::storage_key(key))
            .map(StorageItem::new)
    }

    /// Inserts a new contract storage item.
    pub fn add_storage(&mut self, key: &StorageKey, item: &StorageItem) -> StorageResult<()> {
        self.add(crate::layout::storage_key(key), item.value.clone())
    }

    /// Writes a contract storage item unconditionally.
    pub fn put_storage(&mut self, key: &StorageKey, item: &StorageItem) {
        self.put(crate::layout::storage_key(key), item.value.clone());
    }

    /// Deletes a contract storage item.
    pub fn delete_storage(&mut self, key: &StorageKey) {
        self.delete(&crate::layout::storage_key(key));
    }

    /// Scans a contract's storage entries whose keys start with `prefix`.
    pub fn find_storage(
        &self,
        contract_id: i32,
        prefix: &[u8],
    ) -> Vec<(StorageKey, StorageItem)> {
        let mut raw_prefix = crate::layout::storage_prefix(contract_id);
        raw_prefix.extend_from_slice(prefix);
        self.find_prefix(&raw_prefix)
            .filter_map(|(raw_key, value)| {
                let storage_key = StorageKey::from_raw(&raw_key[1..])?;
                Some((storage_key, StorageItem::new(value)))
            })
            .collect()
    }
}

impl StoreView for StoreCache {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.tracked.get(key) {
            Some(entry) => entry.value.clone(),
            None => self.base.try_get(key),
        }
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        // Merge the tracked overlay with the base, tracked entries winning
        // on key collision and deletions dropping out.
        let tracked: Vec<(Vec<u8>, Option<Vec<u8>>)> = match direction {
            SeekDirection::Forward => self
                .tracked
                .range(key_or_prefix.to_vec()..)
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
            SeekDirection::Backward => self
                .tracked
                .range(..=key_or_prefix.to_vec())
                .rev()
                .map(|(k, e)| (k.clone(), e.value.clone()))
                .collect(),
        };
        let mut base: Vec<(Vec<u8>, Vec<u8>)> =
            self.base.seek(key_or_prefix, direction).collect();
        // Drop base entries shadowed by the overlay.
        base.retain(|(key, _)| !self.tracked.contains_key(key));

        let ascending = direction == SeekDirection::Forward;
        let mut merged: Vec<(Vec<u8>, Vec<u8>)> = tracked
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .chain(base)
            .collect();
        merged.sort_by(|(a, _), (b, _)| if ascending { a.cmp(b) } else { b.cmp(a) });
        Box::new(merged.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::Store;

    fn cache_over(entries: &[(&[u8], &[u8])]) -> (MemoryStore, StoreCache) {
        let store = MemoryStore::new();
        for (key, value) in entries {
            store.put_direct(key.to_vec(), value.to_vec());
        }
        let cache = StoreCache::new(store.snapshot());
        (store, cache)
    }

    #[test]
    fn add_rejects_existing_key() {
        let (_store, mut cache) = cache_over(&[(b"k", b"v")]);
        assert!(matches!(
            cache.add(b"k".to_vec(), b"new".to_vec()),
            Err(StorageError::KeyAlreadyExists)
        ));
        assert!(cache.add(b"fresh".to_vec(), b"v".to_vec()).is_ok());
        assert!(matches!(
            cache.add(b"fresh".to_vec(), b"again".to_vec()),
            Err(StorageError::KeyAlreadyExists)
        ));
    }

    #[test]
    fn deleted_entries_read_as_missing() {
        let (_store, mut cache) = cache_over(&[(b"k", b"v")]);
        cache.delete(b"k");
        assert!(cache.try_get(b"k").is_none());
        assert!(!cache.contains(b"k"));
    }

    #[test]
    fn delete_of_added_removes_entirely() {
        let (_store, mut cache) = cache_over(&[]);
        cache.add(b"k".to_vec(), b"v".to_vec()).unwrap();
        cache.delete(b"k");
        assert_eq!(cache.tracked_len(), 0);
        // And the key can be added again.
        assert!(cache.add(b"k".to_vec(), b"v2".to_vec()).is_ok());
    }

    #[test]
    fn get_or_change_materializes() {
        let (_store, mut cache) = cache_over(&[(b"k", b"v")]);
        let value = cache.get_or_change(b"k".to_vec(), Vec::new);
        assert_eq!(value, b"v");
        // Absent key goes through the factory as Added.
        let fresh = cache.get_or_change(b"new".to_vec(), || b"made".to_vec());
        assert_eq!(fresh, b"made");
        assert_eq!(cache.try_get(b"new"), Some(b"made".to_vec()));
    }

    #[test]
    fn commit_applies_overlay_to_store() {
        let (store, mut cache) = cache_over(&[(b"stay", b"1"), (b"gone", b"2"), (b"mut", b"3")]);
        cache.add(b"new".to_vec(), b"4".to_vec()).unwrap();
        cache.delete(b"gone");
        cache.put(b"mut".to_vec(), b"5".to_vec());

        // Nothing leaks before commit.
        assert_eq!(store.try_get(b"mut"), Some(b"3".to_vec()));
        assert!(store.contains(b"gone"));

        cache.commit();
        assert_eq!(store.try_get(b"new"), Some(b"4".to_vec()));
        assert_eq!(store.try_get(b"mut"), Some(b"5".to_vec()));
        assert!(!store.contains(b"gone"));
        assert_eq!(store.try_get(b"stay"), Some(b"1".to_vec()));
        assert_eq!(cache.tracked_len(), 0);
    }

    #[test]
    fn nested_cache_commit_folds_into_parent() {
        let (store, parent) = cache_over(&[(b"base", b"0")]);
        let mut child = parent.create_snapshot();
        child.put(b"child".to_vec(), b"1".to_vec());
        child.delete(b"base");

        let parent = child.commit_to_parent().expect("nested");
        assert_eq!(parent.try_get(b"child"), Some(b"1".to_vec()));
        assert!(parent.try_get(b"base").is_none());
        // Still not durable until the parent commits.
        assert!(store.contains(b"base"));
    }

    #[test]
    fn nested_cache_abandon_rolls_back() {
        let (_store, parent) = cache_over(&[(b"base", b"0")]);
        let mut child = parent.create_snapshot();
        child.put(b"child".to_vec(), b"1".to_vec());
        child.delete(b"base");

        let parent = child.abandon().expect("nested");
        assert!(parent.try_get(b"child").is_none());
        assert_eq!(parent.try_get(b"base"), Some(b"0".to_vec()));
    }

    #[test]
    fn seek_merges_overlay_and_skips_deleted() {
        let (_store, mut cache) = cache_over(&[(b"a", b"1"), (b"c", b"3"), (b"e", b"5")]);
        cache.put(b"b".to_vec(), b"2".to_vec());
        cache.delete(b"c");
        cache.put(b"e".to_vec(), b"5x".to_vec());

        let forward: Vec<(Vec<u8>, Vec<u8>)> =
            cache.seek(b"", SeekDirection::Forward).collect();
        assert_eq!(
            forward,
            vec![
                (b"a".to_vec(), b"1".to_vec()),
                (b"b".to_vec(), b"2".to_vec()),
                (b"e".to_vec(), b"5x".to_vec()),
            ]
        );

        let backward: Vec<Vec<u8>> = cache
            .seek(b"z", SeekDirection::Backward)
            .map(|(k, _)| k)
            .collect();
        assert_eq!(backward, vec![b"e".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn typed_storage_helpers() {
        let (_store, mut cache) = cache_over(&[]);
        let key = StorageKey::new(3, b"k".to_vec());
        cache.add_storage(&key, &StorageItem::from_i64(42)).unwrap();
        assert_eq!(cache.get_storage(&key).unwrap().as_i64(), Some(42));

        let found = cache.find_storage(3, b"");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, key);

        cache.delete_storage(&key);
        assert!(cache.get_storage(&key).is_none());
    }
}
