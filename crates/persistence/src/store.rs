//! The storage trait family.

/// Iteration direction for [`StoreView::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    /// Ascending byte order, starting at or after the given key.
    Forward,
    /// Descending byte order, starting at or before the given key.
    Backward,
}

/// A read-only key/value view. Implemented by stores, snapshots and the
/// tracking cache alike, so readers never care which layer they hold.
pub trait StoreView {
    /// Returns the value stored under `key`.
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `key` is present.
    fn contains(&self, key: &[u8]) -> bool {
        self.try_get(key).is_some()
    }

    /// Iterates entries starting at `key_or_prefix` in the given
    /// direction. An empty prefix with [`SeekDirection::Forward`] walks the
    /// whole keyspace.
    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>;

    /// Entries whose key starts with `prefix`, ascending.
    fn find_prefix(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let prefix = prefix.to_vec();
        Box::new(
            self.seek(&prefix.clone(), SeekDirection::Forward)
                .take_while(move |(key, _)| key.starts_with(&prefix)),
        )
    }
}

/// A writable, point-in-time view over a store. Reads see the state at
/// snapshot creation; writes buffer until [`Snapshot::commit`].
pub trait Snapshot: StoreView {
    /// Buffers a put.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Buffers a delete.
    fn delete(&mut self, key: &[u8]);

    /// Applies every buffered write to the backing store atomically.
    fn commit(&mut self);
}

/// A persistent key/value store that can open snapshots.
pub trait Store: StoreView + Send + Sync {
    /// Opens a snapshot of the current state.
    fn snapshot(&self) -> Box<dyn Snapshot>;

    /// Writes directly, outside any snapshot. Used only during genesis
    /// bootstrap and by tests.
    fn put_direct(&self, key: Vec<u8>, value: Vec<u8>);
}
