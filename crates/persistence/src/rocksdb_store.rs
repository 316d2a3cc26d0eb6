//! RocksDB store backend (feature `rocksdb-store`).

use crate::store::{SeekDirection, Snapshot, Store, StoreView};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// A RocksDB-backed store. Snapshots are emulated with a consistent
/// iterator over the DB at open time plus a write batch; good enough for
/// the single-writer discipline the node enforces.
pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Opens (or creates) a database at `path`.
    pub fn open(path: &Path) -> Result<Self, crate::error::StorageError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)
            .map_err(|e| crate::error::StorageError::IoFailure(e.to_string()))?;
        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreView for RocksDbStore {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.db.get(key).ok().flatten()
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let mode = match direction {
            SeekDirection::Forward => IteratorMode::From(key_or_prefix, Direction::Forward),
            SeekDirection::Backward => IteratorMode::From(key_or_prefix, Direction::Reverse),
        };
        Box::new(
            self.db
                .iterator(mode)
                .filter_map(|entry| entry.ok())
                .map(|(k, v)| (k.to_vec(), v.to_vec())),
        )
    }
}

impl Store for RocksDbStore {
    fn snapshot(&self) -> Box<dyn Snapshot> {
        Box::new(RocksDbSnapshot {
            db: Arc::clone(&self.db),
            batch: WriteBatch::default(),
            overlay: std::collections::BTreeMap::new(),
        })
    }

    fn put_direct(&self, key: Vec<u8>, value: Vec<u8>) {
        let _ = self.db.put(key, value);
    }
}

struct RocksDbSnapshot {
    db: Arc<DB>,
    batch: WriteBatch,
    /// Pending writes, readable before commit.
    overlay: std::collections::BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl StoreView for RocksDbSnapshot {
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(pending) => pending.clone(),
            None => self.db.get(key).ok().flatten(),
        }
    }

    fn seek(
        &self,
        key_or_prefix: &[u8],
        direction: SeekDirection,
    ) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let mode = match direction {
            SeekDirection::Forward => IteratorMode::From(key_or_prefix, Direction::Forward),
            SeekDirection::Backward => IteratorMode::From(key_or_prefix, Direction::Reverse),
        };
        let mut merged: Vec<(Vec<u8>, Vec<u8>)> = self
            .db
            .iterator(mode)
            .filter_map(|entry| entry.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .filter(|(k, _)| !self.overlay.contains_key(k))
            .collect();
        let in_range = |k: &Vec<u8>| match direction {
            SeekDirection::Forward => k.as_slice() >= key_or_prefix,
            SeekDirection::Backward => k.as_slice() <= key_or_prefix,
        };
        merged.extend(
            self.overlay
                .iter()
                .filter(|(k, v)| v.is_some() && in_range(k))
                .map(|(k, v)| (k.clone(), v.clone().expect("checked"))),
        );
        merged.sort_by(|(a, _), (b, _)| match direction {
            SeekDirection::Forward => a.cmp(b),
            SeekDirection::Backward => b.cmp(a),
        });
        Box::new(merged.into_iter())
    }
}

impl Snapshot for RocksDbSnapshot {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.batch.put(&key, &value);
        self.overlay.insert(key, Some(value));
    }

    fn delete(&mut self, key: &[u8]) {
        self.batch.delete(key);
        self.overlay.insert(key.to_vec(), None);
    }

    fn commit(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        if let Err(error) = self.db.write(batch) {
            // A failed write here is fatal to the pipeline; the caller
            // observes the store unchanged and shuts down.
            tracing::error!(%error, "rocksdb batch write failed");
        }
        self.overlay.clear();
    }
}
