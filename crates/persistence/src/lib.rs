//! Storage for the neo-oxide node.
//!
//! A narrow key/value trait family (`StoreView`, `Snapshot`, `Store`), an
//! in-memory backend, the chain key layout, and `StoreCache`: the
//! add/change/delete-tracking overlay every state mutation funnels
//! through before an atomic commit.

pub mod error;
pub mod layout;
pub mod memory_store;
#[cfg(feature = "rocksdb-store")]
pub mod rocksdb_store;
pub mod storage_item;
pub mod storage_key;
pub mod store;
pub mod store_cache;

pub use error::{StorageError, StorageResult};
pub use memory_store::MemoryStore;
pub use storage_item::StorageItem;
pub use storage_key::StorageKey;
pub use store::{SeekDirection, Snapshot, Store, StoreView};
pub use store_cache::{StoreCache, TrackState};
