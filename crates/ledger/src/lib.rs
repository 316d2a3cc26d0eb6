//! The ledger: block validation, persistence and the memory pool.

pub mod blockchain;
pub mod error;
pub mod events;
pub mod genesis;
pub mod header_cache;
pub mod mempool;
pub mod verification;
pub mod verify_result;

pub use blockchain::Blockchain;
pub use error::{LedgerError, LedgerResult};
pub use events::{BlockchainEvent, MempoolEvent, RemovalReason};
pub use header_cache::HeaderCache;
pub use mempool::MemoryPool;
pub use verify_result::VerifyResult;
