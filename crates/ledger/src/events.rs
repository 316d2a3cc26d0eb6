//! Ledger event types, delivered over tokio broadcast channels.

use oxneo_core::{Block, Transaction, UInt256};
use std::sync::Arc;

/// Why a transaction left the memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Included in a persisted block.
    Included,
    /// Displaced by a conflicting transaction with a better fee.
    Replaced,
    /// Evicted at capacity in favor of better-paying transactions.
    LowPriority,
    /// Sat unverified past the expiry window.
    Expired,
    /// Failed re-verification against new chain state.
    PolicyFail,
}

/// Memory pool notifications.
#[derive(Debug, Clone)]
pub enum MempoolEvent {
    /// A transaction entered the verified partition.
    TransactionAdded(Arc<Transaction>),
    /// A transaction left the pool.
    TransactionRemoved {
        hash: UInt256,
        reason: RemovalReason,
    },
}

/// Blockchain notifications, emitted after the commit is durable.
#[derive(Debug, Clone)]
pub enum BlockchainEvent {
    /// A block was persisted.
    BlockPersisted(Arc<Block>),
    /// The state root over the block's mutations.
    StateChanged { index: u32, root: UInt256 },
}
