//! dBFT consensus for the neo-oxide node.
//!
//! A deterministic state machine per `(block_index, view)`: the primary
//! proposes, backups echo preparations, a commit quorum finalizes, and
//! timeouts rotate the primary through view changes. Recovery messages
//! let rejoining validators catch up without a restart.

pub mod context;
pub mod error;
pub mod messages;
pub mod service;

pub use context::{ConsensusContext, ConsensusPhase};
pub use error::{ConsensusError, ConsensusResult};
pub use messages::{ChangeViewReason, ConsensusMessage, CONSENSUS_CATEGORY};
pub use service::{ConsensusOutput, DbftService};
