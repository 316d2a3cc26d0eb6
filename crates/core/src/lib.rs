//! Core value types and payloads for the neo-oxide node.
//!
//! The 160- and 256-bit hash types, the N3 transaction and block layouts,
//! witnesses and signer scopes, and the extensible payload envelope. All
//! wire encodings here are byte-exact with the reference protocol.

pub mod block;
pub mod contract;
pub mod error;
pub mod extensible;
pub mod fixed8;
pub mod signer;
pub mod transaction;
pub mod uint160;
pub mod uint256;
pub mod witness;
pub mod witness_rule;
pub mod witness_scope;

pub use block::{Block, Header};
pub use error::{CoreError, CoreResult};
pub use extensible::ExtensiblePayload;
pub use fixed8::Fixed8;
pub use signer::Signer;
pub use transaction::{Transaction, TransactionAttribute};
pub use uint160::UInt160;
pub use uint256::UInt256;
pub use witness::Witness;
pub use witness_scope::WitnessScope;
