//! Contract execution for the neo-oxide node.
//!
//! `ApplicationEngine` wraps the VM with chain state: a mutation-tracking
//! store cache, the trigger, the script-hash stack, notifications and
//! witness checking. Syscalls are dispatched by 4-byte name hash with
//! per-syscall capability flags; the native contracts hook block
//! persistence and back fees, policy and balances.

pub mod application_engine;
pub mod binary_serializer;
pub mod contract_state;
pub mod error;
pub mod interop;
pub mod native;
pub mod notification;
pub mod trigger;

pub use application_engine::{ApplicationEngine, Container};
pub use contract_state::ContractState;
pub use error::{ContractError, ContractResult};
pub use notification::NotifyEventArgs;
pub use trigger::TriggerType;
