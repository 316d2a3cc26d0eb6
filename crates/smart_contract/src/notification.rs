//! Contract notifications.

use oxneo_core::UInt160;

/// An event emitted by `System.Runtime.Notify` during execution, recorded
/// in the application log once the transaction persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyEventArgs {
    /// The emitting contract (current script hash at the call).
    pub contract: UInt160,
    /// Event name.
    pub event_name: String,
    /// The state array, serialized with the binary value serializer.
    /// Empty when the state contained unserializable items.
    pub state: Vec<u8>,
}
