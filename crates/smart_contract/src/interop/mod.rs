//! The syscall registry.
//!
//! Each service is addressed by the first four little-endian bytes of the
//! SHA-256 of its name, and declares the call flags a context must hold
//! to invoke it.

pub mod binary;
pub mod contract;
pub mod crypto;
pub mod runtime;
pub mod storage;

use crate::application_engine::HostContext;
use once_cell::sync::Lazy;
use oxneo_cryptography::hash::sha256;
use oxneo_vm::{CallFlags, ExecutionEngine, VmResult};
use std::collections::HashMap;

/// A registered syscall.
pub struct SyscallDescriptor {
    /// Fully qualified service name, e.g. `System.Storage.Get`.
    pub name: &'static str,
    /// Flags the calling context must hold.
    pub required_flags: CallFlags,
    /// Fixed gas price.
    pub price: i64,
    /// The handler.
    pub handler: fn(&mut HostContext, &mut ExecutionEngine) -> VmResult<()>,
}

/// The syscall id for a service name.
pub fn syscall_id(name: &str) -> u32 {
    let digest = sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

macro_rules! descriptors {
    ($(($name:literal, $flags:expr, $price:literal, $handler:path)),* $(,)?) => {
        vec![
            $(SyscallDescriptor {
                name: $name,
                required_flags: $flags,
                price: $price,
                handler: $handler,
            }),*
        ]
    };
}

static REGISTRY: Lazy<HashMap<u32, SyscallDescriptor>> = Lazy::new(|| {
    let list = descriptors![
        // Runtime
        ("System.Runtime.Platform", CallFlags::NONE, 8, runtime::platform),
        ("System.Runtime.GetNetwork", CallFlags::NONE, 8, runtime::get_network),
        ("System.Runtime.GetTrigger", CallFlags::NONE, 8, runtime::get_trigger),
        ("System.Runtime.GetTime", CallFlags::NONE, 8, runtime::get_time),
        ("System.Runtime.GetScriptContainer", CallFlags::NONE, 8, runtime::get_script_container),
        ("System.Runtime.GetExecutingScriptHash", CallFlags::NONE, 16, runtime::get_executing_script_hash),
        ("System.Runtime.GetCallingScriptHash", CallFlags::NONE, 16, runtime::get_calling_script_hash),
        ("System.Runtime.GetEntryScriptHash", CallFlags::NONE, 16, runtime::get_entry_script_hash),
        ("System.Runtime.CheckWitness", CallFlags::NONE, 1024, runtime::check_witness),
        ("System.Runtime.GetInvocationCounter", CallFlags::NONE, 16, runtime::get_invocation_counter),
        ("System.Runtime.Log", CallFlags::ALLOW_NOTIFY, 32768, runtime::log),
        ("System.Runtime.Notify", CallFlags::ALLOW_NOTIFY, 32768, runtime::notify),
        ("System.Runtime.GasLeft", CallFlags::NONE, 16, runtime::gas_left),
        ("System.Runtime.BurnGas", CallFlags::NONE, 16, runtime::burn_gas),
        // Storage
        ("System.Storage.GetContext", CallFlags::READ_STATES, 16, storage::get_context),
        ("System.Storage.GetReadOnlyContext", CallFlags::READ_STATES, 16, storage::get_read_only_context),
        ("System.Storage.AsReadOnly", CallFlags::READ_STATES, 16, storage::as_read_only),
        ("System.Storage.Get", CallFlags::READ_STATES, 32768, storage::get),
        ("System.Storage.Put", CallFlags::WRITE_STATES, 32768, storage::put),
        ("System.Storage.Delete", CallFlags::WRITE_STATES, 32768, storage::delete),
        ("System.Storage.Find", CallFlags::READ_STATES, 32768, storage::find),
        // Iterators (produced by Storage.Find)
        ("System.Iterator.Next", CallFlags::NONE, 32768, storage::iterator_next),
        ("System.Iterator.Value", CallFlags::NONE, 16, storage::iterator_value),
        // Contract
        ("System.Contract.Call", CallFlags::ALLOW_CALL, 32768, contract::call),
        ("System.Contract.GetCallFlags", CallFlags::NONE, 1024, contract::get_call_flags),
        // Binary values
        ("System.Binary.Serialize", CallFlags::NONE, 4096, binary::serialize),
        ("System.Binary.Deserialize", CallFlags::NONE, 16384, binary::deserialize),
        // Crypto
        ("System.Crypto.CheckSig", CallFlags::NONE, 983040, crypto::check_sig),
        ("System.Crypto.Sha256", CallFlags::NONE, 32768, crypto::sha256_syscall),
        ("System.Crypto.Ripemd160", CallFlags::NONE, 32768, crypto::ripemd160_syscall),
    ];
    list.into_iter()
        .map(|descriptor| (syscall_id(descriptor.name), descriptor))
        .collect()
});

/// Looks up a syscall by id.
pub fn descriptor(id: u32) -> Option<&'static SyscallDescriptor> {
    REGISTRY.get(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_name_hashes() {
        let id = syscall_id("System.Runtime.Platform");
        let descriptor = descriptor(id).expect("registered");
        assert_eq!(descriptor.name, "System.Runtime.Platform");
    }

    #[test]
    fn no_id_collisions() {
        // Lazy map construction would silently drop a collision; assert
        // every registered name resolves to itself.
        for name in [
            "System.Runtime.CheckWitness",
            "System.Storage.Get",
            "System.Storage.Put",
            "System.Contract.Call",
            "System.Binary.Serialize",
        ] {
            assert_eq!(descriptor(syscall_id(name)).unwrap().name, name);
        }
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(descriptor(0xdead_beef).is_none());
    }
}
