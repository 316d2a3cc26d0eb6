//! Native contracts: protocol services implemented in the node itself.
//!
//! Only their integration surface exists here: fixed ids and hashes, the
//! storage they own, the methods `System.Contract.Call` can reach, and
//! the OnPersist/PostPersist hooks the block pipeline runs.

pub mod gas_token;
pub mod ledger;
pub mod neo_token;
pub mod policy;

use crate::application_engine::HostContext;
use crate::error::ContractResult;
use once_cell::sync::Lazy;
use oxneo_config::ProtocolSettings;
use oxneo_core::{Block, UInt160};
use oxneo_persistence::StoreCache;
use oxneo_vm::{StackItem, VmError, VmResult};

/// Fixed id of the ledger contract.
pub const LEDGER_ID: i32 = -4;
/// Fixed id of the NEO token.
pub const NEO_ID: i32 = -5;
/// Fixed id of the GAS token.
pub const GAS_ID: i32 = -6;
/// Fixed id of the policy contract.
pub const POLICY_ID: i32 = -7;

/// Derives a native contract's script hash from its name. Stable across
/// every node, independent of any deployed script.
pub fn native_hash(name: &str) -> UInt160 {
    let mut preimage = b"neo-oxide-native:".to_vec();
    preimage.extend_from_slice(name.as_bytes());
    UInt160::from_bytes(oxneo_cryptography::hash::hash160(&preimage))
}

static LEDGER_HASH: Lazy<UInt160> = Lazy::new(|| native_hash("LedgerContract"));
static NEO_HASH: Lazy<UInt160> = Lazy::new(|| native_hash("NeoToken"));
static GAS_HASH: Lazy<UInt160> = Lazy::new(|| native_hash("GasToken"));
static POLICY_HASH: Lazy<UInt160> = Lazy::new(|| native_hash("PolicyContract"));

/// The ledger contract's hash.
pub fn ledger_hash() -> UInt160 {
    *LEDGER_HASH
}

/// The NEO token's hash.
pub fn neo_hash() -> UInt160 {
    *NEO_HASH
}

/// The GAS token's hash.
pub fn gas_hash() -> UInt160 {
    *GAS_HASH
}

/// The policy contract's hash.
pub fn policy_hash() -> UInt160 {
    *POLICY_HASH
}

/// Resolves a native contract's id from its hash.
pub fn native_id_by_hash(hash: &UInt160) -> Option<i32> {
    if hash == &*LEDGER_HASH {
        Some(LEDGER_ID)
    } else if hash == &*NEO_HASH {
        Some(NEO_ID)
    } else if hash == &*GAS_HASH {
        Some(GAS_ID)
    } else if hash == &*POLICY_HASH {
        Some(POLICY_ID)
    } else {
        None
    }
}

/// Dispatches a `System.Contract.Call` aimed at a native contract.
/// Returns `Ok(None)` when the target is not a native.
pub fn invoke(
    host: &mut HostContext,
    target: &UInt160,
    method: &str,
    args: &[StackItem],
) -> VmResult<Option<StackItem>> {
    let result = if target == &*GAS_HASH {
        gas_token::invoke(host, method, args)?
    } else if target == &*NEO_HASH {
        neo_token::invoke(host, method, args)?
    } else if target == &*POLICY_HASH {
        policy::invoke(host, method, args)?
    } else if target == &*LEDGER_HASH {
        ledger::invoke(host, method, args)?
    } else {
        return Ok(None);
    };
    Ok(Some(result))
}

/// Shared state the persistence hooks operate on.
pub struct NativeContext<'a> {
    pub cache: &'a mut StoreCache,
    pub block: &'a Block,
    pub settings: &'a ProtocolSettings,
}

/// Runs every native's OnPersist hook, in fixed order, before the block's
/// transactions execute.
pub fn on_persist(ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    ledger::on_persist(ctx)?;
    gas_token::on_persist(ctx)?;
    Ok(())
}

/// Runs every native's PostPersist hook after the block's transactions
/// executed.
pub fn post_persist(ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    gas_token::post_persist(ctx)?;
    Ok(())
}

pub(crate) fn expect_hash_arg(args: &[StackItem], index: usize) -> VmResult<UInt160> {
    let item = args
        .get(index)
        .ok_or_else(|| VmError::InteropFailure(format!("missing argument {index}")))?;
    let bytes = item.get_byte_array()?;
    UInt160::from_slice(&bytes)
        .map_err(|_| VmError::InteropFailure(format!("argument {index} is not a 160-bit hash")))
}

pub(crate) fn expect_int_arg(args: &[StackItem], index: usize) -> VmResult<i64> {
    let item = args
        .get(index)
        .ok_or_else(|| VmError::InteropFailure(format!("missing argument {index}")))?;
    i64::try_from(item.get_integer(32)?)
        .map_err(|_| VmError::InteropFailure(format!("argument {index} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_hashes_are_distinct_and_stable() {
        let hashes = [ledger_hash(), neo_hash(), gas_hash(), policy_hash()];
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(native_hash("GasToken"), gas_hash());
    }

    #[test]
    fn id_lookup() {
        assert_eq!(native_id_by_hash(&gas_hash()), Some(GAS_ID));
        assert_eq!(native_id_by_hash(&UInt160::zero()), None);
    }
}
