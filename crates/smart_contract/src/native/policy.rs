//! The policy contract: chain-wide tunables and blocked accounts.

use super::{expect_hash_arg, expect_int_arg, POLICY_ID};
use crate::application_engine::HostContext;
use oxneo_core::UInt160;
use oxneo_persistence::{StorageItem, StorageKey, StoreCache};
use oxneo_vm::{StackItem, VmError, VmResult};

const PREFIX_BLOCKED_ACCOUNT: u8 = 0x0f;
const PREFIX_FEE_PER_BYTE: u8 = 0x0a;
const PREFIX_EXEC_FEE_FACTOR: u8 = 0x12;
const PREFIX_STORAGE_PRICE: u8 = 0x13;

/// Default relay fee per transaction byte, in datoshi.
pub const DEFAULT_FEE_PER_BYTE: i64 = 1_000;
/// Default multiplier over VM base prices.
pub const DEFAULT_EXEC_FEE_FACTOR: i64 = 30;
/// Default price per storage byte, in datoshi.
pub const DEFAULT_STORAGE_PRICE: i64 = 100_000;

fn value_key(prefix: u8) -> StorageKey {
    StorageKey::new(POLICY_ID, vec![prefix])
}

fn blocked_key(account: &UInt160) -> StorageKey {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BLOCKED_ACCOUNT);
    key.extend_from_slice(account.as_bytes());
    StorageKey::new(POLICY_ID, key)
}

fn read_value(view: &StoreCache, prefix: u8, default: i64) -> i64 {
    view.get_storage(&value_key(prefix))
        .and_then(|item| item.as_i64())
        .unwrap_or(default)
}

/// The relay fee charged per serialized transaction byte.
pub fn fee_per_byte(view: &StoreCache) -> i64 {
    read_value(view, PREFIX_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
}

/// The multiplier applied to VM base prices.
pub fn exec_fee_factor(view: &StoreCache) -> i64 {
    read_value(view, PREFIX_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR)
}

/// The price of one byte of contract storage.
pub fn storage_price(view: &StoreCache) -> i64 {
    read_value(view, PREFIX_STORAGE_PRICE, DEFAULT_STORAGE_PRICE)
}

/// Whether an account is barred from sending transactions.
pub fn is_blocked(view: &StoreCache, account: &UInt160) -> bool {
    view.get_storage(&blocked_key(account)).is_some()
}

/// Adds an account to the block list.
pub fn block_account(cache: &mut StoreCache, account: &UInt160) -> bool {
    if is_blocked(cache, account) {
        return false;
    }
    cache.put_storage(&blocked_key(account), &StorageItem::new(Vec::new()));
    true
}

/// Removes an account from the block list.
pub fn unblock_account(cache: &mut StoreCache, account: &UInt160) -> bool {
    if !is_blocked(cache, account) {
        return false;
    }
    cache.delete_storage(&blocked_key(account));
    true
}

/// Sets the relay fee per byte. Committee-gated at the call site.
pub fn set_fee_per_byte(cache: &mut StoreCache, value: i64) {
    cache.put_storage(&value_key(PREFIX_FEE_PER_BYTE), &StorageItem::from_i64(value));
}

/// Policy surface reachable through `System.Contract.Call`. Mutating
/// methods demand the committee's witness.
pub fn invoke(host: &mut HostContext, method: &str, args: &[StackItem]) -> VmResult<StackItem> {
    match method {
        "getFeePerByte" => Ok(StackItem::from_int(fee_per_byte(&host.snapshot))),
        "getExecFeeFactor" => Ok(StackItem::from_int(exec_fee_factor(&host.snapshot))),
        "getStoragePrice" => Ok(StackItem::from_int(storage_price(&host.snapshot))),
        "isBlocked" => {
            let account = expect_hash_arg(args, 0)?;
            Ok(StackItem::Boolean(is_blocked(&host.snapshot, &account)))
        }
        "setFeePerByte" => {
            let value = expect_int_arg(args, 0)?;
            if !(0..=100_000_000).contains(&value) {
                return Err(VmError::InteropFailure("fee per byte out of range".into()));
            }
            require_committee(host)?;
            set_fee_per_byte(&mut host.snapshot, value);
            Ok(StackItem::Null)
        }
        "blockAccount" => {
            let account = expect_hash_arg(args, 0)?;
            require_committee(host)?;
            Ok(StackItem::Boolean(block_account(&mut host.snapshot, &account)))
        }
        "unblockAccount" => {
            let account = expect_hash_arg(args, 0)?;
            require_committee(host)?;
            Ok(StackItem::Boolean(unblock_account(
                &mut host.snapshot,
                &account,
            )))
        }
        other => Err(VmError::InteropFailure(format!(
            "PolicyContract has no method {other}"
        ))),
    }
}

fn require_committee(host: &HostContext) -> VmResult<()> {
    // The committee is the validator quorum address; the node stores it at
    // genesis under the policy id so the check works without settings.
    let Some(committee) = committee_address(&host.snapshot) else {
        return Err(VmError::InteropFailure("committee address not set".into()));
    };
    if host.check_witness(&committee) {
        Ok(())
    } else {
        Err(VmError::InteropFailure(
            "committee witness required".into(),
        ))
    }
}

const PREFIX_COMMITTEE_ADDRESS: u8 = 0x17;

/// The committee address recorded at genesis.
pub fn committee_address(view: &StoreCache) -> Option<UInt160> {
    view.get_storage(&value_key(PREFIX_COMMITTEE_ADDRESS))
        .and_then(|item| UInt160::from_slice(&item.value).ok())
}

/// Records the committee address; genesis bootstrap only.
pub fn set_committee_address(cache: &mut StoreCache, address: &UInt160) {
    cache.put_storage(
        &value_key(PREFIX_COMMITTEE_ADDRESS),
        &StorageItem::new(address.as_bytes().to_vec()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_persistence::{MemoryStore, Store};

    fn cache() -> StoreCache {
        StoreCache::new(MemoryStore::new().snapshot())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cache = cache();
        assert_eq!(fee_per_byte(&cache), DEFAULT_FEE_PER_BYTE);
        assert_eq!(exec_fee_factor(&cache), DEFAULT_EXEC_FEE_FACTOR);
        assert_eq!(storage_price(&cache), DEFAULT_STORAGE_PRICE);
    }

    #[test]
    fn set_fee_overrides_default() {
        let mut cache = cache();
        set_fee_per_byte(&mut cache, 2_000);
        assert_eq!(fee_per_byte(&cache), 2_000);
    }

    #[test]
    fn block_and_unblock() {
        let mut cache = cache();
        let account = UInt160::from_bytes([5u8; 20]);
        assert!(!is_blocked(&cache, &account));
        assert!(block_account(&mut cache, &account));
        assert!(!block_account(&mut cache, &account));
        assert!(is_blocked(&cache, &account));
        assert!(unblock_account(&mut cache, &account));
        assert!(!is_blocked(&cache, &account));
    }
}
