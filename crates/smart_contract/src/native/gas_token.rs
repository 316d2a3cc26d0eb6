//! The GAS token: fees and balances.

use super::{expect_hash_arg, expect_int_arg, NativeContext, GAS_ID};
use crate::application_engine::HostContext;
use crate::error::{ContractError, ContractResult};
use oxneo_core::{contract, UInt160};
use oxneo_persistence::{StorageItem, StorageKey, StoreCache};
use oxneo_vm::{StackItem, VmError, VmResult};

/// Storage prefix for account balances.
const PREFIX_BALANCE: u8 = 0x14;
/// Storage prefix for the total supply.
const PREFIX_TOTAL_SUPPLY: u8 = 0x0b;

fn balance_key(account: &UInt160) -> StorageKey {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BALANCE);
    key.extend_from_slice(account.as_bytes());
    StorageKey::new(GAS_ID, key)
}

fn total_supply_key() -> StorageKey {
    StorageKey::new(GAS_ID, vec![PREFIX_TOTAL_SUPPLY])
}

/// Reads an account's GAS balance in datoshi.
pub fn balance_of(view: &StoreCache, account: &UInt160) -> i64 {
    view.get_storage(&balance_key(account))
        .and_then(|item| item.as_i64())
        .unwrap_or(0)
}

/// The total GAS supply in datoshi.
pub fn total_supply(view: &StoreCache) -> i64 {
    view.get_storage(&total_supply_key())
        .and_then(|item| item.as_i64())
        .unwrap_or(0)
}

/// Creates GAS out of thin air; genesis and block rewards only.
pub fn mint(cache: &mut StoreCache, account: &UInt160, amount: i64) -> ContractResult<()> {
    if amount < 0 {
        return Err(ContractError::NativeFailure("negative mint".into()));
    }
    if amount == 0 {
        return Ok(());
    }
    let balance = balance_of(cache, account);
    cache.put_storage(&balance_key(account), &StorageItem::from_i64(balance + amount));
    let supply = total_supply(cache);
    cache.put_storage(&total_supply_key(), &StorageItem::from_i64(supply + amount));
    Ok(())
}

/// Destroys GAS from an account; fee settlement only.
pub fn burn(cache: &mut StoreCache, account: &UInt160, amount: i64) -> ContractResult<()> {
    if amount < 0 {
        return Err(ContractError::NativeFailure("negative burn".into()));
    }
    if amount == 0 {
        return Ok(());
    }
    let balance = balance_of(cache, account);
    if balance < amount {
        return Err(ContractError::InsufficientBalance {
            needed: amount,
            available: balance,
        });
    }
    let remaining = balance - amount;
    if remaining == 0 {
        cache.delete_storage(&balance_key(account));
    } else {
        cache.put_storage(&balance_key(account), &StorageItem::from_i64(remaining));
    }
    let supply = total_supply(cache);
    cache.put_storage(&total_supply_key(), &StorageItem::from_i64(supply - amount));
    Ok(())
}

/// Moves GAS between accounts; the caller has already authorized `from`.
pub fn transfer_internal(
    cache: &mut StoreCache,
    from: &UInt160,
    to: &UInt160,
    amount: i64,
) -> ContractResult<()> {
    if amount < 0 {
        return Err(ContractError::NativeFailure("negative transfer".into()));
    }
    let from_balance = balance_of(cache, from);
    if from_balance < amount {
        return Err(ContractError::InsufficientBalance {
            needed: amount,
            available: from_balance,
        });
    }
    let remaining = from_balance - amount;
    if remaining == 0 {
        cache.delete_storage(&balance_key(from));
    } else {
        cache.put_storage(&balance_key(from), &StorageItem::from_i64(remaining));
    }
    let to_balance = balance_of(cache, to);
    cache.put_storage(&balance_key(to), &StorageItem::from_i64(to_balance + amount));
    Ok(())
}

/// NEP-17 surface reachable through `System.Contract.Call`.
pub fn invoke(host: &mut HostContext, method: &str, args: &[StackItem]) -> VmResult<StackItem> {
    match method {
        "symbol" => Ok(StackItem::from_bytes(b"GAS".to_vec())),
        "decimals" => Ok(StackItem::from_int(8)),
        "totalSupply" => Ok(StackItem::from_int(total_supply(&host.snapshot))),
        "balanceOf" => {
            let account = expect_hash_arg(args, 0)?;
            Ok(StackItem::from_int(balance_of(&host.snapshot, &account)))
        }
        "transfer" => {
            let from = expect_hash_arg(args, 0)?;
            let to = expect_hash_arg(args, 1)?;
            let amount = expect_int_arg(args, 2)?;
            if !host.check_witness(&from) {
                return Ok(StackItem::Boolean(false));
            }
            match transfer_internal(&mut host.snapshot, &from, &to, amount) {
                Ok(()) => {
                    host.notifications.push(crate::notification::NotifyEventArgs {
                        contract: super::gas_hash(),
                        event_name: "Transfer".into(),
                        state: Vec::new(),
                    });
                    Ok(StackItem::Boolean(true))
                }
                Err(ContractError::InsufficientBalance { .. }) => Ok(StackItem::Boolean(false)),
                Err(e) => Err(VmError::InteropFailure(e.to_string())),
            }
        }
        other => Err(VmError::InteropFailure(format!(
            "GasToken has no method {other}"
        ))),
    }
}

/// Burns every transaction's fees from its sender before execution.
pub fn on_persist(ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    for tx in &ctx.block.transactions {
        let sender = tx.sender()?;
        burn(ctx.cache, &sender, tx.system_fee + tx.network_fee)?;
    }
    Ok(())
}

/// Pays the block's network fees to the proposing validator.
pub fn post_persist(ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    let network_fees: i64 = ctx.block.transactions.iter().map(|tx| tx.network_fee).sum();
    if network_fees == 0 {
        return Ok(());
    }
    let validators = super::neo_token::standby_validator_keys(ctx.settings)?;
    let Some(primary_key) = validators.get(ctx.block.header.primary_index as usize) else {
        return Ok(());
    };
    let account = UInt160::from_script(&contract::create_signature_redeem_script(primary_key));
    mint(ctx.cache, &account, network_fees)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_persistence::{MemoryStore, Store};

    fn cache() -> StoreCache {
        StoreCache::new(MemoryStore::new().snapshot())
    }

    #[test]
    fn mint_and_burn_round_trip() {
        let mut cache = cache();
        let account = UInt160::from_bytes([1u8; 20]);
        mint(&mut cache, &account, 500).unwrap();
        assert_eq!(balance_of(&cache, &account), 500);
        assert_eq!(total_supply(&cache), 500);
        burn(&mut cache, &account, 200).unwrap();
        assert_eq!(balance_of(&cache, &account), 300);
        assert_eq!(total_supply(&cache), 300);
    }

    #[test]
    fn burn_rejects_overdraft() {
        let mut cache = cache();
        let account = UInt160::from_bytes([1u8; 20]);
        mint(&mut cache, &account, 100).unwrap();
        assert!(matches!(
            burn(&mut cache, &account, 101),
            Err(ContractError::InsufficientBalance { .. })
        ));
        assert_eq!(balance_of(&cache, &account), 100);
    }

    #[test]
    fn transfer_moves_balance() {
        let mut cache = cache();
        let from = UInt160::from_bytes([1u8; 20]);
        let to = UInt160::from_bytes([2u8; 20]);
        mint(&mut cache, &from, 100).unwrap();
        transfer_internal(&mut cache, &from, &to, 60).unwrap();
        assert_eq!(balance_of(&cache, &from), 40);
        assert_eq!(balance_of(&cache, &to), 60);
    }

    #[test]
    fn zero_balance_entry_is_deleted() {
        let mut cache = cache();
        let account = UInt160::from_bytes([1u8; 20]);
        mint(&mut cache, &account, 100).unwrap();
        burn(&mut cache, &account, 100).unwrap();
        assert!(cache.get_storage(&balance_key(&account)).is_none());
    }
}
