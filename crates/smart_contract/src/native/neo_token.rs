//! The NEO token: governance balances and the validator set.

use super::{expect_hash_arg, NativeContext, NEO_ID};
use crate::application_engine::HostContext;
use crate::error::{ContractError, ContractResult};
use oxneo_config::ProtocolSettings;
use oxneo_core::{contract, UInt160};
use oxneo_cryptography::ecdsa::PUBLIC_KEY_SIZE;
use oxneo_persistence::{StorageItem, StorageKey, StoreCache};
use oxneo_vm::{StackItem, VmError, VmResult};

/// Storage prefix for account balances.
const PREFIX_BALANCE: u8 = 0x14;

/// Total NEO supply; indivisible units.
pub const TOTAL_SUPPLY: i64 = 100_000_000;

fn balance_key(account: &UInt160) -> StorageKey {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BALANCE);
    key.extend_from_slice(account.as_bytes());
    StorageKey::new(NEO_ID, key)
}

/// Reads an account's NEO balance.
pub fn balance_of(view: &StoreCache, account: &UInt160) -> i64 {
    view.get_storage(&balance_key(account))
        .and_then(|item| item.as_i64())
        .unwrap_or(0)
}

/// Assigns the initial supply at genesis.
pub fn initialize(cache: &mut StoreCache, owner: &UInt160) -> ContractResult<()> {
    cache.put_storage(&balance_key(owner), &StorageItem::from_i64(TOTAL_SUPPLY));
    Ok(())
}

/// Parses the configured standby validator keys.
///
/// Committee elections are out of scope; the validator set is the standby
/// list for the lifetime of the chain.
pub fn standby_validator_keys(
    settings: &ProtocolSettings,
) -> ContractResult<Vec<[u8; PUBLIC_KEY_SIZE]>> {
    settings
        .standby_validators
        .iter()
        .map(|encoded| {
            let bytes = hex::decode(encoded).map_err(|e| {
                ContractError::NativeFailure(format!("invalid validator key hex: {e}"))
            })?;
            <[u8; PUBLIC_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
                ContractError::NativeFailure(format!(
                    "validator key must be {PUBLIC_KEY_SIZE} bytes"
                ))
            })
        })
        .collect()
}

/// The next round's validator keys, sorted as the multisig script sorts
/// them.
pub fn next_block_validators(
    settings: &ProtocolSettings,
) -> ContractResult<Vec<[u8; PUBLIC_KEY_SIZE]>> {
    let mut keys = standby_validator_keys(settings)?;
    keys.sort();
    Ok(keys)
}

/// Script hash of the validator quorum multisig (`next_consensus`).
pub fn consensus_address(settings: &ProtocolSettings) -> ContractResult<UInt160> {
    let keys = next_block_validators(settings)?;
    let n = keys.len();
    if n == 0 {
        return Err(ContractError::NativeFailure(
            "no standby validators configured".into(),
        ));
    }
    let f = (n - 1) / 3;
    let m = n - f;
    contract::multisig_script_hash(m, &keys).map_err(ContractError::from)
}

/// Governance surface reachable through `System.Contract.Call`.
pub fn invoke(host: &mut HostContext, method: &str, args: &[StackItem]) -> VmResult<StackItem> {
    match method {
        "symbol" => Ok(StackItem::from_bytes(b"NEO".to_vec())),
        "decimals" => Ok(StackItem::from_int(0)),
        "totalSupply" => Ok(StackItem::from_int(TOTAL_SUPPLY)),
        "balanceOf" => {
            let account = expect_hash_arg(args, 0)?;
            Ok(StackItem::from_int(balance_of(&host.snapshot, &account)))
        }
        other => Err(VmError::InteropFailure(format!(
            "NeoToken has no method {other}"
        ))),
    }
}

/// Nothing to do per block while elections are out of scope.
pub fn on_persist(_ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_cryptography::KeyPair;
    use oxneo_persistence::{MemoryStore, Store};

    fn settings_with_validators(count: usize) -> ProtocolSettings {
        ProtocolSettings {
            standby_validators: (0..count)
                .map(|_| hex::encode(KeyPair::generate().public_key()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn genesis_supply() {
        let mut cache = StoreCache::new(MemoryStore::new().snapshot());
        let owner = UInt160::from_bytes([3u8; 20]);
        initialize(&mut cache, &owner).unwrap();
        assert_eq!(balance_of(&cache, &owner), TOTAL_SUPPLY);
    }

    #[test]
    fn consensus_address_is_quorum_multisig() {
        let settings = settings_with_validators(4);
        let address = consensus_address(&settings).unwrap();
        // n=4, f=1, m=3.
        let keys = next_block_validators(&settings).unwrap();
        let expected = contract::multisig_script_hash(3, &keys).unwrap();
        assert_eq!(address, expected);
    }

    #[test]
    fn empty_validator_set_rejected() {
        let settings = ProtocolSettings::default();
        assert!(consensus_address(&settings).is_err());
    }

    #[test]
    fn bad_key_hex_rejected() {
        let settings = ProtocolSettings {
            standby_validators: vec!["zz".into()],
            ..Default::default()
        };
        assert!(standby_validator_keys(&settings).is_err());
    }
}
