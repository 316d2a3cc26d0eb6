//! Transaction verification against chain state.

use crate::verify_result::VerifyResult;
use oxneo_config::ProtocolSettings;
use oxneo_core::Transaction;
use oxneo_io::Serializable;
use oxneo_smart_contract::native::policy;
use oxneo_smart_contract::native::gas_token;
use oxneo_smart_contract::{ApplicationEngine, Container};
use oxneo_persistence::StoreCache;

/// State-dependent admission rules, the second verification phase.
///
/// Assumes the state-independent pass already succeeded. `snapshot` is a
/// read view at the current height.
pub fn verify_state_dependent(
    tx: &Transaction,
    snapshot: &StoreCache,
    height: u32,
    settings: &ProtocolSettings,
) -> VerifyResult {
    // Validity window: strictly after the current height, within the
    // admission increment.
    if tx.valid_until_block <= height {
        return VerifyResult::Expired;
    }
    if tx.valid_until_block > height + settings.max_valid_until_block_increment {
        return VerifyResult::Expired;
    }

    // Policy gate: no signer may be blocked.
    for signer in &tx.signers {
        if policy::is_blocked(snapshot, &signer.account) {
            return VerifyResult::PolicyFail;
        }
    }

    // Fee floor: the network fee must cover the size-proportional part.
    let size_fee = tx.size() as i64 * policy::fee_per_byte(snapshot);
    if tx.network_fee < size_fee {
        return VerifyResult::PolicyFail;
    }

    // The sender must hold the declared fees.
    let sender = match tx.sender() {
        Ok(sender) => sender,
        Err(_) => return VerifyResult::Invalid,
    };
    let balance = gas_token::balance_of(snapshot, &sender);
    let total_fee = tx.system_fee.saturating_add(tx.network_fee);
    if balance < total_fee {
        return VerifyResult::InsufficientFunds;
    }

    VerifyResult::Succeed
}

/// Runs every witness of the transaction under the Verification trigger.
///
/// Each witness must hash to its signer's account and leave a single
/// truthy result; the combined gas is capped by the network fee left over
/// after the size fee.
pub fn verify_witnesses(
    tx: &Transaction,
    base_snapshot: impl Fn() -> StoreCache,
    height: u32,
    settings: &ProtocolSettings,
    fee_per_byte: i64,
) -> VerifyResult {
    let size_fee = tx.size() as i64 * fee_per_byte;
    let mut gas_budget = tx.network_fee - size_fee;

    for (signer, witness) in tx.signers.iter().zip(&tx.witnesses) {
        if witness.verification_script.is_empty() {
            // Contract-based witnesses need a deployed verify method; not
            // admitted through this path.
            return VerifyResult::WitnessFailure;
        }
        if witness.script_hash() != signer.account {
            return VerifyResult::WitnessFailure;
        }
        let spent = match ApplicationEngine::verify_witness(
            Container::Transaction(tx.clone()),
            base_snapshot(),
            &witness.verification_script,
            &witness.invocation_script,
            gas_budget,
            settings.magic,
            height,
        ) {
            Ok(spent) => spent,
            Err(_) => return VerifyResult::WitnessFailure,
        };
        gas_budget -= spent;
        if gas_budget < 0 {
            return VerifyResult::WitnessFailure;
        }
    }
    VerifyResult::Succeed
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_core::{Signer, UInt160, Witness};
    use oxneo_persistence::{MemoryStore, Store};

    fn snapshot() -> StoreCache {
        StoreCache::new(MemoryStore::new().snapshot())
    }

    fn signed_tx(account: UInt160) -> Transaction {
        Transaction {
            valid_until_block: 100,
            network_fee: 10_000_000,
            signers: vec![Signer::called_by_entry(account)],
            script: vec![0x11],
            witnesses: vec![Witness::new(Vec::new(), vec![0x11])],
            ..Default::default()
        }
    }

    #[test]
    fn expired_window_rejected() {
        let settings = ProtocolSettings::default();
        let account = UInt160::from_script(&[0x11]);
        let mut tx = signed_tx(account);

        tx.valid_until_block = 50;
        assert_eq!(
            verify_state_dependent(&tx, &snapshot(), 50, &settings),
            VerifyResult::Expired
        );
        // Far-future windows are rejected too.
        tx.valid_until_block = 50 + settings.max_valid_until_block_increment + 1;
        assert_eq!(
            verify_state_dependent(&tx, &snapshot(), 50, &settings),
            VerifyResult::Expired
        );
    }

    #[test]
    fn fee_floor_enforced() {
        let settings = ProtocolSettings::default();
        let account = UInt160::from_script(&[0x11]);
        let mut tx = signed_tx(account);
        tx.network_fee = 0;
        assert_eq!(
            verify_state_dependent(&tx, &snapshot(), 0, &settings),
            VerifyResult::PolicyFail
        );
    }

    #[test]
    fn insufficient_funds_rejected() {
        let settings = ProtocolSettings::default();
        let account = UInt160::from_script(&[0x11]);
        let tx = signed_tx(account);
        // No balance was minted for the sender.
        assert_eq!(
            verify_state_dependent(&tx, &snapshot(), 0, &settings),
            VerifyResult::InsufficientFunds
        );
    }

    #[test]
    fn funded_sender_passes() {
        let settings = ProtocolSettings::default();
        let account = UInt160::from_script(&[0x11]);
        let mut cache = snapshot();
        oxneo_smart_contract::native::gas_token::mint(&mut cache, &account, 100_000_000).unwrap();
        let tx = signed_tx(account);
        assert_eq!(
            verify_state_dependent(&tx, &cache, 0, &settings),
            VerifyResult::Succeed
        );
    }

    #[test]
    fn witness_hash_mismatch_fails() {
        let settings = ProtocolSettings::default();
        // Signer account does not match the verification script hash.
        let tx = signed_tx(UInt160::from_bytes([9u8; 20]));
        assert_eq!(
            verify_witnesses(&tx, snapshot, 0, &settings, 0),
            VerifyResult::WitnessFailure
        );
    }

    #[test]
    fn trivial_witness_passes() {
        let settings = ProtocolSettings::default();
        let account = UInt160::from_script(&[0x11]);
        let tx = signed_tx(account);
        assert_eq!(
            verify_witnesses(&tx, snapshot, 0, &settings, 0),
            VerifyResult::Succeed
        );
    }
}
