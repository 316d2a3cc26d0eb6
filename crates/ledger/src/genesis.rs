//! Genesis block construction and store bootstrap.

use crate::error::LedgerResult;
use oxneo_config::{ProtocolSettings, GAS_FACTOR};
use oxneo_core::{Block, Header, UInt160, UInt256, Witness};
use oxneo_smart_contract::native::{gas_token, neo_token, policy};
use oxneo_persistence::StoreCache;

/// Genesis timestamp: 2016-07-15 15:08:21 UTC, in milliseconds.
pub const GENESIS_TIMESTAMP: u64 = 1_468_595_301_000;
/// Genesis consensus nonce.
pub const GENESIS_NONCE: u64 = 2_083_236_893;
/// GAS minted to the committee at genesis, in whole units.
pub const GENESIS_GAS: i64 = 52_000_000;

/// Builds the genesis block for a validator set.
///
/// `next_consensus` is the validator quorum address, or zero when the
/// chain runs without configured validators (tests, observers).
pub fn create_genesis_block(settings: &ProtocolSettings) -> LedgerResult<Block> {
    let next_consensus = if settings.standby_validators.is_empty() {
        UInt160::zero()
    } else {
        neo_token::consensus_address(settings)?
    };
    Ok(Block {
        header: Header {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp: GENESIS_TIMESTAMP,
            nonce: GENESIS_NONCE,
            index: 0,
            primary_index: 0,
            next_consensus,
            // The genesis witness is the constant-true script.
            witness: Witness::new(Vec::new(), vec![0x11]),
        },
        transactions: Vec::new(),
    })
}

/// Seeds token balances and governance state into a fresh chain's cache.
pub fn initialize_native_state(
    cache: &mut StoreCache,
    settings: &ProtocolSettings,
) -> LedgerResult<()> {
    if settings.standby_validators.is_empty() {
        return Ok(());
    }
    let committee = neo_token::consensus_address(settings)?;
    neo_token::initialize(cache, &committee)?;
    gas_token::mint(cache, &committee, GENESIS_GAS * GAS_FACTOR)?;
    policy::set_committee_address(cache, &committee);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_fixed_shape() {
        let block = create_genesis_block(&ProtocolSettings::default()).unwrap();
        assert_eq!(block.index(), 0);
        assert!(block.header.prev_hash.is_zero());
        assert!(block.header.merkle_root.is_zero());
        assert!(block.transactions.is_empty());
        assert_eq!(block.header.witness.verification_script, vec![0x11]);
    }

    #[test]
    fn genesis_hash_is_deterministic() {
        let settings = ProtocolSettings::default();
        let a = create_genesis_block(&settings).unwrap().hash().unwrap();
        let b = create_genesis_block(&settings).unwrap().hash().unwrap();
        assert_eq!(a, b);
    }
}
