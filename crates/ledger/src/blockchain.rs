//! The blockchain: header-chain extension, block execution and atomic
//! persistence.

use crate::error::{InvalidBlockReason, LedgerError, LedgerResult};
use crate::events::BlockchainEvent;
use crate::genesis;
use crate::mempool::TransactionVerifier;
use crate::verification;
use crate::verify_result::VerifyResult;
use oxneo_config::ProtocolSettings;
use oxneo_core::{Block, Header, Transaction, UInt160, UInt256};
use oxneo_cryptography::merkle::merkle_root;
use oxneo_io::Serializable;
use oxneo_persistence::{layout, StorageKey, Store, StoreCache, StoreView};
use oxneo_smart_contract::native::{self, ledger as ledger_native, NativeContext};
use oxneo_smart_contract::{ApplicationEngine, Container, TriggerType};
use oxneo_vm::{CallFlags, VmState};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Prefix (inside the ledger contract's storage space) of persisted
/// transactions.
const TX_STORAGE_PREFIX: u8 = 0x0b;

/// What persisting a transaction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxExecutionState {
    Halt,
    Fault,
}

/// The chain state machine. One per node; all mutations funnel through
/// the single persist lock.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: ProtocolSettings,
    tip: RwLock<(u32, UInt256)>,
    /// Serializes block persistence; held for the whole pipeline.
    persist_lock: Mutex<()>,
    events: broadcast::Sender<BlockchainEvent>,
}

impl Blockchain {
    /// Opens (or bootstraps) a chain over `store`.
    pub fn new(store: Arc<dyn Store>, settings: ProtocolSettings) -> LedgerResult<Self> {
        let (events, _) = broadcast::channel(256);
        let blockchain = Self {
            store,
            settings,
            tip: RwLock::new((0, UInt256::zero())),
            persist_lock: Mutex::new(()),
            events,
        };
        blockchain.bootstrap()?;
        Ok(blockchain)
    }

    /// Writes the genesis block on first start; otherwise restores the tip.
    fn bootstrap(&self) -> LedgerResult<()> {
        if let Some(raw) = self.store.try_get(&layout::current_block_key()) {
            let (index, hash) = ledger_native::decode_pointer(&raw)
                .ok_or_else(|| LedgerError::InvalidFormat("corrupt current-block pointer".into()))?;
            *self.tip.write() = (index, hash);
            return Ok(());
        }

        let block = genesis::create_genesis_block(&self.settings)?;
        let hash = block.hash()?;
        let mut cache = StoreCache::new(self.store.snapshot());
        genesis::initialize_native_state(&mut cache, &self.settings)?;
        self.write_block_with_states(&mut cache, &block, &hash, &[])?;
        cache.put(
            layout::current_block_key(),
            ledger_native::encode_pointer(0, &hash),
        );
        cache.commit();
        *self.tip.write() = (0, hash);
        tracing::info!(%hash, "genesis block written");
        Ok(())
    }

    /// Protocol settings in force.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// Subscribes to chain events.
    pub fn subscribe(&self) -> broadcast::Receiver<BlockchainEvent> {
        self.events.subscribe()
    }

    /// Current height.
    pub fn height(&self) -> u32 {
        self.tip.read().0
    }

    /// Hash of the current tip.
    pub fn current_hash(&self) -> UInt256 {
        self.tip.read().1
    }

    /// A read-only cache over the committed store.
    pub fn snapshot(&self) -> StoreCache {
        StoreCache::new(self.store.snapshot())
    }

    /// Fetches a block by hash.
    pub fn get_block(&self, hash: &UInt256) -> Option<Block> {
        let raw = self.store.try_get(&layout::block_key(hash))?;
        Block::from_bytes(&raw).ok()
    }

    /// Fetches a block by height.
    pub fn get_block_by_index(&self, index: u32) -> Option<Block> {
        let hash = self.get_block_hash(index)?;
        self.get_block(&hash)
    }

    /// Resolves a height to its block hash.
    pub fn get_block_hash(&self, index: u32) -> Option<UInt256> {
        let raw = self.store.try_get(&layout::index_key(index))?;
        UInt256::from_slice(&raw).ok()
    }

    /// Fetches a header by hash.
    pub fn get_header(&self, hash: &UInt256) -> Option<Header> {
        let raw = self.store.try_get(&layout::header_key(hash))?;
        Header::from_bytes(&raw).ok()
    }

    /// Whether a block with this hash is persisted.
    pub fn contains_block(&self, hash: &UInt256) -> bool {
        self.store.contains(&layout::block_key(hash))
    }

    /// Fetches a persisted transaction with its block height and final VM
    /// state.
    pub fn get_transaction(&self, hash: &UInt256) -> Option<(Transaction, u32, TxExecutionState)> {
        let raw = self.store.try_get(&tx_storage_raw_key(hash))?;
        if raw.len() < 5 {
            return None;
        }
        let index = u32::from_le_bytes(raw[..4].try_into().ok()?);
        let state = if raw[4] == 1 {
            TxExecutionState::Halt
        } else {
            TxExecutionState::Fault
        };
        let tx = Transaction::from_bytes(&raw[5..]).ok()?;
        Some((tx, index, state))
    }

    /// Whether a transaction is persisted.
    pub fn contains_transaction_hash(&self, hash: &UInt256) -> bool {
        self.store.contains(&tx_storage_raw_key(hash))
    }

    /// Full admission verification of a single transaction against the
    /// committed state. Used by the mempool and RPC.
    pub fn verify_transaction(&self, tx: &Transaction) -> VerifyResult {
        if tx.verify_state_independent().is_err() {
            return VerifyResult::Invalid;
        }
        let height = self.height();
        let snapshot = self.snapshot();
        let state = verification::verify_state_dependent(tx, &snapshot, height, &self.settings);
        if !state.is_ok() {
            return state;
        }
        let fee_per_byte = oxneo_smart_contract::native::policy::fee_per_byte(&snapshot);
        verification::verify_witnesses(
            tx,
            || self.snapshot(),
            height,
            &self.settings,
            fee_per_byte,
        )
    }

    /// Validates and persists `block` atomically.
    ///
    /// Rejections in the header/body phase leave no trace; once execution
    /// starts, either the whole block commits or nothing does.
    pub fn persist_block(&self, block: &Block) -> LedgerResult<()> {
        let _guard = self.persist_lock.lock();

        // ---- 1. Header checks against the current tip. ----
        let (tip_index, tip_hash) = *self.tip.read();
        if block.header.version != 0 {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(
                format!("version {}", block.header.version),
            )));
        }
        if block.index() <= tip_index {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::Duplicate));
        }
        if block.index() != tip_index + 1 {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(
                format!("index {} does not extend tip {tip_index}", block.index()),
            )));
        }
        if block.header.prev_hash != tip_hash {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(
                "prev_hash does not match tip".into(),
            )));
        }
        let tip_header = self
            .get_header(&tip_hash)
            .ok_or_else(|| LedgerError::NotFound(format!("tip header {tip_hash}")))?;
        if block.header.timestamp <= tip_header.timestamp {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(
                "timestamp does not advance".into(),
            )));
        }
        let validator_count = self.settings.validator_count();
        if validator_count > 0 && block.header.primary_index as usize >= validator_count {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(
                format!("primary index {}", block.header.primary_index),
            )));
        }
        if block.size() > self.settings.max_block_size {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::BadBody(
                format!("size {}", block.size()),
            )));
        }
        self.verify_block_witness(block, &tip_header)?;

        // ---- 2. Body checks. ----
        if block.transactions.len() > self.settings.max_transactions_per_block {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::BadBody(
                format!("{} transactions", block.transactions.len()),
            )));
        }
        block
            .verify_structure()
            .map_err(|e| LedgerError::InvalidBlock(InvalidBlockReason::BadBody(e.to_string())))?;
        let system_fees: i64 = block.transactions.iter().map(|tx| tx.system_fee).sum();
        if system_fees > self.settings.max_block_system_fee {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::BadBody(
                format!("system fees {system_fees}"),
            )));
        }
        for tx in &block.transactions {
            tx.verify_state_independent().map_err(|e| {
                LedgerError::InvalidBlock(InvalidBlockReason::BadBody(e.to_string()))
            })?;
        }

        let block_hash = block.hash()?;

        // ---- 3. Open a snapshot and run the native OnPersist hooks. ----
        let mut cache = StoreCache::new(self.store.snapshot());
        {
            let mut native_ctx = NativeContext {
                cache: &mut cache,
                block,
                settings: &self.settings,
            };
            native::on_persist(&mut native_ctx)?;
        }

        // ---- 4. Execute each transaction under its own child cache. ----
        let mut tx_states = Vec::with_capacity(block.transactions.len());
        for tx in &block.transactions {
            let state = verification::verify_state_dependent(
                tx,
                &cache,
                block.index().saturating_sub(1),
                &self.settings,
            );
            if !state.is_ok() {
                return Err(LedgerError::InvalidTransaction(state));
            }

            let child = cache.create_snapshot();
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                Container::Transaction(tx.clone()),
                child,
                tx.system_fee,
                self.settings.magic,
                block.index(),
                block.header.timestamp,
            );
            engine.load_script(tx.script.clone(), CallFlags::ALL)?;
            let vm_state = engine.execute();
            let fault = engine.fault_reason();
            let (child, notifications) = engine.into_parts();
            match vm_state {
                VmState::Halt => {
                    cache = child.commit_to_parent().expect("child cache has a parent");
                    tx_states.push(TxExecutionState::Halt);
                    tracing::debug!(
                        tx = %tx.hash()?,
                        notifications = notifications.len(),
                        "transaction executed"
                    );
                }
                _ => {
                    // Discard the transaction's writes; fees were already
                    // burned by OnPersist.
                    cache = child.abandon().expect("child cache has a parent");
                    tx_states.push(TxExecutionState::Fault);
                    tracing::debug!(
                        tx = %tx.hash()?,
                        reason = fault.unwrap_or_default(),
                        "transaction faulted"
                    );
                }
            }
        }

        // ---- 5. Native PostPersist hooks. ----
        {
            let mut native_ctx = NativeContext {
                cache: &mut cache,
                block,
                settings: &self.settings,
            };
            native::post_persist(&mut native_ctx)?;
        }

        // ---- 6. Write the block, its index mapping and transactions. ----
        self.write_block_with_states(&mut cache, block, &block_hash, &tx_states)?;
        cache.put(layout::next_block_key(&tip_hash), block_hash.as_bytes().to_vec());
        cache.put(
            layout::current_block_key(),
            ledger_native::encode_pointer(block.index(), &block_hash),
        );

        // ---- 7. State root over the mutations, then one atomic commit. ----
        let root = state_root_of(&cache);
        cache.commit();
        *self.tip.write() = (block.index(), block_hash);

        let _ = self
            .events
            .send(BlockchainEvent::BlockPersisted(Arc::new(block.clone())));
        let _ = self.events.send(BlockchainEvent::StateChanged {
            index: block.index(),
            root,
        });
        tracing::info!(index = block.index(), hash = %block_hash, "block persisted");
        Ok(())
    }

    /// Decodes and persists an imported block, requiring its index to be
    /// exactly the next height. A mismatch is a fatal format error.
    pub fn import_block(&self, raw: &[u8], expected_index: u32) -> LedgerResult<()> {
        let block = Block::from_bytes(raw)
            .map_err(|e| LedgerError::InvalidFormat(format!("undecodable block: {e}")))?;
        if block.index() != expected_index {
            return Err(LedgerError::InvalidFormat(format!(
                "imported block index {} where {expected_index} was expected",
                block.index()
            )));
        }
        self.persist_block(&block)
    }

    fn verify_block_witness(&self, block: &Block, tip_header: &Header) -> LedgerResult<()> {
        if tip_header.next_consensus.is_zero() {
            // Chains without a validator set (tests, local import) skip the
            // quorum witness.
            return Ok(());
        }
        let witness = &block.header.witness;
        if witness.script_hash() != tip_header.next_consensus {
            return Err(LedgerError::InvalidBlock(InvalidBlockReason::WitnessFailure(
                "witness does not hash to next_consensus".into(),
            )));
        }
        let block_hash = block.hash()?;
        ApplicationEngine::verify_witness(
            Container::Block { hash: block_hash },
            self.snapshot(),
            &witness.verification_script,
            &witness.invocation_script,
            oxneo_smart_contract::application_engine::MAX_VERIFICATION_GAS,
            self.settings.magic,
            self.height(),
        )
        .map_err(|e| {
            LedgerError::InvalidBlock(InvalidBlockReason::WitnessFailure(e.to_string()))
        })?;
        Ok(())
    }

    fn write_block_with_states(
        &self,
        cache: &mut StoreCache,
        block: &Block,
        block_hash: &UInt256,
        tx_states: &[TxExecutionState],
    ) -> LedgerResult<()> {
        cache.put(layout::block_key(block_hash), block.to_bytes()?);
        cache.put(layout::header_key(block_hash), block.header.to_bytes()?);
        cache.put(
            layout::index_key(block.index()),
            block_hash.as_bytes().to_vec(),
        );
        for (position, tx) in block.transactions.iter().enumerate() {
            let hash = tx.hash()?;
            let state = tx_states
                .get(position)
                .copied()
                .unwrap_or(TxExecutionState::Halt);
            let mut value = Vec::with_capacity(5 + tx.size());
            value.extend_from_slice(&block.index().to_le_bytes());
            value.push(if state == TxExecutionState::Halt { 1 } else { 0 });
            value.extend_from_slice(&tx.to_bytes()?);
            cache.put(tx_storage_raw_key(&hash), value);
        }
        Ok(())
    }
}

impl TransactionVerifier for Blockchain {
    fn verify(&self, tx: &Transaction) -> VerifyResult {
        self.verify_transaction(tx)
    }

    fn contains_transaction(&self, hash: &UInt256) -> bool {
        self.contains_transaction_hash(hash)
    }
}

/// Raw store key of a persisted transaction, inside the ledger contract's
/// storage section.
fn tx_storage_raw_key(hash: &UInt256) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 32);
    key.push(TX_STORAGE_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    layout::storage_key(&StorageKey::new(native::LEDGER_ID, key))
}

/// Merkle root over the block's mutated keys, the light-weight stand-in
/// for a full state trie.
fn state_root_of(cache: &StoreCache) -> UInt256 {
    let mut leaves: Vec<[u8; 32]> = cache
        .tracked_changes()
        .into_iter()
        .map(|(key, value)| {
            let mut preimage = key;
            match value {
                Some(value) => preimage.extend_from_slice(&value),
                // Deletions hash the key with a tombstone marker.
                None => preimage.push(0xff),
            }
            oxneo_cryptography::hash::hash256(&preimage)
        })
        .collect();
    leaves.sort();
    UInt256::from_bytes(merkle_root(&leaves))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidBlockReason;
    use oxneo_core::Witness;
    use oxneo_persistence::MemoryStore;

    fn chain() -> Blockchain {
        Blockchain::new(Arc::new(MemoryStore::new()), ProtocolSettings::default()).unwrap()
    }

    fn next_block(chain: &Blockchain) -> Block {
        let tip_hash = chain.current_hash();
        let tip_header = chain.get_header(&tip_hash).unwrap();
        let mut block = Block {
            header: Header {
                version: 0,
                prev_hash: tip_hash,
                merkle_root: UInt256::zero(),
                timestamp: tip_header.timestamp + 1,
                nonce: 7,
                index: chain.height() + 1,
                primary_index: 0,
                next_consensus: UInt160::zero(),
                witness: Witness::new(Vec::new(), vec![0x11]),
            },
            transactions: Vec::new(),
        };
        block.header.merkle_root = block.compute_merkle_root().unwrap();
        block
    }

    #[test]
    fn genesis_bootstraps_once() {
        let chain = chain();
        assert_eq!(chain.height(), 0);
        let genesis_hash = chain.current_hash();
        assert!(chain.contains_block(&genesis_hash));
        assert!(chain.get_block_by_index(0).is_some());
    }

    #[test]
    fn persisting_genesis_again_is_duplicate() {
        let chain = chain();
        let genesis = chain.get_block_by_index(0).unwrap();
        let result = chain.persist_block(&genesis);
        assert!(matches!(
            result,
            Err(LedgerError::InvalidBlock(InvalidBlockReason::Duplicate))
        ));
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn empty_block_extends_chain() {
        let chain = chain();
        let block = next_block(&chain);
        chain.persist_block(&block).unwrap();
        assert_eq!(chain.height(), 1);
        assert_eq!(chain.current_hash(), block.hash().unwrap());
        assert_eq!(
            chain.get_block_hash(1),
            Some(block.hash().unwrap())
        );
    }

    #[test]
    fn stale_timestamp_rejected() {
        let chain = chain();
        let mut block = next_block(&chain);
        block.header.timestamp = 0;
        assert!(matches!(
            chain.persist_block(&block),
            Err(LedgerError::InvalidBlock(InvalidBlockReason::HeaderMismatch(_)))
        ));
    }

    #[test]
    fn wrong_prev_hash_rejected() {
        let chain = chain();
        let mut block = next_block(&chain);
        block.header.prev_hash = UInt256::from_bytes([9u8; 32]);
        assert!(chain.persist_block(&block).is_err());
        assert_eq!(chain.height(), 0);
    }

    #[test]
    fn bad_merkle_root_rejected() {
        let chain = chain();
        let mut block = next_block(&chain);
        block.header.merkle_root = UInt256::from_bytes([5u8; 32]);
        assert!(chain.persist_block(&block).is_err());
    }

    #[test]
    fn import_block_strict_index() {
        let chain = chain();
        let block = next_block(&chain);
        let raw = block.to_bytes().unwrap();
        // Wrong expected index is a format error, not a silent warning.
        assert!(matches!(
            chain.import_block(&raw, 5),
            Err(LedgerError::InvalidFormat(_))
        ));
        chain.import_block(&raw, 1).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn events_emitted_after_commit() {
        let chain = chain();
        let mut events = chain.subscribe();
        let block = next_block(&chain);
        chain.persist_block(&block).unwrap();
        match events.try_recv().unwrap() {
            BlockchainEvent::BlockPersisted(persisted) => {
                assert_eq!(persisted.index(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            events.try_recv().unwrap(),
            BlockchainEvent::StateChanged { index: 1, .. }
        ));
    }
}
