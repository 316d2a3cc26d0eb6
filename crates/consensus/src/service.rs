//! The dBFT service: event handlers and the round-trip driver.

use crate::context::{ConsensusContext, ConsensusPhase, PayloadSlot};
use crate::error::{ConsensusError, ConsensusResult};
use crate::messages::{
    ChangeViewReason, ConsensusMessage, ConsensusMessageBody, CONSENSUS_CATEGORY,
};
use oxneo_config::ProtocolSettings;
use oxneo_core::{contract, Block, ExtensiblePayload, UInt160, UInt256, Witness};
use oxneo_cryptography::ecdsa::verify_signature;
use oxneo_cryptography::KeyPair;
use oxneo_io::Serializable;
use oxneo_ledger::{Blockchain, MemoryPool};
use oxneo_persistence::{layout, Store};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Tag of the commit-replay record in the service-state section.
const COMMIT_RECORD_TAG: &str = "dbft-commit";

/// What the service asks the node to do.
#[derive(Debug, Clone)]
pub enum ConsensusOutput {
    /// Relay a signed consensus payload to the network.
    Broadcast(ExtensiblePayload),
    /// A commit quorum finalized this block; persist and relay it.
    BlockReady(Block),
}

/// The per-node dBFT engine. Handlers are synchronous; the node drives
/// them from network deliveries and a view timer.
pub struct DbftService {
    settings: ProtocolSettings,
    blockchain: Arc<Blockchain>,
    mempool: Arc<RwLock<MemoryPool>>,
    store: Arc<dyn Store>,
    key_pair: Option<KeyPair>,
    context: ConsensusContext,
    outputs: mpsc::UnboundedSender<ConsensusOutput>,
    block_time: Duration,
}

impl DbftService {
    /// Creates a service deciding the next block. `key_pair` is `None`
    /// for watch-only observers.
    pub fn new(
        settings: ProtocolSettings,
        blockchain: Arc<Blockchain>,
        mempool: Arc<RwLock<MemoryPool>>,
        store: Arc<dyn Store>,
        key_pair: Option<KeyPair>,
    ) -> ConsensusResult<(Self, mpsc::UnboundedReceiver<ConsensusOutput>)> {
        let (outputs, receiver) = mpsc::unbounded_channel();
        let block_time = Duration::from_millis(settings.milliseconds_per_block);
        let tip_hash = blockchain.current_hash();
        let tip_header = blockchain
            .get_header(&tip_hash)
            .ok_or_else(|| ConsensusError::InvalidPayload("missing tip header".into()))?;
        let my_key = key_pair.as_ref().map(|pair| pair.public_key());
        let context = ConsensusContext::new(
            &settings,
            my_key.as_ref(),
            blockchain.height() + 1,
            tip_hash,
            tip_header.timestamp,
        )?;
        let mut service = Self {
            settings,
            blockchain,
            mempool,
            store,
            key_pair,
            context,
            outputs,
            block_time,
        };
        service.replay_commit_record();
        Ok((service, receiver))
    }

    /// The context, for inspection.
    pub fn context(&self) -> &ConsensusContext {
        &self.context
    }

    /// View timeout with exponential backoff: `block_time << view`.
    pub fn timer_duration(&self) -> Duration {
        self.block_time * (1u32 << self.context.view_number.min(6))
    }

    /// Timer expiry for the current `(height, view)`.
    pub fn on_timeout(&mut self) {
        if !self.context.is_validator() {
            return;
        }
        match self.context.phase {
            ConsensusPhase::CommitSent => {
                // Never change view after committing; just remind peers.
                if let Some(my_index) = self.context.my_index {
                    if let Some(slot) = &self.context.commits[my_index as usize] {
                        let _ = self
                            .outputs
                            .send(ConsensusOutput::Broadcast(slot.payload.clone()));
                    }
                }
            }
            ConsensusPhase::Initial if self.context.is_primary() => {
                self.send_prepare_request();
            }
            ConsensusPhase::BlockSent => {}
            _ => {
                self.request_change_view(ChangeViewReason::Timeout);
            }
        }
    }

    /// A block was persisted; roll the context to the next height.
    pub fn on_block_persisted(&mut self) {
        let tip_hash = self.blockchain.current_hash();
        let Some(tip_header) = self.blockchain.get_header(&tip_hash) else {
            return;
        };
        let my_key = self.key_pair.as_ref().map(|pair| pair.public_key());
        match ConsensusContext::new(
            &self.settings,
            my_key.as_ref(),
            self.blockchain.height() + 1,
            tip_hash,
            tip_header.timestamp,
        ) {
            Ok(context) => {
                self.context = context;
                self.clear_commit_record();
            }
            Err(error) => {
                tracing::warn!(%error, "failed to roll consensus context");
            }
        }
    }

    /// A consensus payload arrived from the network.
    pub fn on_payload(&mut self, payload: &ExtensiblePayload) -> ConsensusResult<()> {
        self.process_payload(payload, true)
    }

    fn process_payload(
        &mut self,
        payload: &ExtensiblePayload,
        allow_recovery: bool,
    ) -> ConsensusResult<()> {
        if payload.category != CONSENSUS_CATEGORY {
            return Err(ConsensusError::InvalidPayload("wrong category".into()));
        }
        let message = ConsensusMessage::from_bytes(&payload.data)?;
        if message.block_index != self.context.block_index {
            return Err(ConsensusError::StalePayload {
                height: message.block_index,
                view: message.view_number,
            });
        }
        let index = message.validator_index as usize;
        if index >= self.context.validator_count() {
            return Err(ConsensusError::InvalidPayload(format!(
                "validator index {index} out of range"
            )));
        }
        self.verify_payload_signature(payload, index)?;

        match &message.body {
            ConsensusMessageBody::PrepareRequest { .. } => {
                self.handle_prepare_request(payload, &message)
            }
            ConsensusMessageBody::PrepareResponse { .. } => {
                self.handle_prepare_response(payload, &message)
            }
            ConsensusMessageBody::Commit { .. } => self.handle_commit(payload, &message),
            ConsensusMessageBody::ChangeView { .. } => self.handle_change_view(payload, &message),
            ConsensusMessageBody::RecoveryRequest { .. } => {
                self.handle_recovery_request();
                Ok(())
            }
            ConsensusMessageBody::RecoveryMessage { payloads } => {
                if allow_recovery {
                    for embedded in payloads.clone() {
                        // Each embedded payload is validated on its own;
                        // nested recovery bundles are not followed.
                        let _ = self.process_payload(&embedded, false);
                    }
                }
                Ok(())
            }
        }
    }

    fn verify_payload_signature(
        &self,
        payload: &ExtensiblePayload,
        validator_index: usize,
    ) -> ConsensusResult<()> {
        let key = &self.context.validators[validator_index];
        let expected_sender =
            UInt160::from_script(&contract::create_signature_redeem_script(key));
        if payload.sender != expected_sender {
            return Err(ConsensusError::InvalidPayload(
                "sender does not match validator".into(),
            ));
        }
        let signature = extract_signature(&payload.witness)
            .ok_or_else(|| ConsensusError::InvalidPayload("malformed witness".into()))?;
        let digest = payload.hash()?;
        if !verify_signature(digest.as_bytes(), &signature, key) {
            return Err(ConsensusError::InvalidPayload("bad signature".into()));
        }
        Ok(())
    }

    fn handle_prepare_request(
        &mut self,
        payload: &ExtensiblePayload,
        message: &ConsensusMessage,
    ) -> ConsensusResult<()> {
        let ConsensusMessageBody::PrepareRequest {
            version,
            prev_hash,
            timestamp,
            nonce,
            transaction_hashes,
        } = &message.body
        else {
            unreachable!()
        };
        if message.view_number != self.context.view_number
            || self.context.phase == ConsensusPhase::ViewChanging
        {
            return Ok(());
        }
        if message.validator_index != self.context.primary_index() {
            return Err(ConsensusError::InvalidPayload(
                "prepare request not from primary".into(),
            ));
        }
        if self.context.preparation_hash.is_some() {
            return Ok(());
        }
        if *version != 0 || *prev_hash != self.context.prev_hash {
            return Err(ConsensusError::InvalidPayload(
                "proposal does not extend the tip".into(),
            ));
        }
        if *timestamp <= self.context.prev_timestamp {
            return Err(ConsensusError::InvalidPayload(
                "proposal timestamp does not advance".into(),
            ));
        }
        if transaction_hashes.len() > self.settings.max_transactions_per_block {
            self.request_change_view(ChangeViewReason::BlockRejectedByPolicy);
            return Ok(());
        }

        // Every proposed transaction must be at hand.
        let mut transactions = std::collections::HashMap::new();
        {
            let pool = self.mempool.read();
            for hash in transaction_hashes {
                match pool.get(hash) {
                    Some(tx) => {
                        transactions.insert(*hash, (*tx).clone());
                    }
                    None => {
                        drop(pool);
                        self.request_change_view(ChangeViewReason::TxNotFound);
                        return Ok(());
                    }
                }
            }
        }

        let preparation_hash = payload.hash()?;
        self.context.preparation_hash = Some(preparation_hash);
        self.context.proposal = Some(crate::context::Proposal {
            timestamp: *timestamp,
            nonce: *nonce,
            transaction_hashes: transaction_hashes.clone(),
        });
        self.context.transactions = transactions;
        self.context.preparations[message.validator_index as usize] = Some(PayloadSlot {
            payload: payload.clone(),
            message: message.clone(),
        });

        // Purge responses bound to a different request.
        for slot in self.context.preparations.iter_mut() {
            if let Some(existing) = slot {
                if let ConsensusMessageBody::PrepareResponse {
                    preparation_hash: bound,
                } = existing.message.body
                {
                    if bound != preparation_hash {
                        *slot = None;
                    }
                }
            }
        }

        if self.context.is_validator() && !self.context.is_primary() {
            self.send_prepare_response(preparation_hash);
        }
        self.check_preparations();
        Ok(())
    }

    fn handle_prepare_response(
        &mut self,
        payload: &ExtensiblePayload,
        message: &ConsensusMessage,
    ) -> ConsensusResult<()> {
        let ConsensusMessageBody::PrepareResponse { preparation_hash } = &message.body else {
            unreachable!()
        };
        if message.view_number != self.context.view_number {
            return Ok(());
        }
        if let Some(expected) = self.context.preparation_hash {
            if *preparation_hash != expected {
                return Err(ConsensusError::InvalidPayload(
                    "response binds a different request".into(),
                ));
            }
        }
        let index = message.validator_index as usize;
        if self.context.preparations[index].is_none() {
            self.context.preparations[index] = Some(PayloadSlot {
                payload: payload.clone(),
                message: message.clone(),
            });
        }
        self.check_preparations();
        Ok(())
    }

    fn handle_commit(
        &mut self,
        payload: &ExtensiblePayload,
        message: &ConsensusMessage,
    ) -> ConsensusResult<()> {
        if message.view_number != self.context.view_number {
            return Ok(());
        }
        let index = message.validator_index as usize;
        if self.context.commits[index].is_none() {
            self.context.commits[index] = Some(PayloadSlot {
                payload: payload.clone(),
                message: message.clone(),
            });
        }
        self.check_commits();
        Ok(())
    }

    fn handle_change_view(
        &mut self,
        payload: &ExtensiblePayload,
        message: &ConsensusMessage,
    ) -> ConsensusResult<()> {
        let index = message.validator_index as usize;
        self.context.change_views[index] = Some(PayloadSlot {
            payload: payload.clone(),
            message: message.clone(),
        });
        // A committed node never leaves its view.
        if self.context.phase == ConsensusPhase::CommitSent
            || self.context.phase == ConsensusPhase::BlockSent
        {
            return Ok(());
        }
        if let Some(new_view) = self.context.change_view_quorum() {
            tracing::info!(
                height = self.context.block_index,
                from = self.context.view_number,
                to = new_view,
                "view change quorum reached"
            );
            self.context.reset_for_view(new_view);
        }
        Ok(())
    }

    fn handle_recovery_request(&mut self) {
        let mut payloads = Vec::new();
        for slot in self
            .context
            .preparations
            .iter()
            .chain(self.context.commits.iter())
            .chain(self.context.change_views.iter())
            .flatten()
        {
            payloads.push(slot.payload.clone());
        }
        if payloads.is_empty() {
            return;
        }
        if let Some(payload) = self.signed_payload(ConsensusMessageBody::RecoveryMessage {
            payloads,
        }) {
            let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
        }
    }

    /// Broadcasts a plea for the current round's payloads.
    pub fn request_recovery(&mut self) {
        if let Some(payload) = self.signed_payload(ConsensusMessageBody::RecoveryRequest {
            timestamp: unix_millis(),
        }) {
            let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
        }
    }

    fn send_prepare_request(&mut self) {
        let max_txs = self.settings.max_transactions_per_block;
        let transactions = self.mempool.read().take_for_block(max_txs);
        let mut hashes = Vec::with_capacity(transactions.len());
        let mut bodies = std::collections::HashMap::new();
        for tx in &transactions {
            if let Ok(hash) = tx.hash() {
                hashes.push(hash);
                bodies.insert(hash, (**tx).clone());
            }
        }
        let timestamp = unix_millis().max(self.context.prev_timestamp + 1);
        let nonce = rand::random::<u64>();
        let body = ConsensusMessageBody::PrepareRequest {
            version: 0,
            prev_hash: self.context.prev_hash,
            timestamp,
            nonce,
            transaction_hashes: hashes.clone(),
        };
        let Some(payload) = self.signed_payload(body.clone()) else {
            return;
        };
        let Ok(preparation_hash) = payload.hash() else {
            return;
        };
        let my_index = self.context.my_index.expect("primary is a validator");
        self.context.preparation_hash = Some(preparation_hash);
        self.context.proposal = Some(crate::context::Proposal {
            timestamp,
            nonce,
            transaction_hashes: hashes,
        });
        self.context.transactions = bodies;
        self.context.preparations[my_index as usize] = Some(PayloadSlot {
            payload: payload.clone(),
            message: ConsensusMessage {
                block_index: self.context.block_index,
                validator_index: my_index,
                view_number: self.context.view_number,
                body,
            },
        });
        self.context.phase = ConsensusPhase::RequestSent;
        tracing::info!(
            height = self.context.block_index,
            view = self.context.view_number,
            "prepare request sent"
        );
        let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
        self.check_preparations();
    }

    fn send_prepare_response(&mut self, preparation_hash: UInt256) {
        let body = ConsensusMessageBody::PrepareResponse { preparation_hash };
        let Some(payload) = self.signed_payload(body.clone()) else {
            return;
        };
        let my_index = self.context.my_index.expect("checked by caller");
        self.context.preparations[my_index as usize] = Some(PayloadSlot {
            payload: payload.clone(),
            message: ConsensusMessage {
                block_index: self.context.block_index,
                validator_index: my_index,
                view_number: self.context.view_number,
                body,
            },
        });
        self.context.phase = ConsensusPhase::ResponseSent;
        let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
    }

    fn request_change_view(&mut self, reason: ChangeViewReason) {
        let new_view = self.context.view_number + 1;
        let body = ConsensusMessageBody::ChangeView {
            new_view_number: new_view,
            timestamp: unix_millis(),
            reason,
        };
        let Some(payload) = self.signed_payload(body.clone()) else {
            return;
        };
        let my_index = self.context.my_index.expect("validators only");
        self.context.change_views[my_index as usize] = Some(PayloadSlot {
            payload: payload.clone(),
            message: ConsensusMessage {
                block_index: self.context.block_index,
                validator_index: my_index,
                view_number: self.context.view_number,
                body,
            },
        });
        self.context.phase = ConsensusPhase::ViewChanging;
        tracing::info!(
            height = self.context.block_index,
            view = self.context.view_number,
            ?reason,
            "requesting view change"
        );
        let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
        if let Some(adopted) = self.context.change_view_quorum() {
            self.context.reset_for_view(adopted);
        }
    }

    fn check_preparations(&mut self) {
        if !matches!(
            self.context.phase,
            ConsensusPhase::Initial | ConsensusPhase::RequestSent | ConsensusPhase::ResponseSent
        ) {
            return;
        }
        if self.context.preparation_hash.is_none() {
            return;
        }
        if self.context.preparation_count() < self.context.quorum() {
            return;
        }
        if !self.context.is_validator() {
            return;
        }
        let Ok(header) = self.context.make_header() else {
            return;
        };
        let Ok(block_hash) = header.hash() else {
            return;
        };
        let Some(pair) = &self.key_pair else {
            return;
        };
        let Ok(signature) = pair.sign(block_hash.as_bytes()) else {
            return;
        };
        let body = ConsensusMessageBody::Commit { signature };
        let Some(payload) = self.signed_payload(body.clone()) else {
            return;
        };
        let my_index = self.context.my_index.expect("validator");
        self.context.commits[my_index as usize] = Some(PayloadSlot {
            payload: payload.clone(),
            message: ConsensusMessage {
                block_index: self.context.block_index,
                validator_index: my_index,
                view_number: self.context.view_number,
                body,
            },
        });
        self.context.phase = ConsensusPhase::CommitSent;
        self.write_commit_record(&payload);
        tracing::info!(
            height = self.context.block_index,
            block = %block_hash,
            "commit sent"
        );
        let _ = self.outputs.send(ConsensusOutput::Broadcast(payload));
        self.check_commits();
    }

    fn check_commits(&mut self) {
        if self.context.phase == ConsensusPhase::BlockSent {
            return;
        }
        let Ok(header) = self.context.make_header() else {
            return;
        };
        let Ok(block_hash) = header.hash() else {
            return;
        };
        // Discard commits whose signature does not verify for this block.
        for (index, slot) in self.context.commits.iter_mut().enumerate() {
            let drop_slot = match slot {
                Some(existing) => match &existing.message.body {
                    ConsensusMessageBody::Commit { signature } => !verify_signature(
                        block_hash.as_bytes(),
                        signature,
                        &self.context.validators[index],
                    ),
                    _ => true,
                },
                None => false,
            };
            if drop_slot {
                *slot = None;
            }
        }
        if self.context.commit_count() < self.context.quorum() {
            return;
        }
        match self.context.make_block() {
            Ok(block) => {
                self.context.phase = ConsensusPhase::BlockSent;
                tracing::info!(
                    height = self.context.block_index,
                    block = %block_hash,
                    "commit quorum reached, block ready"
                );
                let _ = self.outputs.send(ConsensusOutput::BlockReady(block));
            }
            Err(error) => {
                tracing::warn!(%error, "commit quorum reached but block assembly failed");
            }
        }
    }

    fn signed_payload(&self, body: ConsensusMessageBody) -> Option<ExtensiblePayload> {
        let pair = self.key_pair.as_ref()?;
        let my_index = self.context.my_index?;
        let message = ConsensusMessage {
            block_index: self.context.block_index,
            validator_index: my_index,
            view_number: self.context.view_number,
            body,
        };
        let data = message.to_bytes().ok()?;
        let sender = UInt160::from_script(&contract::create_signature_redeem_script(
            &pair.public_key(),
        ));
        let mut payload = ExtensiblePayload {
            category: CONSENSUS_CATEGORY.to_string(),
            valid_block_start: self.context.block_index.saturating_sub(1),
            valid_block_end: self.context.block_index + 1,
            sender,
            data,
            witness: Witness::default(),
        };
        let digest = payload.hash().ok()?;
        let signature = pair.sign(digest.as_bytes()).ok()?;
        let mut invocation = Vec::with_capacity(66);
        invocation.push(0x0c); // PUSHDATA1
        invocation.push(64);
        invocation.extend_from_slice(&signature);
        payload.witness = Witness::new(
            invocation,
            contract::create_signature_redeem_script(&pair.public_key()),
        );
        Some(payload)
    }

    // ---- commit persistence across restarts ----

    fn write_commit_record(&self, payload: &ExtensiblePayload) {
        let Ok(mut record) = payload.to_bytes() else {
            return;
        };
        let mut value = self.context.block_index.to_le_bytes().to_vec();
        value.append(&mut record);
        self.store
            .put_direct(layout::service_state_key(COMMIT_RECORD_TAG), value);
    }

    fn clear_commit_record(&self) {
        // Overwrite with an empty marker; the next commit replaces it.
        self.store
            .put_direct(layout::service_state_key(COMMIT_RECORD_TAG), Vec::new());
    }

    fn replay_commit_record(&mut self) {
        use oxneo_persistence::StoreView;
        let Some(raw) = self
            .store
            .try_get(&layout::service_state_key(COMMIT_RECORD_TAG))
        else {
            return;
        };
        if raw.len() < 4 {
            return;
        }
        let recorded_index = u32::from_le_bytes(raw[..4].try_into().expect("4 bytes"));
        if recorded_index != self.context.block_index {
            return;
        }
        let Ok(payload) = ExtensiblePayload::from_bytes(&raw[4..]) else {
            return;
        };
        // Re-enter the committed state so this node cannot sign a
        // different block at the same height.
        if self.process_payload(&payload, false).is_ok() {
            self.context.phase = ConsensusPhase::CommitSent;
            tracing::info!(
                height = recorded_index,
                "replayed commit record from previous run"
            );
        }
    }
}

fn extract_signature(witness: &Witness) -> Option<[u8; 64]> {
    let script = &witness.invocation_script;
    if script.len() != 66 || script[0] != 0x0c || script[1] != 64 {
        return None;
    }
    script[2..].try_into().ok()
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_persistence::MemoryStore;

    fn make_network(
        n: usize,
    ) -> (
        Vec<DbftService>,
        Vec<mpsc::UnboundedReceiver<ConsensusOutput>>,
    ) {
        let pairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate()).collect();
        let settings = ProtocolSettings {
            standby_validators: pairs.iter().map(|p| hex::encode(p.public_key())).collect(),
            ..Default::default()
        };
        let mut services = Vec::new();
        let mut receivers = Vec::new();
        for pair in pairs {
            let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
            let blockchain =
                Arc::new(Blockchain::new(store.clone(), settings.clone()).unwrap());
            let mempool = Arc::new(RwLock::new(MemoryPool::default()));
            let (service, receiver) = DbftService::new(
                settings.clone(),
                blockchain,
                mempool,
                store,
                Some(KeyPair::from_private_key(&pair.private_key()).unwrap()),
            )
            .unwrap();
            services.push(service);
            receivers.push(receiver);
        }
        (services, receivers)
    }

    /// Delivers every queued broadcast to every other node, returning any
    /// finalized blocks, until the network is quiet.
    fn run_to_quiescence(
        services: &mut [DbftService],
        receivers: &mut [mpsc::UnboundedReceiver<ConsensusOutput>],
    ) -> Vec<(usize, Block)> {
        let mut blocks = Vec::new();
        loop {
            let mut delivered = false;
            for origin in 0..services.len() {
                while let Ok(output) = receivers[origin].try_recv() {
                    delivered = true;
                    match output {
                        ConsensusOutput::Broadcast(payload) => {
                            for (target, service) in services.iter_mut().enumerate() {
                                if target != origin {
                                    let _ = service.on_payload(&payload);
                                }
                            }
                        }
                        ConsensusOutput::BlockReady(block) => blocks.push((origin, block)),
                    }
                }
            }
            if !delivered {
                break;
            }
        }
        blocks
    }

    #[test]
    fn happy_path_four_validators() {
        let (mut services, mut receivers) = make_network(4);
        // Fire the primary's timer so it proposes.
        let primary = services
            .iter()
            .position(|s| s.context().is_primary())
            .expect("one primary");
        services[primary].on_timeout();

        let blocks = run_to_quiescence(&mut services, &mut receivers);

        // Every node finalized the same block at height 1, still in view 0.
        assert_eq!(blocks.len(), 4);
        let hash = blocks[0].1.hash().unwrap();
        for (_, block) in &blocks {
            assert_eq!(block.index(), 1);
            assert_eq!(block.hash().unwrap(), hash);
        }
        for service in &services {
            assert_eq!(service.context().view_number, 0);
        }
    }

    #[test]
    fn finalized_block_persists_on_chain() {
        let (mut services, mut receivers) = make_network(4);
        let primary = services
            .iter()
            .position(|s| s.context().is_primary())
            .unwrap();
        services[primary].on_timeout();
        let blocks = run_to_quiescence(&mut services, &mut receivers);
        let (origin, block) = &blocks[0];
        services[*origin].blockchain.persist_block(block).unwrap();
        assert_eq!(services[*origin].blockchain.height(), 1);
    }

    #[test]
    fn quorum_short_by_one_never_finalizes() {
        let (mut services, mut receivers) = make_network(4);
        let primary = services
            .iter()
            .position(|s| s.context().is_primary())
            .unwrap();
        services[primary].on_timeout();

        // Deliver traffic only among 2 nodes (primary + one backup):
        // 2 < M = 3 preparations, so nobody commits.
        let backup = (primary + 1) % 4;
        let mut blocks = Vec::new();
        loop {
            let mut delivered = false;
            for origin in [primary, backup] {
                while let Ok(output) = receivers[origin].try_recv() {
                    delivered = true;
                    match output {
                        ConsensusOutput::Broadcast(payload) => {
                            for target in [primary, backup] {
                                if target != origin {
                                    let _ = services[target].on_payload(&payload);
                                }
                            }
                        }
                        ConsensusOutput::BlockReady(block) => blocks.push(block),
                    }
                }
            }
            if !delivered {
                break;
            }
        }
        assert!(blocks.is_empty());
    }

    #[test]
    fn timeout_quorum_changes_view() {
        let (mut services, mut receivers) = make_network(4);
        // Every backup times out without seeing a proposal.
        for service in services.iter_mut() {
            if !service.context().is_primary() {
                service.on_timeout();
            }
        }
        let _ = run_to_quiescence(&mut services, &mut receivers);
        // Three change-view requests are a quorum (M = 3); the backups
        // moved to view 1 and the primary (which saw all three) as well.
        let views: Vec<u8> = services.iter().map(|s| s.context().view_number).collect();
        assert!(views.iter().filter(|v| **v == 1).count() >= 3, "{views:?}");
    }

    #[test]
    fn recovery_brings_a_node_up_to_date() {
        let (mut services, mut receivers) = make_network(4);
        let primary = services
            .iter()
            .position(|s| s.context().is_primary())
            .unwrap();
        services[primary].on_timeout();

        // Run the round with node `lagger` cut off.
        let lagger = (primary + 1) % 4;
        let mut blocks = Vec::new();
        loop {
            let mut delivered = false;
            for origin in 0..services.len() {
                if origin == lagger {
                    continue;
                }
                while let Ok(output) = receivers[origin].try_recv() {
                    delivered = true;
                    match output {
                        ConsensusOutput::Broadcast(payload) => {
                            for (target, service) in services.iter_mut().enumerate() {
                                if target != origin && target != lagger {
                                    let _ = service.on_payload(&payload);
                                }
                            }
                        }
                        ConsensusOutput::BlockReady(block) => blocks.push(block),
                    }
                }
            }
            if !delivered {
                break;
            }
        }
        assert!(!blocks.is_empty());

        // The lagger asks for recovery; a caught-up node answers with its
        // stored payloads, which the lagger replays independently.
        services[lagger].request_recovery();
        let request = loop {
            match receivers[lagger].try_recv().unwrap() {
                ConsensusOutput::Broadcast(payload) => break payload,
                _ => continue,
            }
        };
        let responder = (lagger + 1) % 4;
        services[responder].on_payload(&request).unwrap();
        let mut lagger_blocks = Vec::new();
        while let Ok(output) = receivers[responder].try_recv() {
            if let ConsensusOutput::Broadcast(payload) = output {
                let _ = services[lagger].on_payload(&payload);
            }
        }
        while let Ok(output) = receivers[lagger].try_recv() {
            if let ConsensusOutput::BlockReady(block) = output {
                lagger_blocks.push(block);
            }
        }
        assert_eq!(lagger_blocks.len(), 1);
        assert_eq!(
            lagger_blocks[0].hash().unwrap(),
            blocks[0].hash().unwrap()
        );
    }
}
