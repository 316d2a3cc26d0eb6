//! Per-round consensus state.

use crate::error::{ConsensusError, ConsensusResult};
use crate::messages::{ConsensusMessage, ConsensusMessageBody};
use oxneo_config::ProtocolSettings;
use oxneo_core::{contract, Block, ExtensiblePayload, Header, Transaction, UInt160, UInt256, Witness};
use oxneo_cryptography::ecdsa::PUBLIC_KEY_SIZE;
use oxneo_cryptography::merkle::merkle_root;
use oxneo_smart_contract::native::neo_token;
use std::collections::HashMap;

/// Where this node stands in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusPhase {
    /// Nothing sent or received for this round yet.
    Initial,
    /// Primary: proposal broadcast.
    RequestSent,
    /// Backup: proposal acknowledged.
    ResponseSent,
    /// Commit signature broadcast; the node must not change view.
    CommitSent,
    /// Block assembled and handed to persistence.
    BlockSent,
    /// Waiting for a view-change quorum.
    ViewChanging,
}

/// A stored payload slot: the raw envelope plus its parsed message.
pub struct PayloadSlot {
    pub payload: ExtensiblePayload,
    pub message: ConsensusMessage,
}

/// All state for one `(block_index, view)` decision.
pub struct ConsensusContext {
    /// Sorted validator public keys; index = validator index.
    pub validators: Vec<[u8; PUBLIC_KEY_SIZE]>,
    /// This node's validator index, or `None` when watch-only.
    pub my_index: Option<u8>,
    /// The height being decided.
    pub block_index: u32,
    /// Current view.
    pub view_number: u8,
    /// Phase of this node.
    pub phase: ConsensusPhase,
    /// Hash of the tip this round builds on.
    pub prev_hash: UInt256,
    /// Timestamp of the tip header.
    pub prev_timestamp: u64,
    /// One slot per validator for the preparation (request or response).
    pub preparations: Vec<Option<PayloadSlot>>,
    /// One slot per validator for commits.
    pub commits: Vec<Option<PayloadSlot>>,
    /// One slot per validator for change-view requests.
    pub change_views: Vec<Option<PayloadSlot>>,
    /// Hash of the accepted prepare-request payload.
    pub preparation_hash: Option<UInt256>,
    /// The proposal's fields once a request is accepted.
    pub proposal: Option<Proposal>,
    /// Bodies of the proposal's transactions, by hash.
    pub transactions: HashMap<UInt256, Transaction>,
}

/// The accepted proposal for this round.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub timestamp: u64,
    pub nonce: u64,
    pub transaction_hashes: Vec<UInt256>,
}

impl ConsensusContext {
    /// Builds a context for deciding `block_index` on top of the given tip.
    pub fn new(
        settings: &ProtocolSettings,
        my_public_key: Option<&[u8; PUBLIC_KEY_SIZE]>,
        block_index: u32,
        prev_hash: UInt256,
        prev_timestamp: u64,
    ) -> ConsensusResult<Self> {
        let validators = neo_token::next_block_validators(settings)?;
        if validators.is_empty() {
            return Err(ConsensusError::NotValidator);
        }
        let my_index = my_public_key.and_then(|key| {
            validators
                .iter()
                .position(|v| v == key)
                .map(|index| index as u8)
        });
        let n = validators.len();
        Ok(Self {
            validators,
            my_index,
            block_index,
            view_number: 0,
            phase: ConsensusPhase::Initial,
            prev_hash,
            prev_timestamp,
            preparations: (0..n).map(|_| None).collect(),
            commits: (0..n).map(|_| None).collect(),
            change_views: (0..n).map(|_| None).collect(),
            preparation_hash: None,
            proposal: None,
            transactions: HashMap::new(),
        })
    }

    /// Validator count `n`.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Fault tolerance `f = (n - 1) / 3`.
    pub fn f(&self) -> usize {
        (self.validator_count() - 1) / 3
    }

    /// Quorum size `M = n - f`.
    pub fn quorum(&self) -> usize {
        self.validator_count() - self.f()
    }

    /// The primary for the current view: `(block_index - view) mod n`.
    pub fn primary_index(&self) -> u8 {
        let n = self.validator_count() as i64;
        ((self.block_index as i64 - self.view_number as i64).rem_euclid(n)) as u8
    }

    /// Whether this node is the current primary.
    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index())
    }

    /// Whether this node participates at all.
    pub fn is_validator(&self) -> bool {
        self.my_index.is_some()
    }

    /// Resets per-view state for `new_view`, keeping commits: a node that
    /// committed must never regress.
    pub fn reset_for_view(&mut self, new_view: u8) {
        self.view_number = new_view;
        self.phase = ConsensusPhase::Initial;
        self.preparation_hash = None;
        self.proposal = None;
        for slot in self.preparations.iter_mut() {
            *slot = None;
        }
        for slot in self.change_views.iter_mut() {
            *slot = None;
        }
    }

    /// Count of stored preparations matching the accepted request.
    pub fn preparation_count(&self) -> usize {
        self.preparations.iter().filter(|s| s.is_some()).count()
    }

    /// Count of stored commits for the current view.
    pub fn commit_count(&self) -> usize {
        self.commits
            .iter()
            .flatten()
            .filter(|slot| slot.message.view_number == self.view_number)
            .count()
    }

    /// Validators that asked for a view at or above `target`.
    pub fn change_view_quorum(&self) -> Option<u8> {
        let wanted: Vec<u8> = self
            .change_views
            .iter()
            .flatten()
            .filter_map(|slot| match slot.message.body {
                ConsensusMessageBody::ChangeView {
                    new_view_number, ..
                } if new_view_number > self.view_number => Some(new_view_number),
                _ => None,
            })
            .collect();
        if wanted.len() >= self.quorum() {
            wanted.iter().min().copied()
        } else {
            None
        }
    }

    /// The quorum multisig address the assembled block's witness must
    /// hash to.
    pub fn consensus_address(&self) -> ConsensusResult<UInt160> {
        contract::multisig_script_hash(self.quorum(), &self.validators)
            .map_err(ConsensusError::from)
    }

    /// Builds the unsigned header for the accepted proposal.
    pub fn make_header(&self) -> ConsensusResult<Header> {
        let proposal = self
            .proposal
            .as_ref()
            .ok_or_else(|| ConsensusError::InvalidPayload("no proposal accepted".into()))?;
        let hashes: Vec<[u8; 32]> = proposal
            .transaction_hashes
            .iter()
            .map(|h| *h.as_bytes())
            .collect();
        Ok(Header {
            version: 0,
            prev_hash: self.prev_hash,
            merkle_root: UInt256::from_bytes(merkle_root(&hashes)),
            timestamp: proposal.timestamp,
            nonce: proposal.nonce,
            index: self.block_index,
            primary_index: self.primary_index(),
            next_consensus: self.consensus_address()?,
            witness: Witness::default(),
        })
    }

    /// Assembles the final block from the commit quorum: signatures
    /// concatenated in validator order form the invocation script against
    /// the standard multisig verification script.
    pub fn make_block(&self) -> ConsensusResult<Block> {
        let mut header = self.make_header()?;
        let proposal = self
            .proposal
            .as_ref()
            .ok_or_else(|| ConsensusError::InvalidPayload("no proposal accepted".into()))?;

        let m = self.quorum();
        let mut invocation = Vec::new();
        let mut used = 0;
        for slot in self.commits.iter().flatten() {
            if used == m {
                break;
            }
            if slot.message.view_number != self.view_number {
                continue;
            }
            if let ConsensusMessageBody::Commit { signature } = &slot.message.body {
                invocation.push(0x0c); // PUSHDATA1
                invocation.push(64);
                invocation.extend_from_slice(signature);
                used += 1;
            }
        }
        if used < m {
            return Err(ConsensusError::InvalidPayload(format!(
                "only {used} of {m} commits available"
            )));
        }
        let verification = contract::create_multisig_redeem_script(m, &self.validators)?;
        header.witness = Witness::new(invocation, verification);

        let mut transactions = Vec::with_capacity(proposal.transaction_hashes.len());
        for hash in &proposal.transaction_hashes {
            let tx = self.transactions.get(hash).ok_or_else(|| {
                ConsensusError::InvalidPayload(format!("missing transaction {hash}"))
            })?;
            transactions.push(tx.clone());
        }
        Ok(Block {
            header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_cryptography::KeyPair;

    fn settings(n: usize) -> (ProtocolSettings, Vec<KeyPair>) {
        let pairs: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate()).collect();
        let settings = ProtocolSettings {
            standby_validators: pairs.iter().map(|p| hex::encode(p.public_key())).collect(),
            ..Default::default()
        };
        (settings, pairs)
    }

    #[test]
    fn quorum_arithmetic() {
        let (settings, pairs) = settings(4);
        let ctx = ConsensusContext::new(
            &settings,
            Some(&pairs[0].public_key()),
            1,
            UInt256::zero(),
            0,
        )
        .unwrap();
        assert_eq!(ctx.validator_count(), 4);
        assert_eq!(ctx.f(), 1);
        assert_eq!(ctx.quorum(), 3);
    }

    #[test]
    fn primary_rotates_with_view() {
        let (settings, pairs) = settings(4);
        let mut ctx = ConsensusContext::new(
            &settings,
            Some(&pairs[0].public_key()),
            8,
            UInt256::zero(),
            0,
        )
        .unwrap();
        let p0 = ctx.primary_index();
        ctx.reset_for_view(1);
        let p1 = ctx.primary_index();
        assert_ne!(p0, p1);
        // (block_index - view) mod n.
        assert_eq!(p0, (8 % 4) as u8);
        assert_eq!(p1, (7 % 4) as u8);
    }

    #[test]
    fn my_index_follows_sorted_keys() {
        let (settings, pairs) = settings(4);
        let sorted = neo_token::next_block_validators(&settings).unwrap();
        for pair in &pairs {
            let ctx = ConsensusContext::new(
                &settings,
                Some(&pair.public_key()),
                1,
                UInt256::zero(),
                0,
            )
            .unwrap();
            let expected = sorted.iter().position(|k| *k == pair.public_key()).unwrap();
            assert_eq!(ctx.my_index, Some(expected as u8));
        }
    }

    #[test]
    fn watch_only_when_key_absent() {
        let (settings, _) = settings(4);
        let outsider = KeyPair::generate();
        let ctx = ConsensusContext::new(
            &settings,
            Some(&outsider.public_key()),
            1,
            UInt256::zero(),
            0,
        )
        .unwrap();
        assert!(!ctx.is_validator());
    }
}
