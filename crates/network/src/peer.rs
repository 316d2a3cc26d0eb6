//! Per-connection peer state.

use crate::messages::{Message, VersionPayload};
use oxneo_cryptography::BloomFilter;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;

/// Outbound queue depth per connection. Low-priority broadcasts are
/// dropped when it fills; direct responses block briefly instead.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Score deducted for a malformed or protocol-violating message.
pub const MISBEHAVIOR_PENALTY: i32 = 30;
/// Score at which a peer is disconnected and banned.
pub const DISCONNECT_SCORE: i32 = 100;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// TCP established; nothing exchanged.
    Connected,
    /// Our `version` sent.
    VersionSent,
    /// Peer's `version` received.
    VersionReceived,
    /// Both `verack`s exchanged; the peer is fully established.
    Established,
}

/// One remote peer.
pub struct Peer {
    /// The remote endpoint.
    pub address: SocketAddr,
    /// Whether we dialed out (true) or accepted (false).
    pub outbound: bool,
    /// Queue to the connection's writer task.
    pub sender: mpsc::Sender<Message>,
    /// Handshake progress.
    pub handshake: HandshakeState,
    /// The peer's announced version, once received.
    pub version: Option<VersionPayload>,
    /// Whether the peer's `verack` arrived (it may cross our `version`).
    pub verack_received: bool,
    /// Accumulated misbehavior score.
    pub misbehavior: i32,
    /// When traffic last arrived.
    pub last_seen: Instant,
    /// Outstanding ping nonce, if any.
    pub pending_ping: Option<(u32, Instant)>,
    /// The peer's advertised height (updated by version/ping/pong).
    pub last_block_index: u32,
    /// SPV filter loaded by this peer, if any.
    pub filter: Option<BloomFilter>,
}

impl Peer {
    /// Creates peer state around the writer queue.
    pub fn new(address: SocketAddr, outbound: bool, sender: mpsc::Sender<Message>) -> Self {
        Self {
            address,
            outbound,
            sender,
            handshake: HandshakeState::Connected,
            version: None,
            verack_received: false,
            misbehavior: 0,
            last_seen: Instant::now(),
            pending_ping: None,
            last_block_index: 0,
            filter: None,
        }
    }

    /// Whether the handshake completed both ways.
    pub fn is_established(&self) -> bool {
        self.handshake == HandshakeState::Established
    }

    /// Adds misbehavior; returns `true` when the peer must be dropped.
    pub fn penalize(&mut self, points: i32) -> bool {
        self.misbehavior += points;
        self.misbehavior >= DISCONNECT_SCORE
    }

    /// Queues a message without waiting; drops it when the queue is full.
    /// For broadcasts and other low-priority traffic.
    pub fn try_send(&self, message: Message) -> bool {
        self.sender.try_send(message).is_ok()
    }
}
