//! The local node: listener, connections and message dispatch.

use crate::error::{NetworkError, NetworkResult};
use crate::messages::{
    AddrPayload, FilterAddPayload, FilterLoadPayload, GetHeadersPayload, HeadersPayload,
    InvPayload, InventoryType, Message, MessageCommand, NetworkAddress, PingPayload,
    VersionPayload, FRAME_HEADER_SIZE, MAX_ADDRESSES_PER_MESSAGE,
};
use crate::peer::{HandshakeState, Peer, MISBEHAVIOR_PENALTY, OUTBOUND_QUEUE_DEPTH};
use crate::peer_manager::PeerManager;
use crate::relay_cache::RelayCache;
use crate::sync::SyncManager;
use oxneo_config::NetworkConfig;
use oxneo_core::{Block, ExtensiblePayload, Transaction, UInt256};
use oxneo_cryptography::BloomFilter;
use oxneo_io::Serializable;
use oxneo_ledger::{Blockchain, BlockchainEvent, MemoryPool};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// Relay cache capacity (recently seen inventory hashes).
const RELAY_CACHE_CAPACITY: usize = 1_000;
/// Relay cache entry lifetime.
const RELAY_CACHE_TTL: Duration = Duration::from_secs(600);
/// How often the maintenance loop runs.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);
/// Blocks requested per sync round.
const BLOCKS_PER_REQUEST: usize = 50;

struct NodeInner {
    magic: u32,
    nonce: u32,
    user_agent: String,
    config: NetworkConfig,
    blockchain: Arc<Blockchain>,
    mempool: Arc<RwLock<MemoryPool>>,
    peers: Mutex<HashMap<SocketAddr, Peer>>,
    peer_manager: Mutex<PeerManager>,
    relay_cache: Mutex<RelayCache<UInt256>>,
    sync: Mutex<SyncManager>,
    /// Extensible payloads held for `getdata`, by hash.
    extensible_pool: Mutex<HashMap<UInt256, ExtensiblePayload>>,
    /// Consensus inbox, when this node runs a dBFT service.
    consensus_tx: Mutex<Option<mpsc::UnboundedSender<ExtensiblePayload>>>,
    shutdown: watch::Sender<bool>,
}

/// The P2P engine facade the node binary drives.
#[derive(Clone)]
pub struct LocalNode {
    inner: Arc<NodeInner>,
}

impl LocalNode {
    /// Creates a node bound to a chain and pool; no sockets yet.
    pub fn new(
        config: NetworkConfig,
        magic: u32,
        blockchain: Arc<Blockchain>,
        mempool: Arc<RwLock<MemoryPool>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let sync = Mutex::new(SyncManager::new(blockchain.clone()));
        Self {
            inner: Arc::new(NodeInner {
                magic,
                nonce: rand::random(),
                user_agent: format!("/neo-oxide:{}/", env!("CARGO_PKG_VERSION")),
                config: config.clone(),
                blockchain,
                mempool,
                peers: Mutex::new(HashMap::new()),
                peer_manager: Mutex::new(PeerManager::new(Duration::from_secs(
                    config.ban_duration_secs,
                ))),
                relay_cache: Mutex::new(RelayCache::new(RELAY_CACHE_CAPACITY, RELAY_CACHE_TTL)),
                sync,
                extensible_pool: Mutex::new(HashMap::new()),
                consensus_tx: Mutex::new(None),
                shutdown,
            }),
        }
    }

    /// Routes consensus payloads into `sender`.
    pub fn set_consensus_channel(&self, sender: mpsc::UnboundedSender<ExtensiblePayload>) {
        *self.inner.consensus_tx.lock() = Some(sender);
    }

    /// Binds the listener, dials the seeds and starts the maintenance
    /// loops. Returns the bound address once the listener is up; port 0
    /// in the configuration picks an ephemeral port.
    pub async fn start(&self) -> NetworkResult<SocketAddr> {
        let bind_addr = format!("0.0.0.0:{}", self.inner.config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "p2p listener started");

        let inner = self.inner.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, address)) => {
                                if inner.peer_manager.lock().is_banned(address.ip()) {
                                    continue;
                                }
                                if inner.peers.lock().len() >= inner.config.max_connections {
                                    continue;
                                }
                                spawn_connection(inner.clone(), stream, address, false);
                            }
                            Err(error) => {
                                tracing::warn!(%error, "accept failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        for seed in &self.inner.config.seed_list {
            if let Ok(address) = seed.parse::<SocketAddr>() {
                self.connect(address);
            } else {
                tracing::debug!(seed, "unresolvable seed entry");
            }
        }

        self.spawn_maintenance();
        self.spawn_chain_event_pump();
        Ok(local_addr)
    }

    /// Dials a peer in the background.
    pub fn connect(&self, address: SocketAddr) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if inner.peers.lock().contains_key(&address) {
                return;
            }
            match TcpStream::connect(address).await {
                Ok(stream) => spawn_connection(inner, stream, address, true),
                Err(error) => {
                    tracing::debug!(%address, %error, "dial failed");
                }
            }
        });
    }

    /// Established peer count.
    pub fn peer_count(&self) -> usize {
        self.inner
            .peers
            .lock()
            .values()
            .filter(|p| p.is_established())
            .count()
    }

    /// Snapshot of established peers for RPC/CLI surfaces.
    pub fn peer_snapshot(&self) -> Vec<(SocketAddr, u32, String)> {
        self.inner
            .peers
            .lock()
            .values()
            .filter(|p| p.is_established())
            .map(|p| {
                (
                    p.address,
                    p.last_block_index,
                    p.version
                        .as_ref()
                        .map(|v| v.user_agent.clone())
                        .unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Floods a transaction inventory to every established peer.
    pub fn relay_transaction(&self, tx: &Transaction) {
        if let Ok(hash) = tx.hash() {
            relay_inventory(&self.inner, InventoryType::Transaction, hash, None);
        }
    }

    /// Floods a block inventory to every established peer.
    pub fn relay_block(&self, block: &Block) {
        if let Ok(hash) = block.hash() {
            relay_inventory(&self.inner, InventoryType::Block, hash, None);
        }
    }

    /// Broadcasts a consensus (or service) payload.
    pub fn relay_extensible(&self, payload: ExtensiblePayload) {
        let Ok(hash) = payload.hash() else {
            return;
        };
        self.inner.extensible_pool.lock().insert(hash, payload.clone());
        let Ok(bytes) = payload.to_bytes() else {
            return;
        };
        let message = Message::new(self.inner.magic, MessageCommand::Extensible, bytes);
        for peer in self.inner.peers.lock().values() {
            if peer.is_established() {
                peer.try_send(message.clone());
            }
        }
    }

    /// Signals every task to stop.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    fn spawn_maintenance(&self) {
        let inner = self.inner.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        maintain(&inner);
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    /// Pumps blockchain events into the pool and the relay paths.
    fn spawn_chain_event_pump(&self) {
        let inner = self.inner.clone();
        let mut events = self.inner.blockchain.subscribe();
        let mut shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => {
                        match event {
                            Ok(BlockchainEvent::BlockPersisted(block)) => {
                                let hashes = block
                                    .transaction_hashes()
                                    .unwrap_or_default();
                                inner.mempool.write().on_block_persisted(&hashes);
                                if let Ok(hash) = block.hash() {
                                    relay_inventory(&inner, InventoryType::Block, hash, None);
                                }
                            }
                            Ok(BlockchainEvent::StateChanged { .. }) => {}
                            Err(_) => break,
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
    }
}

/// Periodic upkeep: keepalive pings, dead-peer cleanup, redial, sync
/// progress.
fn maintain(inner: &Arc<NodeInner>) {
    let now_secs = unix_seconds();
    let height = inner.blockchain.height();
    let ping_timeout = Duration::from_secs(inner.config.ping_timeout_secs);

    let mut to_drop = Vec::new();
    {
        let mut peers = inner.peers.lock();
        for peer in peers.values_mut() {
            if !peer.is_established() {
                continue;
            }
            match peer.pending_ping {
                Some((_, sent)) if sent.elapsed() > ping_timeout => {
                    to_drop.push(peer.address);
                }
                Some(_) => {}
                None => {
                    let nonce = rand::random();
                    let ping = PingPayload {
                        last_block_index: height,
                        timestamp: now_secs,
                        nonce,
                    };
                    if let Ok(bytes) = ping.to_bytes() {
                        if peer.try_send(Message::new(
                            inner.magic,
                            MessageCommand::Ping,
                            bytes,
                        )) {
                            peer.pending_ping = Some((nonce, std::time::Instant::now()));
                        }
                    }
                }
            }
        }
        for address in &to_drop {
            peers.remove(address);
            tracing::debug!(%address, "peer dropped: ping timeout");
        }
    }

    // Keep the connection count at the desired floor.
    let established = inner
        .peers
        .lock()
        .values()
        .filter(|p| p.is_established())
        .count();
    if established < inner.config.min_desired_connections {
        let candidates = inner
            .peer_manager
            .lock()
            .connect_candidates(inner.config.min_desired_connections - established);
        for address in candidates {
            if !inner.peers.lock().contains_key(&address) {
                let inner = inner.clone();
                tokio::spawn(async move {
                    if let Ok(stream) = TcpStream::connect(address).await {
                        spawn_connection(inner, stream, address, true);
                    }
                });
            }
        }
    }

    drive_sync(inner);
    inner.peer_manager.lock().prune();
}

/// Asks the best peer for headers and outstanding block bodies.
fn drive_sync(inner: &Arc<NodeInner>) {
    let best = inner
        .peers
        .lock()
        .values()
        .filter(|p| p.is_established())
        .max_by_key(|p| p.last_block_index)
        .map(|p| (p.address, p.last_block_index, p.sender.clone()));
    let Some((_address, peer_height, sender)) = best else {
        return;
    };

    let mut sync = inner.sync.lock();
    if sync.wants_headers(peer_height) {
        let payload = GetHeadersPayload {
            hash_start: sync.header_request_start(),
            count: -1,
        };
        if let Ok(bytes) = payload.to_bytes() {
            let _ = sender.try_send(Message::new(
                inner.magic,
                MessageCommand::GetHeaders,
                bytes,
            ));
        }
    }
    let wanted = sync.blocks_to_request(BLOCKS_PER_REQUEST);
    if !wanted.is_empty() {
        let payload = InvPayload::new(InventoryType::Block, wanted);
        if let Ok(bytes) = payload.to_bytes() {
            let _ = sender.try_send(Message::new(inner.magic, MessageCommand::GetData, bytes));
        }
    }
}

fn spawn_connection(
    inner: Arc<NodeInner>,
    stream: TcpStream,
    address: SocketAddr,
    outbound: bool,
) {
    let (queue_tx, mut queue_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);
    {
        let mut peers = inner.peers.lock();
        if peers.contains_key(&address) {
            return;
        }
        peers.insert(address, Peer::new(address, outbound, queue_tx.clone()));
    }
    tracing::debug!(%address, outbound, "connection opened");

    let (mut reader, mut writer) = stream.into_split();

    // Writer task: drains the bounded queue onto the socket.
    let writer_inner = inner.clone();
    tokio::spawn(async move {
        while let Some(message) = queue_rx.recv().await {
            if writer.write_all(&message.to_wire()).await.is_err() {
                break;
            }
        }
        writer_inner.peers.lock().remove(&address);
    });

    // Reader task: frames, validates and dispatches.
    tokio::spawn(async move {
        // Both sides open with their version.
        if send_version(&inner, address).await.is_err() {
            disconnect(&inner, address, false);
            return;
        }
        set_handshake(&inner, address, HandshakeState::VersionSent);

        loop {
            let mut header = [0u8; FRAME_HEADER_SIZE];
            if reader.read_exact(&mut header).await.is_err() {
                break;
            }
            let parsed = Message::parse_header(&header);
            let (magic, command, length, checksum) = match parsed {
                Ok(parts) => parts,
                Err(error) => {
                    tracing::debug!(%address, %error, "bad frame header");
                    punish(&inner, address);
                    break;
                }
            };
            if magic != inner.magic {
                tracing::debug!(%address, magic, "wrong network magic");
                disconnect(&inner, address, true);
                break;
            }
            let mut payload = vec![0u8; length];
            if reader.read_exact(&mut payload).await.is_err() {
                break;
            }
            let message = match Message::assemble(magic, command, checksum, payload) {
                Ok(message) => message,
                Err(error) => {
                    tracing::debug!(%address, %error, "bad payload");
                    punish(&inner, address);
                    continue;
                }
            };
            if let Err(error) = process_message(&inner, address, message).await {
                tracing::debug!(%address, %error, "message rejected");
                if matches!(
                    error,
                    NetworkError::HandshakeFailure(_) | NetworkError::PeerMisbehavior(_)
                ) {
                    disconnect(&inner, address, true);
                    break;
                }
                punish(&inner, address);
            }
            if !inner.peers.lock().contains_key(&address) {
                break;
            }
        }
        disconnect(&inner, address, false);
    });
}

fn set_handshake(inner: &Arc<NodeInner>, address: SocketAddr, state: HandshakeState) {
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        // Never regress an established handshake.
        if peer.handshake != HandshakeState::Established {
            peer.handshake = state;
        }
    }
}

fn punish(inner: &Arc<NodeInner>, address: SocketAddr) {
    let drop_peer = inner
        .peers
        .lock()
        .get_mut(&address)
        .map(|peer| peer.penalize(MISBEHAVIOR_PENALTY))
        .unwrap_or(false);
    if drop_peer {
        disconnect(inner, address, true);
    }
}

fn disconnect(inner: &Arc<NodeInner>, address: SocketAddr, ban: bool) {
    inner.peers.lock().remove(&address);
    if ban {
        inner.peer_manager.lock().ban(address.ip());
        tracing::debug!(%address, "peer banned");
    }
}

async fn send_version(inner: &Arc<NodeInner>, address: SocketAddr) -> NetworkResult<()> {
    let version = VersionPayload {
        protocol_version: 0,
        services: VersionPayload::SERVICE_FULL_NODE,
        timestamp: unix_seconds(),
        port: inner.config.port,
        nonce: inner.nonce,
        user_agent: inner.user_agent.clone(),
        start_height: inner.blockchain.height(),
        relay: true,
    };
    send_direct(inner, address, MessageCommand::Version, version.to_bytes()?).await
}

/// Queues a message that must not be dropped (handshake, direct replies).
async fn send_direct(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    command: MessageCommand,
    payload: Vec<u8>,
) -> NetworkResult<()> {
    let sender = inner
        .peers
        .lock()
        .get(&address)
        .map(|peer| peer.sender.clone())
        .ok_or_else(|| NetworkError::ConnectionFailure("peer gone".into()))?;
    let message = Message::new(inner.magic, command, payload);
    sender
        .send(message)
        .await
        .map_err(|_| NetworkError::ConnectionFailure("outbound queue closed".into()))
}

async fn process_message(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: Message,
) -> NetworkResult<()> {
    let established = inner
        .peers
        .lock()
        .get(&address)
        .map(Peer::is_established)
        .unwrap_or(false);
    if !established && !message.command.allowed_before_handshake() {
        return Err(NetworkError::HandshakeFailure(format!(
            "{} before verack",
            message.command.name()
        )));
    }
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        peer.last_seen = std::time::Instant::now();
    }

    match message.command {
        MessageCommand::Version => handle_version(inner, address, &message).await,
        MessageCommand::Verack => handle_verack(inner, address).await,
        MessageCommand::Ping => handle_ping(inner, address, &message).await,
        MessageCommand::Pong => handle_pong(inner, address, &message),
        MessageCommand::GetAddr => handle_getaddr(inner, address).await,
        MessageCommand::Addr => handle_addr(inner, &message),
        MessageCommand::GetHeaders => handle_getheaders(inner, address, &message).await,
        MessageCommand::Headers => handle_headers(inner, address, &message),
        MessageCommand::GetBlocks => handle_getblocks(inner, address, &message).await,
        MessageCommand::Inv => handle_inv(inner, address, &message).await,
        MessageCommand::GetData => handle_getdata(inner, address, &message).await,
        MessageCommand::Block => handle_block(inner, address, &message),
        MessageCommand::Transaction => handle_transaction(inner, address, &message),
        MessageCommand::Mempool => handle_mempool_request(inner, address).await,
        MessageCommand::FilterLoad => handle_filterload(inner, address, &message),
        MessageCommand::FilterAdd => handle_filteradd(inner, address, &message),
        MessageCommand::FilterClear => {
            if let Some(peer) = inner.peers.lock().get_mut(&address) {
                peer.filter = None;
            }
            Ok(())
        }
        MessageCommand::Extensible => handle_extensible(inner, address, &message),
        MessageCommand::MerkleBlock | MessageCommand::Reject | MessageCommand::NotFound => {
            tracing::trace!(%address, command = message.command.name(), "informational message");
            Ok(())
        }
    }
}

async fn handle_version(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let version = VersionPayload::from_bytes(&message.payload)?;
    if version.nonce == inner.nonce {
        return Err(NetworkError::HandshakeFailure("self connection".into()));
    }
    let ready = {
        let mut peers = inner.peers.lock();
        let peer = peers
            .get_mut(&address)
            .ok_or_else(|| NetworkError::ConnectionFailure("peer gone".into()))?;
        if peer.version.is_some() {
            return Err(NetworkError::HandshakeFailure("duplicate version".into()));
        }
        peer.last_block_index = version.start_height;
        peer.version = Some(version.clone());
        peer.handshake = HandshakeState::VersionReceived;
        if peer.verack_received {
            peer.handshake = HandshakeState::Established;
        }
        peer.is_established()
    };
    // Remember the peer's listening endpoint for future dials.
    if version.port != 0 {
        let mut listen = address;
        listen.set_port(version.port);
        inner.peer_manager.lock().add_address(listen);
    }
    send_direct(inner, address, MessageCommand::Verack, Vec::new()).await?;
    if ready {
        on_established(inner, address).await?;
    }
    Ok(())
}

async fn handle_verack(inner: &Arc<NodeInner>, address: SocketAddr) -> NetworkResult<()> {
    let ready = {
        let mut peers = inner.peers.lock();
        let peer = peers
            .get_mut(&address)
            .ok_or_else(|| NetworkError::ConnectionFailure("peer gone".into()))?;
        if peer.verack_received {
            return Err(NetworkError::HandshakeFailure("duplicate verack".into()));
        }
        peer.verack_received = true;
        if peer.version.is_some() {
            peer.handshake = HandshakeState::Established;
        }
        peer.is_established()
    };
    if ready {
        on_established(inner, address).await?;
    }
    Ok(())
}

async fn on_established(inner: &Arc<NodeInner>, address: SocketAddr) -> NetworkResult<()> {
    tracing::debug!(%address, "handshake complete");
    send_direct(inner, address, MessageCommand::GetAddr, Vec::new()).await
}

async fn handle_ping(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let ping = PingPayload::from_bytes(&message.payload)?;
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        peer.last_block_index = peer.last_block_index.max(ping.last_block_index);
    }
    let pong = PingPayload {
        last_block_index: inner.blockchain.height(),
        timestamp: unix_seconds(),
        nonce: ping.nonce,
    };
    send_direct(inner, address, MessageCommand::Pong, pong.to_bytes()?).await
}

fn handle_pong(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let pong = PingPayload::from_bytes(&message.payload)?;
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        match peer.pending_ping {
            Some((nonce, _)) if nonce == pong.nonce => {
                peer.pending_ping = None;
                peer.last_block_index = peer.last_block_index.max(pong.last_block_index);
            }
            _ => {}
        }
    }
    Ok(())
}

async fn handle_getaddr(inner: &Arc<NodeInner>, address: SocketAddr) -> NetworkResult<()> {
    let addresses: Vec<NetworkAddress> = inner
        .peer_manager
        .lock()
        .recent_addresses(MAX_ADDRESSES_PER_MESSAGE, Some(address))
        .into_iter()
        .map(|addr| {
            NetworkAddress::from_socket_addr(addr, unix_seconds(), VersionPayload::SERVICE_FULL_NODE)
        })
        .collect();
    if addresses.is_empty() {
        return Ok(());
    }
    let payload = AddrPayload { addresses };
    send_direct(inner, address, MessageCommand::Addr, payload.to_bytes()?).await
}

fn handle_addr(inner: &Arc<NodeInner>, message: &Message) -> NetworkResult<()> {
    let payload = AddrPayload::from_bytes(&message.payload)?;
    let mut manager = inner.peer_manager.lock();
    for entry in payload.addresses {
        manager.add_address(entry.socket_addr());
    }
    Ok(())
}

async fn handle_getheaders(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let request = GetHeadersPayload::from_bytes(&message.payload)?;
    let Some(start_header) = inner.blockchain.get_header(&request.hash_start) else {
        return Ok(());
    };
    let mut headers = Vec::new();
    let mut index = start_header.index + 1;
    while headers.len() < request.effective_count() {
        let Some(hash) = inner.blockchain.get_block_hash(index) else {
            break;
        };
        let Some(header) = inner.blockchain.get_header(&hash) else {
            break;
        };
        headers.push(header);
        index += 1;
    }
    if headers.is_empty() {
        return Ok(());
    }
    let payload = HeadersPayload { headers };
    send_direct(inner, address, MessageCommand::Headers, payload.to_bytes()?).await
}

fn handle_headers(
    inner: &Arc<NodeInner>,
    _address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = HeadersPayload::from_bytes(&message.payload)?;
    inner.sync.lock().add_headers(&payload.headers);
    drive_sync(inner);
    Ok(())
}

async fn handle_getblocks(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let request = GetHeadersPayload::from_bytes(&message.payload)?;
    let Some(start_header) = inner.blockchain.get_header(&request.hash_start) else {
        return Ok(());
    };
    let mut hashes = Vec::new();
    let mut index = start_header.index + 1;
    while hashes.len() < request.effective_count().min(500) {
        let Some(hash) = inner.blockchain.get_block_hash(index) else {
            break;
        };
        hashes.push(hash);
        index += 1;
    }
    if hashes.is_empty() {
        return Ok(());
    }
    let payload = InvPayload::new(InventoryType::Block, hashes);
    send_direct(inner, address, MessageCommand::Inv, payload.to_bytes()?).await
}

async fn handle_inv(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = InvPayload::from_bytes(&message.payload)?;
    let unknown: Vec<UInt256> = match payload.inventory_type {
        InventoryType::Block => payload
            .hashes
            .iter()
            .filter(|hash| !inner.blockchain.contains_block(hash))
            .copied()
            .collect(),
        InventoryType::Transaction => {
            let pool = inner.mempool.read();
            payload
                .hashes
                .iter()
                .filter(|hash| {
                    !pool.contains(hash) && !inner.blockchain.contains_transaction_hash(hash)
                })
                .copied()
                .collect()
        }
        InventoryType::Extensible => {
            let pool = inner.extensible_pool.lock();
            payload
                .hashes
                .iter()
                .filter(|hash| !pool.contains_key(hash))
                .copied()
                .collect()
        }
    };
    if unknown.is_empty() {
        return Ok(());
    }
    let request = InvPayload::new(payload.inventory_type, unknown);
    send_direct(inner, address, MessageCommand::GetData, request.to_bytes()?).await
}

async fn handle_getdata(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = InvPayload::from_bytes(&message.payload)?;
    let mut missing = Vec::new();
    for hash in &payload.hashes {
        match payload.inventory_type {
            InventoryType::Block => {
                if let Some(block) = inner.blockchain.get_block(hash) {
                    let filter = inner
                        .peers
                        .lock()
                        .get(&address)
                        .and_then(|peer| peer.filter.clone());
                    match filter {
                        // SPV peers get the filtered form.
                        Some(filter) => {
                            let payload = filtered_block(&block, &filter);
                            send_direct(
                                inner,
                                address,
                                MessageCommand::MerkleBlock,
                                payload.to_bytes()?,
                            )
                            .await?;
                        }
                        None => {
                            send_direct(inner, address, MessageCommand::Block, block.to_bytes()?)
                                .await?;
                        }
                    }
                } else {
                    missing.push(*hash);
                }
            }
            InventoryType::Transaction => {
                let tx = inner.mempool.read().get(hash).map(|tx| (*tx).clone());
                if let Some(tx) = tx {
                    send_direct(
                        inner,
                        address,
                        MessageCommand::Transaction,
                        tx.to_bytes()?,
                    )
                    .await?;
                } else {
                    missing.push(*hash);
                }
            }
            InventoryType::Extensible => {
                let payload = inner.extensible_pool.lock().get(hash).cloned();
                if let Some(payload) = payload {
                    send_direct(
                        inner,
                        address,
                        MessageCommand::Extensible,
                        payload.to_bytes()?,
                    )
                    .await?;
                } else {
                    missing.push(*hash);
                }
            }
        }
    }
    if !missing.is_empty() {
        let notfound = InvPayload::new(payload.inventory_type, missing);
        send_direct(inner, address, MessageCommand::NotFound, notfound.to_bytes()?).await?;
    }
    Ok(())
}

fn handle_block(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let block = Block::from_bytes(&message.payload)?;
    let hash = block
        .hash()
        .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
    if inner.blockchain.contains_block(&hash) {
        return Ok(());
    }
    let applied = inner.sync.lock().on_block(block);
    if applied > 0 {
        // The chain event pump relays the inventory; remember it here so
        // the echo from peers is not re-requested.
        inner.relay_cache.lock().try_add(hash);
    }
    tracing::trace!(%address, %hash, applied, "block received");
    Ok(())
}

fn handle_transaction(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let tx = Transaction::from_bytes(&message.payload)?;
    let hash = tx
        .hash()
        .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
    if !inner.relay_cache.lock().try_add(hash) {
        return Ok(());
    }
    let result = inner
        .mempool
        .write()
        .try_add(tx, inner.blockchain.as_ref());
    if result.is_ok() {
        relay_inventory(inner, InventoryType::Transaction, hash, Some(address));
    } else {
        tracing::trace!(%address, %hash, ?result, "transaction not pooled");
    }
    Ok(())
}

async fn handle_mempool_request(inner: &Arc<NodeInner>, address: SocketAddr) -> NetworkResult<()> {
    let hashes = inner.mempool.read().verified_hashes();
    if hashes.is_empty() {
        return Ok(());
    }
    for chunk in hashes.chunks(crate::messages::MAX_INV_HASHES) {
        let payload = InvPayload::new(InventoryType::Transaction, chunk.to_vec());
        send_direct(inner, address, MessageCommand::Inv, payload.to_bytes()?).await?;
    }
    Ok(())
}

fn handle_filterload(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = FilterLoadPayload::from_bytes(&message.payload)?;
    let filter = BloomFilter::new(
        payload.filter,
        payload.hash_functions as u32,
        payload.tweak,
    )
    .ok_or_else(|| NetworkError::PeerMisbehavior("invalid bloom filter".into()))?;
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        peer.filter = Some(filter);
    }
    Ok(())
}

fn handle_filteradd(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = FilterAddPayload::from_bytes(&message.payload)?;
    if let Some(peer) = inner.peers.lock().get_mut(&address) {
        if let Some(filter) = peer.filter.as_mut() {
            filter.insert(&payload.data);
        }
    }
    Ok(())
}

fn handle_extensible(
    inner: &Arc<NodeInner>,
    address: SocketAddr,
    message: &Message,
) -> NetworkResult<()> {
    let payload = ExtensiblePayload::from_bytes(&message.payload)?;
    let hash = payload
        .hash()
        .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
    let height = inner.blockchain.height();
    if height + 1 < payload.valid_block_start || height > payload.valid_block_end {
        return Ok(());
    }
    if !inner.relay_cache.lock().try_add(hash) {
        return Ok(());
    }
    inner
        .extensible_pool
        .lock()
        .insert(hash, payload.clone());

    // Route by category; the engine itself never interprets the contents.
    if payload.category == "dBFT" {
        if let Some(sender) = inner.consensus_tx.lock().as_ref() {
            let _ = sender.send(payload.clone());
        }
    }

    // Flood onward, skipping the origin.
    let Ok(bytes) = payload.to_bytes() else {
        return Ok(());
    };
    let message = Message::new(inner.magic, MessageCommand::Extensible, bytes);
    for peer in inner.peers.lock().values() {
        if peer.is_established() && peer.address != address {
            peer.try_send(message.clone());
        }
    }
    Ok(())
}

/// Floods an `inv` for `hash` to every established peer except `skip`,
/// respecting loaded SPV filters for transactions.
fn relay_inventory(
    inner: &Arc<NodeInner>,
    inventory_type: InventoryType,
    hash: UInt256,
    skip: Option<SocketAddr>,
) {
    let payload = InvPayload::new(inventory_type, vec![hash]);
    let Ok(bytes) = payload.to_bytes() else {
        return;
    };
    let message = Message::new(inner.magic, MessageCommand::Inv, bytes);
    for peer in inner.peers.lock().values() {
        if !peer.is_established() || Some(peer.address) == skip {
            continue;
        }
        if inventory_type == InventoryType::Transaction {
            if let Some(filter) = &peer.filter {
                if !filter.contains(hash.as_bytes()) {
                    continue;
                }
            }
        }
        peer.try_send(message.clone());
    }
}

/// Projects a block for an SPV peer: every transaction hash plus one flag
/// bit per transaction marking the ones its filter matches.
fn filtered_block(block: &Block, filter: &BloomFilter) -> crate::messages::MerkleBlockPayload {
    let hashes = block.transaction_hashes().unwrap_or_default();
    let mut flags = vec![0u8; (hashes.len() + 7) / 8];
    for (index, hash) in hashes.iter().enumerate() {
        if filter.contains(hash.as_bytes()) {
            flags[index / 8] |= 1 << (index % 8);
        }
    }
    crate::messages::MerkleBlockPayload {
        header: block.header.clone(),
        transaction_count: block.transactions.len() as u32,
        hashes,
        flags,
    }
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}
