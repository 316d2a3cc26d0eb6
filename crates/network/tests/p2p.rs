//! Two-node integration: handshake, header-first sync and relay.

use oxneo_config::{NetworkConfig, ProtocolSettings};
use oxneo_core::{Block, Header, UInt256, Witness};
use oxneo_ledger::{Blockchain, MemoryPool};
use oxneo_network::LocalNode;
use oxneo_persistence::MemoryStore;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

fn make_chain() -> Arc<Blockchain> {
    Arc::new(Blockchain::new(Arc::new(MemoryStore::new()), ProtocolSettings::default()).unwrap())
}

fn make_node(blockchain: Arc<Blockchain>) -> LocalNode {
    let config = NetworkConfig {
        port: 0,
        max_connections: 8,
        min_desired_connections: 0,
        seed_list: Vec::new(),
        ..Default::default()
    };
    let mempool = Arc::new(RwLock::new(MemoryPool::default()));
    LocalNode::new(config, 0x4e45, blockchain, mempool)
}

fn extend_chain(blockchain: &Blockchain, count: u32) {
    for _ in 0..count {
        let tip_hash = blockchain.current_hash();
        let tip_header = blockchain.get_header(&tip_hash).unwrap();
        let mut block = Block {
            header: Header {
                version: 0,
                prev_hash: tip_hash,
                merkle_root: UInt256::zero(),
                timestamp: tip_header.timestamp + 1,
                nonce: 1,
                index: blockchain.height() + 1,
                primary_index: 0,
                next_consensus: Default::default(),
                witness: Witness::new(Vec::new(), vec![0x11]),
            },
            transactions: Vec::new(),
        };
        block.header.merkle_root = block.compute_merkle_root().unwrap();
        blockchain.persist_block(&block).unwrap();
    }
}

async fn wait_for(mut probe: impl FnMut() -> bool, what: &str) {
    for _ in 0..300 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_and_header_first_sync() {
    let chain_a = make_chain();
    extend_chain(&chain_a, 5);
    let node_a = make_node(chain_a.clone());
    let addr_a = node_a.start().await.unwrap();

    let chain_b = make_chain();
    let node_b = make_node(chain_b.clone());
    node_b.start().await.unwrap();

    let mut target = addr_a;
    target.set_ip("127.0.0.1".parse().unwrap());
    node_b.connect(target);

    wait_for(|| node_b.peer_count() == 1, "handshake").await;
    // Header-first sync pulls all five bodies and applies them in order.
    wait_for(|| chain_b.height() == 5, "block sync").await;
    assert_eq!(chain_b.current_hash(), chain_a.current_hash());

    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn new_block_relays_between_peers() {
    let chain_a = make_chain();
    let node_a = make_node(chain_a.clone());
    let addr_a = node_a.start().await.unwrap();

    let chain_b = make_chain();
    let node_b = make_node(chain_b.clone());
    node_b.start().await.unwrap();

    let mut target = addr_a;
    target.set_ip("127.0.0.1".parse().unwrap());
    node_b.connect(target);
    wait_for(|| node_a.peer_count() == 1 && node_b.peer_count() == 1, "handshake").await;

    // A persists a new block; the event pump floods its inventory, B asks
    // for the body, validates and applies it.
    extend_chain(&chain_a, 1);
    wait_for(|| chain_b.height() == 1, "block relay").await;
    assert_eq!(chain_b.current_hash(), chain_a.current_hash());

    node_a.shutdown();
    node_b.shutdown();
}
