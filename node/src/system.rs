//! Node wiring: store, ledger, pool, network, consensus and RPC.

use anyhow::{bail, Context, Result};
use oxneo_config::{NodeConfig, StorageEngine};
use oxneo_consensus::{ConsensusOutput, DbftService};
use oxneo_cryptography::KeyPair;
use oxneo_ledger::{Blockchain, BlockchainEvent, MemoryPool};
use oxneo_network::LocalNode;
use oxneo_persistence::{MemoryStore, Store};
use oxneo_rpc_server::RpcContext;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};

/// Every long-lived subsystem of a running node.
pub struct NeoSystem {
    pub config: NodeConfig,
    pub store: Arc<dyn Store>,
    pub blockchain: Arc<Blockchain>,
    pub mempool: Arc<RwLock<MemoryPool>>,
    pub node: LocalNode,
    shutdown: watch::Sender<bool>,
}

impl NeoSystem {
    /// Builds every subsystem but opens no sockets yet.
    pub fn new(mut config: NodeConfig) -> Result<Self> {
        if config.network.seed_list.is_empty() {
            config.network.seed_list = config.network.network.seeds();
        }
        if config.protocol.magic == oxneo_config::NetworkType::Private.magic() {
            config.protocol.magic = config.network.network.magic();
        }

        let store: Arc<dyn Store> = match config.storage.engine {
            StorageEngine::Memory => Arc::new(MemoryStore::new()),
            StorageEngine::RocksDb => open_rocksdb(&config)?,
        };

        let blockchain = Arc::new(
            Blockchain::new(store.clone(), config.protocol.clone())
                .context("cannot open blockchain")?,
        );
        let mempool = Arc::new(RwLock::new(MemoryPool::default()));
        let node = LocalNode::new(
            config.network.clone(),
            config.protocol.magic,
            blockchain.clone(),
            mempool.clone(),
        );
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            blockchain,
            mempool,
            node,
            shutdown,
        })
    }

    /// Starts networking, RPC and (when configured) consensus.
    pub async fn start(&self) -> Result<()> {
        self.node
            .start()
            .await
            .context("cannot start p2p listener")?;

        if self.config.rpc.enabled {
            let context = RpcContext {
                blockchain: self.blockchain.clone(),
                mempool: self.mempool.clone(),
                node: Some(self.node.clone()),
                settings: self.config.protocol.clone(),
            };
            let config = self.config.clone();
            let mut stop = self.shutdown.subscribe();
            tokio::spawn(async move {
                let shutdown = async move {
                    let _ = stop.changed().await;
                };
                if let Err(error) = oxneo_rpc_server::serve(&config, context, shutdown).await {
                    tracing::error!(%error, "rpc server failed");
                }
            });
        }

        if self.config.consensus.enabled {
            let wallet_path = self
                .config
                .consensus
                .wallet_path
                .as_ref()
                .context("consensus.enabled requires consensus.wallet_path")?;
            let pair = crate::wallet::open(wallet_path)?;
            self.start_consensus(pair)?;
        }
        Ok(())
    }

    /// Spawns the consensus loop for a validator key.
    fn start_consensus(&self, pair: KeyPair) -> Result<()> {
        let (service, mut outputs) = DbftService::new(
            self.config.protocol.clone(),
            self.blockchain.clone(),
            self.mempool.clone(),
            self.store.clone(),
            Some(pair),
        )
        .map_err(|e| anyhow::anyhow!("cannot start consensus: {e}"))?;

        let (payload_tx, mut payload_rx) = mpsc::unbounded_channel();
        self.node.set_consensus_channel(payload_tx);

        let node = self.node.clone();
        let blockchain = self.blockchain.clone();
        let mut chain_events = self.blockchain.subscribe();
        let mut stop = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut service = service;
            let mut deadline = Instant::now() + service.timer_duration();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline.into()) => {
                        service.on_timeout();
                        deadline = Instant::now() + service.timer_duration();
                    }
                    Some(payload) = payload_rx.recv() => {
                        if let Err(error) = service.on_payload(&payload) {
                            tracing::debug!(%error, "consensus payload dropped");
                        }
                    }
                    Some(output) = outputs.recv() => match output {
                        ConsensusOutput::Broadcast(payload) => {
                            node.relay_extensible(payload);
                        }
                        ConsensusOutput::BlockReady(block) => {
                            if let Err(error) = blockchain.persist_block(&block) {
                                tracing::warn!(%error, "consensus block rejected");
                            }
                        }
                    },
                    event = chain_events.recv() => {
                        if let Ok(BlockchainEvent::BlockPersisted(_)) = event {
                            service.on_block_persisted();
                            deadline = Instant::now() + service.timer_duration();
                        }
                    }
                    _ = stop.changed() => break,
                }
            }
        });
        Ok(())
    }

    /// Signals every task to stop; persistence in flight completes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.node.shutdown();
        tracing::info!("node shutting down");
    }
}

#[cfg(feature = "rocksdb-store")]
fn open_rocksdb(config: &NodeConfig) -> Result<Arc<dyn Store>> {
    Ok(Arc::new(
        oxneo_persistence::rocksdb_store::RocksDbStore::open(&config.storage.path)
            .context("cannot open rocksdb store")?,
    ))
}

#[cfg(not(feature = "rocksdb-store"))]
fn open_rocksdb(_config: &NodeConfig) -> Result<Arc<dyn Store>> {
    bail!("this build has no rocksdb support; use storage.engine = \"memory\"")
}
