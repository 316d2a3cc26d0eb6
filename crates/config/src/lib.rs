//! Protocol constants and node configuration.
//!
//! Everything tunable lives here: protocol limits shared by every subsystem
//! and the TOML-backed node configuration the binary loads at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Size of a 256-bit hash in bytes.
pub const HASH_SIZE: usize = 32;
/// Size of a 160-bit script hash in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Default milliseconds between blocks.
pub const MILLISECONDS_PER_BLOCK: u64 = 15_000;
/// Maximum transactions allowed in one block.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 512;
/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 262_144;
/// Maximum cumulative system fee per block, in datoshi.
pub const MAX_BLOCK_SYSTEM_FEE: i64 = 9_000_000_000_000;
/// Maximum serialized transaction size in bytes.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;
/// Maximum transaction script length in bytes.
pub const MAX_SCRIPT_LENGTH: usize = 65_536;
/// Upper bound on `valid_until_block - current_height` at admission.
pub const MAX_VALID_UNTIL_BLOCK_INCREMENT: u32 = 5_760;
/// Number of recent blocks whose hashes stay addressable by contracts.
pub const MAX_TRACEABLE_BLOCKS: u32 = 2_102_400;

/// GAS has eight decimal places; one GAS is 10^8 datoshi.
pub const GAS_FACTOR: i64 = 100_000_000;

/// Default P2P port (MainNet).
pub const DEFAULT_P2P_PORT: u16 = 10_333;
/// Default JSON-RPC port (MainNet).
pub const DEFAULT_RPC_PORT: u16 = 10_332;

/// MainNet seed nodes.
pub const MAINNET_SEEDS: &[&str] = &[
    "seed1.neo.org:10333",
    "seed2.neo.org:10333",
    "seed3.neo.org:10333",
    "seed4.neo.org:10333",
    "seed5.neo.org:10333",
];

/// TestNet seed nodes.
pub const TESTNET_SEEDS: &[&str] = &[
    "seed1t5.neo.org:20333",
    "seed2t5.neo.org:20333",
    "seed3t5.neo.org:20333",
    "seed4t5.neo.org:20333",
    "seed5t5.neo.org:20333",
];

/// Which network a node participates in. The magic number keys the message
/// frame and partitions the networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    MainNet,
    TestNet,
    #[default]
    Private,
}

impl NetworkType {
    /// Network magic constant carried in every message frame.
    pub fn magic(&self) -> u32 {
        match self {
            NetworkType::MainNet => 0x334f_454e,
            NetworkType::TestNet => 0x3554_334e,
            NetworkType::Private => 0x0000_4e45,
        }
    }

    /// Default P2P port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            NetworkType::MainNet => 10_333,
            NetworkType::TestNet => 20_333,
            NetworkType::Private => 30_333,
        }
    }

    /// Default seed list for this network.
    pub fn seeds(&self) -> Vec<String> {
        match self {
            NetworkType::MainNet => MAINNET_SEEDS.iter().map(|s| s.to_string()).collect(),
            NetworkType::TestNet => TESTNET_SEEDS.iter().map(|s| s.to_string()).collect(),
            NetworkType::Private => Vec::new(),
        }
    }
}

/// Consensus-relevant protocol settings, fixed for the lifetime of a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Network magic; included in signed consensus data.
    pub magic: u32,
    /// Target milliseconds between blocks.
    pub milliseconds_per_block: u64,
    /// Maximum transactions per block.
    pub max_transactions_per_block: usize,
    /// Maximum serialized block size.
    pub max_block_size: usize,
    /// Maximum cumulative system fee per block, in datoshi.
    pub max_block_system_fee: i64,
    /// Maximum serialized transaction size.
    pub max_transaction_size: usize,
    /// Admission window for `valid_until_block`.
    pub max_valid_until_block_increment: u32,
    /// Standby validator public keys, hex-encoded compressed points.
    pub standby_validators: Vec<String>,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            magic: NetworkType::Private.magic(),
            milliseconds_per_block: MILLISECONDS_PER_BLOCK,
            max_transactions_per_block: MAX_TRANSACTIONS_PER_BLOCK,
            max_block_size: MAX_BLOCK_SIZE,
            max_block_system_fee: MAX_BLOCK_SYSTEM_FEE,
            max_transaction_size: MAX_TRANSACTION_SIZE,
            max_valid_until_block_increment: MAX_VALID_UNTIL_BLOCK_INCREMENT,
            standby_validators: Vec::new(),
        }
    }
}

impl ProtocolSettings {
    /// Number of validators; `f` and quorum sizes derive from this.
    pub fn validator_count(&self) -> usize {
        self.standby_validators.len()
    }
}

/// P2P networking section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub network: NetworkType,
    pub port: u16,
    pub max_connections: usize,
    pub min_desired_connections: usize,
    pub seed_list: Vec<String>,
    /// Seconds a misbehaving peer stays banned.
    pub ban_duration_secs: u64,
    /// Seconds without a pong before a peer is dropped.
    pub ping_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Private,
            port: DEFAULT_P2P_PORT,
            max_connections: 40,
            min_desired_connections: 10,
            seed_list: Vec::new(),
            ban_duration_secs: 900,
            ping_timeout_secs: 60,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    #[default]
    Memory,
    RocksDb,
}

/// Persistence section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub engine: StorageEngine,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: StorageEngine::Memory,
            path: PathBuf::from("./data"),
        }
    }
}

/// Consensus section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConsensusConfig {
    pub enabled: bool,
    pub wallet_path: Option<PathBuf>,
}

/// JSON-RPC section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub enabled: bool,
    pub port: u16,
    pub bind_address: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: DEFAULT_RPC_PORT,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Synchronization section.
///
/// `min_peer_agreement` is implementation-defined: the fraction of connected
/// peers that must advertise a header chain before sync adopts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub min_peer_agreement: f64,
    /// Maximum headers requested per `getheaders`.
    pub headers_per_request: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_peer_agreement: 0.66,
            headers_per_request: 2_000,
        }
    }
}

/// Top-level node configuration, loadable from TOML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub protocol: ProtocolSettings,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub consensus: ConsensusConfig,
    pub rpc: RpcConfig,
    pub sync: SyncConfig,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.min_desired_connections > self.network.max_connections {
            return Err(ConfigError::Invalid(
                "min_desired_connections exceeds max_connections".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sync.min_peer_agreement) {
            return Err(ConfigError::Invalid(
                "sync.min_peer_agreement must be within [0, 1]".into(),
            ));
        }
        if self.consensus.enabled && self.consensus.wallet_path.is_none() {
            return Err(ConfigError::Invalid(
                "consensus.enabled requires consensus.wallet_path".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[network]
network = "testnet"
port = 20333
max_connections = 20
min_desired_connections = 5

[rpc]
enabled = false

[sync]
min_peer_agreement = 0.75
"#
        )
        .unwrap();
        let config = NodeConfig::load(file.path()).unwrap();
        assert_eq!(config.network.network, NetworkType::TestNet);
        assert_eq!(config.network.port, 20_333);
        assert!(!config.rpc.enabled);
        assert_eq!(config.sync.min_peer_agreement, 0.75);
        // Unspecified sections keep their defaults.
        assert_eq!(config.protocol.max_transactions_per_block, 512);
    }

    #[test]
    fn consensus_requires_wallet() {
        let mut config = NodeConfig::default();
        config.consensus.enabled = true;
        assert!(config.validate().is_err());
        config.consensus.wallet_path = Some(PathBuf::from("wallet.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn magic_differs_per_network() {
        assert_ne!(NetworkType::MainNet.magic(), NetworkType::TestNet.magic());
    }
}
