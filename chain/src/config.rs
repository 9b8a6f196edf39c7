//! Top-level configuration for a node.
//!
//! This module aggregates configuration for:
//!
//! - tokenomics (supply, rewards, halving),
//! - staking and slashing,
//! - gas metering,
//! - block and contract limits,
//! - feature activation flags,
//! - genesis allocations,
//! - the block producer, mempool, peer networking, and storage.
//!
//! The goal is a single [`ChainConfig`] that binaries construct from
//! defaults, a config file, or the environment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gas::GasConfig;
use crate::types::Address;

/// Base units per UNM (8 decimals).
pub const COIN: u64 = 100_000_000;

/// Supply schedule and block rewards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tokenomics {
    /// Hard cap on minted supply.
    pub max_supply: u64,
    /// Supply minted at genesis.
    pub genesis_supply: u64,
    /// Reward for blocks in era 0.
    pub initial_block_reward: u64,
    /// Blocks per halving era.
    pub halving_interval: u64,
}

impl Default for Tokenomics {
    fn default() -> Self {
        Self {
            max_supply: 100_000_000 * COIN,
            genesis_supply: 16_400_000 * COIN,
            initial_block_reward: COIN,
            halving_interval: 31_536_000,
        }
    }
}

/// Staking, delegation, and slashing parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Minimum total stake to be an active validator.
    pub min_validator_stake: u64,
    /// Blocks an undelegation waits before paying out.
    pub unbonding_period: u64,
    /// Commission assigned to validators created by a plain stake.
    pub default_commission: f64,
    /// Stake fraction burned on double-sign evidence.
    pub slashing_fraction: f64,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            min_validator_stake: 1_000 * COIN,
            unbonding_period: 1_814_400,
            default_commission: 0.10,
            slashing_fraction: 0.05,
        }
    }
}

/// Per-block structural limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockLimits {
    pub max_txs_per_block: usize,
    /// Soft limit on serialized block size, in bytes.
    pub max_block_size: usize,
    /// Future tolerance on incoming block timestamps, in seconds.
    pub max_timestamp_drift: u64,
}

impl Default for BlockLimits {
    fn default() -> Self {
        Self {
            max_txs_per_block: 1_000,
            max_block_size: 2_000_000,
            max_timestamp_drift: 60,
        }
    }
}

/// Smart-contract limits and VM gas constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Maximum deployed bytecode size (the Ethereum limit).
    pub max_contract_size: usize,
    pub max_contracts_per_block: usize,
    pub deploy_base_gas: u64,
    pub deploy_per_byte: u64,
    pub call_base_gas: u64,
    pub call_per_byte: u64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            max_contract_size: 24_576,
            max_contracts_per_block: 100,
            deploy_base_gas: 32_000,
            deploy_per_byte: 200,
            call_base_gas: 21_000,
            call_per_byte: 68,
        }
    }
}

/// Activation state of an optional protocol feature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub enabled: bool,
    /// Earliest height the feature may take effect.
    pub min_height: u64,
    pub can_deactivate: bool,
}

impl FeatureFlag {
    fn new(enabled: bool, min_height: u64, can_deactivate: bool) -> Self {
        Self {
            enabled,
            min_height,
            can_deactivate,
        }
    }
}

/// Protocol and VM version identifiers carried in block headers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub protocol_version: u32,
    pub min_supported_version: u32,
    /// VM tag stamped into produced blocks.
    pub vm_version: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            protocol_version: 1,
            min_supported_version: 1,
            vm_version: "evm".to_string(),
        }
    }
}

/// One genesis balance allocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: u64,
}

/// One genesis validator, provisioned with pre-staked funds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub address: Address,
    /// Hex public key; may be empty until the validator first signs.
    pub public_key: String,
    pub stake: u64,
}

/// Genesis ceremony output consumed at first boot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Fixed timestamp so genesis is identical on every node.
    pub timestamp: u64,
    pub allocations: Vec<GenesisAccount>,
    pub validators: Vec<GenesisValidator>,
    pub proposer: Address,
    pub proposer_pubkey: String,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let addr = |s: &str| -> Address {
            s.parse().expect("hard-coded genesis address should parse")
        };
        Self {
            timestamp: 1_761_931_343,
            allocations: vec![
                // Founder
                GenesisAccount {
                    address: addr("0xacffecb00b07a53d61c38edccd7f74de83e36bf0"),
                    balance: 5_000_000 * COIN,
                },
                // Faucet
                GenesisAccount {
                    address: addr("0x8aa829da6b4a5be2789e3ddeff569d6248e3e503"),
                    balance: 1_000_000 * COIN,
                },
                // Treasury
                GenesisAccount {
                    address: addr("0xe3e92fb0a0160e41be8d80bee4b6a81b422c1d4c"),
                    balance: 10_000_000 * COIN,
                },
            ],
            validators: vec![
                GenesisValidator {
                    address: addr("0x8231d09a6766dc1d75a8261e2a64d31cf6c35a8c"),
                    public_key: String::new(),
                    stake: 100_000 * COIN,
                },
                GenesisValidator {
                    address: addr("0xf31d79f0fb66c3767da9285ddefee3a72ee267c6"),
                    public_key: String::new(),
                    stake: 100_000 * COIN,
                },
                GenesisValidator {
                    address: addr("0x0f9f8535e53944956b60127003e396c834b1f36d"),
                    public_key: String::new(),
                    stake: 100_000 * COIN,
                },
            ],
            proposer: addr("0xacffecb00b07a53d61c38edccd7f74de83e36bf0"),
            proposer_pubkey: "cdaab1107e6f2031cae2d966b500a391c65e6e88ebe365d825509397b067bedf\
                              f5c87e497a729aaf79329706ba5a0d599bd2288f5020746a1df4dd3b37ca8c4f"
                .to_string(),
        }
    }
}

/// Block producer pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Interval between blocks while transactions are pending.
    pub interval_secs: u64,
    /// Empty-block heartbeat interval.
    pub idle_interval_secs: u64,
    /// Maximum transactions pulled from the mempool per block.
    pub batch_size: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            idle_interval_secs: 900,
            batch_size: 50,
        }
    }
}

/// Mempool sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub max_age_secs: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_age_secs: 3_600,
        }
    }
}

/// Peer networking parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct P2pConfig {
    /// Address the TCP listener binds to.
    pub listen_addr: String,
    /// Peers dialed at startup when the node boots without local chain
    /// data.
    pub bootstrap_peers: Vec<String>,
    pub max_peers: usize,
    pub ping_interval_secs: u64,
    /// Peers unseen for this long are evicted.
    pub peer_timeout_secs: u64,
    pub sync_interval_secs: u64,
    /// Protocol version advertised in handshakes.
    pub version: String,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:26656".to_string(),
            bootstrap_peers: Vec::new(),
            max_peers: 50,
            ping_interval_secs: 60,
            peer_timeout_secs: 300,
            sync_interval_secs: 30,
            version: "2.0.0".to_string(),
        }
    }
}

/// Persistent storage location.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    pub create_if_missing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "blockchain_data".to_string(),
            create_if_missing: true,
        }
    }
}

/// Top-level node configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: String,
    pub tokenomics: Tokenomics,
    pub staking: StakingConfig,
    pub gas: GasConfig,
    pub limits: BlockLimits,
    pub contracts: ContractConfig,
    pub features: BTreeMap<String, FeatureFlag>,
    pub protocol: ProtocolConfig,
    pub genesis: GenesisConfig,
    pub producer: ProducerConfig,
    pub mempool: MempoolConfig,
    pub p2p: P2pConfig,
    pub storage: StorageConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        let mut features = BTreeMap::new();
        // Core features, live from genesis.
        features.insert("transfers".to_string(), FeatureFlag::new(true, 0, false));
        features.insert("staking".to_string(), FeatureFlag::new(true, 0, false));
        // Contract execution activates later in mainnet history.
        features.insert("contracts".to_string(), FeatureFlag::new(false, 5_000, false));
        features.insert("evm".to_string(), FeatureFlag::new(false, 5_000, false));
        features.insert(
            "batch_transfers".to_string(),
            FeatureFlag::new(false, 1_000, false),
        );
        // Reserved for future protocol phases; the core never trusts
        // these beyond carrying them in configuration.
        features.insert("oracles".to_string(), FeatureFlag::new(false, 10_000, true));
        features.insert(
            "cross_chain".to_string(),
            FeatureFlag::new(false, 50_000, false),
        );
        features.insert(
            "zk_proofs".to_string(),
            FeatureFlag::new(false, 100_000, false),
        );
        features.insert(
            "governance".to_string(),
            FeatureFlag::new(false, 50_000, false),
        );

        Self {
            chain_id: "unicrium-mainnet-1".to_string(),
            tokenomics: Tokenomics::default(),
            staking: StakingConfig::default(),
            gas: GasConfig::default(),
            limits: BlockLimits::default(),
            contracts: ContractConfig::default(),
            features,
            protocol: ProtocolConfig::default(),
            genesis: GenesisConfig::default(),
            producer: ProducerConfig::default(),
            mempool: MempoolConfig::default(),
            p2p: P2pConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ChainConfig {
    /// True when `name` is enabled and past its activation height.
    pub fn feature_active(&self, name: &str, height: u64) -> bool {
        self.features
            .get(name)
            .map(|flag| flag.enabled && height >= flag.min_height)
            .unwrap_or(false)
    }

    /// A small devnet configuration: fast blocks, features on from
    /// genesis, local storage path. Used by tests and local setups.
    pub fn devnet() -> Self {
        let mut cfg = Self::default();
        cfg.chain_id = "unicrium-devnet-1".to_string();
        for name in ["contracts", "evm", "batch_transfers"] {
            if let Some(flag) = cfg.features.get_mut(name) {
                flag.enabled = true;
                flag.min_height = 0;
            }
        }
        cfg.producer.interval_secs = 1;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_supply_constants() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.tokenomics.max_supply, 100_000_000 * COIN);
        assert_eq!(cfg.tokenomics.genesis_supply, 16_400_000 * COIN);
        assert_eq!(cfg.staking.min_validator_stake, 1_000 * COIN);
    }

    #[test]
    fn genesis_allocations_sum_below_genesis_supply() {
        let cfg = ChainConfig::default();
        let allocated: u64 = cfg.genesis.allocations.iter().map(|a| a.balance).sum();
        let staked: u64 = cfg.genesis.validators.iter().map(|v| v.stake).sum();
        assert!(allocated + staked <= cfg.tokenomics.genesis_supply);
    }

    #[test]
    fn feature_gating_respects_height_and_flag() {
        let cfg = ChainConfig::default();
        assert!(cfg.feature_active("transfers", 0));
        assert!(!cfg.feature_active("contracts", 10_000)); // disabled
        assert!(!cfg.feature_active("missing", 0));

        let dev = ChainConfig::devnet();
        assert!(dev.feature_active("contracts", 0));
    }

    #[test]
    fn genesis_proposer_pubkey_is_well_formed() {
        let cfg = ChainConfig::default();
        assert_eq!(cfg.genesis.proposer_pubkey.len(), 128);
        assert!(cfg.genesis.proposer_pubkey.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
