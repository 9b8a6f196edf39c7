//! Unicrium chain library crate.
//!
//! This crate provides the core building blocks of a proof-of-stake
//! node:
//!
//! - cryptographic primitives and canonical hashing (`crypto`),
//! - strongly-typed domain types (`types`),
//! - the account and staking state machine (`ledger`),
//! - transaction pooling (`mempool`),
//! - merkle roots and inclusion proofs (`merkle`),
//! - gas metering (`gas`),
//! - proposer selection and slashing (`consensus`),
//! - persistent storage backends (`storage`),
//! - the EVM contract adapter (`vm`),
//! - block production and import (`node`),
//! - the TCP peer overlay (`p2p`),
//! - and a top-level node configuration (`config`).
//!
//! Higher-level binaries compose these pieces into validator nodes and
//! local devnets.

pub mod config;
pub mod consensus;
pub mod crypto;
pub mod error;
pub mod gas;
pub mod ledger;
pub mod mempool;
pub mod merkle;
pub mod node;
pub mod p2p;
pub mod storage;
pub mod types;
pub mod vm;

// Re-export top-level configuration types.
pub use config::{COIN, ChainConfig, GenesisConfig, P2pConfig, StorageConfig};

// Re-export the crypto surface.
pub use crypto::{KeyPair, hash_object, keccak256, verify_signature};

// Re-export error taxonomy.
pub use error::{BlockError, ChainError, MempoolError, ValidationError};

// Re-export the core state machine and its collaborators.
pub use consensus::{ProofOfStake, SlashingManager};
pub use gas::{GasCalculator, GasConfig};
pub use ledger::{Account, Ledger};
pub use mempool::Mempool;
pub use node::{Blockchain, ProducerHandle, spawn_producer};

// Re-export storage backends.
pub use storage::{
    ChainMetadata, ChainStore, ContractRecord, MemoryStore, RocksDbStore, StorageError,
};

// Re-export the contract layer.
pub use vm::{EvmAdapter, Interpreter, StaticCodeInterpreter};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Default bytecode interpreter for nodes built without a full EVM.
pub type DefaultInterpreter = StaticCodeInterpreter;

/// Default persistent store backend.
pub type DefaultStore = RocksDbStore;

/// The node stack a typical validator runs: RocksDB persistence plus
/// the default interpreter.
pub type DefaultNode = Blockchain<DefaultStore, DefaultInterpreter>;
