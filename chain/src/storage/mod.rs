//! Persistent storage for the chain.
//!
//! [`ChainStore`] is the abstraction the node commits through.
//! Implementations:
//!
//! - [`mem::MemoryStore`]: in-memory, for tests and simulations,
//! - [`rocksdb::RocksDbStore`]: three RocksDB namespaces plus a
//!   contracts side directory, for real nodes.
//!
//! Commit discipline: the node writes the block, state, and index first
//! and the metadata record last, so after a crash `meta.height` never
//! points past a missing block.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::Ledger;
use crate::types::{Address, Block};

pub mod mem;
pub mod rocksdb;

pub use mem::MemoryStore;
pub use rocksdb::RocksDbStore;

/// Chain-level metadata stored under `meta:blockchain`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub height: u64,
    pub latest_hash: String,
    pub total_minted: u64,
}

/// Persisted form of one deployed contract: hex code plus hex-keyed
/// storage, one record per address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: Address,
    /// Runtime bytecode as bare hex.
    pub bytecode: String,
    /// 32-byte hex key → 32-byte hex value.
    #[serde(default)]
    pub storage: BTreeMap<String, String>,
}

/// Storage-level error type.
#[derive(Debug)]
pub enum StorageError {
    /// Underlying RocksDB error.
    RocksDb(::rocksdb::Error),
    /// Filesystem error on the contracts side directory.
    Io(std::io::Error),
    /// A stored record failed to decode.
    Corrupted(String),
}

impl From<::rocksdb::Error> for StorageError {
    fn from(e: ::rocksdb::Error) -> Self {
        StorageError::RocksDb(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::RocksDb(e) => write!(f, "rocksdb: {e}"),
            StorageError::Io(e) => write!(f, "io: {e}"),
            StorageError::Corrupted(msg) => write!(f, "corrupted record: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Abstract storage interface used by the node.
///
/// The interface is intentionally small: height-keyed blocks with a hash
/// index, one current state snapshot with named checkpoints, chain
/// metadata, and per-contract records.
pub trait ChainStore: Send {
    /// Persists a block and its hash index entry.
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError>;

    /// Fetches a block by height, if present.
    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError>;

    /// Fetches a block by hash via the index, if present.
    fn load_block_by_hash(&self, hash: &str) -> Result<Option<Block>, StorageError>;

    /// Persists the current ledger snapshot.
    fn save_state(&mut self, ledger: &Ledger) -> Result<(), StorageError>;

    /// Loads the current ledger snapshot, if one was ever saved.
    fn load_state(&self) -> Result<Option<Ledger>, StorageError>;

    /// Persists chain metadata. Called last in every commit.
    fn save_metadata(&mut self, meta: &ChainMetadata) -> Result<(), StorageError>;

    /// Loads chain metadata; `None` means an empty store.
    fn metadata(&self) -> Result<Option<ChainMetadata>, StorageError>;

    /// Records a named checkpoint descriptor pointing at the current
    /// state.
    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError>;

    /// Persists one contract record (code + storage).
    fn save_contract(&mut self, record: &ContractRecord) -> Result<(), StorageError>;

    /// Loads every persisted contract record.
    fn load_contracts(&self) -> Result<Vec<ContractRecord>, StorageError>;
}

/// Loads a contiguous range of blocks, stopping at the first gap.
pub fn load_blocks_range<S: ChainStore + ?Sized>(
    store: &S,
    start: u64,
    end: u64,
) -> Result<Vec<Block>, StorageError> {
    let mut blocks = Vec::new();
    for height in start..=end {
        match store.load_block(height)? {
            Some(block) => blocks.push(block),
            None => break,
        }
    }
    Ok(blocks)
}
