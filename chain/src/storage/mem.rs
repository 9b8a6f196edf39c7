//! In-memory chain store.
//!
//! Keeps everything in maps. Useful for unit tests, simulations, and
//! small devnets; nothing survives the process.

use std::collections::{BTreeMap, HashMap};

use crate::ledger::Ledger;
use crate::types::{Address, Block};

use super::{ChainMetadata, ChainStore, ContractRecord, StorageError};

/// In-memory implementation of [`ChainStore`].
#[derive(Default)]
pub struct MemoryStore {
    blocks: BTreeMap<u64, Block>,
    hash_index: HashMap<String, u64>,
    state: Option<Ledger>,
    metadata: Option<ChainMetadata>,
    checkpoints: HashMap<String, u64>,
    contracts: BTreeMap<Address, ContractRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True when no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Height a checkpoint was taken at, if it exists.
    pub fn checkpoint_height(&self, name: &str) -> Option<u64> {
        self.checkpoints.get(name).copied()
    }
}

impl ChainStore for MemoryStore {
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError> {
        self.hash_index.insert(block.hash.clone(), block.height);
        self.blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        Ok(self.blocks.get(&height).cloned())
    }

    fn load_block_by_hash(&self, hash: &str) -> Result<Option<Block>, StorageError> {
        match self.hash_index.get(hash) {
            Some(height) => self.load_block(*height),
            None => Ok(None),
        }
    }

    fn save_state(&mut self, ledger: &Ledger) -> Result<(), StorageError> {
        self.state = Some(ledger.clone());
        Ok(())
    }

    fn load_state(&self) -> Result<Option<Ledger>, StorageError> {
        Ok(self.state.clone())
    }

    fn save_metadata(&mut self, meta: &ChainMetadata) -> Result<(), StorageError> {
        self.metadata = Some(meta.clone());
        Ok(())
    }

    fn metadata(&self) -> Result<Option<ChainMetadata>, StorageError> {
        Ok(self.metadata.clone())
    }

    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        self.checkpoints.insert(name.to_string(), height);
        Ok(())
    }

    fn save_contract(&mut self, record: &ContractRecord) -> Result<(), StorageError> {
        self.contracts.insert(record.address, record.clone());
        Ok(())
    }

    fn load_contracts(&self) -> Result<Vec<ContractRecord>, StorageError> {
        Ok(self.contracts.values().cloned().collect())
    }
}
