//! RocksDB-backed chain store.
//!
//! The data directory holds three databases plus a side directory:
//!
//! - `blocks/`:   `block:<height>` → block JSON, `meta:blockchain` →
//!   chain metadata,
//! - `state/`:    `state:current` → ledger snapshot,
//!   `checkpoint:<name>` → checkpoint descriptor,
//! - `indexes/`:  `hash:<block_hash>` → height,
//! - `contracts/`: `<address>.json` → contract code and storage.
//!
//! All records are canonical JSON; the encoding must stay stable across
//! restarts for state roots to reproduce.

use std::fs;
use std::path::{Path, PathBuf};

use rocksdb::{DB, Options};
use serde_json::json;

use crate::config::StorageConfig;
use crate::ledger::Ledger;
use crate::types::Block;

use super::{ChainMetadata, ChainStore, ContractRecord, StorageError};

const STATE_KEY: &[u8] = b"state:current";
const META_KEY: &[u8] = b"meta:blockchain";

/// RocksDB implementation of [`ChainStore`].
pub struct RocksDbStore {
    blocks: DB,
    state: DB,
    indexes: DB,
    contracts_dir: PathBuf,
}

impl RocksDbStore {
    /// Opens (or creates) the three databases and the contracts
    /// directory under `cfg.data_dir`.
    pub fn open(cfg: &StorageConfig) -> Result<Self, StorageError> {
        let data_dir = Path::new(&cfg.data_dir);
        fs::create_dir_all(data_dir)?;

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);

        let blocks = DB::open(&opts, data_dir.join("blocks"))?;
        let state = DB::open(&opts, data_dir.join("state"))?;
        let indexes = DB::open(&opts, data_dir.join("indexes"))?;

        let contracts_dir = data_dir.join("contracts");
        fs::create_dir_all(&contracts_dir)?;

        tracing::info!(path = %data_dir.display(), "storage initialized");
        Ok(Self {
            blocks,
            state,
            indexes,
            contracts_dir,
        })
    }

    /// Whether a chain already exists under `cfg.data_dir`. Drives the
    /// bootstrap policy: nodes without local blocks dial out as clients.
    pub fn data_present(cfg: &StorageConfig) -> bool {
        Path::new(&cfg.data_dir).join("blocks").exists()
    }

    fn block_key(height: u64) -> Vec<u8> {
        format!("block:{height}").into_bytes()
    }

    fn hash_key(hash: &str) -> Vec<u8> {
        format!("hash:{hash}").into_bytes()
    }

    fn decode<T: serde::de::DeserializeOwned>(
        bytes: &[u8],
        what: &str,
    ) -> Result<T, StorageError> {
        serde_json::from_slice(bytes)
            .map_err(|e| StorageError::Corrupted(format!("{what}: {e}")))
    }

    fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|e| StorageError::Corrupted(format!("{what}: {e}")))
    }
}

impl ChainStore for RocksDbStore {
    fn save_block(&mut self, block: &Block) -> Result<(), StorageError> {
        let encoded = Self::encode(block, "block")?;
        self.blocks.put(Self::block_key(block.height), encoded)?;
        self.indexes
            .put(Self::hash_key(&block.hash), block.height.to_string())?;
        tracing::debug!(height = block.height, "block saved");
        Ok(())
    }

    fn load_block(&self, height: u64) -> Result<Option<Block>, StorageError> {
        match self.blocks.get(Self::block_key(height))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes, "block")?)),
            None => Ok(None),
        }
    }

    fn load_block_by_hash(&self, hash: &str) -> Result<Option<Block>, StorageError> {
        match self.indexes.get(Self::hash_key(hash))? {
            Some(bytes) => {
                let height: u64 = String::from_utf8_lossy(&bytes)
                    .parse()
                    .map_err(|_| StorageError::Corrupted("hash index height".to_string()))?;
                self.load_block(height)
            }
            None => Ok(None),
        }
    }

    fn save_state(&mut self, ledger: &Ledger) -> Result<(), StorageError> {
        let encoded = Self::encode(ledger, "state")?;
        self.state.put(STATE_KEY, encoded)?;
        Ok(())
    }

    fn load_state(&self) -> Result<Option<Ledger>, StorageError> {
        match self.state.get(STATE_KEY)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes, "state")?)),
            None => Ok(None),
        }
    }

    fn save_metadata(&mut self, meta: &ChainMetadata) -> Result<(), StorageError> {
        let encoded = Self::encode(meta, "metadata")?;
        self.blocks.put(META_KEY, encoded)?;
        Ok(())
    }

    fn metadata(&self) -> Result<Option<ChainMetadata>, StorageError> {
        match self.blocks.get(META_KEY)? {
            Some(bytes) => Ok(Some(Self::decode(&bytes, "metadata")?)),
            None => Ok(None),
        }
    }

    fn create_checkpoint(&mut self, name: &str, height: u64) -> Result<(), StorageError> {
        let descriptor = json!({
            "name": name,
            "height": height,
            "state_key": "state:current",
        });
        let key = format!("checkpoint:{name}").into_bytes();
        self.state
            .put(key, Self::encode(&descriptor, "checkpoint")?)?;
        tracing::info!(name, height, "checkpoint created");
        Ok(())
    }

    fn save_contract(&mut self, record: &ContractRecord) -> Result<(), StorageError> {
        let path = self.contracts_dir.join(format!("{}.json", record.address));
        let encoded = Self::encode(record, "contract")?;
        fs::write(path, encoded)?;
        tracing::debug!(address = %record.address, "contract saved");
        Ok(())
    }

    fn load_contracts(&self) -> Result<Vec<ContractRecord>, StorageError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.contracts_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            match Self::decode::<ContractRecord>(&bytes, "contract") {
                Ok(record) => records.push(record),
                Err(e) => {
                    // A single bad file should not take the node down.
                    tracing::error!(path = %path.display(), error = %e, "skipping contract file");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::{Address, ZERO_HASH};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, RocksDbStore) {
        let tmp = TempDir::new().expect("create temp dir");
        let cfg = StorageConfig {
            data_dir: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        let store = RocksDbStore::open(&cfg).expect("open store");
        (tmp, store)
    }

    fn signed_block(height: u64) -> Block {
        let kp = KeyPair::from_seed("proposer").unwrap();
        let mut block = Block::new(height, ZERO_HASH.to_string(), 1_700_000_000, kp.address());
        block.tx_root = ZERO_HASH.to_string();
        block.sign(&kp);
        block
    }

    #[test]
    fn block_roundtrip_with_hash_index() {
        let (_tmp, mut store) = temp_store();
        let block = signed_block(0);
        store.save_block(&block).unwrap();

        let loaded = store.load_block(0).unwrap().expect("block present");
        assert_eq!(loaded, block);

        let by_hash = store
            .load_block_by_hash(&block.hash)
            .unwrap()
            .expect("index present");
        assert_eq!(by_hash.height, 0);
    }

    #[test]
    fn state_and_metadata_roundtrip() {
        let (_tmp, mut store) = temp_store();

        let mut ledger = Ledger::new();
        ledger.get_or_create_account(Address([3u8; 20])).balance = 42;
        store.save_state(&ledger).unwrap();

        let meta = ChainMetadata {
            height: 0,
            latest_hash: "h".to_string(),
            total_minted: 42,
        };
        store.save_metadata(&meta).unwrap();

        let restored = store.load_state().unwrap().expect("state present");
        assert_eq!(restored.state_root(), ledger.state_root());
        assert_eq!(store.metadata().unwrap().unwrap(), meta);
    }

    #[test]
    fn contracts_persist_as_side_files() {
        let (tmp, mut store) = temp_store();
        let record = ContractRecord {
            address: Address([9u8; 20]),
            bytecode: "608060405f".to_string(),
            storage: [("00".repeat(32), "11".repeat(32))].into_iter().collect(),
        };
        store.save_contract(&record).unwrap();

        let file = tmp
            .path()
            .join("contracts")
            .join(format!("{}.json", record.address));
        assert!(file.exists());

        let loaded = store.load_contracts().unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[test]
    fn data_present_reflects_block_db() {
        let tmp = TempDir::new().unwrap();
        let cfg = StorageConfig {
            data_dir: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        assert!(!RocksDbStore::data_present(&cfg));
        let _store = RocksDbStore::open(&cfg).unwrap();
        assert!(RocksDbStore::data_present(&cfg));
    }
}
