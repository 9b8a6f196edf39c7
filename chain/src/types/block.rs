//! Block type and canonical header hashing.
//!
//! A block is hashed and signed through its canonical header: a fixed
//! key set serialized as canonical JSON. The proposer signs the header
//! (with its own public key stamped in), and the block hash is the hash
//! of the header *including* the signature. The same canonical form is
//! used on every node, so hashes and signatures are reproducible.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::crypto::{KeyPair, hash_object, verify_object_signature};

use super::{Address, PublicKey, Transaction};

/// Sentinel string carried by genesis header fields in place of real
/// hashes. Non-genesis blocks carrying it are rejected.
pub const GENESIS_SENTINEL: &str = "genesis";

/// A chain block. Mutable only until [`Block::sign`] seals it; committed
/// blocks are never modified.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub prev_hash: String,
    pub timestamp: u64,
    pub proposer: Address,
    /// Hex public key of the proposer; the genesis block carries the
    /// configured genesis key.
    #[serde(default)]
    pub proposer_pubkey: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub tx_root: String,
    #[serde(default)]
    pub state_root: String,
    #[serde(default)]
    pub validator_set_hash: String,
    #[serde(default)]
    pub next_validator_set_hash: String,
    #[serde(default)]
    pub consensus_hash: String,
    #[serde(default)]
    pub app_hash: String,
    #[serde(default)]
    pub total_fees: u64,
    #[serde(default)]
    pub block_reward: u64,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub contracts_deployed: u32,
    #[serde(default)]
    pub contract_calls: u32,
    #[serde(default)]
    pub contract_gas_used: u64,
    #[serde(default = "default_vm_version")]
    pub vm_version: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    #[serde(default)]
    pub extra_data: String,
    #[serde(default)]
    pub reserved_field1: u64,
    #[serde(default)]
    pub reserved_field2: u64,
    #[serde(default)]
    pub reserved_field3: String,
}

fn default_vm_version() -> String {
    "none".to_string()
}

fn default_protocol_version() -> u32 {
    1
}

impl Block {
    /// Creates an unsealed block with empty roots and no signature.
    pub fn new(height: u64, prev_hash: String, timestamp: u64, proposer: Address) -> Self {
        Self {
            height,
            prev_hash,
            timestamp,
            proposer,
            proposer_pubkey: String::new(),
            transactions: Vec::new(),
            tx_root: String::new(),
            state_root: String::new(),
            validator_set_hash: String::new(),
            next_validator_set_hash: String::new(),
            consensus_hash: String::new(),
            app_hash: String::new(),
            total_fees: 0,
            block_reward: 0,
            signature: String::new(),
            hash: String::new(),
            contracts_deployed: 0,
            contract_calls: 0,
            contract_gas_used: 0,
            vm_version: default_vm_version(),
            protocol_version: default_protocol_version(),
            extra_data: String::new(),
            reserved_field1: 0,
            reserved_field2: 0,
            reserved_field3: String::new(),
        }
    }

    /// The canonical header: the fixed key set every node hashes and
    /// signs. Transactions appear only through their count and merkle
    /// root.
    pub fn header_value(&self) -> Value {
        let mut m = Map::new();
        m.insert("height".into(), json!(self.height));
        m.insert("prev_hash".into(), json!(self.prev_hash));
        m.insert("timestamp".into(), json!(self.timestamp));
        m.insert("proposer".into(), json!(self.proposer.to_string()));
        m.insert("proposer_pubkey".into(), json!(self.proposer_pubkey));
        m.insert("state_root".into(), json!(self.state_root));
        m.insert("validator_set_hash".into(), json!(self.validator_set_hash));
        m.insert(
            "next_validator_set_hash".into(),
            json!(self.next_validator_set_hash),
        );
        m.insert("consensus_hash".into(), json!(self.consensus_hash));
        m.insert("app_hash".into(), json!(self.app_hash));
        m.insert("tx_count".into(), json!(self.transactions.len()));
        m.insert("tx_merkle_root".into(), json!(self.tx_root));
        m.insert("total_fees".into(), json!(self.total_fees));
        m.insert("block_reward".into(), json!(self.block_reward));
        m.insert("contracts_deployed".into(), json!(self.contracts_deployed));
        m.insert("contract_calls".into(), json!(self.contract_calls));
        m.insert("contract_gas_used".into(), json!(self.contract_gas_used));
        m.insert("vm_version".into(), json!(self.vm_version));
        m.insert("protocol_version".into(), json!(self.protocol_version));
        Value::Object(m)
    }

    /// Block hash: the canonical header plus the signature.
    pub fn compute_hash(&self) -> String {
        let mut header = self.header_value();
        header
            .as_object_mut()
            .expect("header_value always returns an object")
            .insert("signature".into(), json!(self.signature));
        hash_object(&header)
    }

    /// Signs the header with the proposer's key and seals the hash.
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.proposer_pubkey = keypair.public_key().to_hex();
        self.signature = keypair.sign_object(&self.header_value());
        self.hash = self.compute_hash();
    }

    /// Verifies the proposer signature over the canonical header.
    pub fn verify_signature(&self) -> bool {
        if self.signature.is_empty() || self.proposer_pubkey.is_empty() {
            return false;
        }
        let Ok(pubkey) = PublicKey::from_hex(&self.proposer_pubkey) else {
            return false;
        };
        verify_object_signature(&pubkey, &self.header_value(), &self.signature)
    }

    /// True when any header field still carries the genesis sentinel.
    pub fn has_sentinel_fields(&self) -> bool {
        [
            self.state_root.as_str(),
            self.validator_set_hash.as_str(),
            self.next_validator_set_hash.as_str(),
            self.consensus_hash.as_str(),
            self.app_hash.as_str(),
            self.signature.as_str(),
            self.hash.as_str(),
        ]
        .contains(&GENESIS_SENTINEL)
    }

    /// Ids of all included transactions, in block order.
    pub fn tx_ids(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }

    /// Sum of transaction fees in this block.
    pub fn sum_fees(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.fee()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZERO_HASH;

    fn dummy_block(height: u64) -> Block {
        let proposer = KeyPair::from_seed("proposer").unwrap().address();
        let mut block = Block::new(height, ZERO_HASH.to_string(), 1_700_000_000 + height, proposer);
        block.tx_root = ZERO_HASH.to_string();
        block.state_root = "aa".repeat(32);
        block
    }

    #[test]
    fn block_hash_is_deterministic() {
        let block = dummy_block(1);
        assert_eq!(block.compute_hash(), block.compute_hash());
    }

    #[test]
    fn sign_seals_hash_and_verifies() {
        let kp = KeyPair::from_seed("proposer").unwrap();
        let mut block = dummy_block(1);
        block.sign(&kp);

        assert_eq!(block.hash, block.compute_hash());
        assert!(block.verify_signature());
    }

    #[test]
    fn header_tamper_invalidates_signature() {
        let kp = KeyPair::from_seed("proposer").unwrap();
        let mut block = dummy_block(1);
        block.sign(&kp);

        block.total_fees = 123;
        assert!(!block.verify_signature());
    }

    #[test]
    fn signature_feeds_into_block_hash() {
        let kp = KeyPair::from_seed("proposer").unwrap();
        let mut block = dummy_block(1);
        let unsigned_hash = block.compute_hash();
        block.sign(&kp);
        assert_ne!(block.hash, unsigned_hash);
    }

    #[test]
    fn serde_roundtrip_preserves_header() {
        let kp = KeyPair::from_seed("proposer").unwrap();
        let mut block = dummy_block(2);
        block.sign(&kp);

        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.compute_hash(), block.hash);
        assert!(back.verify_signature());
    }

    #[test]
    fn sentinel_detection() {
        let mut block = dummy_block(3);
        assert!(!block.has_sentinel_fields());
        block.app_hash = GENESIS_SENTINEL.to_string();
        assert!(block.has_sentinel_fields());
    }
}
