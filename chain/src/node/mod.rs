//! The node state machine.
//!
//! [`Blockchain`] owns the ledger, the store, the mempool, the proposer
//! selector, the slashing manager, and the contract adapter, and is the
//! only writer of committed chain state. Locally produced blocks go
//! through [`Blockchain::produce_block`]; blocks arriving from peers go
//! through [`Blockchain::import_block`]. Both execute on a cloned ledger
//! that replaces the live one only after storage succeeds, so a rejected
//! block leaves no partial state.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::config::ChainConfig;
use crate::consensus::{ProofOfStake, SlashingManager};
use crate::crypto::{KeyPair, hash_object};
use crate::error::{BlockError, ChainError, ValidationError};
use crate::gas::GasCalculator;
use crate::ledger::Ledger;
use crate::mempool::Mempool;
use crate::merkle;
use crate::storage::{ChainMetadata, ChainStore, ContractRecord};
use crate::types::{Address, Block, Transaction, TxKind, TxType, ZERO_HASH};
use crate::types::block::GENESIS_SENTINEL;
use crate::vm::{EvmAdapter, Interpreter};

pub mod producer;

pub use producer::{ProducerHandle, spawn_producer};

/// How many committed blocks stay cached in memory.
const RECENT_BLOCKS: usize = 100;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Side effects of executing a block's transactions on a working ledger.
struct BlockExecution {
    applied: Vec<Transaction>,
    total_fees: u64,
    contracts_deployed: u32,
    contract_calls: u32,
    contract_gas_used: u64,
    contract_records: Vec<ContractRecord>,
}

impl BlockExecution {
    fn new() -> Self {
        Self {
            applied: Vec::new(),
            total_fees: 0,
            contracts_deployed: 0,
            contract_calls: 0,
            contract_gas_used: 0,
            contract_records: Vec::new(),
        }
    }
}

/// A full node: state machine plus everything it commits through.
pub struct Blockchain<S, I> {
    config: ChainConfig,
    store: S,
    ledger: Ledger,
    consensus: ProofOfStake,
    slashing: SlashingManager,
    mempool: Mempool,
    gas: GasCalculator,
    vm: EvmAdapter<I>,
    recent_blocks: VecDeque<Block>,
    height: u64,
    total_minted: u64,
    restored: bool,
}

impl<S: ChainStore, I: Interpreter> Blockchain<S, I> {
    /// Opens the chain from `store`, creating the genesis block when the
    /// store is empty.
    pub fn new(config: ChainConfig, store: S, interpreter: I) -> Result<Self, ChainError> {
        let gas = GasCalculator::new(config.gas.clone());
        let consensus = ProofOfStake::new(config.staking.min_validator_stake);
        let slashing = SlashingManager::new(config.staking.slashing_fraction);
        let mempool = Mempool::new(config.mempool.max_size, config.mempool.max_age_secs);
        let vm = EvmAdapter::new(interpreter, config.contracts.max_contract_size);

        let mut node = Self {
            config,
            store,
            ledger: Ledger::new(),
            consensus,
            slashing,
            mempool,
            gas,
            vm,
            recent_blocks: VecDeque::new(),
            height: 0,
            total_minted: 0,
            restored: false,
        };
        node.load_or_create_genesis()?;
        Ok(node)
    }

    fn load_or_create_genesis(&mut self) -> Result<(), ChainError> {
        match self.store.metadata()? {
            None => self.create_genesis(),
            Some(meta) => self.load_existing(meta),
        }
    }

    fn create_genesis(&mut self) -> Result<(), ChainError> {
        tracing::info!(chain_id = %self.config.chain_id, "no chain data, creating genesis block");

        for allocation in &self.config.genesis.allocations {
            self.ledger
                .get_or_create_account(allocation.address)
                .balance = allocation.balance;
        }
        for validator in &self.config.genesis.validators {
            let account = self.ledger.get_or_create_account(validator.address);
            account.staked = validator.stake;
            self.ledger.validators.insert(
                validator.address,
                crate::types::ValidatorInfo {
                    address: validator.address,
                    public_key: validator.public_key.clone(),
                    stake: validator.stake,
                    delegated_stake: 0,
                    commission_rate: self.config.staking.default_commission,
                    jailed: false,
                    jailed_until: 0,
                    total_blocks_proposed: 0,
                    total_blocks_missed: 0,
                    created_at: 0,
                },
            );
        }
        self.refresh_consensus_set(0);

        let genesis = self.genesis_block();
        self.total_minted = self.config.tokenomics.genesis_supply;

        self.store.save_block(&genesis)?;
        self.store.save_state(&self.ledger)?;
        self.store.save_metadata(&ChainMetadata {
            height: 0,
            latest_hash: genesis.hash.clone(),
            total_minted: self.total_minted,
        })?;

        self.height = 0;
        self.recent_blocks.push_back(genesis);
        self.restored = false;
        tracing::info!(
            genesis_supply = self.total_minted,
            validators = self.config.genesis.validators.len(),
            "genesis block created"
        );
        Ok(())
    }

    fn genesis_block(&self) -> Block {
        let mut genesis = Block::new(
            0,
            ZERO_HASH.to_string(),
            self.config.genesis.timestamp,
            self.config.genesis.proposer,
        );
        genesis.proposer_pubkey = self.config.genesis.proposer_pubkey.clone();
        genesis.tx_root = ZERO_HASH.to_string();
        genesis.state_root = GENESIS_SENTINEL.to_string();
        genesis.validator_set_hash = GENESIS_SENTINEL.to_string();
        genesis.next_validator_set_hash = GENESIS_SENTINEL.to_string();
        genesis.consensus_hash = GENESIS_SENTINEL.to_string();
        genesis.app_hash = GENESIS_SENTINEL.to_string();
        genesis.signature = GENESIS_SENTINEL.to_string();
        genesis.hash = GENESIS_SENTINEL.to_string();
        genesis
    }

    fn load_existing(&mut self, meta: ChainMetadata) -> Result<(), ChainError> {
        self.height = meta.height;
        self.total_minted = meta.total_minted;

        let start = meta.height.saturating_sub(RECENT_BLOCKS as u64);
        for height in start..=meta.height {
            match self.store.load_block(height)? {
                Some(block) => self.recent_blocks.push_back(block),
                None => {
                    // A partial commit left metadata ahead of the block
                    // records; refuse to run on it.
                    return Err(ChainError::Storage(crate::storage::StorageError::Corrupted(
                        format!("metadata height {} but block {height} missing", meta.height),
                    )));
                }
            }
        }

        if let Some(state) = self.store.load_state()? {
            self.ledger = state;
        }
        self.refresh_consensus_set(self.height);
        self.vm.load_records(self.store.load_contracts()?);
        self.restored = true;

        tracing::info!(
            height = self.height,
            accounts = self.ledger.accounts.len(),
            validators = self.consensus.validator_count(),
            "chain state loaded"
        );
        Ok(())
    }

    fn refresh_consensus_set(&mut self, height: u64) {
        let min_stake = self.config.staking.min_validator_stake;
        let stakes: Vec<(Address, u64)> = self
            .ledger
            .active_validators(height, min_stake)
            .iter()
            .map(|v| (v.address, v.total_stake()))
            .collect();
        self.consensus.replace_validators(stakes);
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn total_minted(&self) -> u64 {
        self.total_minted
    }

    /// Whether the node booted from existing chain data (drives the
    /// client-vs-listener bootstrap policy).
    pub fn was_restored(&self) -> bool {
        self.restored
    }

    pub fn latest_block(&self) -> &Block {
        self.recent_blocks
            .back()
            .expect("a chain always has at least the genesis block")
    }

    pub fn get_block(&self, height: u64) -> Result<Option<Block>, ChainError> {
        Ok(self.store.load_block(height)?)
    }

    pub fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>, ChainError> {
        Ok(self.store.load_block_by_hash(hash)?)
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.ledger.get_balance(address)
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.ledger.get_nonce(address)
    }

    pub fn state_root(&self) -> String {
        self.ledger.state_root()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn vm(&self) -> &EvmAdapter<I> {
        &self.vm
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn mempool_size(&self) -> usize {
        self.mempool.size()
    }

    /// Mempool wake signal for the producer.
    pub fn mempool_signal(&self) -> std::sync::Arc<tokio::sync::Notify> {
        self.mempool.signal()
    }

    pub fn slashing(&self) -> &SlashingManager {
        &self.slashing
    }

    /// Records a named state checkpoint at the current height.
    pub fn checkpoint(&mut self, name: &str) -> Result<(), ChainError> {
        Ok(self.store.create_checkpoint(name, self.height)?)
    }

    /// Block reward for a block at `height`, after halving and the
    /// supply clamp. The first `halving_interval` blocks (heights 1..=N)
    /// pay the full initial reward.
    pub fn get_block_reward(&self, height: u64) -> u64 {
        let era = height.saturating_sub(1) / self.config.tokenomics.halving_interval;
        let mut reward = if era >= 64 {
            0
        } else {
            self.config.tokenomics.initial_block_reward >> era
        };
        if reward < 1 {
            reward = 1;
        }
        let remaining = self
            .config
            .tokenomics
            .max_supply
            .saturating_sub(self.total_minted);
        reward.min(remaining)
    }

    // ------------------------------------------------------------------
    // Transaction admission
    // ------------------------------------------------------------------

    /// Validates and admits a transaction to the mempool. Returns its
    /// id.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<String, ChainError> {
        self.check_transaction(&tx, &self.ledger, false)
            .map_err(ChainError::Validation)?;
        let txid = self.mempool.add(tx)?;
        tracing::debug!(txid = %&txid[..16], pool = self.mempool.size(), "transaction queued");
        Ok(txid)
    }

    /// Stateless + stateful transaction checks.
    ///
    /// With `strict_nonce` the nonce must equal the ledger's expected
    /// value (block execution); otherwise gapped nonces are allowed in
    /// (mempool admission) and ordering is the mempool's job.
    fn check_transaction(
        &self,
        tx: &Transaction,
        ledger: &Ledger,
        strict_nonce: bool,
    ) -> Result<(), ValidationError> {
        if !tx.verify_signature() {
            return Err(ValidationError::InvalidSignature);
        }

        let next_height = self.height + 1;
        match tx.tx_type() {
            TxType::ContractDeploy | TxType::ContractCall => {
                if !self.config.feature_active("contracts", next_height) {
                    return Err(ValidationError::FeatureDisabled("contracts"));
                }
            }
            TxType::BatchTransfer => {
                if !self.config.feature_active("batch_transfers", next_height) {
                    return Err(ValidationError::FeatureDisabled("batch_transfers"));
                }
            }
            _ => {}
        }

        let expected_nonce = ledger.get_nonce(&tx.sender());
        let nonce_ok = if strict_nonce {
            tx.nonce() == expected_nonce
        } else {
            tx.nonce() >= expected_nonce
        };
        if !nonce_ok {
            return Err(ValidationError::NonceMismatch {
                expected: expected_nonce,
                got: tx.nonce(),
            });
        }

        if !self.gas.validate_gas_limit(tx.gas_limit()) {
            return Err(ValidationError::GasLimitOutOfRange(tx.gas_limit()));
        }
        let required_gas = self.gas.calculate_tx_gas(tx.tx_type(), tx.data_size(), 0, 0);
        if tx.gas_limit() < required_gas {
            return Err(ValidationError::GasLimitTooLow {
                required: required_gas,
                limit: tx.gas_limit(),
            });
        }

        let gas_fee = self.gas.calculate_fee(required_gas, Some(tx.gas_price()));
        let total_cost = tx.amount() + tx.fee() + gas_fee;
        let available = ledger.get_balance(&tx.sender());
        if available < total_cost {
            return Err(ValidationError::InsufficientBalance {
                required: total_cost,
                available,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Block execution
    // ------------------------------------------------------------------

    /// Applies one validated transaction to the working ledger, routing
    /// contract kinds through the VM adapter.
    fn apply_tx(
        &mut self,
        ledger: &mut Ledger,
        tx: &Transaction,
        height: u64,
        exec: &mut BlockExecution,
    ) -> Result<(), ValidationError> {
        match tx.kind() {
            TxKind::ContractDeploy {
                bytecode,
                input,
                value,
            } => {
                let outcome = self.vm.deploy(
                    ledger,
                    tx.sender(),
                    bytecode,
                    input,
                    *value,
                    tx.gas_limit(),
                );
                if !outcome.success {
                    return Err(ValidationError::VmRejected(
                        outcome.error.unwrap_or_else(|| "deploy failed".to_string()),
                    ));
                }
                let gas_fee = self
                    .gas
                    .calculate_fee(outcome.gas_used, Some(tx.gas_price()));
                ledger.transfer(tx.sender(), Address::ZERO, gas_fee + tx.fee())?;
                ledger.increment_nonce(tx.sender());

                exec.contracts_deployed += 1;
                exec.contract_gas_used += outcome.gas_used;
                let address = outcome.address.expect("successful deploy has an address");
                if let Some(record) = self.vm.record(&address) {
                    exec.contract_records.push(record);
                }
            }
            TxKind::ContractCall {
                contract,
                input,
                value,
            } => {
                if !self.vm.contract_exists(contract) {
                    return Err(ValidationError::ContractNotFound(*contract));
                }
                let outcome =
                    self.vm
                        .call(ledger, tx.sender(), *contract, input, *value, tx.gas_limit());
                if !outcome.success {
                    return Err(ValidationError::VmRejected(
                        outcome.error.unwrap_or_else(|| "call failed".to_string()),
                    ));
                }
                let gas_fee = self
                    .gas
                    .calculate_fee(outcome.gas_used, Some(tx.gas_price()));
                ledger.transfer(tx.sender(), Address::ZERO, gas_fee + tx.fee())?;
                ledger.increment_nonce(tx.sender());

                exec.contract_calls += 1;
                exec.contract_gas_used += outcome.gas_used;
                if let Some(record) = self.vm.record(contract) {
                    exec.contract_records.push(record);
                }
            }
            _ => ledger.apply_transaction(tx, height, &self.config.staking)?,
        }
        Ok(())
    }

    fn consensus_hash(&self) -> String {
        hash_object(&json!({
            "chain_id": self.config.chain_id,
            "min_validator_stake": self.config.staking.min_validator_stake,
            "initial_block_reward": self.config.tokenomics.initial_block_reward,
            "halving_interval": self.config.tokenomics.halving_interval,
            "max_supply": self.config.tokenomics.max_supply,
        }))
    }

    /// Assembles, executes, signs, and commits the next block.
    ///
    /// The proposer is selected by stake weight; when no validators
    /// exist the first known account (or the producing key itself) is
    /// used so a bootstrap chain can still make progress.
    pub fn produce_block(&mut self, keypair: &KeyPair) -> Result<Block, ChainError> {
        let next_height = self.height + 1;
        let proposer = self
            .consensus
            .select_proposer(next_height, "")
            .or_else(|| self.ledger.accounts.keys().next().copied())
            .unwrap_or_else(|| keypair.address());

        // Harvest ready transactions under the current nonce view.
        let expected = self
            .ledger
            .expected_nonces(self.mempool.senders());
        let candidates = self
            .mempool
            .get_ready(&expected, self.config.producer.batch_size);

        let mut working = self.ledger.clone();
        working.process_mature_unbonding(next_height);

        let mut exec = BlockExecution::new();
        for tx in candidates {
            if let Err(e) = self.check_transaction(&tx, &working, true) {
                tracing::warn!(txid = %&tx.txid()[..16], error = %e, "dropping invalid transaction");
                continue;
            }
            match self.apply_tx(&mut working, &tx, next_height, &mut exec) {
                Ok(()) => {
                    exec.total_fees += tx.fee();
                    exec.applied.push(tx);
                }
                Err(e) => {
                    tracing::warn!(txid = %&tx.txid()[..16], error = %e, "transaction failed to apply");
                }
            }
        }

        let tx_ids: Vec<String> = exec.applied.iter().map(|tx| tx.txid()).collect();
        let tx_root = if tx_ids.is_empty() {
            ZERO_HASH.to_string()
        } else {
            merkle::compute_tx_root(&tx_ids)
        };

        let block_reward = self.get_block_reward(next_height);
        working.get_or_create_account(proposer).balance += block_reward;
        let new_total_minted = self.total_minted + block_reward;

        let min_stake = self.config.staking.min_validator_stake;
        let mut block = Block::new(
            next_height,
            self.latest_block().hash.clone(),
            unix_now(),
            proposer,
        );
        block.transactions = exec.applied.clone();
        block.tx_root = tx_root;
        block.validator_set_hash = self.ledger.validator_set_hash(next_height, min_stake);
        block.next_validator_set_hash = working.validator_set_hash(next_height, min_stake);
        block.consensus_hash = self.consensus_hash();
        block.state_root = working.state_root();
        block.app_hash = block.state_root.clone();
        block.total_fees = exec.total_fees;
        block.block_reward = block_reward;
        block.contracts_deployed = exec.contracts_deployed;
        block.contract_calls = exec.contract_calls;
        block.contract_gas_used = exec.contract_gas_used;
        block.vm_version = self.config.protocol.vm_version.clone();
        block.protocol_version = self.config.protocol.protocol_version;
        block.sign(keypair);

        self.commit(block.clone(), working, exec, new_total_minted)?;

        tracing::info!(
            height = block.height,
            proposer = %block.proposer,
            txs = block.transactions.len(),
            reward = block.block_reward,
            "block produced"
        );
        Ok(block)
    }

    /// Validates and commits a block received from a peer.
    pub fn import_block(&mut self, block: Block) -> Result<(), ChainError> {
        let expected_height = self.height + 1;
        if block.height != expected_height {
            return Err(BlockError::HeightMismatch {
                expected: expected_height,
                got: block.height,
            }
            .into());
        }
        if block.has_sentinel_fields() {
            return Err(BlockError::SentinelHeader.into());
        }

        let expected_prev = self.latest_block().hash.clone();
        if block.prev_hash != expected_prev {
            return Err(BlockError::PrevHashMismatch {
                expected: expected_prev,
                got: block.prev_hash,
            }
            .into());
        }

        let now = unix_now();
        if block.timestamp > now + self.config.limits.max_timestamp_drift {
            return Err(BlockError::TimestampDrift {
                timestamp: block.timestamp,
                now,
            }
            .into());
        }

        if block.transactions.len() > self.config.limits.max_txs_per_block {
            return Err(BlockError::TooManyTransactions {
                count: block.transactions.len(),
                max: self.config.limits.max_txs_per_block,
            }
            .into());
        }

        let serialized_size = serde_json::to_vec(&block).map(|b| b.len()).unwrap_or(0);
        if serialized_size > self.config.limits.max_block_size {
            return Err(BlockError::BlockTooLarge {
                size: serialized_size,
                max: self.config.limits.max_block_size,
            }
            .into());
        }

        let deploys = block
            .transactions
            .iter()
            .filter(|tx| tx.tx_type() == TxType::ContractDeploy)
            .count();
        if deploys > self.config.contracts.max_contracts_per_block {
            return Err(BlockError::TooManyContractDeploys {
                count: deploys,
                max: self.config.contracts.max_contracts_per_block,
            }
            .into());
        }

        if !block.verify_signature() {
            return Err(BlockError::InvalidProposerSignature.into());
        }

        let min_stake = self.config.staking.min_validator_stake;
        if !block.validator_set_hash.is_empty()
            && block.validator_set_hash != self.ledger.validator_set_hash(block.height, min_stake)
        {
            return Err(BlockError::ValidatorSetMismatch.into());
        }

        // Execute on a working copy; every transaction must be valid
        // under the evolving pre-block snapshot.
        let mut working = self.ledger.clone();
        working.process_mature_unbonding(block.height);
        let mut exec = BlockExecution::new();
        for tx in block.transactions.clone() {
            let txid = tx.txid();
            self.check_transaction(&tx, &working, true)
                .map_err(|source| BlockError::InvalidTransaction {
                    txid: txid.clone(),
                    source,
                })?;
            self.apply_tx(&mut working, &tx, block.height, &mut exec)
                .map_err(|source| BlockError::InvalidTransaction { txid, source })?;
            exec.total_fees += tx.fee();
            exec.applied.push(tx);
        }

        // The reward the proposer credited itself, clamped to what the
        // supply cap still allows.
        let remaining = self
            .config
            .tokenomics
            .max_supply
            .saturating_sub(self.total_minted);
        let reward = block.block_reward.min(remaining);
        working.get_or_create_account(block.proposer).balance += reward;
        let new_total_minted = self.total_minted + reward;

        self.commit(block, working, exec, new_total_minted)
    }

    /// Persists a block and its state, then swaps the working ledger in.
    /// Metadata goes last so a crash never leaves it ahead of the data.
    fn commit(
        &mut self,
        block: Block,
        working: Ledger,
        exec: BlockExecution,
        new_total_minted: u64,
    ) -> Result<(), ChainError> {
        let mut working = working;

        // Double-sign bookkeeping happens at commit so both local and
        // remote blocks are observed.
        let events = self.slashing.process_block(
            block.height,
            block.proposer,
            &block.hash,
            self.consensus.stakes(),
        );
        for event in &events {
            working.slash_validator(
                &event.validator,
                self.config.staking.slashing_fraction,
                &event.reason,
            );
        }

        self.store.save_block(&block)?;
        self.store.save_state(&working)?;
        for record in &exec.contract_records {
            self.store.save_contract(record)?;
        }
        self.store.save_metadata(&ChainMetadata {
            height: block.height,
            latest_hash: block.hash.clone(),
            total_minted: new_total_minted,
        })?;

        // Storage succeeded: the block is now canonical.
        self.ledger = working;
        self.height = block.height;
        self.total_minted = new_total_minted;

        if let Some(validator) = self.ledger.validators.get_mut(&block.proposer) {
            validator.total_blocks_proposed += 1;
        }
        self.refresh_consensus_set(block.height);

        let included: Vec<String> = exec.applied.iter().map(|tx| tx.txid()).collect();
        self.mempool.remove_batch(&included);

        self.recent_blocks.push_back(block);
        while self.recent_blocks.len() > RECENT_BLOCKS + 1 {
            self.recent_blocks.pop_front();
        }
        Ok(())
    }
}
