//! Ledger-facing contract adapter.
//!
//! The adapter owns everything around the interpreter: deterministic
//! contract addresses (`keccak256(rlp([sender, nonce]))`), deployed code
//! and per-contract storage, an account view synchronized from the
//! ledger before every operation, and a state root over that view
//! refreshed after every successful operation. Code and storage survive
//! restarts through [`ContractRecord`]s loaded eagerly at init.

use std::collections::BTreeMap;

use rlp::RlpStream;
use serde_json::{Map, Value, json};

use crate::crypto::{canonical_json, keccak256};
use crate::ledger::Ledger;
use crate::storage::ContractRecord;
use crate::types::{ADDRESS_LEN, Address};

use super::{CallMessage, ContractStorage, CreateMessage, Interpreter, StorageWord, VmOutcome};

/// Result of a contract deployment.
#[derive(Clone, Debug)]
pub struct DeployOutcome {
    pub success: bool,
    pub address: Option<Address>,
    pub gas_used: u64,
    pub error: Option<String>,
}

/// Result of a contract call.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    pub success: bool,
    pub return_data: Vec<u8>,
    pub gas_used: u64,
    pub error: Option<String>,
}

/// Synced view of one account inside the VM.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct AccountView {
    balance: u64,
    nonce: u64,
}

/// Contract interface over a pluggable interpreter.
pub struct EvmAdapter<I> {
    interpreter: I,
    max_contract_size: usize,
    /// address → runtime code.
    contracts: BTreeMap<Address, Vec<u8>>,
    /// address → storage words.
    storage: BTreeMap<Address, ContractStorage>,
    /// Ledger-synced balances and nonces, authoritative between
    /// operations.
    accounts: BTreeMap<Address, AccountView>,
    state_root: String,
}

impl<I: Interpreter> EvmAdapter<I> {
    pub fn new(interpreter: I, max_contract_size: usize) -> Self {
        let mut adapter = Self {
            interpreter,
            max_contract_size,
            contracts: BTreeMap::new(),
            storage: BTreeMap::new(),
            accounts: BTreeMap::new(),
            state_root: String::new(),
        };
        adapter.refresh_state_root();
        adapter
    }

    /// Loads persisted contracts into the adapter (done once at node
    /// startup).
    pub fn load_records(&mut self, records: Vec<ContractRecord>) {
        let count = records.len();
        for record in records {
            let code = match hex::decode(&record.bytecode) {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!(address = %record.address, error = %e, "bad contract code hex");
                    continue;
                }
            };
            let mut storage = ContractStorage::new();
            for (k, v) in &record.storage {
                match (decode_word(k), decode_word(v)) {
                    (Some(key), Some(value)) => {
                        storage.insert(key, value);
                    }
                    _ => {
                        tracing::error!(address = %record.address, "bad storage word hex");
                    }
                }
            }
            self.storage.insert(record.address, storage);
            self.contracts.insert(record.address, code);
        }
        if count > 0 {
            tracing::info!(count, "contracts loaded from storage");
        }
        self.refresh_state_root();
    }

    /// Persisted form of one contract, written after deploys and calls.
    pub fn record(&self, address: &Address) -> Option<ContractRecord> {
        let code = self.contracts.get(address)?;
        let storage = self
            .storage
            .get(address)
            .map(|s| {
                s.iter()
                    .map(|(k, v)| (hex::encode(k), hex::encode(v)))
                    .collect()
            })
            .unwrap_or_default();
        Some(ContractRecord {
            address: *address,
            bytecode: hex::encode(code),
            storage,
        })
    }

    /// Derives the address for a deployment by `sender` at `nonce`: the
    /// last 20 bytes of `keccak256(rlp([sender, nonce]))`.
    pub fn contract_address(sender: &Address, nonce: u64) -> Address {
        let mut stream = RlpStream::new_list(2);
        stream.append(&sender.0.to_vec());
        stream.append(&nonce);
        let digest = keccak256(&stream.out());
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Address(addr)
    }

    /// Pulls an account's balance and nonce from the ledger into the
    /// adapter's view. The balance always follows the ledger; the nonce
    /// keeps the adapter's own bump when it is ahead, so back-to-back
    /// deploys in one block derive distinct addresses.
    fn sync_account(&mut self, ledger: &Ledger, address: Address) {
        let ledger_nonce = ledger.get_nonce(&address);
        let view = self.accounts.entry(address).or_default();
        view.balance = ledger.get_balance(&address);
        view.nonce = view.nonce.max(ledger_nonce);
        tracing::debug!(%address, balance = view.balance, nonce = view.nonce, "account synced");
    }

    /// Deploys `bytecode` from `deployer`.
    pub fn deploy(
        &mut self,
        ledger: &Ledger,
        deployer: Address,
        bytecode: &[u8],
        constructor_args: &[u8],
        value: u64,
        gas_limit: u64,
    ) -> DeployOutcome {
        if bytecode.is_empty() {
            return DeployOutcome {
                success: false,
                address: None,
                gas_used: 0,
                error: Some("empty bytecode".to_string()),
            };
        }
        if bytecode.len() > self.max_contract_size {
            return DeployOutcome {
                success: false,
                address: None,
                gas_used: 0,
                error: Some(format!(
                    "bytecode too large: {} > {}",
                    bytecode.len(),
                    self.max_contract_size
                )),
            };
        }

        self.sync_account(ledger, deployer);
        let nonce = self.accounts[&deployer].nonce;
        let address = Self::contract_address(&deployer, nonce);

        let msg = CreateMessage {
            sender: deployer,
            create_address: address,
            code: bytecode,
            data: constructor_args,
            value,
            gas_limit,
        };
        let mut storage = ContractStorage::new();
        let outcome: VmOutcome = self.interpreter.create(&msg, &mut storage);

        if !outcome.success {
            return DeployOutcome {
                success: false,
                address: None,
                gas_used: outcome.gas_used,
                error: outcome.error,
            };
        }

        self.contracts.insert(address, outcome.output);
        self.storage.insert(address, storage);
        // Write back the nonce bump so a second deploy in the same block
        // derives a fresh address.
        if let Some(view) = self.accounts.get_mut(&deployer) {
            view.nonce += 1;
        }
        self.refresh_state_root();

        tracing::info!(%address, gas = outcome.gas_used, "contract deployed");
        DeployOutcome {
            success: true,
            address: Some(address),
            gas_used: outcome.gas_used,
            error: None,
        }
    }

    /// Calls a deployed contract.
    pub fn call(
        &mut self,
        ledger: &Ledger,
        caller: Address,
        contract: Address,
        input: &[u8],
        value: u64,
        gas_limit: u64,
    ) -> CallOutcome {
        let Some(code) = self.contracts.get(&contract).cloned() else {
            return CallOutcome {
                success: false,
                return_data: Vec::new(),
                gas_used: 0,
                error: Some("contract not found".to_string()),
            };
        };

        self.sync_account(ledger, caller);
        self.sync_account(ledger, contract);

        let msg = CallMessage {
            sender: caller,
            contract,
            code: &code,
            data: input,
            value,
            gas_limit,
        };
        let storage = self.storage.entry(contract).or_default();
        let outcome = self.interpreter.call(&msg, storage);

        if !outcome.success {
            return CallOutcome {
                success: false,
                return_data: Vec::new(),
                gas_used: outcome.gas_used,
                error: outcome.error,
            };
        }

        self.refresh_state_root();
        tracing::info!(%contract, gas = outcome.gas_used, "contract call executed");
        CallOutcome {
            success: true,
            return_data: outcome.output,
            gas_used: outcome.gas_used,
            error: None,
        }
    }

    pub fn contract_exists(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn get_code(&self, address: &Address) -> Option<&[u8]> {
        self.contracts.get(address).map(|c| c.as_slice())
    }

    /// Storage read; absent slots read as zero.
    pub fn get_storage(&self, address: &Address, key: &StorageWord) -> StorageWord {
        self.storage
            .get(address)
            .and_then(|s| s.get(key))
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn set_storage(&mut self, address: Address, key: StorageWord, value: StorageWord) {
        self.storage.entry(address).or_default().insert(key, value);
        self.refresh_state_root();
    }

    /// Number of deployed contracts.
    pub fn contract_count(&self) -> usize {
        self.contracts.len()
    }

    /// Root over the synced account view and deployed code, refreshed
    /// after each successful operation.
    pub fn state_root(&self) -> &str {
        &self.state_root
    }

    fn refresh_state_root(&mut self) {
        let mut state = Map::new();
        for (address, view) in &self.accounts {
            let code_hash = self
                .contracts
                .get(address)
                .map(|code| hex::encode(keccak256(code)))
                .unwrap_or_default();
            state.insert(
                address.to_string(),
                json!({
                    "balance": view.balance.to_string(),
                    "nonce": view.nonce,
                    "code_hash": code_hash,
                }),
            );
        }
        for address in self.contracts.keys() {
            state.entry(address.to_string()).or_insert_with(|| {
                json!({
                    "balance": "0",
                    "nonce": 0,
                    "code_hash": hex::encode(keccak256(&self.contracts[address])),
                })
            });
        }
        let canonical = canonical_json(&Value::Object(state));
        self.state_root = hex::encode(keccak256(canonical.as_bytes()));
    }
}

fn decode_word(hex_str: &str) -> Option<StorageWord> {
    let bytes = hex::decode(hex_str).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&bytes);
    Some(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::StaticCodeInterpreter;

    fn adapter() -> EvmAdapter<StaticCodeInterpreter> {
        EvmAdapter::new(StaticCodeInterpreter::default(), 24_576)
    }

    fn funded_ledger(address: Address, balance: u64) -> Ledger {
        let mut ledger = Ledger::new();
        ledger.get_or_create_account(address).balance = balance;
        ledger
    }

    #[test]
    fn contract_address_is_deterministic_and_nonce_dependent() {
        let sender = Address([1u8; 20]);
        let a0 = EvmAdapter::<StaticCodeInterpreter>::contract_address(&sender, 0);
        let a0_again = EvmAdapter::<StaticCodeInterpreter>::contract_address(&sender, 0);
        let a1 = EvmAdapter::<StaticCodeInterpreter>::contract_address(&sender, 1);

        assert_eq!(a0, a0_again);
        assert_ne!(a0, a1);
    }

    #[test]
    fn deploy_stores_code_and_bumps_view_nonce() {
        let deployer = Address([1u8; 20]);
        let ledger = funded_ledger(deployer, 1_000_000);
        let mut vm = adapter();

        let out = vm.deploy(&ledger, deployer, &[0x60, 0x80], &[], 0, 1_000_000);
        assert!(out.success, "{:?}", out.error);
        let address = out.address.unwrap();
        assert!(vm.contract_exists(&address));
        assert_eq!(vm.get_code(&address), Some(&[0x60, 0x80][..]));

        // Second deploy in the same block gets a different address even
        // though the ledger nonce has not moved yet.
        let out2 = vm.deploy(&ledger, deployer, &[0x60, 0x80], &[], 0, 1_000_000);
        assert!(out2.success);
        assert_ne!(out2.address.unwrap(), address);
    }

    #[test]
    fn deploy_rejects_empty_and_oversized_bytecode() {
        let deployer = Address([1u8; 20]);
        let ledger = funded_ledger(deployer, 0);
        let mut vm = adapter();

        let empty = vm.deploy(&ledger, deployer, &[], &[], 0, 1_000_000);
        assert!(!empty.success);
        assert_eq!(empty.error.as_deref(), Some("empty bytecode"));

        let huge = vec![0u8; 24_577];
        let too_big = vm.deploy(&ledger, deployer, &huge, &[], 0, 100_000_000);
        assert!(!too_big.success);
        assert!(too_big.error.unwrap().contains("too large"));
    }

    #[test]
    fn call_requires_existing_contract() {
        let caller = Address([1u8; 20]);
        let ledger = funded_ledger(caller, 0);
        let mut vm = adapter();

        let out = vm.call(&ledger, caller, Address([9u8; 20]), &[], 0, 100_000);
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("contract not found"));
    }

    #[test]
    fn storage_reads_default_to_zero_and_roundtrip() {
        let mut vm = adapter();
        let contract = Address([5u8; 20]);
        let key = [1u8; 32];

        assert_eq!(vm.get_storage(&contract, &key), [0u8; 32]);
        vm.set_storage(contract, key, [7u8; 32]);
        assert_eq!(vm.get_storage(&contract, &key), [7u8; 32]);
    }

    #[test]
    fn records_roundtrip_through_persistence() {
        let deployer = Address([1u8; 20]);
        let ledger = funded_ledger(deployer, 0);
        let mut vm = adapter();

        let out = vm.deploy(&ledger, deployer, &[0xde, 0xad], &[], 0, 1_000_000);
        let address = out.address.unwrap();
        vm.set_storage(address, [1u8; 32], [2u8; 32]);

        let record = vm.record(&address).expect("record exists");

        let mut restored = adapter();
        restored.load_records(vec![record]);
        assert!(restored.contract_exists(&address));
        assert_eq!(restored.get_code(&address), Some(&[0xde, 0xad][..]));
        assert_eq!(restored.get_storage(&address, &[1u8; 32]), [2u8; 32]);
    }

    #[test]
    fn state_root_changes_after_operations() {
        let deployer = Address([1u8; 20]);
        let ledger = funded_ledger(deployer, 42);
        let mut vm = adapter();
        let root0 = vm.state_root().to_string();

        let out = vm.deploy(&ledger, deployer, &[0x01], &[], 0, 1_000_000);
        assert!(out.success);
        assert_ne!(vm.state_root(), root0);
    }
}
