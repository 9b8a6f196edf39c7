//! Account state machine.
//!
//! The ledger holds accounts, the validator set, delegation records, and
//! the unbonding queue, and defines the execution rule for every
//! non-contract transaction kind. Contract kinds are executed by the VM
//! adapter; the ledger only sees their balance and nonce effects.
//!
//! The whole ledger is `Clone`: block execution runs on a clone which
//! replaces the live state only after the block commits, so a rejected
//! block leaves nothing behind.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::StakingConfig;
use crate::crypto::{canonical_json, hash_object, keccak256};
use crate::error::ValidationError;
use crate::types::{
    Address, Delegation, Transaction, TxKind, UnbondingEntry, ValidatorInfo,
};

mod hex_bytes {
    //! Serde helper: `Option<Vec<u8>>` as bare hex.
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(s) => hex::decode(&s).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}

/// One account: balance, nonce, stake, and (for contracts) code and
/// storage. Created lazily on first touch and never destroyed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    #[serde(default)]
    pub balance: u64,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub staked: u64,
    #[serde(default)]
    pub is_contract: bool,
    #[serde(default, with = "hex_bytes")]
    pub contract_bytecode: Option<Vec<u8>>,
    #[serde(default)]
    pub contract_bytecode_hash: String,
    /// Contract storage as 32-byte hex key → 32-byte hex value.
    #[serde(default)]
    pub contract_storage: BTreeMap<String, String>,
    #[serde(default = "default_vm_type")]
    pub contract_vm_type: String,
    #[serde(default)]
    pub contract_creator: Option<Address>,
    #[serde(default)]
    pub contract_created_at: u64,
}

fn default_vm_type() -> String {
    "none".to_string()
}

impl Account {
    /// A fresh zero-valued account.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balance: 0,
            nonce: 0,
            staked: 0,
            is_contract: false,
            contract_bytecode: None,
            contract_bytecode_hash: String::new(),
            contract_storage: BTreeMap::new(),
            contract_vm_type: default_vm_type(),
            contract_creator: None,
            contract_created_at: 0,
        }
    }
}

/// Account, validator, delegation, and unbonding state.
///
/// Serializes to the `{accounts, validators, delegations, unbonding}`
/// snapshot stored under `state:current`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub accounts: BTreeMap<Address, Account>,
    #[serde(default)]
    pub validators: BTreeMap<Address, ValidatorInfo>,
    #[serde(default)]
    pub delegations: Vec<Delegation>,
    #[serde(default)]
    pub unbonding: Vec<UnbondingEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the account, materializing a zero-valued one on first use.
    pub fn get_or_create_account(&mut self, address: Address) -> &mut Account {
        self.accounts
            .entry(address)
            .or_insert_with(|| Account::new(address))
    }

    pub fn get_balance(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    pub fn get_stake(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.staked).unwrap_or(0)
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.accounts.get(address).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn has_sufficient_balance(&self, address: &Address, amount: u64) -> bool {
        self.get_balance(address) >= amount
    }

    /// Moves `amount` between two accounts. Fails without mutating when
    /// the sender cannot cover it.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), ValidationError> {
        let available = self.get_balance(&from);
        if available < amount {
            return Err(ValidationError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        self.get_or_create_account(from).balance -= amount;
        self.get_or_create_account(to).balance += amount;
        Ok(())
    }

    pub fn increment_nonce(&mut self, address: Address) {
        self.get_or_create_account(address).nonce += 1;
    }

    /// Applies one non-contract transaction. Contract kinds are routed
    /// through the VM adapter by the node and rejected here.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        current_height: u64,
        staking: &StakingConfig,
    ) -> Result<(), ValidationError> {
        let sender = tx.sender();
        let fee = tx.fee();

        match tx.kind().clone() {
            TxKind::Transfer { recipient, amount } => {
                let total = amount + fee;
                let available = self.get_balance(&sender);
                if available < total {
                    return Err(ValidationError::InsufficientBalance {
                        required: total,
                        available,
                    });
                }
                self.get_or_create_account(sender).balance -= total;
                self.get_or_create_account(sender).nonce += 1;
                self.get_or_create_account(recipient).balance += amount;
            }
            TxKind::Stake { amount, public_key } => {
                let key_hex = public_key
                    .map(|pk| pk.to_hex())
                    .or_else(|| tx.payload().sender_pubkey.map(|pk| pk.to_hex()))
                    .unwrap_or_default();
                self.bond_stake(
                    sender,
                    amount,
                    fee,
                    key_hex,
                    staking.default_commission,
                    current_height,
                )?;
            }
            TxKind::CreateValidator {
                public_key,
                commission_rate,
                amount,
            } => {
                self.bond_stake(
                    sender,
                    amount,
                    fee,
                    public_key.to_hex(),
                    commission_rate,
                    current_height,
                )?;
                // Explicit registration also refreshes the commission.
                if let Some(validator) = self.validators.get_mut(&sender) {
                    validator.commission_rate = commission_rate;
                    validator.public_key = public_key.to_hex();
                }
            }
            TxKind::Unstake { amount } => {
                let account = self.get_or_create_account(sender);
                if account.staked < amount {
                    return Err(ValidationError::InsufficientStake {
                        required: amount,
                        available: account.staked,
                    });
                }
                if account.balance < fee {
                    return Err(ValidationError::InsufficientBalance {
                        required: fee,
                        available: account.balance,
                    });
                }
                account.balance -= fee;
                account.staked -= amount;
                account.balance += amount;
                account.nonce += 1;

                if let Some(validator) = self.validators.get_mut(&sender) {
                    validator.stake = validator.stake.saturating_sub(amount);
                    if validator.stake < staking.min_validator_stake {
                        self.validators.remove(&sender);
                        tracing::info!(validator = %sender, "validator dropped below minimum stake");
                    }
                }
            }
            TxKind::Delegate { validator, amount } => {
                if !self.validators.contains_key(&validator) {
                    return Err(ValidationError::UnknownValidator(validator));
                }
                let total = amount + fee;
                let available = self.get_balance(&sender);
                if available < total {
                    return Err(ValidationError::InsufficientBalance {
                        required: total,
                        available,
                    });
                }
                let account = self.get_or_create_account(sender);
                account.balance -= total;
                account.nonce += 1;
                self.delegations.push(Delegation {
                    delegator: sender,
                    validator,
                    amount,
                    created_at: current_height,
                });
                if let Some(v) = self.validators.get_mut(&validator) {
                    v.delegated_stake += amount;
                }
            }
            TxKind::Undelegate { validator, amount } => {
                let delegated: u64 = self
                    .delegations
                    .iter()
                    .filter(|d| d.delegator == sender && d.validator == validator)
                    .map(|d| d.amount)
                    .sum();
                if delegated < amount {
                    return Err(ValidationError::InsufficientStake {
                        required: amount,
                        available: delegated,
                    });
                }
                let available = self.get_balance(&sender);
                if available < fee {
                    return Err(ValidationError::InsufficientBalance {
                        required: fee,
                        available,
                    });
                }

                // Consume delegation records oldest-first.
                let mut remaining = amount;
                let mut kept = Vec::with_capacity(self.delegations.len());
                for mut d in std::mem::take(&mut self.delegations) {
                    if remaining > 0 && d.delegator == sender && d.validator == validator {
                        let take = remaining.min(d.amount);
                        d.amount -= take;
                        remaining -= take;
                        if d.amount > 0 {
                            kept.push(d);
                        }
                    } else {
                        kept.push(d);
                    }
                }
                self.delegations = kept;

                if let Some(v) = self.validators.get_mut(&validator) {
                    v.delegated_stake = v.delegated_stake.saturating_sub(amount);
                }
                let account = self.get_or_create_account(sender);
                account.balance -= fee;
                account.nonce += 1;
                self.unbonding.push(UnbondingEntry {
                    address: sender,
                    validator: Some(validator),
                    amount,
                    completion_height: current_height + staking.unbonding_period,
                    created_at: current_height,
                });
            }
            TxKind::Vote { .. } => {
                let available = self.get_balance(&sender);
                if available < fee {
                    return Err(ValidationError::InsufficientBalance {
                        required: fee,
                        available,
                    });
                }
                let account = self.get_or_create_account(sender);
                account.balance -= fee;
                account.nonce += 1;
            }
            TxKind::EditValidator { commission_rate } => {
                if !self.validators.contains_key(&sender) {
                    return Err(ValidationError::UnknownValidator(sender));
                }
                let available = self.get_balance(&sender);
                if available < fee {
                    return Err(ValidationError::InsufficientBalance {
                        required: fee,
                        available,
                    });
                }
                let account = self.get_or_create_account(sender);
                account.balance -= fee;
                account.nonce += 1;
                if let Some(v) = self.validators.get_mut(&sender) {
                    v.commission_rate = commission_rate;
                }
            }
            TxKind::BatchTransfer {
                recipients,
                amounts,
            } => {
                let sum: u128 = amounts.iter().map(|&a| a as u128).sum();
                let total = sum + fee as u128;
                let available = self.get_balance(&sender);
                if (available as u128) < total {
                    return Err(ValidationError::InsufficientBalance {
                        required: total.min(u64::MAX as u128) as u64,
                        available,
                    });
                }
                self.get_or_create_account(sender).balance -= total as u64;
                self.get_or_create_account(sender).nonce += 1;
                for (recipient, amount) in recipients.iter().zip(amounts.iter()) {
                    self.get_or_create_account(*recipient).balance += amount;
                }
            }
            TxKind::ContractDeploy { .. } | TxKind::ContractCall { .. } => {
                return Err(ValidationError::Malformed(
                    "contract transactions execute through the VM adapter".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn bond_stake(
        &mut self,
        sender: Address,
        amount: u64,
        fee: u64,
        public_key: String,
        commission_rate: f64,
        current_height: u64,
    ) -> Result<(), ValidationError> {
        let total = amount + fee;
        let available = self.get_balance(&sender);
        if available < total {
            return Err(ValidationError::InsufficientBalance {
                required: total,
                available,
            });
        }
        let account = self.get_or_create_account(sender);
        account.balance -= total;
        account.staked += amount;
        account.nonce += 1;

        match self.validators.get_mut(&sender) {
            Some(validator) => validator.stake += amount,
            None => {
                self.validators.insert(
                    sender,
                    ValidatorInfo {
                        address: sender,
                        public_key,
                        stake: amount,
                        delegated_stake: 0,
                        commission_rate,
                        jailed: false,
                        jailed_until: 0,
                        total_blocks_proposed: 0,
                        total_blocks_missed: 0,
                        created_at: current_height,
                    },
                );
            }
        }
        Ok(())
    }

    /// Pays out unbonding entries whose completion height has been
    /// reached; returns how many matured.
    pub fn process_mature_unbonding(&mut self, current_height: u64) -> usize {
        let mut completed = 0;
        let mut remaining = Vec::with_capacity(self.unbonding.len());
        for entry in std::mem::take(&mut self.unbonding) {
            if entry.is_mature(current_height) {
                self.get_or_create_account(entry.address).balance += entry.amount;
                completed += 1;
            } else {
                remaining.push(entry);
            }
        }
        self.unbonding = remaining;
        completed
    }

    /// Burns `⌊stake × fraction⌋` of a validator's self-stake. Returns
    /// the slashed amount (0 for unknown validators).
    pub fn slash_validator(&mut self, address: &Address, fraction: f64, reason: &str) -> u64 {
        let Some(validator) = self.validators.get_mut(address) else {
            return 0;
        };
        let slash_amount = (validator.stake as f64 * fraction).floor() as u64;
        validator.stake -= slash_amount;
        if let Some(account) = self.accounts.get_mut(address) {
            account.staked = account.staked.saturating_sub(slash_amount);
        }
        tracing::warn!(validator = %address, amount = slash_amount, reason, "validator slashed");
        slash_amount
    }

    /// Jails a validator until the given height.
    pub fn jail_validator(&mut self, address: &Address, until_height: u64) {
        if let Some(validator) = self.validators.get_mut(address) {
            validator.jailed = true;
            validator.jailed_until = until_height;
        }
    }

    /// Active validators in address order.
    pub fn active_validators(&self, current_height: u64, min_stake: u64) -> Vec<&ValidatorInfo> {
        self.validators
            .values()
            .filter(|v| v.is_active(current_height, min_stake))
            .collect()
    }

    /// Hash of the ordered active validator list, carried in block
    /// headers.
    pub fn validator_set_hash(&self, current_height: u64, min_stake: u64) -> String {
        let set: Vec<Value> = self
            .active_validators(current_height, min_stake)
            .iter()
            .map(|v| {
                json!({
                    "address": v.address.to_string(),
                    "public_key": v.public_key,
                    "stake": v.stake,
                    "delegated_stake": v.delegated_stake,
                })
            })
            .collect();
        hash_object(&set)
    }

    /// Sum of balances and stakes across all accounts.
    pub fn total_supply(&self) -> u64 {
        self.accounts
            .values()
            .map(|a| a.balance + a.staked)
            .sum()
    }

    /// Sum of staked funds across all accounts.
    pub fn total_staked(&self) -> u64 {
        self.accounts.values().map(|a| a.staked).sum()
    }

    /// Deterministic state root: Keccak-256 hex of the canonical JSON of
    /// accounts sorted by address, with string-encoded balances and a
    /// fixed empty `code_hash`.
    ///
    /// This exact serialization must not change without a versioned
    /// migration, or roots stop being comparable across versions.
    pub fn state_root(&self) -> String {
        let mut state = Map::new();
        for (address, account) in &self.accounts {
            state.insert(
                address.to_string(),
                json!({
                    "balance": account.balance.to_string(),
                    "nonce": account.nonce,
                    "staked": account.staked.to_string(),
                    "code_hash": "",
                }),
            );
        }
        let canonical = canonical_json(&Value::Object(state));
        hex::encode(keccak256(canonical.as_bytes()))
    }

    /// Per-sender expected nonces for a set of addresses.
    pub fn expected_nonces<'a>(
        &self,
        senders: impl Iterator<Item = &'a Address>,
    ) -> BTreeMap<Address, u64> {
        senders.map(|s| (*s, self.get_nonce(s))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::types::TxPayload;

    fn staking() -> StakingConfig {
        StakingConfig {
            min_validator_stake: 1_000,
            unbonding_period: 10,
            default_commission: 0.10,
            slashing_fraction: 0.05,
        }
    }

    fn fund(ledger: &mut Ledger, address: Address, balance: u64) {
        ledger.get_or_create_account(address).balance = balance;
    }

    fn signed(kp: &KeyPair, nonce: u64, kind: TxKind, fee: u64) -> Transaction {
        TxPayload::new(kp.address(), nonce, kind, fee, 1_700_000_000).sign(kp)
    }

    #[test]
    fn transfer_debits_sender_and_credits_recipient() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let bob = KeyPair::from_seed("bob").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, alice.address(), 1_000);

        let tx = signed(
            &alice,
            0,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: 100,
            },
            10,
        );
        ledger.apply_transaction(&tx, 1, &staking()).unwrap();

        assert_eq!(ledger.get_balance(&alice.address()), 890);
        assert_eq!(ledger.get_balance(&bob.address()), 100);
        assert_eq!(ledger.get_nonce(&alice.address()), 1);
    }

    #[test]
    fn transfer_with_insufficient_balance_leaves_state_untouched() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let bob = KeyPair::from_seed("bob").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, alice.address(), 50);

        let tx = signed(
            &alice,
            0,
            TxKind::Transfer {
                recipient: bob.address(),
                amount: 100,
            },
            10,
        );
        let err = ledger.apply_transaction(&tx, 1, &staking()).unwrap_err();
        assert!(matches!(err, ValidationError::InsufficientBalance { .. }));
        assert_eq!(ledger.get_balance(&alice.address()), 50);
        assert_eq!(ledger.get_nonce(&alice.address()), 0);
    }

    #[test]
    fn stake_creates_validator_and_unstake_drops_it() {
        let val = KeyPair::from_seed("validator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, val.address(), 5_000);

        let stake = signed(
            &val,
            0,
            TxKind::Stake {
                amount: 2_000,
                public_key: Some(val.public_key()),
            },
            10,
        );
        ledger.apply_transaction(&stake, 1, &staking()).unwrap();

        let v = ledger.validators.get(&val.address()).expect("validator exists");
        assert_eq!(v.stake, 2_000);
        assert!((v.commission_rate - 0.10).abs() < f64::EPSILON);
        assert_eq!(ledger.get_stake(&val.address()), 2_000);
        assert_eq!(ledger.get_balance(&val.address()), 2_990);

        // Unstaking below the minimum removes the validator record.
        let unstake = signed(&val, 1, TxKind::Unstake { amount: 1_500 }, 10);
        ledger.apply_transaction(&unstake, 2, &staking()).unwrap();

        assert!(!ledger.validators.contains_key(&val.address()));
        assert_eq!(ledger.get_stake(&val.address()), 500);
        assert_eq!(ledger.get_balance(&val.address()), 4_480);
    }

    #[test]
    fn unstake_more_than_staked_fails() {
        let val = KeyPair::from_seed("validator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, val.address(), 100);

        let tx = signed(&val, 0, TxKind::Unstake { amount: 50 }, 1);
        let err = ledger.apply_transaction(&tx, 1, &staking()).unwrap_err();
        assert!(matches!(err, ValidationError::InsufficientStake { .. }));
    }

    #[test]
    fn delegate_and_undelegate_through_unbonding() {
        let val = KeyPair::from_seed("validator").unwrap();
        let user = KeyPair::from_seed("delegator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, val.address(), 5_000);
        fund(&mut ledger, user.address(), 1_000);

        let stake = signed(
            &val,
            0,
            TxKind::Stake {
                amount: 2_000,
                public_key: Some(val.public_key()),
            },
            0,
        );
        ledger.apply_transaction(&stake, 1, &staking()).unwrap();

        let delegate = signed(
            &user,
            0,
            TxKind::Delegate {
                validator: val.address(),
                amount: 500,
            },
            5,
        );
        ledger.apply_transaction(&delegate, 2, &staking()).unwrap();
        assert_eq!(ledger.validators[&val.address()].delegated_stake, 500);
        assert_eq!(ledger.get_balance(&user.address()), 495);

        let undelegate = signed(
            &user,
            1,
            TxKind::Undelegate {
                validator: val.address(),
                amount: 500,
            },
            5,
        );
        ledger.apply_transaction(&undelegate, 3, &staking()).unwrap();
        assert_eq!(ledger.validators[&val.address()].delegated_stake, 0);
        assert_eq!(ledger.unbonding.len(), 1);

        // Funds return only once the unbonding period elapses.
        assert_eq!(ledger.process_mature_unbonding(5), 0);
        assert_eq!(ledger.get_balance(&user.address()), 490);
        assert_eq!(ledger.process_mature_unbonding(13), 1);
        assert_eq!(ledger.get_balance(&user.address()), 990);
        assert!(ledger.unbonding.is_empty());
    }

    #[test]
    fn delegate_to_unknown_validator_fails() {
        let user = KeyPair::from_seed("delegator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, user.address(), 1_000);

        let tx = signed(
            &user,
            0,
            TxKind::Delegate {
                validator: Address([9u8; 20]),
                amount: 100,
            },
            1,
        );
        let err = ledger.apply_transaction(&tx, 1, &staking()).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownValidator(_)));
    }

    #[test]
    fn batch_transfer_credits_all_recipients() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, alice.address(), 1_000);

        let r1 = Address([1u8; 20]);
        let r2 = Address([2u8; 20]);
        let tx = signed(
            &alice,
            0,
            TxKind::BatchTransfer {
                recipients: vec![r1, r2],
                amounts: vec![100, 200],
            },
            10,
        );
        ledger.apply_transaction(&tx, 1, &staking()).unwrap();

        assert_eq!(ledger.get_balance(&alice.address()), 690);
        assert_eq!(ledger.get_balance(&r1), 100);
        assert_eq!(ledger.get_balance(&r2), 200);
    }

    #[test]
    fn slash_validator_burns_a_fraction_of_stake() {
        let val = KeyPair::from_seed("validator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, val.address(), 5_000);
        let stake = signed(
            &val,
            0,
            TxKind::Stake {
                amount: 2_000,
                public_key: Some(val.public_key()),
            },
            0,
        );
        ledger.apply_transaction(&stake, 1, &staking()).unwrap();

        let slashed = ledger.slash_validator(&val.address(), 0.05, "double_sign");
        assert_eq!(slashed, 100);
        assert_eq!(ledger.validators[&val.address()].stake, 1_900);
        assert_eq!(ledger.get_stake(&val.address()), 1_900);

        assert_eq!(ledger.slash_validator(&Address([7u8; 20]), 0.05, "double_sign"), 0);
    }

    #[test]
    fn state_root_is_deterministic_and_tracks_changes() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, alice.address(), 1_000);

        let root1 = ledger.state_root();
        assert_eq!(root1, ledger.state_root());
        assert_eq!(root1.len(), 64);

        let clone = ledger.clone();
        assert_eq!(clone.state_root(), root1);

        ledger.get_or_create_account(alice.address()).balance = 999;
        assert_ne!(ledger.state_root(), root1);
    }

    #[test]
    fn snapshot_roundtrip_preserves_state_root() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let val = KeyPair::from_seed("validator").unwrap();
        let mut ledger = Ledger::new();
        fund(&mut ledger, alice.address(), 1_000);
        fund(&mut ledger, val.address(), 5_000);
        let stake = signed(
            &val,
            0,
            TxKind::Stake {
                amount: 2_000,
                public_key: Some(val.public_key()),
            },
            0,
        );
        ledger.apply_transaction(&stake, 1, &staking()).unwrap();

        let json = serde_json::to_string(&ledger).unwrap();
        let restored: Ledger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
        assert_eq!(restored.state_root(), ledger.state_root());
    }
}
