//! Stake-weighted proposer selection.
//!
//! The selector keeps a "rotation": a multiset of validator addresses
//! where each active validator appears `max(1, ⌊stake / min_stake⌋)`
//! times, with `min_stake` the smallest active stake. Selection hashes
//! `"{height}{seed}"` and indexes the rotation with the digest modulo
//! its length, so every node picks the same proposer for a height.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::types::Address;

/// Deterministic stake-weighted proposer selector.
#[derive(Clone, Debug)]
pub struct ProofOfStake {
    min_stake: u64,
    /// validator address → total stake. BTreeMap so rotation order is
    /// identical on every node.
    validators: BTreeMap<Address, u64>,
    rotation: Vec<Address>,
}

impl ProofOfStake {
    pub fn new(min_stake: u64) -> Self {
        Self {
            min_stake,
            validators: BTreeMap::new(),
            rotation: Vec::new(),
        }
    }

    /// Adds or updates a validator. Stakes below the minimum remove the
    /// validator instead. Returns whether the validator is now in the
    /// set.
    pub fn set_validator(&mut self, address: Address, stake: u64) -> bool {
        if stake >= self.min_stake {
            self.validators.insert(address, stake);
            self.rebuild_rotation();
            tracing::debug!(validator = %address, stake, "validator added to rotation");
            true
        } else {
            self.remove_validator(&address);
            false
        }
    }

    /// Removes a validator from the set. Returns whether it was present.
    pub fn remove_validator(&mut self, address: &Address) -> bool {
        let removed = self.validators.remove(address).is_some();
        if removed {
            self.rebuild_rotation();
            tracing::debug!(validator = %address, "validator removed from rotation");
        }
        removed
    }

    /// Replaces the whole set (used after loading state or committing a
    /// block that changed stakes).
    pub fn replace_validators(&mut self, stakes: impl IntoIterator<Item = (Address, u64)>) {
        self.validators = stakes
            .into_iter()
            .filter(|(_, stake)| *stake >= self.min_stake)
            .collect();
        self.rebuild_rotation();
    }

    fn rebuild_rotation(&mut self) {
        self.rotation.clear();
        if self.validators.is_empty() {
            return;
        }
        let min_unit = self
            .validators
            .values()
            .copied()
            .min()
            .filter(|&m| m > 0)
            .unwrap_or(self.min_stake);

        for (address, stake) in &self.validators {
            let weight = (stake / min_unit).max(1) as usize;
            self.rotation.extend(std::iter::repeat(*address).take(weight));
        }
        tracing::debug!(weight = self.rotation.len(), "rotation rebuilt");
    }

    /// Deterministically selects the proposer for a height.
    ///
    /// Falls back to the first validator when the rotation is somehow
    /// empty, and to `None` when there are no validators at all (the
    /// producer then degrades to its bootstrap path).
    pub fn select_proposer(&self, height: u64, seed: &str) -> Option<Address> {
        if self.rotation.is_empty() {
            return self.validators.keys().next().copied();
        }

        let mut hasher = Sha256::new();
        hasher.update(format!("{height}{seed}").as_bytes());
        let digest = hasher.finalize();

        // Digest as a big integer modulo the rotation length.
        let modulus = self.rotation.len() as u128;
        let index = digest
            .iter()
            .fold(0u128, |acc, &byte| (acc * 256 + byte as u128) % modulus);

        Some(self.rotation[index as usize])
    }

    /// Current number of validators in the set.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Stake of a specific validator, if present.
    pub fn stake_of(&self, address: &Address) -> Option<u64> {
        self.validators.get(address).copied()
    }

    /// Stakes of all validators, for slashing lookups.
    pub fn stakes(&self) -> &BTreeMap<Address, u64> {
        &self.validators
    }
}
