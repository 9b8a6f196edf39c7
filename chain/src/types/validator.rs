//! Validator, delegation, and unbonding records.

use serde::{Deserialize, Serialize};

use super::Address;

/// On-chain validator record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub address: Address,
    /// Hex public key the validator signs blocks with. May be empty for
    /// genesis validators provisioned before their first signed block.
    pub public_key: String,
    pub stake: u64,
    #[serde(default)]
    pub delegated_stake: u64,
    /// Commission on delegation rewards, 0.0 to 1.0.
    pub commission_rate: f64,
    #[serde(default)]
    pub jailed: bool,
    #[serde(default)]
    pub jailed_until: u64,
    #[serde(default)]
    pub total_blocks_proposed: u64,
    #[serde(default)]
    pub total_blocks_missed: u64,
    #[serde(default)]
    pub created_at: u64,
}

impl ValidatorInfo {
    /// Total voting power: own stake plus delegations.
    pub fn total_stake(&self) -> u64 {
        self.stake + self.delegated_stake
    }

    /// A validator is active when it is not jailed (or its jail term has
    /// elapsed) and its total stake meets the minimum.
    pub fn is_active(&self, current_height: u64, min_stake: u64) -> bool {
        if self.jailed && current_height < self.jailed_until {
            return false;
        }
        self.total_stake() >= min_stake
    }
}

/// A delegation from one account to a validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: Address,
    pub validator: Address,
    pub amount: u64,
    #[serde(default)]
    pub created_at: u64,
}

/// A queued withdrawal of staked or delegated funds, released once
/// `completion_height` is reached.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnbondingEntry {
    pub address: Address,
    /// `None` for plain unstaking, the validator address for
    /// undelegation.
    pub validator: Option<Address>,
    pub amount: u64,
    pub completion_height: u64,
    #[serde(default)]
    pub created_at: u64,
}

impl UnbondingEntry {
    /// True once the entry may be paid out.
    pub fn is_mature(&self, current_height: u64) -> bool {
        current_height >= self.completion_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ADDRESS_LEN;

    fn validator(stake: u64, delegated: u64) -> ValidatorInfo {
        ValidatorInfo {
            address: Address([1u8; ADDRESS_LEN]),
            public_key: String::new(),
            stake,
            delegated_stake: delegated,
            commission_rate: 0.1,
            jailed: false,
            jailed_until: 0,
            total_blocks_proposed: 0,
            total_blocks_missed: 0,
            created_at: 0,
        }
    }

    #[test]
    fn total_stake_includes_delegations() {
        let v = validator(10_000, 5_000);
        assert_eq!(v.total_stake(), 15_000);
        assert!(v.is_active(0, 1_000));
        assert!(!v.is_active(0, 20_000));
    }

    #[test]
    fn jailed_validator_reactivates_after_term() {
        let mut v = validator(10_000, 0);
        v.jailed = true;
        v.jailed_until = 100;

        assert!(!v.is_active(50, 1_000));
        assert!(v.is_active(100, 1_000));
    }

    #[test]
    fn unbonding_maturity() {
        let entry = UnbondingEntry {
            address: Address([2u8; ADDRESS_LEN]),
            validator: None,
            amount: 10,
            completion_height: 5,
            created_at: 0,
        };
        assert!(!entry.is_mature(4));
        assert!(entry.is_mature(5));
    }
}
