//! Gas metering and fee calculation.
//!
//! Every transaction kind has a base cost; data bytes, storage traffic,
//! and signature verification add on top. Fees are
//! `gas_used × max(gas_price, min_gas_price)`.

use serde::{Deserialize, Serialize};

use crate::types::TxType;

/// Gas cost table and limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GasConfig {
    /// Flat cost charged to every transaction.
    pub tx_base: u64,
    pub transfer: u64,
    pub stake: u64,
    pub unstake: u64,
    pub delegate: u64,
    pub undelegate: u64,
    pub vote: u64,
    /// Base cost for contract deploys and calls.
    pub contract_base: u64,
    /// Fallback cost for kinds without a dedicated entry.
    pub other: u64,
    /// Cost per byte of transaction data.
    pub byte_cost: u64,
    /// Cost of the signature verification itself.
    pub signature_verify: u64,
    /// Cost per byte written to contract storage.
    pub storage_write: u64,
    /// Cost per byte read from contract storage.
    pub storage_read: u64,
    /// Upper bound on a single transaction's gas limit.
    pub max_gas_per_tx: u64,
    /// Upper bound on gas in one block.
    pub max_gas_per_block: u64,
    /// Floor applied to the effective gas price.
    pub min_gas_price: u64,
    /// The authoritative network gas price.
    pub default_gas_price: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            tx_base: 1_000,
            transfer: 2_000,
            stake: 5_000,
            unstake: 5_000,
            delegate: 3_000,
            undelegate: 3_000,
            vote: 1_000,
            contract_base: 10_000,
            other: 1_000,
            byte_cost: 10,
            signature_verify: 500,
            storage_write: 100,
            storage_read: 10,
            max_gas_per_tx: 1_000_000,
            max_gas_per_block: 10_000_000,
            min_gas_price: 1,
            default_gas_price: 1,
        }
    }
}

impl GasConfig {
    /// Base cost for a transaction kind.
    pub fn tx_type_cost(&self, tx_type: TxType) -> u64 {
        match tx_type {
            TxType::Transfer | TxType::BatchTransfer => self.transfer,
            TxType::Stake | TxType::CreateValidator => self.stake,
            TxType::Unstake => self.unstake,
            TxType::Delegate => self.delegate,
            TxType::Undelegate => self.undelegate,
            TxType::Vote => self.vote,
            TxType::ContractDeploy | TxType::ContractCall => self.contract_base,
            TxType::EditValidator => self.other,
        }
    }
}

/// Computes gas costs and fees against a [`GasConfig`].
#[derive(Clone, Debug, Default)]
pub struct GasCalculator {
    config: GasConfig,
}

impl GasCalculator {
    pub fn new(config: GasConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GasConfig {
        &self.config
    }

    /// Total gas for a transaction: base + kind + data + storage +
    /// signature verification.
    pub fn calculate_tx_gas(
        &self,
        tx_type: TxType,
        data_size: usize,
        storage_write: usize,
        storage_read: usize,
    ) -> u64 {
        let c = &self.config;
        c.tx_base
            + c.tx_type_cost(tx_type)
            + data_size as u64 * c.byte_cost
            + storage_write as u64 * c.storage_write
            + storage_read as u64 * c.storage_read
            + c.signature_verify
    }

    /// Fee for consumed gas. `gas_price` of `None` uses the network
    /// default; the configured minimum is always enforced.
    pub fn calculate_fee(&self, gas_used: u64, gas_price: Option<u64>) -> u64 {
        let price = gas_price
            .unwrap_or(self.config.default_gas_price)
            .max(self.config.min_gas_price);
        gas_used * price
    }

    /// A gas limit is valid when positive and within the per-tx bound.
    pub fn validate_gas_limit(&self, gas_limit: u64) -> bool {
        gas_limit > 0 && gas_limit <= self.config.max_gas_per_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_gas_covers_base_and_signature() {
        let calc = GasCalculator::default();
        let gas = calc.calculate_tx_gas(TxType::Transfer, 0, 0, 0);
        // tx_base + transfer + signature_verify
        assert_eq!(gas, 1_000 + 2_000 + 500);
    }

    #[test]
    fn data_bytes_are_metered() {
        let calc = GasCalculator::default();
        let empty = calc.calculate_tx_gas(TxType::Stake, 0, 0, 0);
        let with_data = calc.calculate_tx_gas(TxType::Stake, 16, 0, 0);
        assert_eq!(with_data - empty, 160);
    }

    #[test]
    fn storage_traffic_is_metered() {
        let calc = GasCalculator::default();
        let base = calc.calculate_tx_gas(TxType::ContractCall, 0, 0, 0);
        let heavy = calc.calculate_tx_gas(TxType::ContractCall, 0, 10, 20);
        assert_eq!(heavy - base, 10 * 100 + 20 * 10);
    }

    #[test]
    fn fee_enforces_minimum_gas_price() {
        let calc = GasCalculator::default();
        assert_eq!(calc.calculate_fee(1_000, Some(0)), 1_000);
        assert_eq!(calc.calculate_fee(1_000, Some(5)), 5_000);
        assert_eq!(calc.calculate_fee(1_000, None), 1_000);
    }

    #[test]
    fn gas_limit_bounds() {
        let calc = GasCalculator::default();
        assert!(!calc.validate_gas_limit(0));
        assert!(calc.validate_gas_limit(21_000));
        assert!(calc.validate_gas_limit(1_000_000));
        assert!(!calc.validate_gas_limit(1_000_001));
    }
}
