//! Double-sign detection and stake penalties.
//!
//! The detector records, per `(height, validator)`, the set of block
//! hashes that validator has endorsed. A second distinct hash at the
//! same height is double-sign evidence. The executor turns evidence into
//! a stake penalty of `⌊stake × slashing_fraction⌋` and keeps the event
//! history.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::types::Address;

/// Kinds of recorded misbehavior. Only double signing is enforced by the
/// core; missed-block accounting is carried on validator records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    DoubleSign,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::DoubleSign => "double_sign",
        }
    }
}

/// Evidence of validator misbehavior.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingEvidence {
    pub validator: Address,
    pub kind: EvidenceKind,
    pub height: u64,
    pub timestamp: u64,
    /// The conflicting block hashes observed at `height`.
    pub block_hashes: Vec<String>,
}

/// A slashing that was carried out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlashingEvent {
    pub validator: Address,
    pub reason: String,
    pub amount_slashed: u64,
    pub height: u64,
    pub timestamp: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Observes proposed blocks and accumulates evidence.
#[derive(Debug, Default)]
pub struct SlashingDetector {
    /// height → validator → endorsed block hashes.
    seen_votes: HashMap<u64, HashMap<Address, HashSet<String>>>,
    evidence_pool: Vec<SlashingEvidence>,
}

impl SlashingDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an endorsement and returns evidence when the validator
    /// already endorsed a different hash at this height.
    pub fn detect_double_sign(
        &mut self,
        height: u64,
        validator: Address,
        block_hash: &str,
    ) -> Option<SlashingEvidence> {
        let endorsed = self
            .seen_votes
            .entry(height)
            .or_default()
            .entry(validator)
            .or_default();

        if !endorsed.is_empty() && !endorsed.contains(block_hash) {
            tracing::warn!(validator = %validator, height, "double sign detected");
            let mut hashes: Vec<String> = endorsed.iter().cloned().collect();
            hashes.sort();
            hashes.push(block_hash.to_string());

            let evidence = SlashingEvidence {
                validator,
                kind: EvidenceKind::DoubleSign,
                height,
                timestamp: unix_now(),
                block_hashes: hashes,
            };
            self.evidence_pool.push(evidence.clone());
            return Some(evidence);
        }

        endorsed.insert(block_hash.to_string());
        None
    }

    /// All evidence collected so far.
    pub fn evidence(&self) -> &[SlashingEvidence] {
        &self.evidence_pool
    }

    /// Drops endorsement bookkeeping below a height to bound memory.
    pub fn prune_below(&mut self, height: u64) {
        self.seen_votes.retain(|&h, _| h >= height);
    }
}

/// Applies penalties for confirmed evidence.
#[derive(Debug)]
pub struct SlashingExecutor {
    slashing_fraction: f64,
    history: Vec<SlashingEvent>,
    slashed: HashSet<Address>,
}

impl SlashingExecutor {
    pub fn new(slashing_fraction: f64) -> Self {
        Self {
            slashing_fraction,
            history: Vec::new(),
            slashed: HashSet::new(),
        }
    }

    /// Computes and records the penalty for `evidence` against a stake.
    /// Returns the slashed amount.
    pub fn slash_validator(&mut self, stake: u64, evidence: &SlashingEvidence) -> u64 {
        let amount = (stake as f64 * self.slashing_fraction).floor() as u64;
        let event = SlashingEvent {
            validator: evidence.validator,
            reason: evidence.kind.as_str().to_string(),
            amount_slashed: amount,
            height: evidence.height,
            timestamp: unix_now(),
        };
        self.history.push(event);
        self.slashed.insert(evidence.validator);
        tracing::warn!(validator = %evidence.validator, amount, "validator slashed");
        amount
    }

    pub fn history(&self) -> &[SlashingEvent] {
        &self.history
    }

    pub fn was_slashed(&self, validator: &Address) -> bool {
        self.slashed.contains(validator)
    }
}

/// Detector + executor wired together, as the node consumes them.
#[derive(Debug)]
pub struct SlashingManager {
    pub detector: SlashingDetector,
    pub executor: SlashingExecutor,
}

impl SlashingManager {
    pub fn new(slashing_fraction: f64) -> Self {
        Self {
            detector: SlashingDetector::new(),
            executor: SlashingExecutor::new(slashing_fraction),
        }
    }

    /// Observes a proposed block. When the proposer double-signed, the
    /// penalty is computed against `validator_stakes` and returned as
    /// events; the caller applies them to the ledger.
    pub fn process_block(
        &mut self,
        height: u64,
        proposer: Address,
        block_hash: &str,
        validator_stakes: &BTreeMap<Address, u64>,
    ) -> Vec<SlashingEvent> {
        let mut events = Vec::new();
        if let Some(evidence) = self.detector.detect_double_sign(height, proposer, block_hash) {
            let stake = validator_stakes.get(&proposer).copied().unwrap_or(0);
            self.executor.slash_validator(stake, &evidence);
            if let Some(event) = self.executor.history().last() {
                events.push(event.clone());
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[test]
    fn same_hash_twice_is_not_double_signing() {
        let mut detector = SlashingDetector::new();
        assert!(detector.detect_double_sign(5, addr(1), "hash-a").is_none());
        assert!(detector.detect_double_sign(5, addr(1), "hash-a").is_none());
        assert!(detector.evidence().is_empty());
    }

    #[test]
    fn distinct_hash_at_same_height_yields_evidence() {
        let mut detector = SlashingDetector::new();
        assert!(detector.detect_double_sign(5, addr(1), "hash-a").is_none());
        let evidence = detector
            .detect_double_sign(5, addr(1), "hash-b")
            .expect("evidence expected");

        assert_eq!(evidence.kind, EvidenceKind::DoubleSign);
        assert_eq!(evidence.height, 5);
        assert!(evidence.block_hashes.contains(&"hash-a".to_string()));
        assert!(evidence.block_hashes.contains(&"hash-b".to_string()));
    }

    #[test]
    fn different_heights_are_independent() {
        let mut detector = SlashingDetector::new();
        assert!(detector.detect_double_sign(5, addr(1), "hash-a").is_none());
        assert!(detector.detect_double_sign(6, addr(1), "hash-b").is_none());
    }

    #[test]
    fn executor_applies_five_percent() {
        let mut manager = SlashingManager::new(0.05);
        let mut stakes = BTreeMap::new();
        stakes.insert(addr(1), 2_000u64);

        assert!(manager.process_block(5, addr(1), "hash-a", &stakes).is_empty());
        let events = manager.process_block(5, addr(1), "hash-b", &stakes);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount_slashed, 100);
        assert_eq!(events[0].reason, "double_sign");
        assert!(manager.executor.was_slashed(&addr(1)));
    }

    #[test]
    fn pruning_drops_old_heights() {
        let mut detector = SlashingDetector::new();
        detector.detect_double_sign(5, addr(1), "hash-a");
        detector.prune_below(10);
        // After pruning, the old endorsement is forgotten.
        assert!(detector.detect_double_sign(5, addr(1), "hash-b").is_none());
    }
}
