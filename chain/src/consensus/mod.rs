//! Consensus building blocks: proposer selection and misbehavior
//! detection.

pub mod pos;
pub mod slashing;

pub use pos::ProofOfStake;
pub use slashing::{SlashingEvent, SlashingEvidence, SlashingManager};
