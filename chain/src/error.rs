//! Error taxonomy surfaced by the chain core.
//!
//! Validation errors are local rejections and never mutate state.
//! Consensus-level block errors drop the offending block. Storage errors
//! abort the commit in progress; the producer refuses to advance
//! metadata past them. Network errors never reach this module.

use std::fmt;

use crate::crypto::CryptoError;
use crate::storage::StorageError;
use crate::types::Address;

/// Reasons a transaction is rejected before or during execution.
#[derive(Debug)]
pub enum ValidationError {
    InvalidAddress(String),
    InvalidSignature,
    NonceMismatch { expected: u64, got: u64 },
    InsufficientBalance { required: u64, available: u64 },
    InsufficientStake { required: u64, available: u64 },
    GasLimitTooLow { required: u64, limit: u64 },
    GasLimitOutOfRange(u64),
    BytecodeTooLarge(usize),
    EmptyBytecode,
    ContractNotFound(Address),
    UnknownValidator(Address),
    FeatureDisabled(&'static str),
    VmRejected(String),
    Malformed(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidAddress(s) => write!(f, "invalid address: {s}"),
            ValidationError::InvalidSignature => write!(f, "invalid signature"),
            ValidationError::NonceMismatch { expected, got } => {
                write!(f, "nonce mismatch: expected {expected}, got {got}")
            }
            ValidationError::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: required {required}, available {available}"
            ),
            ValidationError::InsufficientStake {
                required,
                available,
            } => write!(
                f,
                "insufficient stake: required {required}, available {available}"
            ),
            ValidationError::GasLimitTooLow { required, limit } => {
                write!(f, "gas limit {limit} below required {required}")
            }
            ValidationError::GasLimitOutOfRange(limit) => {
                write!(f, "gas limit {limit} out of range")
            }
            ValidationError::BytecodeTooLarge(n) => write!(f, "bytecode too large: {n} bytes"),
            ValidationError::EmptyBytecode => write!(f, "empty bytecode"),
            ValidationError::ContractNotFound(addr) => write!(f, "contract not found: {addr}"),
            ValidationError::UnknownValidator(addr) => write!(f, "unknown validator: {addr}"),
            ValidationError::FeatureDisabled(name) => {
                write!(f, "feature '{name}' is not active")
            }
            ValidationError::VmRejected(msg) => write!(f, "vm rejected transaction: {msg}"),
            ValidationError::Malformed(msg) => write!(f, "malformed transaction: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Reasons a whole block is rejected at import.
#[derive(Debug)]
pub enum BlockError {
    HeightMismatch { expected: u64, got: u64 },
    PrevHashMismatch { expected: String, got: String },
    TimestampDrift { timestamp: u64, now: u64 },
    SentinelHeader,
    InvalidProposerSignature,
    ValidatorSetMismatch,
    TooManyTransactions { count: usize, max: usize },
    BlockTooLarge { size: usize, max: usize },
    TooManyContractDeploys { count: usize, max: usize },
    InvalidTransaction { txid: String, source: ValidationError },
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::HeightMismatch { expected, got } => {
                write!(f, "block height mismatch: expected {expected}, got {got}")
            }
            BlockError::PrevHashMismatch { expected, got } => {
                write!(f, "prev hash mismatch: expected {expected}, got {got}")
            }
            BlockError::TimestampDrift { timestamp, now } => {
                write!(f, "block timestamp {timestamp} too far from now {now}")
            }
            BlockError::SentinelHeader => {
                write!(f, "non-genesis block carries genesis sentinel fields")
            }
            BlockError::InvalidProposerSignature => write!(f, "invalid proposer signature"),
            BlockError::ValidatorSetMismatch => write!(f, "validator set hash mismatch"),
            BlockError::TooManyTransactions { count, max } => {
                write!(f, "block has {count} transactions, maximum is {max}")
            }
            BlockError::BlockTooLarge { size, max } => {
                write!(f, "block size {size} bytes exceeds maximum {max}")
            }
            BlockError::TooManyContractDeploys { count, max } => {
                write!(f, "block deploys {count} contracts, maximum is {max}")
            }
            BlockError::InvalidTransaction { txid, source } => {
                write!(f, "invalid transaction {txid}: {source}")
            }
        }
    }
}

impl std::error::Error for BlockError {}

/// Mempool admission failures.
#[derive(Debug)]
pub enum MempoolError {
    Duplicate(String),
    Full,
}

impl fmt::Display for MempoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MempoolError::Duplicate(txid) => write!(f, "duplicate transaction {txid}"),
            MempoolError::Full => write!(f, "mempool full"),
        }
    }
}

impl std::error::Error for MempoolError {}

/// Top-level error for node operations.
#[derive(Debug)]
pub enum ChainError {
    Validation(ValidationError),
    Block(BlockError),
    Mempool(MempoolError),
    Storage(StorageError),
    Crypto(CryptoError),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::Validation(e) => write!(f, "{e}"),
            ChainError::Block(e) => write!(f, "{e}"),
            ChainError::Mempool(e) => write!(f, "{e}"),
            ChainError::Storage(e) => write!(f, "storage error: {e}"),
            ChainError::Crypto(e) => write!(f, "crypto error: {e}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<ValidationError> for ChainError {
    fn from(e: ValidationError) -> Self {
        ChainError::Validation(e)
    }
}

impl From<BlockError> for ChainError {
    fn from(e: BlockError) -> Self {
        ChainError::Block(e)
    }
}

impl From<MempoolError> for ChainError {
    fn from(e: MempoolError) -> Self {
        ChainError::Mempool(e)
    }
}

impl From<StorageError> for ChainError {
    fn from(e: StorageError) -> Self {
        ChainError::Storage(e)
    }
}

impl From<CryptoError> for ChainError {
    fn from(e: CryptoError) -> Self {
        ChainError::Crypto(e)
    }
}
