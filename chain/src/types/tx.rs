//! Transaction types.
//!
//! Transactions are a two-stage construct:
//!
//! - [`TxPayload`] is the unsigned value: sender identity, nonce, and a
//!   typed [`TxKind`] describing the intent.
//! - [`Transaction`] wraps a payload with the sender's public key and a
//!   compact ECDSA signature. Only signed transactions are ever admitted
//!   to the mempool or included in a block.
//!
//! On the wire and in storage a transaction is a flat JSON object (the
//! original column layout, with hex for byte fields). In memory the
//! kind-specific fields live on the [`TxKind`] enum; the conversion
//! happens only at the serde boundary. Unknown transaction kinds are
//! rejected at deserialization.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::crypto::{
    KeyPair, address_from_public_key, canonical_json, hash_object, verify_signature,
};

use super::{Address, PublicKey, Signature};

/// Maximum size of the free-form `extra_data` field, in bytes.
pub const MAX_EXTRA_DATA: usize = 1024;

/// Default gas limit attached to transactions that do not set one.
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Default gas price attached to transactions that do not set one.
pub const DEFAULT_GAS_PRICE: u64 = 1;

/// Current transaction format version.
pub const TX_VERSION: u32 = 1;

/// The set of transaction kinds understood by the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxType {
    Transfer,
    Stake,
    Unstake,
    Delegate,
    Undelegate,
    Vote,
    CreateValidator,
    EditValidator,
    ContractDeploy,
    ContractCall,
    BatchTransfer,
}

impl TxType {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Transfer => "transfer",
            TxType::Stake => "stake",
            TxType::Unstake => "unstake",
            TxType::Delegate => "delegate",
            TxType::Undelegate => "undelegate",
            TxType::Vote => "vote",
            TxType::CreateValidator => "create_validator",
            TxType::EditValidator => "edit_validator",
            TxType::ContractDeploy => "contract_deploy",
            TxType::ContractCall => "contract_call",
            TxType::BatchTransfer => "batch_transfer",
        }
    }

    /// Parses a wire name; `None` for unknown kinds.
    pub fn parse(s: &str) -> Option<TxType> {
        Some(match s {
            "transfer" => TxType::Transfer,
            "stake" => TxType::Stake,
            "unstake" => TxType::Unstake,
            "delegate" => TxType::Delegate,
            "undelegate" => TxType::Undelegate,
            "vote" => TxType::Vote,
            "create_validator" => TxType::CreateValidator,
            "edit_validator" => TxType::EditValidator,
            "contract_deploy" => TxType::ContractDeploy,
            "contract_call" => TxType::ContractCall,
            "batch_transfer" => TxType::BatchTransfer,
            _ => return None,
        })
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed intent of a transaction. Each arm carries exactly the fields
/// its execution rule needs.
#[derive(Clone, Debug, PartialEq)]
pub enum TxKind {
    /// Moves `amount` base units from the sender to `recipient`.
    Transfer { recipient: Address, amount: u64 },
    /// Locks `amount` base units as validator stake. `public_key` is
    /// required on first stake unless the signed payload already carries
    /// the sender's key.
    Stake {
        amount: u64,
        public_key: Option<PublicKey>,
    },
    /// Releases `amount` base units of stake back to the balance.
    Unstake { amount: u64 },
    /// Delegates `amount` base units to `validator`.
    Delegate { validator: Address, amount: u64 },
    /// Queues withdrawal of a delegation; matures after the unbonding
    /// period.
    Undelegate { validator: Address, amount: u64 },
    /// Finality vote for a block hash at a height. Recorded for fee and
    /// nonce accounting only; vote aggregation is not wired into commit.
    Vote { height: u64, block_hash: String },
    /// Registers a validator with an explicit commission rate.
    CreateValidator {
        public_key: PublicKey,
        commission_rate: f64,
        amount: u64,
    },
    /// Updates the sender's validator commission rate.
    EditValidator { commission_rate: f64 },
    /// Deploys contract bytecode; `value` is forwarded to the constructor.
    ContractDeploy {
        bytecode: Vec<u8>,
        input: Vec<u8>,
        value: u64,
    },
    /// Calls a deployed contract.
    ContractCall {
        contract: Address,
        input: Vec<u8>,
        value: u64,
    },
    /// Transfers to several recipients in one transaction. The two
    /// vectors are parallel and must have equal length.
    BatchTransfer {
        recipients: Vec<Address>,
        amounts: Vec<u64>,
    },
}

impl TxKind {
    /// Returns the wire-level kind tag.
    pub fn tx_type(&self) -> TxType {
        match self {
            TxKind::Transfer { .. } => TxType::Transfer,
            TxKind::Stake { .. } => TxType::Stake,
            TxKind::Unstake { .. } => TxType::Unstake,
            TxKind::Delegate { .. } => TxType::Delegate,
            TxKind::Undelegate { .. } => TxType::Undelegate,
            TxKind::Vote { .. } => TxType::Vote,
            TxKind::CreateValidator { .. } => TxType::CreateValidator,
            TxKind::EditValidator { .. } => TxType::EditValidator,
            TxKind::ContractDeploy { .. } => TxType::ContractDeploy,
            TxKind::ContractCall { .. } => TxType::ContractCall,
            TxKind::BatchTransfer { .. } => TxType::BatchTransfer,
        }
    }
}

/// Errors raised while parsing or validating a transaction.
#[derive(Debug)]
pub enum TxError {
    InvalidAddress(String),
    UnknownTxType(String),
    InvalidSignature(String),
    InvalidHex(&'static str),
    MissingField(&'static str),
    BatchLengthMismatch { recipients: usize, amounts: usize },
    ExtraDataTooLarge(usize),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::InvalidAddress(s) => write!(f, "invalid address: {s}"),
            TxError::UnknownTxType(s) => write!(f, "unknown tx_type: {s}"),
            TxError::InvalidSignature(s) => write!(f, "invalid signature encoding: {s}"),
            TxError::InvalidHex(field) => write!(f, "invalid hex in field {field}"),
            TxError::MissingField(field) => write!(f, "missing field {field}"),
            TxError::BatchLengthMismatch {
                recipients,
                amounts,
            } => write!(
                f,
                "batch_recipients ({recipients}) and batch_amounts ({amounts}) differ in length"
            ),
            TxError::ExtraDataTooLarge(n) => {
                write!(f, "extra_data is {n} bytes, maximum is {MAX_EXTRA_DATA}")
            }
        }
    }
}

impl std::error::Error for TxError {}

/// Unsigned transaction payload.
#[derive(Clone, Debug, PartialEq)]
pub struct TxPayload {
    pub sender: Address,
    pub sender_pubkey: Option<PublicKey>,
    pub nonce: u64,
    pub kind: TxKind,
    pub fee: u64,
    pub gas_limit: u64,
    pub gas_price: u64,
    pub timestamp: u64,
    pub version: u32,
    pub extra_data: Vec<u8>,
}

impl TxPayload {
    /// Creates a payload with default gas parameters and version.
    pub fn new(sender: Address, nonce: u64, kind: TxKind, fee: u64, timestamp: u64) -> Self {
        Self {
            sender,
            sender_pubkey: None,
            nonce,
            kind,
            fee,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
            timestamp,
            version: TX_VERSION,
            extra_data: Vec::new(),
        }
    }

    /// Flat `amount` column: only plain transfers move value through it.
    pub fn amount(&self) -> u64 {
        match &self.kind {
            TxKind::Transfer { amount, .. } => *amount,
            _ => 0,
        }
    }

    /// Flat `recipient` column.
    pub fn recipient(&self) -> Option<Address> {
        match &self.kind {
            TxKind::Transfer { recipient, .. } => Some(*recipient),
            _ => None,
        }
    }

    /// Kind-specific parameters as the signed `data` map.
    ///
    /// Every semantic field of the kind appears here, so the signature
    /// binds all of them (byte fields as bare hex).
    pub fn data_map(&self) -> Map<String, Value> {
        let mut data = Map::new();
        match &self.kind {
            TxKind::Transfer { .. } => {}
            TxKind::Stake { amount, public_key } => {
                data.insert("stake_amount".into(), json!(amount));
                if let Some(pk) = public_key {
                    data.insert("public_key".into(), json!(pk.to_hex()));
                }
            }
            TxKind::Unstake { amount } => {
                data.insert("unstake_amount".into(), json!(amount));
            }
            TxKind::Delegate { validator, amount } => {
                data.insert("validator".into(), json!(validator.to_string()));
                data.insert("delegate_amount".into(), json!(amount));
            }
            TxKind::Undelegate { validator, amount } => {
                data.insert("validator".into(), json!(validator.to_string()));
                data.insert("undelegate_amount".into(), json!(amount));
            }
            TxKind::Vote { height, block_hash } => {
                data.insert("vote_height".into(), json!(height));
                data.insert("block_hash".into(), json!(block_hash));
            }
            TxKind::CreateValidator {
                public_key,
                commission_rate,
                amount,
            } => {
                data.insert("public_key".into(), json!(public_key.to_hex()));
                data.insert("commission_rate".into(), json!(commission_rate));
                data.insert("stake_amount".into(), json!(amount));
            }
            TxKind::EditValidator { commission_rate } => {
                data.insert("commission_rate".into(), json!(commission_rate));
            }
            TxKind::ContractDeploy {
                bytecode,
                input,
                value,
            } => {
                data.insert("bytecode".into(), json!(hex::encode(bytecode)));
                data.insert("constructor_input".into(), json!(hex::encode(input)));
                data.insert("contract_value".into(), json!(value));
            }
            TxKind::ContractCall {
                contract,
                input,
                value,
            } => {
                data.insert("contract_address".into(), json!(contract.to_string()));
                data.insert("input".into(), json!(hex::encode(input)));
                data.insert("contract_value".into(), json!(value));
            }
            TxKind::BatchTransfer {
                recipients,
                amounts,
            } => {
                let rs: Vec<String> = recipients.iter().map(|r| r.to_string()).collect();
                data.insert("batch_recipients".into(), json!(rs));
                data.insert("batch_amounts".into(), json!(amounts));
            }
        }
        data
    }

    /// The signable payload: a fixed ten-key object, identical on sign
    /// and verify. Excludes the signature itself.
    pub fn signing_value(&self) -> Value {
        let mut m = Map::new();
        m.insert("sender".into(), json!(self.sender.to_string()));
        m.insert(
            "sender_pubkey".into(),
            match &self.sender_pubkey {
                Some(pk) => json!(pk.to_hex()),
                None => Value::Null,
            },
        );
        m.insert("nonce".into(), json!(self.nonce));
        m.insert("tx_type".into(), json!(self.kind.tx_type().as_str()));
        m.insert("amount".into(), json!(self.amount()));
        m.insert(
            "recipient".into(),
            match self.recipient() {
                Some(r) => json!(r.to_string()),
                None => Value::Null,
            },
        );
        m.insert("fee".into(), json!(self.fee));
        m.insert("gas_limit".into(), json!(self.gas_limit));
        m.insert("data".into(), Value::Object(self.data_map()));
        m.insert("timestamp".into(), json!(self.timestamp));
        Value::Object(m)
    }

    /// Transaction id: hex hash of the canonical signing payload.
    pub fn txid(&self) -> String {
        hash_object(&self.signing_value())
    }

    /// Serialized size of the `data` map, used for gas metering.
    pub fn data_size(&self) -> usize {
        canonical_json(&Value::Object(self.data_map())).len()
    }

    /// Signs this payload, producing an immutable [`Transaction`].
    ///
    /// The keypair's public key is stamped into the payload before
    /// signing, so the signature covers it.
    pub fn sign(mut self, keypair: &KeyPair) -> Transaction {
        self.sender_pubkey = Some(keypair.public_key());
        let message = canonical_json(&self.signing_value());
        let signature = keypair.sign(message.as_bytes());
        Transaction {
            payload: self,
            signature,
        }
    }
}

/// A signed transaction. Immutable once constructed; the only way to
/// obtain one is [`TxPayload::sign`] or deserialization from the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    payload: TxPayload,
    signature: Signature,
}

impl Transaction {
    /// The signed payload.
    pub fn payload(&self) -> &TxPayload {
        &self.payload
    }

    /// The compact ECDSA signature over the canonical payload.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn sender(&self) -> Address {
        self.payload.sender
    }

    pub fn nonce(&self) -> u64 {
        self.payload.nonce
    }

    pub fn kind(&self) -> &TxKind {
        &self.payload.kind
    }

    pub fn tx_type(&self) -> TxType {
        self.payload.kind.tx_type()
    }

    pub fn amount(&self) -> u64 {
        self.payload.amount()
    }

    pub fn recipient(&self) -> Option<Address> {
        self.payload.recipient()
    }

    pub fn fee(&self) -> u64 {
        self.payload.fee
    }

    pub fn gas_limit(&self) -> u64 {
        self.payload.gas_limit
    }

    pub fn gas_price(&self) -> u64 {
        self.payload.gas_price
    }

    pub fn timestamp(&self) -> u64 {
        self.payload.timestamp
    }

    pub fn txid(&self) -> String {
        self.payload.txid()
    }

    pub fn data_size(&self) -> usize {
        self.payload.data_size()
    }

    /// Verifies the signature against the embedded public key and checks
    /// that the key actually derives the sender address.
    pub fn verify_signature(&self) -> bool {
        let Some(pubkey) = &self.payload.sender_pubkey else {
            return false;
        };
        if address_from_public_key(pubkey) != self.payload.sender {
            return false;
        }
        let message = canonical_json(&self.payload.signing_value());
        verify_signature(pubkey, message.as_bytes(), &self.signature)
    }
}

/// Flat wire/storage form of a transaction.
#[derive(Serialize, Deserialize)]
struct RawTransaction {
    sender: String,
    sender_pubkey: Option<String>,
    nonce: u64,
    tx_type: String,
    amount: u64,
    recipient: Option<String>,
    fee: u64,
    gas_limit: u64,
    #[serde(default = "default_gas_price")]
    gas_price: u64,
    #[serde(default)]
    data: Map<String, Value>,
    signature: String,
    timestamp: u64,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    contract_bytecode: Option<String>,
    #[serde(default)]
    contract_input: Option<String>,
    #[serde(default)]
    contract_value: u64,
    #[serde(default)]
    batch_recipients: Vec<String>,
    #[serde(default)]
    batch_amounts: Vec<u64>,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    extra_data: String,
}

fn default_gas_price() -> u64 {
    DEFAULT_GAS_PRICE
}

fn default_version() -> u32 {
    TX_VERSION
}

impl From<&Transaction> for RawTransaction {
    fn from(tx: &Transaction) -> Self {
        let p = &tx.payload;
        let (contract_address, contract_bytecode, contract_input, contract_value) = match &p.kind {
            TxKind::ContractDeploy {
                bytecode,
                input,
                value,
            } => (
                None,
                Some(hex::encode(bytecode)),
                Some(hex::encode(input)),
                *value,
            ),
            TxKind::ContractCall {
                contract,
                input,
                value,
            } => (
                Some(contract.to_string()),
                None,
                Some(hex::encode(input)),
                *value,
            ),
            _ => (None, None, None, 0),
        };
        let (batch_recipients, batch_amounts) = match &p.kind {
            TxKind::BatchTransfer {
                recipients,
                amounts,
            } => (
                recipients.iter().map(|r| r.to_string()).collect(),
                amounts.clone(),
            ),
            _ => (Vec::new(), Vec::new()),
        };

        RawTransaction {
            sender: p.sender.to_string(),
            sender_pubkey: p.sender_pubkey.as_ref().map(|pk| pk.to_hex()),
            nonce: p.nonce,
            tx_type: p.kind.tx_type().as_str().to_string(),
            amount: p.amount(),
            recipient: p.recipient().map(|r| r.to_string()),
            fee: p.fee,
            gas_limit: p.gas_limit,
            gas_price: p.gas_price,
            data: p.data_map(),
            signature: tx.signature.to_hex(),
            timestamp: p.timestamp,
            contract_address,
            contract_bytecode,
            contract_input,
            contract_value,
            batch_recipients,
            batch_amounts,
            version: p.version,
            extra_data: hex::encode(&p.extra_data),
        }
    }
}

fn data_u64(data: &Map<String, Value>, key: &'static str) -> Result<u64, TxError> {
    data.get(key)
        .and_then(Value::as_u64)
        .ok_or(TxError::MissingField(key))
}

fn data_f64(data: &Map<String, Value>, key: &'static str) -> Result<f64, TxError> {
    data.get(key)
        .and_then(Value::as_f64)
        .ok_or(TxError::MissingField(key))
}

fn data_address(data: &Map<String, Value>, key: &'static str) -> Result<Address, TxError> {
    let s = data
        .get(key)
        .and_then(Value::as_str)
        .ok_or(TxError::MissingField(key))?;
    s.parse().map_err(|_| TxError::InvalidAddress(s.to_string()))
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = TxError;

    fn try_from(raw: RawTransaction) -> Result<Self, Self::Error> {
        let tx_type =
            TxType::parse(&raw.tx_type).ok_or_else(|| TxError::UnknownTxType(raw.tx_type.clone()))?;
        let sender: Address = raw
            .sender
            .parse()
            .map_err(|_| TxError::InvalidAddress(raw.sender.clone()))?;
        let sender_pubkey = match &raw.sender_pubkey {
            Some(s) => Some(PublicKey::from_hex(s).map_err(|_| TxError::InvalidHex("sender_pubkey"))?),
            None => None,
        };
        let signature =
            Signature::from_hex(&raw.signature).map_err(|_| TxError::InvalidSignature(raw.signature.clone()))?;
        let extra_data = hex::decode(&raw.extra_data).map_err(|_| TxError::InvalidHex("extra_data"))?;
        if extra_data.len() > MAX_EXTRA_DATA {
            return Err(TxError::ExtraDataTooLarge(extra_data.len()));
        }

        let kind = match tx_type {
            TxType::Transfer => {
                let recipient_str = raw.recipient.as_deref().ok_or(TxError::MissingField("recipient"))?;
                let recipient: Address = recipient_str
                    .parse()
                    .map_err(|_| TxError::InvalidAddress(recipient_str.to_string()))?;
                TxKind::Transfer {
                    recipient,
                    amount: raw.amount,
                }
            }
            TxType::Stake => {
                let amount = data_u64(&raw.data, "stake_amount")?;
                let public_key = match raw.data.get("public_key").and_then(Value::as_str) {
                    Some(s) => {
                        Some(PublicKey::from_hex(s).map_err(|_| TxError::InvalidHex("public_key"))?)
                    }
                    None => None,
                };
                TxKind::Stake { amount, public_key }
            }
            TxType::Unstake => TxKind::Unstake {
                amount: data_u64(&raw.data, "unstake_amount")?,
            },
            TxType::Delegate => TxKind::Delegate {
                validator: data_address(&raw.data, "validator")?,
                amount: data_u64(&raw.data, "delegate_amount")?,
            },
            TxType::Undelegate => TxKind::Undelegate {
                validator: data_address(&raw.data, "validator")?,
                amount: data_u64(&raw.data, "undelegate_amount")?,
            },
            TxType::Vote => TxKind::Vote {
                height: data_u64(&raw.data, "vote_height")?,
                block_hash: raw
                    .data
                    .get("block_hash")
                    .and_then(Value::as_str)
                    .ok_or(TxError::MissingField("block_hash"))?
                    .to_string(),
            },
            TxType::CreateValidator => {
                let pk_hex = raw
                    .data
                    .get("public_key")
                    .and_then(Value::as_str)
                    .ok_or(TxError::MissingField("public_key"))?;
                TxKind::CreateValidator {
                    public_key: PublicKey::from_hex(pk_hex)
                        .map_err(|_| TxError::InvalidHex("public_key"))?,
                    commission_rate: data_f64(&raw.data, "commission_rate")?,
                    amount: data_u64(&raw.data, "stake_amount")?,
                }
            }
            TxType::EditValidator => TxKind::EditValidator {
                commission_rate: data_f64(&raw.data, "commission_rate")?,
            },
            TxType::ContractDeploy => {
                let bytecode_hex = raw
                    .contract_bytecode
                    .as_deref()
                    .ok_or(TxError::MissingField("contract_bytecode"))?;
                let bytecode =
                    hex::decode(bytecode_hex).map_err(|_| TxError::InvalidHex("contract_bytecode"))?;
                let input = match raw.contract_input.as_deref() {
                    Some(s) => hex::decode(s).map_err(|_| TxError::InvalidHex("contract_input"))?,
                    None => Vec::new(),
                };
                TxKind::ContractDeploy {
                    bytecode,
                    input,
                    value: raw.contract_value,
                }
            }
            TxType::ContractCall => {
                let contract_str = raw
                    .contract_address
                    .as_deref()
                    .ok_or(TxError::MissingField("contract_address"))?;
                let contract: Address = contract_str
                    .parse()
                    .map_err(|_| TxError::InvalidAddress(contract_str.to_string()))?;
                let input = match raw.contract_input.as_deref() {
                    Some(s) => hex::decode(s).map_err(|_| TxError::InvalidHex("contract_input"))?,
                    None => Vec::new(),
                };
                TxKind::ContractCall {
                    contract,
                    input,
                    value: raw.contract_value,
                }
            }
            TxType::BatchTransfer => {
                if raw.batch_recipients.len() != raw.batch_amounts.len() {
                    return Err(TxError::BatchLengthMismatch {
                        recipients: raw.batch_recipients.len(),
                        amounts: raw.batch_amounts.len(),
                    });
                }
                let mut recipients = Vec::with_capacity(raw.batch_recipients.len());
                for r in &raw.batch_recipients {
                    recipients.push(r.parse().map_err(|_| TxError::InvalidAddress(r.clone()))?);
                }
                TxKind::BatchTransfer {
                    recipients,
                    amounts: raw.batch_amounts,
                }
            }
        };

        Ok(Transaction {
            payload: TxPayload {
                sender,
                sender_pubkey,
                nonce: raw.nonce,
                kind,
                fee: raw.fee,
                gas_limit: raw.gas_limit,
                gas_price: raw.gas_price,
                timestamp: raw.timestamp,
                version: raw.version,
                extra_data,
            },
            signature,
        })
    }
}

impl Serialize for Transaction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawTransaction::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Transaction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawTransaction::deserialize(deserializer)?;
        Transaction::try_from(raw).map_err(D::Error::custom)
    }
}
