//! Core domain types used by the chain
//!
//! This module defines strongly-typed addresses, public keys, and
//! signatures that are shared across the chain implementation, together
//! with the transaction, block, and validator records built on top of
//! them. The goal is to avoid "naked" byte buffers and hex strings in
//! public APIs: bytes live in memory, hex appears only at the
//! (de)serialization boundary.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod block;
pub mod tx;
pub mod validator;

pub use block::Block;
pub use tx::{Transaction, TxKind, TxPayload, TxType};
pub use validator::{Delegation, UnbondingEntry, ValidatorInfo};

/// Length in bytes of an account address.
pub const ADDRESS_LEN: usize = 20;

/// Length in bytes of an uncompressed secp256k1 public key (X ‖ Y).
pub const PUBLIC_KEY_LEN: usize = 64;

/// Length in bytes of a compact ECDSA signature (r ‖ s).
pub const SIGNATURE_LEN: usize = 64;

/// The all-zero prev-hash carried by the genesis block.
pub const ZERO_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// 20-byte account address, rendered as `0x` + 40 lowercase hex.
///
/// Addresses are derived as the last 20 bytes of the Keccak-256 digest of
/// the 64-byte uncompressed public key (see
/// [`crate::crypto::address_from_public_key`]). Parsing accepts mixed-case
/// hex; rendering is always lowercase.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The zero address. Gas fees are burned by crediting this account.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Returns the raw 20 address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

/// Error returned when parsing a textual address fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressParseError(pub String);

impl fmt::Display for AddressParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for AddressParseError {}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .ok_or_else(|| AddressParseError(s.to_string()))?;
        if hex_part.len() != ADDRESS_LEN * 2 {
            return Err(AddressParseError(s.to_string()));
        }
        let bytes = hex::decode(hex_part).map_err(|_| AddressParseError(s.to_string()))?;
        let mut arr = [0u8; ADDRESS_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Uncompressed secp256k1 public key (64 bytes, no `0x04` prefix).
///
/// Rendered as 128 lowercase hex characters on the wire and in block
/// headers; kept as raw bytes in memory.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Returns the raw 64 key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Parses a public key from 128 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }

    /// Returns the key as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}…)", &self.to_hex()[..16])
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Compact ECDSA signature (r ‖ s, 64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; SIGNATURE_LEN]);

impl Signature {
    /// Returns the raw 64 signature bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Parses a signature from 128 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != SIGNATURE_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; SIGNATURE_LEN];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }

    /// Returns the signature as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", &self.to_hex()[..16])
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrips_through_hex() {
        let addr: Address = "0xacffecb00b07a53d61c38edccd7f74de83e36bf0"
            .parse()
            .expect("valid address");
        assert_eq!(
            addr.to_string(),
            "0xacffecb00b07a53d61c38edccd7f74de83e36bf0"
        );
    }

    #[test]
    fn address_accepts_mixed_case_but_renders_lowercase() {
        let addr: Address = "0xACFFECB00B07A53D61C38EDCCD7F74DE83E36BF0"
            .parse()
            .expect("valid address");
        assert_eq!(
            addr.to_string(),
            "0xacffecb00b07a53d61c38edccd7f74de83e36bf0"
        );
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(
            "acffecb00b07a53d61c38edccd7f74de83e36bf0"
                .parse::<Address>()
                .is_err()
        );
        assert!("0xacff".parse::<Address>().is_err());
        assert!(
            "0xzzffecb00b07a53d61c38edccd7f74de83e36bf0"
                .parse::<Address>()
                .is_err()
        );
    }

    #[test]
    fn address_serde_uses_string_form() {
        let addr = Address([0xab; ADDRESS_LEN]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn signature_hex_roundtrip() {
        let sig = Signature([7u8; SIGNATURE_LEN]);
        let parsed = Signature::from_hex(&sig.to_hex()).unwrap();
        assert_eq!(parsed, sig);
        assert!(Signature::from_hex("abcd").is_err());
    }
}
