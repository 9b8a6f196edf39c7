//! Cryptographic primitives: secp256k1 keypairs, Keccak-256 hashing, and
//! canonical-JSON object hashing.
//!
//! Signatures are compact 64-byte ECDSA over the Keccak-256 prehash of
//! the message, so they stay interoperable with Ethereum-style tooling.
//! Every structure that is hashed or signed goes through
//! [`canonical_json`]: keys sorted ascending, no whitespace, `","`/`":"`
//! separators. The same rule on sign and verify or signatures will not
//! round-trip.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::Sha256;
use sha3::{Digest, Keccak256};

use crate::types::{ADDRESS_LEN, Address, PUBLIC_KEY_LEN, PublicKey, SIGNATURE_LEN, Signature};

/// Errors raised by key handling and signing.
#[derive(Debug)]
pub enum CryptoError {
    /// Private key bytes were rejected by the curve implementation.
    InvalidPrivateKey,
    /// Public key bytes do not describe a valid curve point.
    InvalidPublicKey,
    /// Signing failed (should not happen with a valid key).
    SigningFailed,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::InvalidPrivateKey => write!(f, "invalid private key"),
            CryptoError::InvalidPublicKey => write!(f, "invalid public key"),
            CryptoError::SigningFailed => write!(f, "signing failed"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Returns the hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Serializes `value` as canonical JSON.
///
/// The value is first converted to a [`serde_json::Value`]; since
/// `serde_json` maps are ordered by key, the resulting compact string has
/// sorted keys and fixed separators regardless of struct field order.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    let v = serde_json::to_value(value)
        .expect("values fed to canonical_json must be JSON-serializable");
    serde_json::to_string(&v).expect("serde_json::Value is always serializable")
}

/// Deterministic hash of any JSON-serializable value: hex SHA-256 of its
/// canonical JSON. Used for transaction ids, block hashes, and merkle
/// parents.
pub fn hash_object<T: Serialize>(value: &T) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Derives an [`Address`] from a 64-byte uncompressed public key: the
/// last 20 bytes of `keccak256(X ‖ Y)`.
pub fn address_from_public_key(public_key: &PublicKey) -> Address {
    let digest = keccak256(public_key.as_bytes());
    let mut addr = [0u8; ADDRESS_LEN];
    addr.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
    Address(addr)
}

/// ECDSA (secp256k1) keypair used to sign transactions and blocks.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Derives a deterministic keypair from a UTF-8 seed string.
    ///
    /// The private scalar is the SHA-256 digest of the seed. Intended for
    /// tests and local devnets, not production key management.
    pub fn from_seed(seed: &str) -> Result<Self, CryptoError> {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        let digest = hasher.finalize();
        let signing_key =
            SigningKey::from_slice(digest.as_slice()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Restores a keypair from a 64-hex-character private key.
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(private_key_hex).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Returns the 64-byte uncompressed public key (X ‖ Y, no prefix).
    pub fn public_key(&self) -> PublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        // Encoded point is 0x04 ‖ X ‖ Y.
        let mut arr = [0u8; PUBLIC_KEY_LEN];
        arr.copy_from_slice(&bytes[1..1 + PUBLIC_KEY_LEN]);
        PublicKey(arr)
    }

    /// Returns the address derived from this keypair's public key.
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Returns the private key as lowercase hex.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Signs a message, returning a compact 64-byte signature.
    ///
    /// The message is prehashed with Keccak-256 before signing.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let prehash = keccak256(message);
        let sig: EcdsaSignature = self
            .signing_key
            .sign_prehash(&prehash)
            .expect("signing with a valid key cannot fail");
        let mut compact = [0u8; SIGNATURE_LEN];
        compact.copy_from_slice(sig.to_bytes().as_slice());
        Signature(compact)
    }

    /// Signs the canonical JSON of `value`, returning the signature as hex.
    pub fn sign_object<T: Serialize>(&self, value: &T) -> String {
        self.sign(canonical_json(value).as_bytes()).to_hex()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the private key.
        write!(f, "KeyPair({})", self.address())
    }
}

/// Verifies a compact ECDSA signature over the Keccak-256 prehash of
/// `message`. Returns `false` on any malformed input.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let mut sec1 = [0u8; 1 + PUBLIC_KEY_LEN];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(public_key.as_bytes());

    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&sec1) else {
        return false;
    };
    let Ok(sig) = EcdsaSignature::from_slice(signature.as_bytes()) else {
        return false;
    };

    let prehash = keccak256(message);
    verifying_key.verify_prehash(&prehash, &sig).is_ok()
}

/// Verifies a hex signature over the canonical JSON of `value`.
pub fn verify_object_signature<T: Serialize>(
    public_key: &PublicKey,
    value: &T,
    signature_hex: &str,
) -> bool {
    let Ok(sig) = Signature::from_hex(signature_hex) else {
        return false;
    };
    verify_signature(public_key, canonical_json(value).as_bytes(), &sig)
}
