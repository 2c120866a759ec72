//! # Ciphertext Handles
//!
//! Encrypted values never appear in ledger state as bytes. The ledger holds
//! a [`CiphertextHandle`]: an opaque capability naming a value stored by the
//! confidential compute service, which also keeps the access list deciding
//! who may decrypt it. [`Plaintext`] is what an authorized principal gets
//! back.
//!
//! A ciphertext's [`PlaintextKind`] is public, as the type of an encrypted
//! integer or address is in any typed FHE scheme. Only its value is hidden.

use serde::{Deserialize, Serialize};

use crate::digest::{to_hex, ContentDigest};
use crate::identity::Address;

/// Opaque reference to a ciphertext held by the compute service.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(pub ContentDigest);

impl std::fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CiphertextHandle({}...)", to_hex(&self.0.as_bytes()[..4]))
    }
}

impl std::fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ct:{}", to_hex(&self.0.as_bytes()[..8]))
    }
}

/// Proof that a ciphertext was produced for a given submission context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputProof(pub ContentDigest);

/// A ciphertext handle together with its input proof, as submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedInput {
    /// The ciphertext capability.
    pub handle: CiphertextHandle,
    /// The proof binding it to the submitter's context.
    pub proof: InputProof,
}

/// Public type tag of a ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaintextKind {
    /// Unsigned integer.
    Uint,
    /// Address.
    Address,
    /// 4-byte selector.
    Selector,
}

impl std::fmt::Display for PlaintextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Uint => "uint",
            Self::Address => "address",
            Self::Selector => "selector",
        })
    }
}

/// A decrypted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Plaintext {
    /// Unsigned integer (amounts, numeric call arguments).
    Uint(u64),
    /// Account or contract address.
    Address(Address),
    /// 4-byte function selector.
    Selector([u8; 4]),
}

impl Plaintext {
    /// The integer value, if this is a `Uint`.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// The address, if this is an `Address`.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// The selector, if this is a `Selector`.
    pub fn as_selector(&self) -> Option<[u8; 4]> {
        match self {
            Self::Selector(s) => Some(*s),
            _ => None,
        }
    }

    /// The value's kind.
    pub fn kind(&self) -> PlaintextKind {
        match self {
            Self::Uint(_) => PlaintextKind::Uint,
            Self::Address(_) => PlaintextKind::Address,
            Self::Selector(_) => PlaintextKind::Selector,
        }
    }
}
