//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier the ledger hands out or accepts.
//! Batch ids for swap batches and UEI batches live in separate namespaces,
//! as do intent ids and task ids, so a settlement for one kind can never be
//! routed to the other.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::digest::{from_hex, sha256_raw, to_hex, ContentDigest};

/// Token amount in the smallest unit of its asset.
pub type Amount = u64;

/// A 20-byte account address (submitters, operators, call targets).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Derive an address from key material: the last 20 bytes of its SHA-256.
    pub fn derive(key_material: &[u8]) -> Self {
        let digest = sha256_raw(&[key_material]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[12..]);
        Self(bytes)
    }

    /// Render as `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", to_hex(&self.0))
    }

    /// Parse from a 40-character hex string, with or without `0x`.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = from_hex(s.trim())?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("address must be 20 bytes, got {}", v.len()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Ticker-style asset identifier (e.g. `"USDC"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create an asset identifier. Rejects empty or whitespace-only names.
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("asset identifier must be non-empty".to_string());
        }
        Ok(Self(name))
    }

    /// Access the asset name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The trading context of a swap batch: an unordered asset pair.
///
/// `PoolKey::new(X, Y) == PoolKey::new(Y, X)`; both directions of a pair
/// share one open batch so they can be netted against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolKey {
    /// Lexicographically smaller asset.
    pub low: AssetId,
    /// Lexicographically larger asset.
    pub high: AssetId,
}

impl PoolKey {
    /// Build the pool key for a directed pair.
    pub fn new(a: &AssetId, b: &AssetId) -> Self {
        if a <= b {
            Self {
                low: a.clone(),
                high: b.clone(),
            }
        } else {
            Self {
                low: b.clone(),
                high: a.clone(),
            }
        }
    }
}

impl std::fmt::Display for PoolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.low, self.high)
    }
}

/// Identifier of a swap intent, derived from `(submitter, payload, sequence)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(pub ContentDigest);

/// Identifier of a UEI task, derived from `(submitter, call, sequence)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub ContentDigest);

/// Monotonic identifier of a swap batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

/// Monotonic identifier of a UEI batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UeiBatchId(pub u64);

/// An execution domain (chain) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub u64);

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "intent:{}", to_hex(&self.0.as_bytes()[..8]))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task:{}", to_hex(&self.0.as_bytes()[..8]))
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

impl std::fmt::Display for UeiBatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uei-batch:{}", self.0)
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "domain:{}", self.0)
    }
}
