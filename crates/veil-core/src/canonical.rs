//! # Canonical Serialization: JCS Byte Production
//!
//! `CanonicalBytes` is the only construction path for bytes that get hashed
//! or signed anywhere in Veil.
//!
//! ## Security Invariant
//!
//! Committee members compute settlements independently and must sign the
//! same digest. If two members serialized the same settlement with
//! different key order or number formatting, the signatures would never
//! aggregate. The private inner field forces every digest through
//! [`CanonicalBytes::new()`], which:
//!
//! 1. **Rejects floats.** Amounts are integers; floats have platform- and
//!    library-dependent JSON renderings.
//! 2. **Serializes with RFC 8785 (JCS)** via `serde_jcs`: sorted keys,
//!    compact separators, deterministic byte sequence.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CanonicalizationError, FloatRepr};

/// Bytes produced exclusively by JCS canonicalization.
///
/// # Invariants
///
/// - The only constructor is `CanonicalBytes::new()`.
/// - No float numbers appear anywhere in the value tree.
/// - Object keys are sorted, separators compact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::FloatRejected` if the value contains
    /// a float. Returns `CanonicalizationError::SerializationFailed` if the
    /// value cannot be represented as JSON (e.g. an integer beyond `u64`).
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        reject_floats(&value)?;
        let s = serde_jcs::to_string(&value)?;
        Ok(Self(s.into_bytes()))
    }

    /// Access the canonical bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn reject_floats(value: &Value) -> Result<(), CanonicalizationError> {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => Ok(()),
        Value::Number(n) => {
            if n.is_f64() && !n.is_i64() && !n.is_u64() {
                if let Some(f) = n.as_f64() {
                    return Err(CanonicalizationError::FloatRejected(FloatRepr(f)));
                }
            }
            Ok(())
        }
        Value::Object(map) => map.values().try_for_each(reject_floats),
        Value::Array(arr) => arr.iter().try_for_each(reject_floats),
    }
}
