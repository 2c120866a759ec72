//! # Error Types: Protocol Error Taxonomy
//!
//! Every rejected ledger write surfaces as one of five classes:
//!
//! - **Validation**: malformed payload, id mismatch, unauthorized caller.
//! - **Consensus**: too few attestations, or attestations from outside the
//!   batch committee.
//! - **Temporal**: deadline passed, finalized too early, response window
//!   expired.
//! - **State**: double finalize, double settle, acting on a batch in the
//!   wrong lifecycle state.
//! - **Execution**: an external call (swap, vault, relay) failed during
//!   settlement.
//!
//! Validation, temporal and state errors leave ledger state unchanged and
//! callers retry with re-fetched state. Consensus errors leave the batch
//! where it was; operators gather more signatures. Execution errors on a
//! UEI plan are terminal for that plan.

use thiserror::Error;

/// Top-level error type for Veil.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VeilError {
    /// Malformed or unauthorized input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Attestation threshold not met.
    #[error("consensus error: {reason} ({valid} valid committee attestations, {required} required)")]
    Consensus {
        /// Why the attestation set was rejected.
        reason: String,
        /// Distinct valid committee signers counted.
        valid: usize,
        /// Required threshold.
        required: usize,
    },

    /// A time window or deadline check failed.
    #[error("temporal error: {0}")]
    Temporal(String),

    /// Operation not allowed in the object's current lifecycle state.
    #[error("state error: {0}")]
    State(String),

    /// An external call failed while applying a settlement.
    #[error("execution error: {0}")]
    Execution(String),

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl VeilError {
    /// Short class name, used as a structured logging field.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Consensus { .. } => "consensus",
            Self::Temporal(_) => "temporal",
            Self::State(_) => "state",
            Self::Execution(_) => "execution",
            Self::Canonicalization(_) => "canonicalization",
        }
    }

    /// Whether this is a [`VeilError::State`] rejection.
    ///
    /// Operators racing on the same batch see this when another member's
    /// submission already settled it.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State(_))
    }
}

/// Error during canonical serialization.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(FloatRepr),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),
}

impl From<serde_json::Error> for CanonicalizationError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationFailed(e.to_string())
    }
}

/// A rejected float value, kept comparable so the error enum can derive `Eq`.
#[derive(Debug, Clone, Copy)]
pub struct FloatRepr(pub f64);

impl PartialEq for FloatRepr {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatRepr {}

impl PartialEq<f64> for FloatRepr {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for FloatRepr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
