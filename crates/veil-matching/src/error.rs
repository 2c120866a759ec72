//! Matching error type.

use thiserror::Error;
use veil_core::{CanonicalizationError, IntentId, VeilError};

/// Errors from the matching engine and settlement checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingError {
    /// The same intent id appears twice in the input.
    #[error("duplicate intent in matching input: {0}")]
    DuplicateIntent(IntentId),

    /// An intent swaps an asset for itself.
    #[error("intent {0} has identical input and output assets")]
    SameAsset(IntentId),

    /// Totals exceeded the amount range.
    #[error("arithmetic overflow while {context}")]
    ArithmeticOverflow {
        /// What was being summed.
        context: &'static str,
    },

    /// A settlement payload is internally inconsistent.
    #[error("inconsistent settlement: {reason}")]
    Inconsistent {
        /// First inconsistency found.
        reason: String,
    },

    /// Digest input could not be canonicalized.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

impl From<MatchingError> for VeilError {
    fn from(e: MatchingError) -> Self {
        match e {
            MatchingError::Canonicalization(c) => VeilError::Canonicalization(c),
            other => VeilError::Validation(other.to_string()),
        }
    }
}
