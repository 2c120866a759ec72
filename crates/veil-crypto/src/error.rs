//! Cryptographic error type.

use thiserror::Error;
use veil_core::{CanonicalizationError, VeilError};

/// Errors from key handling, signing and verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Malformed key material.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Malformed signature encoding.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// Signature did not verify.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// A seed source was asked to derive without its signing key.
    #[error("seed source cannot derive: {0}")]
    SeedUnavailable(String),

    /// The signed payload could not be canonicalized.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

impl From<CryptoError> for VeilError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Canonicalization(c) => VeilError::Canonicalization(c),
            other => VeilError::Validation(other.to_string()),
        }
    }
}
