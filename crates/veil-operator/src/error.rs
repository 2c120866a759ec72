//! Operator-side errors.

use thiserror::Error;
use veil_core::{CanonicalizationError, VeilError};
use veil_crypto::CryptoError;
use veil_ledger::ComputeError;
use veil_matching::MatchingError;
use veil_uei::UeiError;

/// Anything that stops a worker from contributing to one batch.
#[derive(Error, Debug)]
pub enum OperatorError {
    /// The ledger rejected a call.
    #[error(transparent)]
    Ledger(#[from] VeilError),

    /// Decryption failed.
    #[error("decrypt failed: {0}")]
    Compute(#[from] ComputeError),

    /// The matching engine rejected the decrypted batch.
    #[error("matching failed: {0}")]
    Matching(#[from] MatchingError),

    /// The plan builder rejected the decrypted tasks.
    #[error("plan building failed: {0}")]
    Uei(#[from] UeiError),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Crypto(#[from] CryptoError),

    /// A digest could not be computed.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),

    /// Decrypted data did not have the expected shape.
    #[error("malformed plaintext: {0}")]
    Malformed(String),
}

impl OperatorError {
    /// Whether the ledger already moved past the state this call assumed,
    /// typically because another committee member won the race.
    pub fn is_lost_race(&self) -> bool {
        matches!(self, Self::Ledger(e) if e.is_state())
    }

    /// Whether the batch's response window has closed, so retrying is moot.
    pub fn is_window_closed(&self) -> bool {
        matches!(self, Self::Ledger(VeilError::Temporal(_)))
    }
}
