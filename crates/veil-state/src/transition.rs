//! Transition records and errors shared by every lifecycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use veil_core::{ContentDigest, Timestamp, VeilError};

/// Record of a single state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: String,
    /// State after the transition.
    pub to_state: String,
    /// Ledger time of the transition.
    pub timestamp: Timestamp,
    /// Digest of whatever authorized it (settlement digest, plan digest).
    pub evidence_digest: Option<ContentDigest>,
    /// Free-form reason.
    pub reason: Option<String>,
}

/// A transition not present in the machine's edge table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Attempted transition is not allowed by the state machine.
    #[error("invalid {machine} transition: {from} -> {to}")]
    InvalidTransition {
        /// Which machine rejected it.
        machine: &'static str,
        /// Current state.
        from: &'static str,
        /// Attempted target state.
        to: &'static str,
    },
}

impl From<TransitionError> for VeilError {
    fn from(e: TransitionError) -> Self {
        VeilError::State(e.to_string())
    }
}
