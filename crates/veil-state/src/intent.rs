//! Intent status.
//!
//! ```text
//! Pending ──► Matched ──► Settled
//!    │           ├──────► Rejected
//!    └───────────┴──────► Expired
//! ```
//!
//! An intent becomes `Matched` when its batch enters processing with the
//! intent's deadline at or after the batch's `settle_by` instant. Intents
//! due earlier go straight to `Expired`, as do matched intents of a batch
//! that is later abandoned. A matched intent the committee could not fill
//! (its decrypted amount exceeds its collateral) ends `Rejected` when the
//! batch settles. Every terminal state other than `Settled` returns the
//! intent's collateral in full.

use serde::{Deserialize, Serialize};

use crate::transition::TransitionError;

/// Runtime intent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    /// Submitted, waiting in a batch.
    Pending,
    /// Included in a matching run.
    Matched,
    /// Settlement applied.
    Settled,
    /// Deadline passed or batch abandoned.
    Expired,
    /// Excluded from a settled batch as unfillable.
    Rejected,
}

impl IntentStatus {
    /// Canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Matched => "MATCHED",
            Self::Settled => "SETTLED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Expired | Self::Rejected)
    }

    /// Return the next state if `self → to` is a valid edge.
    pub fn transition(self, to: IntentStatus) -> Result<IntentStatus, TransitionError> {
        let valid = matches!(
            (self, to),
            (Self::Pending, Self::Matched)
                | (Self::Pending, Self::Expired)
                | (Self::Matched, Self::Settled)
                | (Self::Matched, Self::Expired)
                | (Self::Matched, Self::Rejected)
        );
        if valid {
            Ok(to)
        } else {
            Err(TransitionError::InvalidTransition {
                machine: "intent",
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
