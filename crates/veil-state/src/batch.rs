//! # Batch Lifecycle
//!
//! ```text
//! Collecting ──► Finalized ──► Processing ──► Settled
//!                    │              │
//!                    └──────────────┴───────► Failed
//! ```
//!
//! ## Security Invariant
//!
//! `Settled` and `Failed` are terminal. A batch can therefore be settled at
//! most once: the second settlement attempt meets a terminal state and is
//! rejected before any balance is touched.

use serde::{Deserialize, Serialize};
use veil_core::{ContentDigest, Timestamp};

use crate::transition::{TransitionError, TransitionRecord};

/// Runtime batch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Open, accepting submissions.
    Collecting,
    /// Closed; committee assigned and granted decrypt rights.
    Finalized,
    /// A committee member has started (or submitted) a settlement.
    Processing,
    /// Settlement accepted and applied.
    Settled,
    /// Abandoned: response window lapsed, or the UEI plan failed.
    Failed,
}

impl BatchStatus {
    /// Canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Collecting => "COLLECTING",
            Self::Finalized => "FINALIZED",
            Self::Processing => "PROCESSING",
            Self::Settled => "SETTLED",
            Self::Failed => "FAILED",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Failed)
    }

    /// Whether the edge `self → to` exists.
    pub fn can_transition_to(&self, to: BatchStatus) -> bool {
        matches!(
            (self, to),
            (Self::Collecting, Self::Finalized)
                | (Self::Finalized, Self::Processing)
                | (Self::Finalized, Self::Failed)
                | (Self::Processing, Self::Settled)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current batch state plus its transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLifecycle {
    status: BatchStatus,
    transition_log: Vec<TransitionRecord>,
}

impl Default for BatchLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchLifecycle {
    /// A fresh, collecting batch.
    pub fn new() -> Self {
        Self {
            status: BatchStatus::Collecting,
            transition_log: Vec::new(),
        }
    }

    /// Current state.
    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Whether the batch reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Every transition so far, oldest first.
    pub fn transition_log(&self) -> &[TransitionRecord] {
        &self.transition_log
    }

    /// When the batch entered `status`, if it ever did.
    pub fn entered_at(&self, status: BatchStatus) -> Option<Timestamp> {
        self.transition_log
            .iter()
            .find(|r| r.to_state == status.name())
            .map(|r| r.timestamp)
    }

    /// Attempt a transition, recording it on success.
    pub fn try_transition(
        &mut self,
        to: BatchStatus,
        at: Timestamp,
        evidence_digest: Option<ContentDigest>,
        reason: Option<String>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition {
                machine: "batch",
                from: self.status.name(),
                to: to.name(),
            });
        }
        self.transition_log.push(TransitionRecord {
            from_state: self.status.name().to_string(),
            to_state: to.name().to_string(),
            timestamp: at,
            evidence_digest,
            reason,
        });
        self.status = to;
        Ok(())
    }
}
