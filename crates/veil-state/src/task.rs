//! UEI task status.
//!
//! `Pending → {Executed | Failed | Expired | Rejected}`. A failed plan marks
//! every one of its tasks `Failed`, including those whose calls never ran.
//! A task whose call could not be built is left out of its plan and ends
//! `Rejected` when the batch closes, whatever the plan's outcome.

use serde::{Deserialize, Serialize};

use crate::transition::TransitionError;

/// Runtime UEI task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Submitted, waiting in a batch.
    Pending,
    /// Its plan executed successfully.
    Executed,
    /// Its plan failed.
    Failed,
    /// Deadline passed before execution or batch abandoned.
    Expired,
    /// Its call could not be built, so no plan step served it.
    Rejected,
}

impl TaskStatus {
    /// Canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Return the next state if `self → to` is a valid edge.
    pub fn transition(self, to: TaskStatus) -> Result<TaskStatus, TransitionError> {
        if self == Self::Pending && to != Self::Pending {
            Ok(to)
        } else {
            Err(TransitionError::InvalidTransition {
                machine: "task",
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
