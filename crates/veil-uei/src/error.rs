//! UEI error types.

use thiserror::Error;
use veil_core::{Address, CanonicalizationError, DomainId, TaskId, VeilError};

/// Errors building or digesting an execution plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UeiError {
    /// The same task id appears twice in the input.
    #[error("duplicate task in plan input: {0}")]
    DuplicateTask(TaskId),

    /// A schema registration is malformed.
    #[error("invalid argument schema {name}: {reason}")]
    InvalidSchema {
        /// Schema name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Decrypted arguments do not fit the call's schema.
    #[error("task {task}: {reason}")]
    ArgumentMismatch {
        /// Offending task.
        task: TaskId,
        /// First mismatch found.
        reason: String,
    },

    /// Aggregated amount or value exceeded the amount range.
    #[error("arithmetic overflow aggregating calls to {target}")]
    ArithmeticOverflow {
        /// Target of the overflowing group.
        target: Address,
    },

    /// Digest input could not be canonicalized.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

impl From<UeiError> for VeilError {
    fn from(e: UeiError) -> Self {
        match e {
            UeiError::Canonicalization(c) => VeilError::Canonicalization(c),
            other => VeilError::Validation(other.to_string()),
        }
    }
}

/// A vault call that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// The target reverted.
    #[error("call to {target} reverted: {reason}")]
    Reverted {
        /// Call target.
        target: Address,
        /// Revert reason.
        reason: String,
    },

    /// The vault refused the call (e.g. insufficient custody balance).
    #[error("vault rejected call to {target}: {reason}")]
    Rejected {
        /// Call target.
        target: Address,
        /// Why.
        reason: String,
    },
}

/// A cross-domain hand-off that did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No route to the destination domain.
    #[error("no relay route to {0}")]
    Unreachable(DomainId),

    /// The relay refused the message.
    #[error("relay rejected message to {domain}: {reason}")]
    Rejected {
        /// Destination.
        domain: DomainId,
        /// Why.
        reason: String,
    },
}
