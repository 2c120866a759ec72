//! # veil-ledger: Intent Ledger and Settlement Gate
//!
//! The on-ledger half of Veil. Accepts encrypted swap intents and UEI
//! tasks, batches them, draws an operator committee per batch, and applies
//! the settlements and execution plans that committees attest to.
//!
//! ## Security Invariant
//!
//! No plaintext amount or call argument is ever stored here. The ledger
//! only holds ciphertext handles and grants decrypt rights to a batch's
//! committee at finalization. Settlements are checked structurally against
//! public data (membership, directions, deadlines) and accepted only with
//! `min_attestations` distinct committee signatures over their digest.
//!
//! ## Crate Layout
//!
//! - [`ledger`]: the [`Ledger`] state, its service seams and read API.
//! - [`scheduler`]: intent submission, batch finalization and expiry.
//! - [`settlement`]: swap settlement validation and atomic application.
//! - [`uei`]: rolling UEI batches and plan execution.
//! - [`selection`], [`consensus`]: committee draw and attestation threshold.
//! - [`compute`], [`exchange`], [`balances`], [`events`]: the confidential
//!   compute seam, the exchange pool seam, custody balances and the
//!   hash-chained event log.

pub mod balances;
pub mod compute;
pub mod consensus;
pub mod events;
pub mod exchange;
pub mod ledger;
pub mod records;
pub mod scheduler;
pub mod selection;
pub mod settlement;
pub mod uei;

#[cfg(test)]
mod testing;

pub use balances::{BalanceBook, BalanceError};
pub use compute::{
    ComputeError, ConfidentialCompute, DecryptAuthorization, InMemoryCompute,
    DEFAULT_MAX_HANDLES_PER_CALL,
};
pub use consensus::check_threshold;
pub use events::{EventLog, EventRecord, LedgerEvent, SelectionEvidence};
pub use exchange::{ConstantProductPool, ExchangeError, ExchangePool};
pub use ledger::{Ledger, LedgerServices};
pub use records::{
    FinalizedBatch, FinalizedBatchPage, IntentPayload, IntentRecord, SwapBatch, SwapBatchView,
    TaskPayload, TaskRecord, UeiBatch, UeiBatchView,
};
pub use selection::{select_committee, verify_committee, OperatorInfo, OperatorRegistry};
pub use settlement::SettlementReceipt;
pub use uei::UeiSettlementReceipt;
