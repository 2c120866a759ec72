//! # veil-operator: Committee Member Node
//!
//! The off-ledger half of Veil. Each operator runs an [`OperatorWorker`]
//! that polls the ledger for finalized batches, decrypts the ones its key
//! was drawn for, computes the deterministic settlement or execution plan,
//! and gossips its attestation through an [`AttestationBoard`]. The member
//! whose attestation completes the threshold submits to the ledger.
//!
//! ## Security Invariant
//!
//! Plaintexts never leave the worker. Only digests and signatures are
//! posted; only the threshold-signed settlement is submitted.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod decrypt;
pub mod error;
pub mod worker;

pub use client::{LedgerClient, LocalLedger};
pub use config::OperatorConfig;
pub use coordinator::{AttestationBoard, BatchRef, Contribution, PostOutcome, SettlementCoordinator};
pub use decrypt::ChunkedDecryptor;
pub use error::OperatorError;
pub use worker::{OperatorWorker, WorkerStats};
