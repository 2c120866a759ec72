//! # veil-uei: Universal Encrypted Intents
//!
//! The generalization of swap batching to arbitrary confidential calls.
//! A task carries an encrypted `(decoder, target, selector, args[])`; after
//! the committee decrypts a batch it builds one [`ExecutionPlan`],
//! aggregating calls that share a function and every non-amount argument,
//! signs the [`plan_digest`], and the ledger runs the approved plan through
//! the [`PlanExecutor`].
//!
//! External effects go through two traits, [`CustodialVault`] for local
//! calls and [`CrossDomainRelay`] for calls whose target lives on another
//! execution domain.

pub mod call;
pub mod error;
pub mod executor;
pub mod plan;
pub mod schema;
pub mod vault;

pub use call::{encode_calldata, DecryptedTask, EncryptedCall};
pub use error::{RelayError, UeiError, VaultError};
pub use executor::{ExecutionReport, FailureStage, PlanExecutor, PlanOutcome, StepOutput};
pub use plan::{build_plan, plan_digest, ExecutionPlan, PlanStep};
pub use schema::{ArgKind, ArgumentSchema, CallKey, SchemaRegistry};
pub use vault::{
    CrossDomainRelay, CustodialVault, InMemoryRelay, InMemoryVault, RelayedCall, VaultCall,
};
