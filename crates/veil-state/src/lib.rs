//! # veil-state: Lifecycle State Machines
//!
//! - **Batch** (`batch.rs`): `Collecting → Finalized → Processing →
//!   {Settled | Failed}`, plus `Finalized → Failed` when the response
//!   window lapses before any committee member starts. Shared by swap and
//!   UEI batches. Every transition is appended to a log with its instant
//!   and evidence digest.
//! - **Intent** (`intent.rs`): `Pending → Matched → Settled`, with
//!   `Expired` reachable from both non-terminal states.
//! - **Task** (`task.rs`): `Pending → {Executed | Failed | Expired}`.
//!
//! All machines move strictly forward. Transitions are checked at runtime
//! against an explicit edge table; anything else is a [`TransitionError`].

pub mod batch;
pub mod intent;
pub mod task;
pub mod transition;

pub use batch::{BatchLifecycle, BatchStatus};
pub use intent::IntentStatus;
pub use task::TaskStatus;
pub use transition::{TransitionError, TransitionRecord};
