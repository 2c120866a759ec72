//! # veil-matching: Confidential Intent Netting
//!
//! Run independently by every committee member once a batch's amounts are
//! decrypted. Produces a [`SwapSettlement`] and the [`settlement_digest`]
//! the member signs. Members that decrypted the same intents in the same
//! canonical order produce the same digest; any divergence simply fails to
//! reach the attestation threshold.

pub mod digest;
pub mod engine;
pub mod error;
pub mod settlement;

pub use digest::settlement_digest;
pub use engine::{match_batch, MatchingEngine};
pub use error::MatchingError;
pub use settlement::{
    distribute_output, DecryptedIntent, IntentFill, InternalTransfer, NetResidual, Payout,
    SwapSettlement, UserShare,
};
