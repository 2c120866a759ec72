//! # veil-core: Foundational Types
//!
//! Every other Veil crate depends on `veil-core`; it depends on nothing
//! internal. It defines the primitives the ledger, the matching engine and
//! the operator workers must agree on byte-for-byte.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `IntentId`, `BatchId`, `UeiBatchId`, `TaskId`,
//!    `Address`, `AssetId`, `DomainId`. An intent id can never be passed
//!    where a task id is expected.
//!
//! 2. **`CanonicalBytes` newtype.** All digests (intent ids, settlement
//!    digests, event chain links, selection seeds) are computed from
//!    `CanonicalBytes`, never from ad hoc `serde_json::to_vec()` output.
//!    Independent committee members therefore hash identical bytes.
//!
//! 3. **One error taxonomy.** [`VeilError`] carries the five protocol error
//!    classes (validation, consensus, temporal, state, execution). Crate-local
//!    errors convert into it at the ledger boundary.
//!
//! 4. **Injectable time.** [`Clock`] decouples every temporal guard from the
//!    wall clock so finalization windows and deadlines are testable.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `veil-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod canonical;
pub mod config;
pub mod digest;
pub mod error;
pub mod handle;
pub mod identity;
pub mod temporal;

pub use canonical::CanonicalBytes;
pub use config::{ConfigError, ProtocolConfig};
pub use digest::{sha256_digest, sha256_raw, ContentDigest};
pub use error::{CanonicalizationError, VeilError};
pub use handle::{CiphertextHandle, EncryptedInput, InputProof, Plaintext, PlaintextKind};
pub use identity::{Address, Amount, AssetId, BatchId, DomainId, IntentId, PoolKey, TaskId, UeiBatchId};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
