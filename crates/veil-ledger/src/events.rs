//! # Event Log
//!
//! Append-only, hash-chained record of every ledger state change. The
//! off-chain side never receives pushes: operators poll
//! [`EventLog::since`] with a cursor (the next sequence number they have
//! not seen) and treat events idempotently.
//!
//! ## Integrity Model
//!
//! Each record stores `prev_digest` (the digest of the record before it,
//! [`ContentDigest::ZERO`] for the first) and its own `digest`, the
//! canonical SHA-256 of `(sequence, timestamp, prev_digest, event)`. The
//! chain head seeds committee selection, so a batch's committee depends on
//! every event that preceded its finalization.

use serde::{Deserialize, Serialize};
use veil_core::{
    sha256_digest, Address, Amount, BatchId, CanonicalBytes, CanonicalizationError, ContentDigest,
    IntentId, PoolKey, TaskId, Timestamp, UeiBatchId,
};
use veil_crypto::SelectionSeed;

/// Committee selection evidence published at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionEvidence {
    /// Key the seed was derived for, e.g. `swap:3`.
    pub batch_key: String,
    /// Chain head digest at finalization.
    pub entropy: ContentDigest,
    /// Derived seed and its proof.
    pub seed: SelectionSeed,
    /// Number of registered operators the committee was drawn from.
    pub operator_pool_size: usize,
}

/// A ledger state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A swap intent joined an open batch.
    IntentSubmitted {
        /// New intent.
        intent_id: IntentId,
        /// Batch it joined.
        batch_id: BatchId,
        /// Trading context.
        pool: PoolKey,
        /// Submitter.
        submitter: Address,
    },
    /// A swap batch closed and received its committee.
    BatchFinalized {
        /// Batch.
        batch_id: BatchId,
        /// Trading context.
        pool: PoolKey,
        /// Ordered committee.
        committee: Vec<Address>,
        /// Selection evidence.
        selection: SelectionEvidence,
        /// Number of intents in the batch.
        intent_count: usize,
    },
    /// A committee member started settling a swap batch.
    BatchProcessing {
        /// Batch.
        batch_id: BatchId,
        /// Member that acknowledged the batch; `None` when a settlement
        /// submission triggered the transition.
        operator: Option<Address>,
    },
    /// A swap batch settled.
    BatchSettled {
        /// Batch.
        batch_id: BatchId,
        /// Signed settlement digest.
        digest: ContentDigest,
        /// Committee members whose attestations counted.
        signers: Vec<Address>,
        /// Volume sent to the exchange pool.
        net_amount: Amount,
        /// Output received from the exchange pool.
        amount_out: Amount,
    },
    /// A swap batch was abandoned.
    BatchFailed {
        /// Batch.
        batch_id: BatchId,
        /// Why.
        reason: String,
    },
    /// A UEI task joined the rolling batch.
    TaskSubmitted {
        /// New task.
        task_id: TaskId,
        /// Batch it joined.
        batch_id: UeiBatchId,
        /// Submitter.
        submitter: Address,
    },
    /// A UEI batch closed and received its committee.
    UeiBatchFinalized {
        /// Batch.
        batch_id: UeiBatchId,
        /// Ordered committee.
        committee: Vec<Address>,
        /// Selection evidence.
        selection: SelectionEvidence,
        /// Number of tasks in the batch.
        task_count: usize,
    },
    /// A committee member started settling a UEI batch.
    UeiBatchProcessing {
        /// Batch.
        batch_id: UeiBatchId,
        /// Member that acknowledged the batch; `None` when a settlement
        /// submission triggered the transition.
        operator: Option<Address>,
    },
    /// A UEI plan executed completely.
    UeiBatchSettled {
        /// Batch.
        batch_id: UeiBatchId,
        /// Signed plan digest.
        digest: ContentDigest,
        /// Committee members whose attestations counted.
        signers: Vec<Address>,
        /// External calls made.
        steps: usize,
    },
    /// A UEI batch failed: plan aborted or response window lapsed.
    UeiBatchFailed {
        /// Batch.
        batch_id: UeiBatchId,
        /// Why.
        reason: String,
    },
}

impl LedgerEvent {
    /// Event name, as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IntentSubmitted { .. } => "intent_submitted",
            Self::BatchFinalized { .. } => "batch_finalized",
            Self::BatchProcessing { .. } => "batch_processing",
            Self::BatchSettled { .. } => "batch_settled",
            Self::BatchFailed { .. } => "batch_failed",
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::UeiBatchFinalized { .. } => "uei_batch_finalized",
            Self::UeiBatchProcessing { .. } => "uei_batch_processing",
            Self::UeiBatchSettled { .. } => "uei_batch_settled",
            Self::UeiBatchFailed { .. } => "uei_batch_failed",
        }
    }
}

/// One link of the event chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the log, from zero.
    pub sequence: u64,
    /// Ledger time of the change.
    pub timestamp: Timestamp,
    /// Digest of the previous record.
    pub prev_digest: ContentDigest,
    /// Digest of this record.
    pub digest: ContentDigest,
    /// The change.
    pub event: LedgerEvent,
}

#[derive(Serialize)]
struct RecordBody<'a> {
    sequence: u64,
    timestamp: &'a Timestamp,
    prev_digest: &'a ContentDigest,
    event: &'a LedgerEvent,
}

fn record_digest(
    sequence: u64,
    timestamp: &Timestamp,
    prev_digest: &ContentDigest,
    event: &LedgerEvent,
) -> Result<ContentDigest, CanonicalizationError> {
    let body = RecordBody {
        sequence,
        timestamp,
        prev_digest,
        event,
    };
    Ok(sha256_digest(&CanonicalBytes::new(&body)?))
}

/// The append-only log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from exported records. Links are not checked; call
    /// [`Self::verify_chain`].
    pub fn from_records(records: Vec<EventRecord>) -> Self {
        Self { records }
    }

    /// Number of records; also the cursor just past the newest record.
    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    /// Whether nothing was logged yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Digest of the newest record, [`ContentDigest::ZERO`] when empty.
    pub fn head(&self) -> ContentDigest {
        self.records.last().map_or(ContentDigest::ZERO, |r| r.digest)
    }

    /// Append `event` at `timestamp`.
    pub fn append(
        &mut self,
        timestamp: Timestamp,
        event: LedgerEvent,
    ) -> Result<&EventRecord, CanonicalizationError> {
        let sequence = self.len();
        let prev_digest = self.head();
        let digest = record_digest(sequence, &timestamp, &prev_digest, &event)?;
        tracing::trace!(sequence, kind = event.kind(), "event appended");
        self.records.push(EventRecord {
            sequence,
            timestamp,
            prev_digest,
            digest,
            event,
        });
        Ok(&self.records[self.records.len() - 1])
    }

    /// Records with `sequence >= cursor`.
    pub fn since(&self, cursor: u64) -> &[EventRecord] {
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Recompute every link. Returns the first broken sequence number.
    pub fn verify_chain(&self) -> Result<(), u64> {
        let mut prev = ContentDigest::ZERO;
        for r in &self.records {
            let expected = record_digest(r.sequence, &r.timestamp, &prev, &r.event).map_err(|_| r.sequence)?;
            if r.prev_digest != prev || r.digest != expected {
                return Err(r.sequence);
            }
            prev = r.digest;
        }
        Ok(())
    }
}
