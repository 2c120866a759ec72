//! Ledger-side records of intents, tasks and their batches, and the views
//! handed to operators.

use serde::{Deserialize, Serialize};
use veil_core::{
    Address, Amount, AssetId, BatchId, CiphertextHandle, ContentDigest, EncryptedInput, IntentId,
    PoolKey, TaskId, Timestamp, UeiBatchId,
};
use veil_state::{BatchLifecycle, BatchStatus, IntentStatus, TaskStatus};
use veil_uei::EncryptedCall;

use crate::events::SelectionEvidence;

// ── Swap side ───────────────────────────────────────────────────────

/// What a submitter sends to open a swap intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPayload {
    /// Asset sold.
    pub asset_in: AssetId,
    /// Asset bought.
    pub asset_out: AssetId,
    /// Encrypted amount of `asset_in`.
    pub amount: EncryptedInput,
    /// Public amount of `asset_in` held in escrow while the intent is
    /// live. Must cover the encrypted amount; the unspent part is returned.
    pub collateral: Amount,
    /// Latest acceptable settlement reference time.
    pub deadline: Timestamp,
}

/// A stored swap intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRecord {
    /// Identifier.
    pub intent_id: IntentId,
    /// Submitter.
    pub submitter: Address,
    /// Asset sold.
    pub asset_in: AssetId,
    /// Asset bought.
    pub asset_out: AssetId,
    /// Ciphertext capability for the amount.
    pub amount: CiphertextHandle,
    /// Escrowed `asset_in`.
    pub collateral: Amount,
    /// Deadline.
    pub deadline: Timestamp,
    /// Owning batch.
    pub batch_id: BatchId,
    /// Ledger-wide submission sequence.
    pub sequence: u64,
    /// Lifecycle status.
    pub status: IntentStatus,
}

impl IntentRecord {
    /// Whether the intent trades `asset_in → asset_out`.
    pub fn trades(&self, asset_in: &AssetId, asset_out: &AssetId) -> bool {
        self.asset_in == *asset_in && self.asset_out == *asset_out
    }
}

/// A swap batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapBatch {
    /// Identifier.
    pub batch_id: BatchId,
    /// Trading context.
    pub pool: PoolKey,
    /// Member intents in submission order.
    pub intent_ids: Vec<IntentId>,
    /// When the first intent arrived.
    pub created_at: Timestamp,
    /// When the batch closed.
    pub finalized_at: Option<Timestamp>,
    /// End of the response window. Members due before it are expired.
    pub settle_by: Option<Timestamp>,
    /// Ordered committee, empty until finalization.
    pub committee: Vec<Address>,
    /// How the committee was drawn.
    pub selection: Option<SelectionEvidence>,
    /// Digest of the accepted settlement.
    pub settlement_digest: Option<ContentDigest>,
    /// State machine and transition log.
    pub lifecycle: BatchLifecycle,
}

impl SwapBatch {
    pub(crate) fn open(batch_id: BatchId, pool: PoolKey, now: Timestamp) -> Self {
        Self {
            batch_id,
            pool,
            intent_ids: Vec::new(),
            created_at: now,
            finalized_at: None,
            settle_by: None,
            committee: Vec::new(),
            selection: None,
            settlement_digest: None,
            lifecycle: BatchLifecycle::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> BatchStatus {
        self.lifecycle.status()
    }
}

// ── UEI side ────────────────────────────────────────────────────────

/// What a submitter sends to open a UEI task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Encrypted call description.
    pub call: EncryptedCall,
    /// Native value attached to the call, in plaintext.
    pub value: Amount,
    /// Latest acceptable execution reference time.
    pub deadline: Timestamp,
}

/// A stored UEI task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Identifier.
    pub task_id: TaskId,
    /// Submitter.
    pub submitter: Address,
    /// Encrypted call.
    pub call: EncryptedCall,
    /// Attached value.
    pub value: Amount,
    /// Deadline.
    pub deadline: Timestamp,
    /// Owning batch.
    pub batch_id: UeiBatchId,
    /// Ledger-wide submission sequence.
    pub sequence: u64,
    /// Lifecycle status.
    pub status: TaskStatus,
}

/// A UEI batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeiBatch {
    /// Identifier.
    pub batch_id: UeiBatchId,
    /// Member tasks in submission order.
    pub task_ids: Vec<TaskId>,
    /// When the batch was opened.
    pub created_at: Timestamp,
    /// Most recent submission; the idle window runs from here.
    pub last_submission_at: Option<Timestamp>,
    /// When the batch closed.
    pub finalized_at: Option<Timestamp>,
    /// End of the response window. Members due before it are expired.
    pub settle_by: Option<Timestamp>,
    /// Ordered committee, empty until finalization.
    pub committee: Vec<Address>,
    /// How the committee was drawn.
    pub selection: Option<SelectionEvidence>,
    /// Digest of the accepted plan.
    pub plan_digest: Option<ContentDigest>,
    /// State machine and transition log.
    pub lifecycle: BatchLifecycle,
}

impl UeiBatch {
    pub(crate) fn open(batch_id: UeiBatchId, now: Timestamp) -> Self {
        Self {
            batch_id,
            task_ids: Vec::new(),
            created_at: now,
            last_submission_at: None,
            finalized_at: None,
            settle_by: None,
            committee: Vec::new(),
            selection: None,
            plan_digest: None,
            lifecycle: BatchLifecycle::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> BatchStatus {
        self.lifecycle.status()
    }
}

// ── Operator views ──────────────────────────────────────────────────

/// A swap batch with its intents, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapBatchView {
    /// The batch.
    pub batch: SwapBatch,
    /// Its intents.
    pub intents: Vec<IntentRecord>,
}

/// A UEI batch with its tasks, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeiBatchView {
    /// The batch.
    pub batch: UeiBatch,
    /// Its tasks.
    pub tasks: Vec<TaskRecord>,
}

/// A batch that was finalized after the polling cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalizedBatch {
    /// Swap batch.
    Swap(SwapBatchView),
    /// UEI batch.
    Uei(UeiBatchView),
}

impl FinalizedBatch {
    /// Current status of the underlying batch.
    pub fn status(&self) -> BatchStatus {
        match self {
            Self::Swap(v) => v.batch.status(),
            Self::Uei(v) => v.batch.status(),
        }
    }

    /// Ordered committee.
    pub fn committee(&self) -> &[Address] {
        match self {
            Self::Swap(v) => &v.batch.committee,
            Self::Uei(v) => &v.batch.committee,
        }
    }

    /// Label for logs, e.g. `batch:3` or `uei-batch:1`.
    pub fn label(&self) -> String {
        match self {
            Self::Swap(v) => v.batch.batch_id.to_string(),
            Self::Uei(v) => v.batch.batch_id.to_string(),
        }
    }
}

/// One page of [`crate::Ledger::query_finalized_batches`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedBatchPage {
    /// Cursor to pass on the next poll.
    pub next_cursor: u64,
    /// Batches finalized at or after the previous cursor, oldest first.
    pub batches: Vec<FinalizedBatch>,
}
