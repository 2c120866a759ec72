//! # Batch Scheduler
//!
//! Collects swap intents into one open batch per pool and closes batches.
//!
//! A batch closes when its age reaches `batch_interval_secs`, or earlier on
//! admin override. Closing is lazy: nothing runs on a timer. Either a
//! caller invokes [`Ledger::finalize_batch`], or the next submission to the
//! same pool finds the open batch overdue and closes it before opening a
//! new one.
//!
//! ## Intent status
//!
//! Intents stay `Pending` through finalization. When the batch enters
//! `Processing` each becomes `Matched`, or `Expired` if its deadline
//! precedes the batch's `settle_by`. Settlement moves `Matched` intents to
//! `Settled` or `Rejected`; a failed batch moves them to `Expired`.
//!
//! ## Collateral
//!
//! Submission moves the intent's public `collateral` of `asset_in` into
//! escrow and fails if the submitter cannot cover it. Expired and
//! rejected intents get the full collateral back. A settled intent spends
//! from its collateral and gets the rest back.

use veil_core::{Address, BatchId, IntentId, PlaintextKind, PoolKey, Timestamp, VeilError};
use veil_state::{BatchStatus, IntentStatus};

use crate::events::LedgerEvent;
use crate::ledger::{derive_id, Ledger};
use crate::records::{IntentPayload, IntentRecord, SwapBatch};

const INTENT_ID_DOMAIN: &str = "veil/intent/v1";

impl Ledger {
    /// Accept a swap intent into its pool's open batch.
    pub fn submit_intent(
        &mut self,
        submitter: Address,
        payload: IntentPayload,
    ) -> Result<IntentId, VeilError> {
        let now = self.now();
        if payload.deadline <= now {
            return Err(VeilError::Temporal(format!(
                "deadline {} is not after ledger time {now}",
                payload.deadline
            )));
        }
        if payload.asset_in == payload.asset_out {
            return Err(VeilError::Validation(format!(
                "intent swaps {} for itself",
                payload.asset_in
            )));
        }
        if payload.collateral == 0 {
            return Err(VeilError::Validation("intent carries no collateral".to_string()));
        }
        self.services
            .compute
            .verify_input_kind(&payload.amount, submitter, PlaintextKind::Uint)?;

        let sequence = self.next_sequence;
        let intent_id = IntentId(derive_id(INTENT_ID_DOMAIN, &submitter, &payload, sequence)?);
        if self.intents.contains_key(&intent_id) {
            return Err(VeilError::Validation(format!("{intent_id} already exists")));
        }

        self.hold_collateral(submitter, &payload.asset_in, payload.collateral)?;

        let pool = PoolKey::new(&payload.asset_in, &payload.asset_out);
        self.finalize_if_overdue(&pool, now);
        let batch_id = self.open_batch_for(&pool, now);

        self.intents.insert(
            intent_id,
            IntentRecord {
                intent_id,
                submitter,
                asset_in: payload.asset_in,
                asset_out: payload.asset_out,
                amount: payload.amount.handle,
                collateral: payload.collateral,
                deadline: payload.deadline,
                batch_id,
                sequence,
                status: IntentStatus::Pending,
            },
        );
        if let Some(batch) = self.batches.get_mut(&batch_id) {
            batch.intent_ids.push(intent_id);
        }
        self.next_sequence += 1;
        self.emit(LedgerEvent::IntentSubmitted {
            intent_id,
            batch_id,
            pool: pool.clone(),
            submitter,
        })?;
        tracing::info!(
            %intent_id,
            %batch_id,
            %pool,
            %submitter,
            collateral = payload.collateral,
            "intent submitted"
        );
        Ok(intent_id)
    }

    /// Close a swap batch.
    ///
    /// Requires the batch interval to have elapsed since the batch opened,
    /// unless `force` is set by the admin.
    pub fn finalize_batch(
        &mut self,
        caller: &Address,
        batch_id: BatchId,
        force: bool,
    ) -> Result<(), VeilError> {
        let now = self.now();
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        if batch.status() != BatchStatus::Collecting {
            return Err(VeilError::State(format!(
                "{batch_id} is {}, not COLLECTING",
                batch.status()
            )));
        }
        if batch.intent_ids.is_empty() {
            return Err(VeilError::State(format!("{batch_id} is empty")));
        }
        if force {
            self.require_admin(caller, "force finalization")?;
        } else if !now.has_elapsed(batch.created_at, self.config.batch_interval_secs) {
            return Err(VeilError::Temporal(format!(
                "{batch_id} is {}s old; the batch interval is {}s",
                now.seconds_since(batch.created_at),
                self.config.batch_interval_secs
            )));
        }
        self.close_swap_batch(batch_id, now)
    }

    /// A committee member acknowledges a finalized batch.
    pub fn begin_processing(&mut self, operator: &Address, batch_id: BatchId) -> Result<(), VeilError> {
        let now = self.now();
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        if batch.status() != BatchStatus::Finalized {
            return Err(VeilError::State(format!(
                "{batch_id} is {}, not FINALIZED",
                batch.status()
            )));
        }
        if !batch.committee.contains(operator) {
            return Err(VeilError::Validation(format!(
                "{operator} is not on the committee of {batch_id}"
            )));
        }
        self.check_response_window(&batch_id, batch.settle_by, now)?;
        self.enter_processing(batch_id, Some(*operator), now)
    }

    /// Abandon a batch whose response window lapsed without settlement.
    pub fn expire_batch(&mut self, batch_id: BatchId) -> Result<(), VeilError> {
        let now = self.now();
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        if !matches!(batch.status(), BatchStatus::Finalized | BatchStatus::Processing) {
            return Err(VeilError::State(format!(
                "{batch_id} is {} and cannot expire",
                batch.status()
            )));
        }
        if self.check_response_window(&batch_id, batch.settle_by, now).is_ok() {
            return Err(VeilError::Temporal(format!(
                "{batch_id} is still inside its response window"
            )));
        }
        self.fail_swap_batch(batch_id, now, "response window expired".to_string())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn finalize_if_overdue(&mut self, pool: &PoolKey, now: Timestamp) {
        let Some(&open) = self.open_batches.get(pool) else {
            return;
        };
        let overdue = self.batches.get(&open).is_some_and(|b| {
            !b.intent_ids.is_empty() && now.has_elapsed(b.created_at, self.config.batch_interval_secs)
        });
        if !overdue {
            return;
        }
        if let Err(e) = self.close_swap_batch(open, now) {
            tracing::warn!(batch_id = %open, %pool, error = %e, "lazy finalization failed; batch stays open");
        }
    }

    fn open_batch_for(&mut self, pool: &PoolKey, now: Timestamp) -> BatchId {
        if let Some(&open) = self.open_batches.get(pool) {
            return open;
        }
        let batch_id = BatchId(self.next_batch_id);
        self.next_batch_id += 1;
        self.batches.insert(batch_id, SwapBatch::open(batch_id, pool.clone(), now));
        self.open_batches.insert(pool.clone(), batch_id);
        tracing::debug!(%batch_id, %pool, "batch opened");
        batch_id
    }

    /// Draw the committee, grant decrypt rights and mark the batch Finalized.
    fn close_swap_batch(&mut self, batch_id: BatchId, now: Timestamp) -> Result<(), VeilError> {
        let drawn = self.draw_committee(format!("swap:{}", batch_id.0))?;
        let settle_by = self.settle_by(now)?;
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        for intent_id in &batch.intent_ids {
            let Some(intent) = self.intents.get(intent_id) else {
                continue;
            };
            for member in &drawn.committee {
                self.services
                    .compute
                    .grant_decrypt_permission(intent.amount, *member)?;
            }
        }

        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Finalized, now, Some(drawn.evidence.seed.seed), None)?;
        batch.finalized_at = Some(now);
        batch.settle_by = Some(settle_by);
        batch.committee = drawn.committee.clone();
        batch.selection = Some(drawn.evidence.clone());
        let pool = batch.pool.clone();
        let intent_count = batch.intent_ids.len();
        if self.open_batches.get(&pool) == Some(&batch_id) {
            self.open_batches.remove(&pool);
        }

        self.emit(LedgerEvent::BatchFinalized {
            batch_id,
            pool: pool.clone(),
            committee: drawn.committee.clone(),
            selection: drawn.evidence,
            intent_count,
        })?;
        tracing::info!(
            %batch_id,
            %pool,
            intents = intent_count,
            committee = ?drawn.committee,
            "batch finalized"
        );
        Ok(())
    }

    /// Finalized → Processing; classify each intent against `settle_by`.
    pub(crate) fn enter_processing(
        &mut self,
        batch_id: BatchId,
        operator: Option<Address>,
        now: Timestamp,
    ) -> Result<(), VeilError> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        let settle_by = batch
            .settle_by
            .ok_or_else(|| VeilError::State(format!("{batch_id} has not been finalized")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Processing, now, None, None)?;
        let intent_ids = batch.intent_ids.clone();
        for id in &intent_ids {
            let Some(intent) = self.intents.get_mut(id) else {
                continue;
            };
            if intent.deadline < settle_by {
                intent.status = intent.status.transition(IntentStatus::Expired)?;
                self.release_collateral(id)?;
            } else {
                intent.status = intent.status.transition(IntentStatus::Matched)?;
            }
        }
        self.emit(LedgerEvent::BatchProcessing { batch_id, operator })?;
        tracing::info!(%batch_id, operator = ?operator, "batch processing");
        Ok(())
    }

    /// → Failed; every unsettled intent expires.
    pub(crate) fn fail_swap_batch(
        &mut self,
        batch_id: BatchId,
        now: Timestamp,
        reason: String,
    ) -> Result<(), VeilError> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Failed, now, None, Some(reason.clone()))?;
        let intent_ids = batch.intent_ids.clone();
        for id in &intent_ids {
            let Some(intent) = self.intents.get_mut(id) else {
                continue;
            };
            if !intent.status.is_terminal() {
                intent.status = intent.status.transition(IntentStatus::Expired)?;
                self.release_collateral(id)?;
            }
        }
        self.emit(LedgerEvent::BatchFailed {
            batch_id,
            reason: reason.clone(),
        })?;
        tracing::warn!(%batch_id, %reason, "batch failed");
        Ok(())
    }
}
