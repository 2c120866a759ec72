//! # UEI Batches
//!
//! The arbitrary-call counterpart of swap batching. There is always exactly
//! one rolling UEI batch collecting tasks. It closes once no task arrived
//! for `uei_idle_timeout_secs` (or on admin override), and a fresh one opens
//! immediately.
//!
//! Settling a UEI batch executes its attested [`ExecutionPlan`]. Unlike a
//! swap settlement, an execution failure is terminal: the batch becomes
//! `Failed`, every task in the plan becomes `Failed`, and the call still
//! returns an `Execution` error to the submitter.
//!
//! A task the committee could not build a call for is listed in the plan's
//! `rejected` set and ends `Rejected`; it never blocks the rest of the
//! batch.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use veil_core::{
    Address, Amount, ContentDigest, PlaintextKind, TaskId, Timestamp, UeiBatchId, VeilError,
};
use veil_crypto::Attestation;
use veil_state::{BatchStatus, TaskStatus};
use veil_uei::{
    plan_digest, ArgumentSchema, CallKey, ExecutionPlan, ExecutionReport, PlanExecutor, PlanOutcome,
};

use crate::consensus::check_threshold;
use crate::events::LedgerEvent;
use crate::ledger::{derive_id, Ledger};
use crate::records::{TaskPayload, TaskRecord, UeiBatch};

const TASK_ID_DOMAIN: &str = "veil/task/v1";

/// What an executed UEI plan did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UeiSettlementReceipt {
    /// Settled batch.
    pub batch_id: UeiBatchId,
    /// Attested plan digest.
    pub digest: ContentDigest,
    /// Committee members whose attestations counted.
    pub signers: Vec<Address>,
    /// Per-step results.
    pub report: ExecutionReport,
}

impl Ledger {
    /// Register the argument schema that lets calls matching `key` be
    /// aggregated. Admin only.
    pub fn register_schema(
        &mut self,
        caller: &Address,
        key: CallKey,
        schema: ArgumentSchema,
    ) -> Result<(), VeilError> {
        self.require_admin(caller, "register argument schemas")?;
        self.schemas.register(key, schema)?;
        Ok(())
    }

    /// Accept a UEI task into the rolling batch.
    pub fn submit_task(&mut self, submitter: Address, payload: TaskPayload) -> Result<TaskId, VeilError> {
        let now = self.now();
        if payload.deadline <= now {
            return Err(VeilError::Temporal(format!(
                "deadline {} is not after ledger time {now}",
                payload.deadline
            )));
        }
        let compute = &self.services.compute;
        compute.verify_input_kind(&payload.call.decoder, submitter, PlaintextKind::Address)?;
        compute.verify_input_kind(&payload.call.target, submitter, PlaintextKind::Address)?;
        compute.verify_input_kind(&payload.call.selector, submitter, PlaintextKind::Selector)?;
        for (i, arg) in payload.call.args.iter().enumerate() {
            if compute.verify_input(arg, submitter)? == PlaintextKind::Selector {
                return Err(VeilError::Validation(format!(
                    "argument {i} is a selector and cannot be encoded"
                )));
            }
        }

        let sequence = self.next_sequence;
        let task_id = TaskId(derive_id(TASK_ID_DOMAIN, &submitter, &payload, sequence)?);
        if self.tasks.contains_key(&task_id) {
            return Err(VeilError::Validation(format!("{task_id} already exists")));
        }
        let batch_id = self.current_uei_batch;
        let batch = self
            .uei_batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::State(format!("{batch_id} is missing")))?;
        batch.task_ids.push(task_id);
        batch.last_submission_at = Some(now);
        self.tasks.insert(
            task_id,
            TaskRecord {
                task_id,
                submitter,
                call: payload.call,
                value: payload.value,
                deadline: payload.deadline,
                batch_id,
                sequence,
                status: TaskStatus::Pending,
            },
        );
        self.next_sequence += 1;
        self.emit(LedgerEvent::TaskSubmitted {
            task_id,
            batch_id,
            submitter,
        })?;
        tracing::info!(%task_id, %batch_id, %submitter, "task submitted");
        Ok(task_id)
    }

    /// Close the rolling UEI batch and open the next one.
    pub fn finalize_uei_batch(&mut self, caller: &Address, force: bool) -> Result<UeiBatchId, VeilError> {
        let now = self.now();
        let batch_id = self.current_uei_batch;
        let batch = self
            .uei_batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::State(format!("{batch_id} is missing")))?;
        if batch.task_ids.is_empty() {
            return Err(VeilError::State(format!("{batch_id} is empty")));
        }
        if force {
            self.require_admin(caller, "force finalization")?;
        } else {
            let last = batch.last_submission_at.unwrap_or(batch.created_at);
            if !now.has_elapsed(last, self.config.uei_idle_timeout_secs) {
                return Err(VeilError::Temporal(format!(
                    "{batch_id} received a task {}s ago; the idle timeout is {}s",
                    now.seconds_since(last),
                    self.config.uei_idle_timeout_secs
                )));
            }
        }

        let drawn = self.draw_committee(format!("uei:{}", batch_id.0))?;
        let settle_by = self.settle_by(now)?;
        for task_id in &batch.task_ids {
            let Some(task) = self.tasks.get(task_id) else {
                continue;
            };
            for handle in task.call.handles() {
                for member in &drawn.committee {
                    self.services.compute.grant_decrypt_permission(handle, *member)?;
                }
            }
        }

        let batch = self
            .uei_batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::State(format!("{batch_id} is missing")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Finalized, now, Some(drawn.evidence.seed.seed), None)?;
        batch.finalized_at = Some(now);
        batch.settle_by = Some(settle_by);
        batch.committee = drawn.committee.clone();
        batch.selection = Some(drawn.evidence.clone());
        let task_count = batch.task_ids.len();

        let next = UeiBatchId(batch_id.0 + 1);
        self.uei_batches.insert(next, UeiBatch::open(next, now));
        self.current_uei_batch = next;

        self.emit(LedgerEvent::UeiBatchFinalized {
            batch_id,
            committee: drawn.committee.clone(),
            selection: drawn.evidence,
            task_count,
        })?;
        tracing::info!(%batch_id, tasks = task_count, committee = ?drawn.committee, "uei batch finalized");
        Ok(batch_id)
    }

    /// A committee member acknowledges a finalized UEI batch.
    pub fn begin_uei_processing(&mut self, operator: &Address, batch_id: UeiBatchId) -> Result<(), VeilError> {
        let now = self.now();
        let batch = self.uei_batch_record(batch_id)?;
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
        self.enter_uei_processing(batch_id, Some(*operator), now)
    }

    /// Execute the attested plan of a UEI batch.
    ///
    /// Returns `Execution` if the plan failed; the failure has then already
    /// been recorded and the batch is `Failed`.
    pub fn settle_uei_batch(
        &mut self,
        batch_id: UeiBatchId,
        plan: &ExecutionPlan,
        attestations: &[Attestation],
    ) -> Result<UeiSettlementReceipt, VeilError> {
        let now = self.now();
        let batch = self.uei_batch_record(batch_id)?;
        match batch.status() {
            BatchStatus::Finalized | BatchStatus::Processing => {}
            BatchStatus::Settled => {
                return Err(VeilError::State(format!("{batch_id} is already settled")));
            }
            other => {
                return Err(VeilError::State(format!(
                    "{batch_id} is {other} and cannot be settled"
                )));
            }
        }
        self.check_response_window(&batch_id, batch.settle_by, now)?;
        self.validate_plan(batch, plan)?;
        let digest = plan_digest(plan)?;
        let committee = batch.committee.clone();

        if batch.status() == BatchStatus::Finalized {
            self.enter_uei_processing(batch_id, None, now)?;
        }
        let signers = check_threshold(
            self.services.verifier.as_ref(),
            &digest,
            attestations,
            &committee,
            self.config.min_attestations,
        )
        .map_err(|e| {
            tracing::warn!(%batch_id, error = %e, "plan rejected by consensus gate");
            e
        })?;

        let report = PlanExecutor::new(
            self.services.vault.as_ref(),
            self.services.relay.as_ref(),
            self.config.local_domain,
        )
        .run(plan);

        match report.outcome.clone() {
            PlanOutcome::Executed => {
                self.close_uei_batch(batch_id, plan, now, BatchStatus::Settled, TaskStatus::Executed, Some(digest), None)?;
                self.emit(LedgerEvent::UeiBatchSettled {
                    batch_id,
                    digest,
                    signers: signers.clone(),
                    steps: plan.steps.len(),
                })?;
                tracing::info!(%batch_id, %digest, steps = plan.steps.len(), "uei batch settled");
                Ok(UeiSettlementReceipt {
                    batch_id,
                    digest,
                    signers,
                    report,
                })
            }
            PlanOutcome::Failed { stage, step, reason } => {
                let reason = format!("step {step} failed during {stage:?}: {reason}");
                self.close_uei_batch(
                    batch_id,
                    plan,
                    now,
                    BatchStatus::Failed,
                    TaskStatus::Failed,
                    Some(digest),
                    Some(reason.clone()),
                )?;
                self.emit(LedgerEvent::UeiBatchFailed {
                    batch_id,
                    reason: reason.clone(),
                })?;
                tracing::warn!(%batch_id, %reason, "uei plan failed; batch failed");
                Err(VeilError::Execution(reason))
            }
        }
    }

    /// Abandon a UEI batch whose response window lapsed.
    pub fn expire_uei_batch(&mut self, batch_id: UeiBatchId) -> Result<(), VeilError> {
        let now = self.now();
        let batch = self.uei_batch_record(batch_id)?;
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
        let reason = "response window expired".to_string();
        let batch = self
            .uei_batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::State(format!("{batch_id} is missing")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Failed, now, None, Some(reason.clone()))?;
        let task_ids = batch.task_ids.clone();
        for id in &task_ids {
            if let Some(task) = self.tasks.get_mut(id) {
                if !task.status.is_terminal() {
                    task.status = task.status.transition(TaskStatus::Expired)?;
                }
            }
        }
        self.emit(LedgerEvent::UeiBatchFailed {
            batch_id,
            reason: reason.clone(),
        })?;
        tracing::warn!(%batch_id, %reason, "uei batch failed");
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn uei_batch_record(&self, batch_id: UeiBatchId) -> Result<&UeiBatch, VeilError> {
        self.uei_batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))
    }

    fn enter_uei_processing(
        &mut self,
        batch_id: UeiBatchId,
        operator: Option<Address>,
        now: Timestamp,
    ) -> Result<(), VeilError> {
        let batch = self
            .uei_batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Processing, now, None, None)?;
        self.emit(LedgerEvent::UeiBatchProcessing { batch_id, operator })?;
        tracing::info!(%batch_id, operator = ?operator, "uei batch processing");
        Ok(())
    }

    /// Every batch task is served, expired or rejected exactly once, step
    /// values match the tasks' attached values, and the expired set follows
    /// the public deadlines against `settle_by`.
    fn validate_plan(&self, batch: &UeiBatch, plan: &ExecutionPlan) -> Result<(), VeilError> {
        let batch_id = batch.batch_id;
        if plan.batch_id != batch_id {
            return Err(VeilError::Validation(format!(
                "plan is for {}, not {batch_id}",
                plan.batch_id
            )));
        }
        let settle_by = batch
            .settle_by
            .ok_or_else(|| VeilError::State(format!("{batch_id} has not been finalized")))?;

        let mut seen: BTreeSet<TaskId> = BTreeSet::new();
        for id in plan.accounted_tasks() {
            if !seen.insert(*id) {
                return Err(VeilError::Validation(format!("{id} appears more than once in the plan")));
            }
        }
        let members: BTreeSet<TaskId> = batch.task_ids.iter().copied().collect();
        if seen != members {
            return Err(VeilError::Validation(format!(
                "plan covers {} tasks, {batch_id} holds {}",
                seen.len(),
                members.len()
            )));
        }

        let expired: BTreeSet<TaskId> = plan.expired.iter().copied().collect();
        let mut values: BTreeMap<TaskId, Amount> = BTreeMap::new();
        for id in &batch.task_ids {
            let task = self
                .tasks
                .get(id)
                .ok_or_else(|| VeilError::Validation(format!("unknown {id}")))?;
            if (task.deadline < settle_by) != expired.contains(id) {
                return Err(VeilError::Validation(format!(
                    "{id}: expired set disagrees with its deadline"
                )));
            }
            values.insert(*id, task.value);
        }

        for (i, step) in plan.steps.iter().enumerate() {
            if step.task_ids.is_empty() {
                return Err(VeilError::Validation(format!("step {i} serves no task")));
            }
            let total = step
                .task_ids
                .iter()
                .try_fold(0 as Amount, |acc, id| acc.checked_add(values.get(id).copied().unwrap_or(0)))
                .ok_or_else(|| VeilError::Validation(format!("step {i} value overflows")))?;
            if total != step.value {
                return Err(VeilError::Validation(format!(
                    "step {i} sends {} but its tasks attach {total}",
                    step.value
                )));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn close_uei_batch(
        &mut self,
        batch_id: UeiBatchId,
        plan: &ExecutionPlan,
        now: Timestamp,
        to: BatchStatus,
        task_outcome: TaskStatus,
        digest: Option<ContentDigest>,
        reason: Option<String>,
    ) -> Result<(), VeilError> {
        let batch = self
            .uei_batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        batch.lifecycle.try_transition(to, now, digest, reason)?;
        batch.plan_digest = digest;
        for id in plan.task_ids() {
            if let Some(task) = self.tasks.get_mut(id) {
                task.status = task.status.transition(task_outcome)?;
            }
        }
        for id in &plan.expired {
            if let Some(task) = self.tasks.get_mut(id) {
                task.status = task.status.transition(TaskStatus::Expired)?;
            }
        }
        for id in &plan.rejected {
            if let Some(task) = self.tasks.get_mut(id) {
                task.status = task.status.transition(TaskStatus::Rejected)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compute::ConfidentialCompute;
    use crate::records::TaskPayload;
    use crate::testing::{admin, user, Fixture, DECODER, RAW_TARGET, TOKEN, TRANSFER};
    use veil_core::{DomainId, Plaintext, VeilError};
    use veil_state::{BatchStatus, TaskStatus};
    use veil_uei::{plan_digest, ArgKind, ArgumentSchema, CallKey, EncryptedCall};

    #[test]
    fn idle_timeout_gates_finalization() {
        let mut fx = Fixture::new();
        fx.submit_transfer(1, 9, 100, 600);
        fx.clock.advance(10);
        fx.submit_transfer(2, 9, 50, 600);
        fx.clock.advance(10);
        assert!(matches!(
            fx.ledger.finalize_uei_batch(&user(5), false),
            Err(VeilError::Temporal(_))
        ));
        fx.clock.advance(5);
        let closed = fx.ledger.finalize_uei_batch(&user(5), false).unwrap();
        assert_eq!(fx.ledger.uei_batch(closed).unwrap().status(), BatchStatus::Finalized);
        assert_ne!(fx.ledger.current_uei_batch(), closed);
        assert!(matches!(
            fx.ledger.finalize_uei_batch(&admin(), true),
            Err(VeilError::State(_))
        ));
        fx.ledger.verify_uei_committee(closed).unwrap();
    }

    #[test]
    fn aggregated_plan_executes_once() {
        let mut fx = Fixture::new();
        let tasks: Vec<_> = (1..=3).map(|n| fx.submit_transfer(n, 9, 100 * n as u64, 600)).collect();
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        assert_eq!(plan.steps.len(), 1);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        let receipt = fx.ledger.settle_uei_batch(batch_id, &plan, &atts).unwrap();
        assert!(receipt.report.succeeded());
        assert_eq!(fx.vault.executed().len(), 1);
        for t in &tasks {
            assert_eq!(fx.ledger.task(t).unwrap().status, TaskStatus::Executed);
        }
        assert!(matches!(
            fx.ledger.settle_uei_batch(batch_id, &plan, &atts),
            Err(VeilError::State(_))
        ));
    }

    #[test]
    fn failing_step_fails_every_task() {
        let mut fx = Fixture::new();
        let a = fx.submit_transfer(1, 9, 100, 600);
        let b = fx.submit_call(2, RAW_TARGET, vec![Plaintext::Uint(1)], 5, 600);
        fx.vault.revert_on_execute(RAW_TARGET, "paused");
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        assert_eq!(plan.steps.len(), 2);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        assert!(matches!(
            fx.ledger.settle_uei_batch(batch_id, &plan, &atts),
            Err(VeilError::Execution(_))
        ));
        assert_eq!(fx.ledger.uei_batch(batch_id).unwrap().status(), BatchStatus::Failed);
        assert_eq!(fx.ledger.task(&a).unwrap().status, TaskStatus::Failed);
        assert_eq!(fx.ledger.task(&b).unwrap().status, TaskStatus::Failed);
        assert_eq!(fx.ledger.events().records().last().unwrap().event.kind(), "uei_batch_failed");
    }

    #[test]
    fn failure_at_middle_step_fails_all_three_tasks() {
        let mut fx = Fixture::new();
        let first = fx.submit_transfer(1, 9, 100, 600);
        let middle = fx.submit_call(2, RAW_TARGET, vec![Plaintext::Uint(7)], 0, 600);
        let last = fx.submit_transfer(3, 8, 100, 600);
        fx.vault.revert_on_execute(RAW_TARGET, "paused");
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[1].task_ids, vec![middle]);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);

        let err = fx.ledger.settle_uei_batch(batch_id, &plan, &atts).unwrap_err();
        assert!(matches!(&err, VeilError::Execution(reason) if reason.starts_with("step 1 failed")));
        assert_eq!(fx.vault.executed().len(), 1);
        assert_eq!(fx.ledger.uei_batch(batch_id).unwrap().status(), BatchStatus::Failed);
        for id in [first, middle, last] {
            assert_eq!(fx.ledger.task(&id).unwrap().status, TaskStatus::Failed);
        }
    }

    #[test]
    fn mismatched_task_is_rejected_and_the_rest_execute() {
        let mut fx = Fixture::new();
        let good = fx.submit_transfer(1, 9, 100, 600);
        let bad = fx.submit_call(2, TOKEN, vec![Plaintext::Uint(1), Plaintext::Uint(2)], 0, 600);
        let other = fx.submit_transfer(3, 8, 50, 600);
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        assert_eq!(plan.rejected, vec![bad]);
        assert_eq!(plan.steps.len(), 2);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        fx.ledger.settle_uei_batch(batch_id, &plan, &atts).unwrap();
        assert_eq!(fx.ledger.uei_batch(batch_id).unwrap().status(), BatchStatus::Settled);
        assert_eq!(fx.ledger.task(&good).unwrap().status, TaskStatus::Executed);
        assert_eq!(fx.ledger.task(&other).unwrap().status, TaskStatus::Executed);
        assert_eq!(fx.ledger.task(&bad).unwrap().status, TaskStatus::Rejected);
        assert_eq!(fx.vault.executed().len(), 2);
    }

    #[test]
    fn call_fields_must_have_the_right_kind() {
        let mut fx = Fixture::new();
        let owner = user(1);
        let enc = |p: Plaintext| fx.compute.encrypt(p, owner).unwrap();
        let call = |selector: Plaintext, arg: Plaintext| EncryptedCall {
            decoder: enc(Plaintext::Address(DECODER)),
            target: enc(Plaintext::Address(TOKEN)),
            selector: enc(selector),
            args: vec![enc(arg)],
        };
        let deadline = fx.ledger.now().plus_secs(600).unwrap();
        let wrong_selector = TaskPayload {
            call: call(Plaintext::Uint(5), Plaintext::Uint(1)),
            value: 0,
            deadline,
        };
        let selector_argument = TaskPayload {
            call: call(Plaintext::Selector(TRANSFER), Plaintext::Selector(TRANSFER)),
            value: 0,
            deadline,
        };
        for payload in [wrong_selector, selector_argument] {
            assert!(matches!(
                fx.ledger.submit_task(owner, payload),
                Err(VeilError::Validation(_))
            ));
        }
        assert!(fx.ledger.uei_batch(fx.ledger.current_uei_batch()).unwrap().task_ids.is_empty());
    }

    #[test]
    fn simulation_failure_executes_nothing() {
        let mut fx = Fixture::new();
        fx.submit_transfer(1, 9, 100, 600);
        fx.submit_call(2, RAW_TARGET, vec![Plaintext::Uint(1)], 0, 600);
        fx.vault.revert_on_simulate(RAW_TARGET, "would revert");
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        assert!(fx.ledger.settle_uei_batch(batch_id, &plan, &atts).is_err());
        assert!(fx.vault.executed().is_empty());
        assert_eq!(fx.ledger.uei_batch(batch_id).unwrap().status(), BatchStatus::Failed);
    }

    #[test]
    fn tasks_past_deadline_are_expired_in_plan() {
        let mut fx = Fixture::new();
        let late = fx.submit_transfer(1, 9, 100, 5);
        let kept = fx.submit_transfer(2, 9, 100, 600);
        fx.clock.advance(20);
        let batch_id = fx.ledger.finalize_uei_batch(&user(3), false).unwrap();
        let plan = fx.build_plan(batch_id);
        assert_eq!(plan.expired, vec![late]);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        fx.ledger.settle_uei_batch(batch_id, &plan, &atts).unwrap();
        assert_eq!(fx.ledger.task(&late).unwrap().status, TaskStatus::Expired);
        assert_eq!(fx.ledger.task(&kept).unwrap().status, TaskStatus::Executed);
    }

    #[test]
    fn schema_registration_is_admin_only() {
        let mut fx = Fixture::new();
        let key = CallKey {
            decoder: DECODER,
            target: RAW_TARGET,
            selector: TRANSFER,
        };
        let schema = ArgumentSchema {
            name: "transfer".into(),
            args: vec![ArgKind::Address, ArgKind::Uint],
            amount_index: 1,
            domain: fx.ledger.config().local_domain,
        };
        assert!(matches!(
            fx.ledger.register_schema(&user(1), key, schema.clone()),
            Err(VeilError::Validation(_))
        ));
        fx.ledger.register_schema(&admin(), key, schema).unwrap();
        assert!(fx.ledger.schemas().lookup(&key).is_some());
    }

    #[test]
    fn cross_domain_steps_go_through_the_relay() {
        let mut fx = Fixture::new();
        let key = CallKey {
            decoder: DECODER,
            target: RAW_TARGET,
            selector: TRANSFER,
        };
        let schema = ArgumentSchema {
            name: "bridge".into(),
            args: vec![ArgKind::Uint],
            amount_index: 0,
            domain: DomainId(2),
        };
        fx.ledger.register_schema(&admin(), key, schema).unwrap();
        fx.submit_call(1, RAW_TARGET, vec![Plaintext::Uint(40)], 0, 600);
        fx.submit_call(2, RAW_TARGET, vec![Plaintext::Uint(60)], 0, 600);
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let plan = fx.build_plan(batch_id);
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee[1..]);
        fx.ledger.settle_uei_batch(batch_id, &plan, &atts).unwrap();
        let relayed = fx.relay.dispatched();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].domain, DomainId(2));
        assert!(fx.vault.executed().is_empty());
    }

    #[test]
    fn response_window_expiry() {
        let mut fx = Fixture::new();
        let task = fx.submit_transfer(1, 9, 100, 6000);
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        assert!(matches!(fx.ledger.expire_uei_batch(batch_id), Err(VeilError::Temporal(_))));
        fx.clock.advance(301);
        fx.ledger.expire_uei_batch(batch_id).unwrap();
        assert_eq!(fx.ledger.uei_batch(batch_id).unwrap().status(), BatchStatus::Failed);
        assert_eq!(fx.ledger.task(&task).unwrap().status, TaskStatus::Expired);
    }

    #[test]
    fn plan_must_cover_the_batch() {
        let mut fx = Fixture::new();
        fx.submit_transfer(1, 9, 100, 600);
        fx.submit_transfer(2, 8, 100, 600);
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let mut plan = fx.build_plan(batch_id);
        plan.steps.pop();
        let committee = fx.ledger.uei_batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&plan_digest(&plan).unwrap(), &committee);
        assert!(matches!(
            fx.ledger.settle_uei_batch(batch_id, &plan, &atts),
            Err(VeilError::Validation(_))
        ));
        assert!(fx.vault.executed().is_empty());
    }

    #[test]
    fn selector_is_hidden_until_decrypted() {
        let mut fx = Fixture::new();
        let task = fx.submit_transfer(1, 9, 100, 600);
        let record = fx.ledger.task(&task).unwrap().clone();
        let handles = record.call.handles();
        let batch_id = fx.ledger.finalize_uei_batch(&admin(), true).unwrap();
        let member = fx.ledger.uei_batch(batch_id).unwrap().committee[0];
        let plain = fx.decrypt(fx.operator_key(&member), &handles).unwrap();
        assert_eq!(plain[2].as_selector(), Some(TRANSFER));
    }
}
