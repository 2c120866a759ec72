//! # Execution Plans
//!
//! Turns a batch's decrypted tasks into the ordered sequence of external
//! calls the committee will sign.
//!
//! ## Aggregation
//!
//! Tasks are grouped by `(decoder, target, selector)` together with every
//! non-amount argument and the attached value. For a call with a
//! registered [`ArgumentSchema`] the group's amount arguments are summed
//! and one call is built, so N transfers of the same token to the same
//! recipient become one transfer of the total. Calls without a schema are
//! never merged. Groups are ordered by the canonical position of their
//! first task, and tasks within a group keep canonical order.
//!
//! ## Digest
//!
//! [`plan_digest`] commits to `(batch_id, task_ids[], targets[],
//! calldatas[])` plus each step's value and domain, the per-step task
//! grouping, the expired list and the rejected list.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use veil_core::{
    sha256_digest, Address, Amount, CanonicalBytes, ContentDigest, DomainId, Plaintext, TaskId,
    Timestamp, UeiBatchId,
};

use crate::call::{encode_calldata, DecryptedTask};
use crate::error::UeiError;
use crate::schema::{CallKey, SchemaRegistry};

/// One external call in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Tasks served by this call, in canonical order.
    pub task_ids: Vec<TaskId>,
    /// Domain the call runs on.
    pub domain: DomainId,
    /// Call target.
    pub target: Address,
    /// `selector ‖ words`.
    pub calldata: Vec<u8>,
    /// Native value sent with the call.
    pub value: Amount,
}

/// The ordered sequence of calls for one UEI batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Batch the plan settles.
    pub batch_id: UeiBatchId,
    /// Calls in execution order.
    pub steps: Vec<PlanStep>,
    /// Tasks excluded because their deadline preceded the reference time.
    pub expired: Vec<TaskId>,
    /// Live tasks excluded because their call could not be built.
    pub rejected: Vec<TaskId>,
}

impl ExecutionPlan {
    /// Every task the plan names: served, expired or rejected.
    pub fn accounted_tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.task_ids()
            .chain(self.expired.iter())
            .chain(self.rejected.iter())
    }

    /// Every task served by some step, in step order.
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.steps.iter().flat_map(|s| s.task_ids.iter())
    }

    /// Steps that leave the local domain.
    pub fn cross_domain_steps(&self, local: DomainId) -> usize {
        self.steps.iter().filter(|s| s.domain != local).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey {
    call: CallKey,
    fixed_args: Vec<(usize, Plaintext)>,
    value: Amount,
}

struct Group {
    key: GroupKey,
    amount_index: usize,
    domain: DomainId,
    amount: Amount,
    value: Amount,
    template: Vec<Plaintext>,
    task_ids: Vec<TaskId>,
}

/// Build the execution plan for `tasks` (canonical order).
///
/// A task whose call cannot be built (arguments that do not fit its
/// schema, an unencodable argument, or an amount that would overflow its
/// group) is listed in [`ExecutionPlan::rejected`] and the rest of the
/// batch is planned without it. Only a duplicate task id fails the plan.
pub fn build_plan(
    batch_id: UeiBatchId,
    reference_time: Timestamp,
    tasks: &[DecryptedTask],
    registry: &SchemaRegistry,
    local_domain: DomainId,
) -> Result<ExecutionPlan, UeiError> {
    let mut seen = BTreeSet::new();
    for task in tasks {
        if !seen.insert(task.task_id) {
            return Err(UeiError::DuplicateTask(task.task_id));
        }
    }

    let mut planner = Planner {
        registry,
        local_domain,
        slots: Vec::new(),
        groups: Vec::new(),
        group_index: BTreeMap::new(),
    };
    let mut expired = Vec::new();
    let mut rejected = Vec::new();
    for task in tasks {
        if task.deadline < reference_time {
            expired.push(task.task_id);
            continue;
        }
        if let Err(e) = planner.admit(task) {
            tracing::warn!(batch_id = %batch_id, task_id = %task.task_id, error = %e, "task rejected from plan");
            rejected.push(task.task_id);
        }
    }

    let steps = planner.into_steps()?;
    let served: usize = steps.iter().map(|s| s.task_ids.len()).sum();
    tracing::debug!(
        batch_id = %batch_id,
        tasks = tasks.len(),
        expired = expired.len(),
        rejected = rejected.len(),
        steps = steps.len(),
        served,
        "execution plan built"
    );
    Ok(ExecutionPlan {
        batch_id,
        steps,
        expired,
        rejected,
    })
}

// Slots are either aggregated groups or single unschematized calls; both
// keep the canonical position of their first task.
enum Slot {
    Group(usize),
    Single(PlanStep),
}

struct Planner<'a> {
    registry: &'a SchemaRegistry,
    local_domain: DomainId,
    slots: Vec<Slot>,
    groups: Vec<Group>,
    group_index: BTreeMap<GroupKey, usize>,
}

impl Planner<'_> {
    /// Add `task` to the plan, or leave the plan untouched and say why not.
    fn admit(&mut self, task: &DecryptedTask) -> Result<(), UeiError> {
        let call = CallKey {
            decoder: task.decoder,
            target: task.target,
            selector: task.selector,
        };
        let Some(schema) = self.registry.lookup(&call) else {
            let calldata = encode_calldata(task.selector, &task.args).ok_or_else(|| {
                UeiError::ArgumentMismatch {
                    task: task.task_id,
                    reason: "selector cannot be passed as an argument".to_string(),
                }
            })?;
            self.slots.push(Slot::Single(PlanStep {
                task_ids: vec![task.task_id],
                domain: self.local_domain,
                target: task.target,
                calldata,
                value: task.value,
            }));
            return Ok(());
        };

        schema.check(task.task_id, &task.args)?;
        let amount = task
            .args
            .get(schema.amount_index)
            .and_then(Plaintext::as_uint)
            .ok_or_else(|| UeiError::ArgumentMismatch {
                task: task.task_id,
                reason: "amount argument is not an integer".to_string(),
            })?;
        let key = GroupKey {
            call,
            fixed_args: task
                .args
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != schema.amount_index)
                .map(|(i, a)| (i, *a))
                .collect(),
            value: task.value,
        };

        if let Some(&gi) = self.group_index.get(&key) {
            let group = &mut self.groups[gi];
            let overflow = || UeiError::ArithmeticOverflow { target: task.target };
            let total = group.amount.checked_add(amount).ok_or_else(overflow)?;
            let value = group.value.checked_add(task.value).ok_or_else(overflow)?;
            group.amount = total;
            group.value = value;
            group.task_ids.push(task.task_id);
            return Ok(());
        }
        self.group_index.insert(key.clone(), self.groups.len());
        self.slots.push(Slot::Group(self.groups.len()));
        self.groups.push(Group {
            key,
            amount_index: schema.amount_index,
            domain: schema.domain,
            amount,
            value: task.value,
            template: task.args.clone(),
            task_ids: vec![task.task_id],
        });
        Ok(())
    }

    fn into_steps(self) -> Result<Vec<PlanStep>, UeiError> {
        let mut steps = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            match slot {
                Slot::Single(step) => steps.push(step),
                Slot::Group(gi) => {
                    let group = &self.groups[gi];
                    let mut args = group.template.clone();
                    args[group.amount_index] = Plaintext::Uint(group.amount);
                    let calldata = encode_calldata(group.key.call.selector, &args).ok_or_else(|| {
                        UeiError::ArgumentMismatch {
                            task: group.task_ids[0],
                            reason: "selector cannot be passed as an argument".to_string(),
                        }
                    })?;
                    steps.push(PlanStep {
                        task_ids: group.task_ids.clone(),
                        domain: group.domain,
                        target: group.key.call.target,
                        calldata,
                        value: group.value,
                    });
                }
            }
        }
        Ok(steps)
    }
}

const PLAN_DOMAIN: &str = "veil/uei-plan/v1";

#[derive(Serialize)]
struct PlanCommitment<'a> {
    domain: &'static str,
    batch_id: UeiBatchId,
    task_ids: Vec<&'a TaskId>,
    targets: Vec<Address>,
    calldatas: Vec<String>,
    values: Vec<Amount>,
    domains: Vec<DomainId>,
    grouping: Vec<usize>,
    expired: &'a [TaskId],
    rejected: &'a [TaskId],
}

/// Canonical digest of an execution plan.
pub fn plan_digest(plan: &ExecutionPlan) -> Result<ContentDigest, UeiError> {
    let commitment = PlanCommitment {
        domain: PLAN_DOMAIN,
        batch_id: plan.batch_id,
        task_ids: plan.task_ids().collect(),
        targets: plan.steps.iter().map(|s| s.target).collect(),
        calldatas: plan
            .steps
            .iter()
            .map(|s| veil_core::digest::to_hex(&s.calldata))
            .collect(),
        values: plan.steps.iter().map(|s| s.value).collect(),
        domains: plan.steps.iter().map(|s| s.domain).collect(),
        grouping: plan.steps.iter().map(|s| s.task_ids.len()).collect(),
        expired: &plan.expired,
        rejected: &plan.rejected,
    };
    Ok(sha256_digest(&CanonicalBytes::new(&commitment)?))
}
