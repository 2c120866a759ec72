//! # Plan Executor
//!
//! Runs a consensus-approved [`ExecutionPlan`] as one ordered sequence.
//!
//! 1. **Simulation.** Every local step is dry-run through
//!    [`CustodialVault::simulate`] before anything executes. A step that
//!    fails simulation fails the plan with no external effect.
//! 2. **Execution.** Steps run in order: local steps through the vault,
//!    steps for other domains through the relay. The first failure aborts
//!    the remaining steps.
//!
//! A failure in either stage fails the whole plan. Calls that already
//! succeeded before an execution-stage failure are not compensated.

use serde::{Deserialize, Serialize};
use veil_core::{ContentDigest, DomainId};

use crate::plan::ExecutionPlan;
use crate::vault::{CrossDomainRelay, CustodialVault};

/// Where a plan failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// During the dry run; nothing executed.
    Simulation,
    /// During execution; earlier steps already took effect.
    Execution,
}

/// What one successful step produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutput {
    /// Return data of a local call.
    Local(Vec<u8>),
    /// Message id of a relayed call.
    Relayed(ContentDigest),
}

/// Outcome of running a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanOutcome {
    /// Every step succeeded.
    Executed,
    /// A step failed; later steps were not attempted.
    Failed {
        /// Stage of the failing step.
        stage: FailureStage,
        /// Index of the failing step.
        step: usize,
        /// Failure reason.
        reason: String,
    },
}

/// Outcome plus the outputs of the steps that succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Overall outcome.
    pub outcome: PlanOutcome,
    /// Outputs of successfully executed steps, in order.
    pub outputs: Vec<StepOutput>,
}

impl ExecutionReport {
    /// Whether the plan executed completely.
    pub fn succeeded(&self) -> bool {
        self.outcome == PlanOutcome::Executed
    }
}

/// Drives plans through a vault and a relay.
pub struct PlanExecutor<'a> {
    vault: &'a dyn CustodialVault,
    relay: &'a dyn CrossDomainRelay,
    local_domain: DomainId,
}

impl<'a> PlanExecutor<'a> {
    /// Executor for the committee's `local_domain`.
    pub fn new(
        vault: &'a dyn CustodialVault,
        relay: &'a dyn CrossDomainRelay,
        local_domain: DomainId,
    ) -> Self {
        Self {
            vault,
            relay,
            local_domain,
        }
    }

    /// Simulate, then execute, `plan`.
    pub fn run(&self, plan: &ExecutionPlan) -> ExecutionReport {
        for (i, step) in plan.steps.iter().enumerate() {
            if step.domain != self.local_domain {
                continue;
            }
            if let Err(e) = self.vault.simulate(step.target, &step.calldata, step.value) {
                tracing::warn!(batch_id = %plan.batch_id, step = i, error = %e, "plan failed simulation");
                return ExecutionReport {
                    outcome: PlanOutcome::Failed {
                        stage: FailureStage::Simulation,
                        step: i,
                        reason: e.to_string(),
                    },
                    outputs: Vec::new(),
                };
            }
        }

        let mut outputs = Vec::with_capacity(plan.steps.len());
        for (i, step) in plan.steps.iter().enumerate() {
            let result = if step.domain == self.local_domain {
                self.vault
                    .execute(step.target, &step.calldata, step.value)
                    .map(StepOutput::Local)
                    .map_err(|e| e.to_string())
            } else {
                self.relay
                    .dispatch(step.domain, step.target, &step.calldata)
                    .map(StepOutput::Relayed)
                    .map_err(|e| e.to_string())
            };
            match result {
                Ok(output) => outputs.push(output),
                Err(reason) => {
                    tracing::warn!(
                        batch_id = %plan.batch_id,
                        step = i,
                        skipped = plan.steps.len() - i - 1,
                        %reason,
                        "plan aborted on failing step"
                    );
                    return ExecutionReport {
                        outcome: PlanOutcome::Failed {
                            stage: FailureStage::Execution,
                            step: i,
                            reason,
                        },
                        outputs,
                    };
                }
            }
        }
        tracing::info!(batch_id = %plan.batch_id, steps = plan.steps.len(), "plan executed");
        ExecutionReport {
            outcome: PlanOutcome::Executed,
            outputs,
        }
    }
}
