//! Plan approval workflow.
//!
//! Plans are created `Draft` and gated behind a human decision before the
//! executor ever sees them: approve everything, approve a single step (for
//! the step-by-step execution mode), or reject with a reason.

use crate::error::{AgentError, Result};
use crate::planner::{PlanStatus, StepStatus, TaskPlan};

/// A human decision about a draft plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Approve the whole plan for execution.
    ApproveAll,

    /// Approve execution of one specific step (step-by-step mode).
    ApproveStep {
        /// The step to approve.
        step_id: String,
    },

    /// Reject the plan, recording why.
    Reject {
        /// The reviewer's reason.
        reason: String,
    },
}

/// Apply an approval decision to a draft plan.
///
/// `ApproveAll` and `ApproveStep` move the plan to `Approved`; `Reject`
/// moves it to `Cancelled` with the reason recorded in the plan summary.
///
/// # Errors
///
/// Returns [`AgentError::ApprovalInvalid`] when the plan is not in `Draft`
/// (or already `Approved`, for step approvals), or when the referenced step
/// does not exist or is not pending.
pub fn apply_decision(mut plan: TaskPlan, decision: ApprovalDecision) -> Result<TaskPlan> {
    match decision {
        ApprovalDecision::ApproveAll => {
            if plan.status != PlanStatus::Draft {
                return Err(AgentError::ApprovalInvalid {
                    reason: format!("cannot approve a plan in status {}", plan.status),
                });
            }
            plan.status = PlanStatus::Approved;
            tracing::info!(plan_id = %plan.id, "plan approved");
            Ok(plan)
        }

        ApprovalDecision::ApproveStep { step_id } => {
            if !matches!(plan.status, PlanStatus::Draft | PlanStatus::Approved) {
                return Err(AgentError::ApprovalInvalid {
                    reason: format!("cannot approve a step in plan status {}", plan.status),
                });
            }
            let step = plan
                .step(&step_id)
                .ok_or_else(|| AgentError::ApprovalInvalid {
                    reason: format!("no such step `{step_id}`"),
                })?;
            if step.status != StepStatus::Pending {
                return Err(AgentError::ApprovalInvalid {
                    reason: format!("step `{step_id}` is not pending"),
                });
            }
            plan.status = PlanStatus::Approved;
            tracing::info!(plan_id = %plan.id, step_id = %step_id, "step approved");
            Ok(plan)
        }

        ApprovalDecision::Reject { reason } => {
            if plan.status != PlanStatus::Draft {
                return Err(AgentError::ApprovalInvalid {
                    reason: format!("cannot reject a plan in status {}", plan.status),
                });
            }
            tracing::info!(plan_id = %plan.id, reason = %reason, "plan rejected");
            plan.status = PlanStatus::Cancelled;
            plan.summary = Some(format!("Rejected: {reason}"));
            Ok(plan)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
