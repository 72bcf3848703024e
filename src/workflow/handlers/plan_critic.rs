//! Accepts or rejects the plan; review-mode sessions pause on acceptance.

use futures_util::future::BoxFuture;

use super::{StepHandler, APPROVED};
use crate::llm;
use crate::models::state::{SessionMode, SessionState, WorkflowStatus};
use crate::workflow::context::ExecutionContext;
use crate::Result;

const SYSTEM_PROMPT: &str = "You are a Technical Plan Critic. Review the proposed plan for safety, completeness, and feasibility. If the plan is good, respond with 'APPROVED'. If not, provide specific, constructive feedback on what steps are missing or dangerous.";

/// Reviews `plan` and routes to branch naming, a pause, or re-planning.
pub struct PlanCritic;

impl StepHandler for PlanCritic {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let user = format!(
                "Goal: {}\nProposed Plan:\n{}\n\nReview the plan.",
                state.goal,
                state.plan.as_deref().unwrap_or_default()
            );
            let feedback = llm::ask(ctx.llm.as_ref(), SYSTEM_PROMPT, &user).await?;

            if !feedback.contains(APPROVED) {
                state.status = WorkflowStatus::Planning;
                ctx.log(state, format!("Plan Critic Feedback: {feedback}")).await;
                state.plan_critic_feedback = Some(feedback);
                return Ok(());
            }

            state.plan_critic_feedback = None;
            if state.mode == SessionMode::Review {
                state.status = WorkflowStatus::WaitingForUser;
                state.next_status = Some(WorkflowStatus::BranchNaming);
                ctx.log(
                    state,
                    "Plan Critic Approved. Waiting for user approval before generating branch.",
                )
                .await;
            } else {
                state.status = WorkflowStatus::BranchNaming;
                ctx.log(state, "Plan Critic Approved.").await;
            }
            Ok(())
        })
    }
}
