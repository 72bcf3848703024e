//! Reviews the changes, growing more lenient with each rejection and
//! forcing approval once the retry budget is spent.

use futures_util::future::BoxFuture;

use super::{StepHandler, APPROVED};
use crate::models::state::{SessionState, WorkflowStatus};
use crate::tools::{run_agent, AgentTask, ToolSet};
use crate::workflow::context::ExecutionContext;
use crate::Result;

/// Model rounds per review.
pub const MAX_ITERATIONS: u32 = 5;
/// Rejections after which the reviewer is asked for leniency.
pub const LENIENT_AFTER: u32 = 2;
/// Rejections after which the changes are approved regardless.
pub const FORCE_APPROVAL_AT: u32 = 4;

const SYSTEM_PROMPT: &str = "You are a pragmatic Code Reviewer. Check the workspace to verify that the core goal has been met and the code is functionally correct. Use 'read_file' or 'run_command' (e.g. tests) to verify.
- Focus: core logic, correctness, security and regressions.
- Ignore: formatting, style preferences and comments unless they break the build.
If the core requirements are satisfied, respond with 'APPROVED'.";

const LENIENCY_NOTE: &str = " This is a subsequent review. Be even more lenient. Prioritize functional correctness over everything else. Do NOT request changes unless the code is broken.";

/// System prompt for a review after `review_count` rejections.
#[must_use]
pub fn system_prompt(review_count: u32) -> String {
    let mut prompt = SYSTEM_PROMPT.to_owned();
    if review_count >= LENIENT_AFTER {
        prompt.push_str(LENIENCY_NOTE);
    }
    prompt
}

/// Approves the changes for commit or returns them to coding.
pub struct Reviewer;

impl StepHandler for Reviewer {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let task = AgentTask {
                system_prompt: system_prompt(state.review_count),
                user_prompt: format!(
                    "Goal: {}\nPlan: {}\n\nVerify the changes. If good, say {APPROVED}. Otherwise, list critical changes needed.",
                    state.goal,
                    state.plan.as_deref().unwrap_or_default()
                ),
                tools: ToolSet::inspector(),
                sentinel: APPROVED,
                max_iterations: MAX_ITERATIONS,
            };

            let run = run_agent(ctx, task).await?;
            if run.reached(APPROVED) {
                state.review_feedback = None;
                state.status = WorkflowStatus::Committing;
                ctx.log(state, "Reviewer Approved. Proceeding to commit.").await;
                return Ok(());
            }

            state.review_count = (state.review_count + 1).min(FORCE_APPROVAL_AT);
            if state.review_count >= FORCE_APPROVAL_AT {
                state.review_feedback = None;
                state.status = WorkflowStatus::Committing;
                ctx.log(
                    state,
                    format!(
                        "Max review attempts reached. Forced approval of functional changes: {}",
                        run.output
                    ),
                )
                .await;
            } else {
                ctx.log(
                    state,
                    format!(
                        "Reviewer requested changes (Attempt {}): {}",
                        state.review_count, run.output
                    ),
                )
                .await;
                state.review_feedback = Some(run.output);
                state.status = WorkflowStatus::Coding;
            }
            Ok(())
        })
    }
}
