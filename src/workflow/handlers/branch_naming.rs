//! Creates the session's work branch, or re-checks out the one it already has.

use futures_util::future::BoxFuture;

use super::StepHandler;
use crate::git;
use crate::llm;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::workflow::context::ExecutionContext;
use crate::Result;

const SYSTEM_PROMPT: &str = "You are a Git Branch Name Generator. Generate a branch name from the user's goal and plan.
Rules:
1. Format: `type/short-description-kebab-case`
2. Allowed types: `feature`, `bugfix`, `hotfix`, `chore`, `docs`.
3. Never use colons or uppercase.
4. Do not include quotes or backticks.
5. Do not include the session ID; it is added automatically.
Respond with the branch name only.";

/// Names and checks out the work branch.
pub struct BranchNaming;

impl BranchNaming {
    async fn reuse(ctx: &ExecutionContext, state: &mut SessionState, branch: String) {
        ctx.log(
            state,
            format!("Branch name already exists: {branch}. Skipping generation."),
        )
        .await;

        match git::checkout_or_create_branch(ctx.sandbox.as_ref(), &branch).await {
            Ok(()) => {
                ctx.log(state, format!("Checked out branch {branch}.")).await;
                state.status = WorkflowStatus::Coding;
            }
            Err(err) => {
                ctx.log(state, format!("Branch checkout failed: {err}")).await;
                state.status = WorkflowStatus::Failed;
            }
        }
    }
}

impl StepHandler for BranchNaming {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(branch) = state.branch_name.clone() {
                Self::reuse(ctx, state, branch).await;
                return Ok(());
            }

            let user = format!(
                "Goal: {}\nPlan: {}\n\nGenerate the branch name.",
                state.goal,
                state.plan.as_deref().unwrap_or_default()
            );
            let raw = llm::ask(ctx.llm.as_ref(), SYSTEM_PROMPT, &user).await?;

            let mut branch = git::sanitize_branch_name(&raw);
            let suffix = git::branch_suffix(&state.session_id);
            if !branch.ends_with(&suffix) {
                branch.push_str(&suffix);
            }

            if !git::validate_branch_name(&branch) {
                ctx.log(
                    state,
                    format!(
                        "Generated branch name '{branch}' does not match {}.",
                        git::BRANCH_NAME_PATTERN
                    ),
                )
                .await;
                state.status = WorkflowStatus::Failed;
                return Ok(());
            }

            ctx.log(state, format!("Generated branch name: {branch}")).await;

            match git::create_branch(ctx.sandbox.as_ref(), &branch).await {
                Ok(()) => {
                    state.branch_name = Some(branch);
                    state.status = WorkflowStatus::Coding;
                }
                Err(err) => {
                    ctx.log(state, format!("Branch creation failed: {err}")).await;
                    state.status = WorkflowStatus::Failed;
                }
            }
            Ok(())
        })
    }
}
