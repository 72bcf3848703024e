//! Stages, commits and pushes the session's changes.

use futures_util::future::BoxFuture;
use tracing::warn;

use super::StepHandler;
use crate::git;
use crate::llm;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::tools::with_co_author;
use crate::workflow::context::ExecutionContext;
use crate::Result;

const SYSTEM_PROMPT: &str = "You are a Commit Message Generator following Conventional Commits. Generate a git commit message for the provided diff.
Rules:
1. Subject format: `type(scope): description`
2. Allowed types: `feat`, `fix`, `chore`, `docs`, `style`, `refactor`, `test`.
3. The subject is lowercase, present tense and under 50 characters.
4. Include a body separated from the subject by a blank line, explaining what changed and why.";

/// Strip wrapping quotes and backticks from a generated commit message.
#[must_use]
pub fn clean_commit_message(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim()
        .to_owned()
}

/// Commits everything and pushes the work branch.
pub struct CommitAndPush;

impl StepHandler for CommitAndPush {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let sandbox = ctx.sandbox.as_ref();
            let diff = git::stage_all_and_diff(sandbox).await?;

            if diff.trim().is_empty() {
                ctx.log(state, "No changes detected to commit.").await;
                state.status = WorkflowStatus::Completed;
                return Ok(());
            }

            let diff = git::truncate_diff(&diff, ctx.limits.diff_char_budget);
            let user = format!(
                "Goal: {}\nDiff:\n{diff}\n\nGenerate the commit message.",
                state.goal
            );
            let message = clean_commit_message(
                &llm::ask(ctx.llm.as_ref(), SYSTEM_PROMPT, &user).await?,
            );
            let message = with_co_author(&message, ctx.credentials.as_ref());
            ctx.log(state, format!("Generated commit message: {message}")).await;
            state.commit_message = Some(message.clone());

            if let Err(err) = git::commit(sandbox, &message).await {
                ctx.log(state, format!("Commit failed: {err}")).await;
                state.status = WorkflowStatus::Failed;
                return Ok(());
            }
            ctx.log(state, "Changes committed.").await;

            let Some(branch) = state.branch_name.clone() else {
                warn!(session_id = %state.session_id, "branch name missing, skipping push");
                ctx.log(state, "Warning: Branch name missing in state. Cannot push.")
                    .await;
                state.status = WorkflowStatus::Completed;
                return Ok(());
            };

            match git::push(sandbox, &branch, &state.base_branch).await {
                Ok(()) => {
                    ctx.log(state, format!("Pushed branch {branch} to origin.")).await;
                    state.status = WorkflowStatus::PrCreation;
                }
                Err(err) => {
                    ctx.log(state, format!("Push failed: {err}")).await;
                    state.status = WorkflowStatus::Failed;
                }
            }
            Ok(())
        })
    }
}
