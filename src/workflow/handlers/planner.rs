//! Drafts the plan, or refines the existing one after critique or input.

use std::fmt::Write as _;

use futures_util::future::BoxFuture;

use super::StepHandler;
use crate::llm;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::workflow::context::ExecutionContext;
use crate::Result;

const SYSTEM_PROMPT: &str = "You are a Senior Technical Planner. Create a detailed, step-by-step plan to accomplish the user's goal in a software repository. The plan must be clear and actionable for a programmer.
{agents_md}
### GUIDING PRINCIPLES
1. Verification is mandatory: every step that modifies something includes a sub-step verifying the change.
2. Diagnose before action: for bug fixes, reproduce the issue or locate the root cause before fixing it.
3. Source over artifacts: never edit build output such as `dist/` or `build/`.

### CONTEXT & EXPLORATION
The file tree below may be truncated for large repositories. If the files to change are not obvious, start with an exploration phase: search for distinctive keywords, trace imports and calls, and list subdirectories. Do not guess file locations.

### GIT
The repository is already cloned and checked out to the base branch. Do NOT include steps for creating branches, committing or pushing; the system handles them.";

/// Produces `plan` and hands it to the critic.
pub struct Planner;

/// Extra context assembled from critique, pending input and the previous plan.
#[must_use]
pub fn planning_context(state: &SessionState) -> String {
    let mut context = String::new();

    if let Some(feedback) = &state.plan_critic_feedback {
        let _ = write!(
            context,
            "\nPrevious Plan Rejected. Critic Feedback: {feedback}\nPlease improve the plan."
        );
    }

    if !state.pending_inputs.is_empty() {
        let _ = write!(
            context,
            "\n\nUser Feedback/Input:\n{}\n\nINSTRUCTION: The user has provided feedback. Update the plan to address this input.",
            state.pending_inputs.join("\n")
        );
    }

    if let Some(plan) = &state.plan {
        let _ = write!(
            context,
            "\n\nExisting Plan:\n{plan}\n\nINSTRUCTION: The goal has been updated or feedback received. Refine the Existing Plan to accommodate the new requirements. Keep completed progress where possible."
        );
    }

    context
}

fn system_prompt(state: &SessionState) -> String {
    let agents_md = state
        .agents_md_content
        .as_deref()
        .map(|content| {
            format!(
                "\n### REPOSITORY SPECIFIC INSTRUCTIONS (AGENTS.md)\nYou MUST obey these instructions:\n{content}\n"
            )
        })
        .unwrap_or_default();
    SYSTEM_PROMPT.replace("{agents_md}", &agents_md)
}

impl StepHandler for Planner {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let files = match &state.codebase_tree {
                Some(tree) => tree.clone(),
                None => match ctx.sandbox.list_dir(".").await {
                    Ok(entries) => entries.join("\n"),
                    Err(err) => format!("Error listing files: {err}"),
                },
            };

            let user = format!(
                "Goal: {goal}\nRepo: {repo}\nBase Branch: {base}\nSession ID: {id}\nFiles:\n{files}\nContext: {context}\n\nPlease provide a numbered list of steps to achieve this.",
                goal = state.goal,
                repo = state.repo_url.as_deref().unwrap_or("(none)"),
                base = state.base_branch,
                id = state.session_id,
                context = planning_context(state),
            );

            let plan = llm::ask(ctx.llm.as_ref(), &system_prompt(state), &user).await?;
            ctx.log(state, format!("Plan generated: {plan}")).await;
            state.plan = Some(plan);
            state.status = WorkflowStatus::PlanCritic;
            Ok(())
        })
    }
}
