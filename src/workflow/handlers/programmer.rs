//! Implements the plan with a tool-using agent.

use futures_util::future::BoxFuture;

use super::{StepHandler, CHANGES_COMPLETE};
use crate::models::state::{SessionState, WorkflowStatus};
use crate::tools::{run_agent, AgentTask, ToolSet};
use crate::workflow::context::ExecutionContext;
use crate::Result;

/// Model rounds per programming iteration.
pub const MAX_ITERATIONS: u32 = 15;

const SYSTEM_PROMPT: &str = "You are a Skilled Software Engineer. You have tools to modify the file system and run commands. Follow the plan to implement the requested changes. Do not commit changes; just modify the files. If there is review feedback, address it.";

/// Edits the workspace according to the plan and any feedback.
pub struct Programmer;

impl StepHandler for Programmer {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut context = format!("Plan:\n{}\n", state.plan.as_deref().unwrap_or_default());
            if let Some(feedback) = &state.review_feedback {
                context.push_str(&format!(
                    "\nReview Feedback (Fix these issues):\n{feedback}\n"
                ));
            }

            let task = AgentTask {
                system_prompt: SYSTEM_PROMPT.to_owned(),
                user_prompt: format!(
                    "Goal: {}\nContext:\n{context}\n\nExecute the necessary changes. When finished with the current iteration of changes, simply respond with '{CHANGES_COMPLETE}'.",
                    state.goal
                ),
                tools: ToolSet::programmer(),
                sentinel: CHANGES_COMPLETE,
                max_iterations: MAX_ITERATIONS,
            };

            let run = run_agent(ctx, task).await?;
            ctx.log(state, format!("Programmer output: {}", run.output)).await;
            state.status = WorkflowStatus::Testing;
            Ok(())
        })
    }
}
