//! Tool-calling agent loop.
//!
//! The model is called repeatedly; each requested tool runs in the
//! sandbox and its output is fed back until the model answers without
//! tool calls, emits the task's sentinel, or the round budget runs out.

use tracing::debug;

use super::{execute, truncate_output, ToolSet, LOGGED_OUTPUT_LIMIT};
use crate::llm::{ChatMessage, CompletionRequest};
use crate::workflow::context::ExecutionContext;
use crate::Result;

/// Final answer when the round budget is exhausted.
pub const MAX_ITERATIONS_OUTPUT: &str = "Agent stopped due to max iterations.";

/// One agent invocation.
pub struct AgentTask<'a> {
    /// System prompt.
    pub system_prompt: String,
    /// Opening user message.
    pub user_prompt: String,
    /// Tools the agent may call.
    pub tools: ToolSet,
    /// Text that marks the agent's work as done.
    pub sentinel: &'a str,
    /// Maximum model rounds.
    pub max_iterations: u32,
}

/// Outcome of an agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    /// Final answer text.
    pub output: String,
    /// Model rounds used.
    pub rounds: u32,
}

impl AgentRun {
    /// Whether the final answer contains `sentinel`.
    #[must_use]
    pub fn reached(&self, sentinel: &str) -> bool {
        self.output.contains(sentinel)
    }
}

/// Drive the agent to a final answer.
///
/// # Errors
///
/// Returns `AppError::Llm` if a model call fails. Tool failures are fed
/// back to the model instead.
pub async fn run_agent(ctx: &ExecutionContext, task: AgentTask<'_>) -> Result<AgentRun> {
    let mut messages = vec![ChatMessage::user(task.user_prompt)];
    let definitions = task.tools.definitions();

    for round in 1..=task.max_iterations {
        let request = CompletionRequest {
            system_prompt: task.system_prompt.clone(),
            messages: messages.clone(),
            tools: definitions.clone(),
        };
        let response = ctx.llm.complete(&request).await?;
        let text = response.text().to_owned();
        debug!(session_id = %ctx.session_id, round, calls = response.tool_calls.len(), "agent round");

        if response.tool_calls.is_empty() || text.contains(task.sentinel) {
            return Ok(AgentRun {
                output: text,
                rounds: round,
            });
        }

        messages.push(ChatMessage::Assistant {
            content: response.content.clone(),
            tool_calls: response.tool_calls.clone(),
        });

        for call in response.tool_calls {
            ctx.trace(&format!(
                "Executing tool '{}' with input: {}",
                call.name, call.arguments
            ))
            .await;

            let output = match task.tools.find(&call.name) {
                Some(tool) => execute(tool, &call.arguments, ctx.sandbox.as_ref()).await,
                None => format!("Error: unknown tool '{}'", call.name),
            };

            ctx.trace(&format!(
                "Tool output: {}",
                truncate_output(&output, LOGGED_OUTPUT_LIMIT)
            ))
            .await;

            messages.push(ChatMessage::Tool {
                tool_call_id: call.id,
                content: output,
            });
        }
    }

    Ok(AgentRun {
        output: MAX_ITERATIONS_OUTPUT.to_owned(),
        rounds: task.max_iterations,
    })
}
