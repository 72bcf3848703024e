//! Drives a session through the workflow until it pauses or finishes.
//!
//! The engine owns the session for the duration of a run. After every
//! handler it persists the state, then checks the lifetime budget and
//! the pending-input queue. Human input interrupts the run between steps
//! except while coding, when it is held until the next checkpoint.

use tracing::{debug, info, info_span, warn, Instrument};

use super::context::ExecutionContext;
use super::handlers::NodeRegistry;
use super::router::route;
use crate::config::EngineConfig;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::{AppError, Result};

/// Logged when the lifetime step budget runs out.
pub const MAX_STEPS_MESSAGE: &str = "Max workflow steps reached.";
/// Logged when a single pass exceeds its recursion limit.
pub const RECURSION_LIMIT_MESSAGE: &str = "Max workflow steps reached (recursion limit).";
/// Logged when a pass stops for pending human input.
pub const INTERRUPTION_MESSAGE: &str = "Interruption: New user input received.";

/// Why a pass stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    /// The status no longer routes to a node.
    Stopped,
    /// Pending input arrived outside coding.
    Interrupted,
    /// The lifetime budget is used up.
    BudgetExhausted,
}

/// Workflow engine over a [`NodeRegistry`].
pub struct WorkflowEngine {
    registry: NodeRegistry,
    limits: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine dispatching through `registry`.
    #[must_use]
    pub fn new(registry: NodeRegistry, limits: EngineConfig) -> Self {
        Self { registry, limits }
    }

    /// Run `state` until it reaches `WAITING_FOR_USER`, `COMPLETED` or
    /// `FAILED`, and return the final state.
    ///
    /// Handler errors do not escape; they mark the session `FAILED`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Serialization` if the state
    /// cannot be persisted, and `AppError::Workflow` if a node has no
    /// registered handler.
    pub async fn run(&self, ctx: &ExecutionContext, mut state: SessionState) -> Result<SessionState> {
        let span = info_span!("workflow_run", session_id = %state.session_id);
        async move {
            loop {
                if state.status.is_terminal() {
                    break;
                }

                if state.steps_taken >= self.limits.max_steps {
                    state.status = WorkflowStatus::Failed;
                    ctx.log(&mut state, MAX_STEPS_MESSAGE).await;
                    ctx.store.save_state(&state).await?;
                    break;
                }

                if self.absorb_pending_input(ctx, &mut state).await? {
                    continue;
                }

                let outcome = self.run_pass(ctx, &mut state).await?;
                debug!(?outcome, status = %state.status, "workflow pass finished");
            }

            info!(status = %state.status, steps = state.steps_taken, "workflow run finished");
            Ok(state)
        }
        .instrument(span)
        .await
    }

    /// Fold pending input into the goal unless the session is coding.
    /// Returns whether input was absorbed.
    async fn absorb_pending_input(&self, ctx: &ExecutionContext, state: &mut SessionState) -> Result<bool> {
        let pending = ctx.store.get_pending_inputs(&state.session_id).await?;
        if pending.is_empty() || state.status == WorkflowStatus::Coding {
            return Ok(false);
        }

        ctx.log(state, format!("Received user inputs: {pending:?}")).await;
        state.fold_inputs(&pending);

        if !ctx
            .store
            .remove_pending_prefix(&state.session_id, pending.len())
            .await?
        {
            warn!(count = pending.len(), "pending input shrank before removal");
        }
        state.pending_inputs = ctx.store.get_pending_inputs(&state.session_id).await?;
        ctx.store.save_state(state).await?;
        Ok(true)
    }

    async fn run_pass(&self, ctx: &ExecutionContext, state: &mut SessionState) -> Result<PassOutcome> {
        let remaining = self.limits.max_steps.saturating_sub(state.steps_taken);
        let pass_limit = self
            .limits
            .recursion_limit
            .map_or(remaining + 2, |limit| limit.min(remaining + 2));
        let mut pass_steps = 0u32;

        loop {
            let Some(node) = route(state) else {
                return Ok(PassOutcome::Stopped);
            };

            if pass_steps >= pass_limit {
                state.status = WorkflowStatus::Failed;
                ctx.log(state, RECURSION_LIMIT_MESSAGE).await;
                ctx.store.save_state(state).await?;
                return Ok(PassOutcome::Stopped);
            }

            let handler = self
                .registry
                .get(node)
                .ok_or_else(|| AppError::Workflow(format!("no handler registered for {node}")))?;

            let from = state.status;
            let outcome = handler
                .run(state, ctx)
                .instrument(info_span!("workflow_step", node = node.name()))
                .await;

            state.steps_taken += 1;
            pass_steps += 1;

            match outcome {
                Ok(()) if node.allows(state.status) => {
                    info!(node = node.name(), from = %from, to = %state.status, "step completed");
                }
                Ok(()) => {
                    let reason = format!(
                        "Illegal transition from {node} to {}; marking session failed.",
                        state.status
                    );
                    warn!(node = node.name(), to = %state.status, "illegal transition");
                    state.status = WorkflowStatus::Failed;
                    ctx.log(state, reason).await;
                }
                Err(err) => {
                    warn!(node = node.name(), %err, "step failed");
                    state.status = WorkflowStatus::Failed;
                    ctx.log(state, format!("Workflow error: {err}")).await;
                }
            }

            ctx.store.save_state(state).await?;

            if state.status.is_terminal() {
                return Ok(PassOutcome::Stopped);
            }

            if state.steps_taken >= self.limits.max_steps {
                return Ok(PassOutcome::BudgetExhausted);
            }

            let pending = ctx.store.get_pending_inputs(&state.session_id).await?;
            if !pending.is_empty() && state.status != WorkflowStatus::Coding {
                ctx.log(state, INTERRUPTION_MESSAGE).await;
                ctx.store.save_state(state).await?;
                return Ok(PassOutcome::Interrupted);
            }
        }
    }
}
