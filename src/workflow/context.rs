//! Per-session handle giving step handlers their collaborators.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::control_plane::{ControlPlane, GitCredentials};
use crate::llm::LlmClient;
use crate::models::state::SessionState;
use crate::persistence::state_store::StateStore;
use crate::sandbox::Sandbox;

/// Everything a handler may touch while running one step.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Session being executed.
    pub session_id: String,
    /// Workspace the session's commands run in.
    pub sandbox: Arc<dyn Sandbox>,
    /// Model client.
    pub llm: Arc<dyn LlmClient>,
    /// Store used for log lines and interruption checks.
    pub store: Arc<dyn StateStore>,
    /// Control-plane client, when one is configured.
    pub control_plane: Option<Arc<dyn ControlPlane>>,
    /// Git credentials fetched for the session.
    pub credentials: Option<GitCredentials>,
    /// Engine budgets and thresholds.
    pub limits: EngineConfig,
}

impl ExecutionContext {
    /// Record a trace line on the state, in the store log and in `tracing`.
    ///
    /// A failed store write is logged and otherwise ignored.
    pub async fn log(&self, state: &mut SessionState, line: impl Into<String>) {
        let line = line.into();
        self.trace(&line).await;
        state.logs.push(line);
    }

    /// Record a trace line in the store log and in `tracing` only.
    pub async fn trace(&self, line: &str) {
        info!(session_id = %self.session_id, "{line}");
        if let Err(err) = self.store.append_log(&self.session_id, line).await {
            warn!(session_id = %self.session_id, %err, "failed to append session log");
        }
    }
}
