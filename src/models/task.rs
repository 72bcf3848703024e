//! Queue message that asks a worker to run a session.

use serde::{Deserialize, Serialize};

use super::state::{SessionMode, SessionState};

/// Start or continue message placed on the task queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskMessage {
    /// Session to run.
    pub session_id: String,
    /// Goal at enqueue time.
    pub goal: String,
    /// Repository to clone, if any.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Base branch.
    pub base_branch: String,
    /// Approval mode.
    #[serde(default)]
    pub mode: SessionMode,
    /// Control-plane bearer token.
    #[serde(default)]
    pub worker_token: Option<String>,
}

impl From<&SessionState> for TaskMessage {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            goal: state.goal.clone(),
            repo_url: state.repo_url.clone(),
            base_branch: state.base_branch.clone(),
            mode: state.mode,
            worker_token: state.worker_token.clone(),
        }
    }
}
