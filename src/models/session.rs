//! Coarse store-level session status and the status report.

use serde::{Deserialize, Serialize};

use super::state::WorkflowStatus;

/// Store-level lifecycle status reported to API callers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Waiting in the task queue.
    Queued,
    /// Owned by a worker.
    Running,
    /// Paused for human approval or input.
    WaitingForUser,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
}

impl SessionStatus {
    /// Database representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::WaitingForUser => "WAITING_FOR_USER",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "QUEUED" => Some(Self::Queued),
            "RUNNING" => Some(Self::Running),
            "WAITING_FOR_USER" => Some(Self::WaitingForUser),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the session has finished for good.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl From<WorkflowStatus> for SessionStatus {
    /// Store status recorded once the engine stops at `status`.
    fn from(status: WorkflowStatus) -> Self {
        match status {
            WorkflowStatus::WaitingForUser => Self::WaitingForUser,
            WorkflowStatus::Completed => Self::Completed,
            WorkflowStatus::Failed => Self::Failed,
            _ => Self::Running,
        }
    }
}

/// Snapshot returned by the status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    /// Session identifier.
    pub id: String,
    /// Store-level status.
    pub status: SessionStatus,
    /// Session trace lines.
    pub logs: Vec<String>,
    /// Final result text, if the worker recorded one.
    pub result: Option<String>,
}
