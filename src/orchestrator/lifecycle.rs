//! Session lifecycle: start, resume, inject input and report status.
//!
//! These operations back the HTTP API. They only touch the persisted
//! state and the task queue; workers pick the sessions up from there.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::models::session::{SessionStatus, StatusReport};
use crate::models::state::{SessionMode, SessionState, WorkflowStatus};
use crate::models::task::TaskMessage;
use crate::persistence::queue::TaskQueue;
use crate::persistence::state_store::StateStore;
use crate::{AppError, Result};

/// Parameters of a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// What the agent should accomplish.
    pub goal: String,
    /// Repository to work in.
    pub repo_url: Option<String>,
    /// Branch to base the work on; `main` when absent.
    pub base_branch: Option<String>,
    /// Approval mode.
    pub mode: SessionMode,
}

/// Outcome of [`SessionService::add_session_input`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDisposition {
    /// Held for the running session to pick up between steps.
    Queued,
    /// Folded into the goal and the session re-enqueued for planning.
    Requeued,
}

/// API-facing session operations, shared behind an `Arc`.
pub struct SessionService {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn TaskQueue>,
}

impl SessionService {
    /// Create the service over a store and a queue.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, queue: Arc<dyn TaskQueue>) -> Self {
        Self { store, queue }
    }

    /// Persist a fresh session and enqueue it. Returns the session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for an empty goal, or a store/queue
    /// error.
    pub async fn start_session(&self, request: StartRequest) -> Result<String> {
        let goal = request.goal.trim();
        if goal.is_empty() {
            return Err(AppError::BadRequest("goal must not be empty".into()));
        }

        let session_id = Uuid::new_v4().to_string();
        let base_branch = request
            .base_branch
            .filter(|branch| !branch.trim().is_empty())
            .unwrap_or_else(|| "main".to_owned());
        let repo_url = request.repo_url.filter(|url| !url.trim().is_empty());

        let mut state = SessionState::new(
            session_id.clone(),
            goal.to_owned(),
            repo_url,
            base_branch,
            request.mode,
        );
        state.worker_token = Some(Uuid::new_v4().simple().to_string());

        let span = info_span!("start_session", session_id = %session_id);
        async {
            self.store.save_state(&state).await?;
            self.store.set_status(&session_id, SessionStatus::Queued).await?;
            self.store.append_log(&session_id, "Session queued.").await?;
            self.queue.enqueue(&TaskMessage::from(&state)).await?;
            info!(mode = ?state.mode, "session queued");
            Ok::<(), AppError>(())
        }
        .instrument(span)
        .await?;

        Ok(session_id)
    }

    /// Continue a paused session at its recorded next status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown sessions and
    /// `AppError::InvalidState` unless the session is waiting for the user.
    pub async fn resume_session(&self, session_id: &str) -> Result<()> {
        let span = info_span!("resume_session", session_id);
        async {
            let mut state = self.load(session_id).await?;
            if state.status != WorkflowStatus::WaitingForUser {
                return Err(AppError::InvalidState(format!(
                    "session {session_id} is not waiting for user (status: {})",
                    state.status
                )));
            }

            state.status = state.next_status.take().unwrap_or(WorkflowStatus::Coding);
            self.requeue(&state, &format!("Session resumed at {}.", state.status))
                .await?;
            info!(status = %state.status, "session resumed");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Record human input. A paused or finished session folds all pending
    /// input into its goal and is re-enqueued for planning; a running one
    /// picks it up between steps.
    ///
    /// # Errors
    ///
    /// Returns `AppError::BadRequest` for empty input and
    /// `AppError::NotFound` for unknown sessions.
    pub async fn add_session_input(&self, session_id: &str, message: &str) -> Result<InputDisposition> {
        if message.trim().is_empty() {
            return Err(AppError::BadRequest("message must not be empty".into()));
        }

        let span = info_span!("add_session_input", session_id);
        async {
            let mut state = self.load(session_id).await?;
            self.store.append_pending_input(session_id, message).await?;

            if !matches!(
                state.status,
                WorkflowStatus::WaitingForUser | WorkflowStatus::Completed
            ) {
                self.store
                    .append_log(session_id, &format!("User input queued: {message}"))
                    .await?;
                info!(status = %state.status, "input queued for running session");
                return Ok(InputDisposition::Queued);
            }

            let pending = self.store.get_pending_inputs(session_id).await?;
            state.fold_inputs(&pending);
            state.next_status = None;
            state.pending_inputs.clear();
            self.store.clear_pending_inputs(session_id).await?;
            self.requeue(&state, &format!("Received user inputs: {pending:?}"))
                .await?;
            info!(inputs = pending.len(), "input folded, session re-queued");
            Ok(InputDisposition::Requeued)
        }
        .instrument(span)
        .await
    }

    /// Status, log and result of a session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown sessions.
    pub async fn get_status(&self, session_id: &str) -> Result<StatusReport> {
        let status = self
            .store
            .get_status(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;

        Ok(StatusReport {
            id: session_id.to_owned(),
            status,
            logs: self.store.get_logs(session_id).await?,
            result: self.store.get_result(session_id).await?,
        })
    }

    async fn load(&self, session_id: &str) -> Result<SessionState> {
        self.store
            .get_state(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))
    }

    async fn requeue(&self, state: &SessionState, log_line: &str) -> Result<()> {
        self.store.save_state(state).await?;
        self.store.append_log(&state.session_id, log_line).await?;
        self.store
            .set_status(&state.session_id, SessionStatus::Queued)
            .await?;
        self.queue.enqueue(&TaskMessage::from(state)).await
    }
}
