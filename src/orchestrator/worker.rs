//! Queue consumer that runs sessions end to end.
//!
//! One worker handles one session at a time: it prepares a sandbox and
//! the repository, runs the workflow engine, records the outcome and
//! releases the sandbox. Any number of worker processes may share a
//! queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::control_plane::{ControlPlane, GitCredentials};
use crate::git::{self, DEFAULT_AUTHOR_EMAIL, DEFAULT_AUTHOR_NAME};
use crate::llm::LlmClient;
use crate::models::session::SessionStatus;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::models::task::TaskMessage;
use crate::persistence::queue::TaskQueue;
use crate::persistence::state_store::StateStore;
use crate::sandbox::{SandboxFactory, SandboxRegistry};
use crate::workflow::{ExecutionContext, WorkflowEngine};
use crate::Result;

/// Result text recorded for completed sessions.
pub const COMPLETED_RESULT: &str = "Workflow completed successfully.";
/// Result text recorded for failed sessions.
pub const FAILED_RESULT: &str = "Workflow failed or timed out.";

/// Directory created under the sandbox root when no repository is given.
const SCRATCH_DIR: &str = "workspace";
/// Pause after a queue failure before polling again.
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Collaborators shared by every session a worker runs.
pub struct WorkerServices {
    /// Session state and log store.
    pub store: Arc<dyn StateStore>,
    /// Task queue to consume.
    pub queue: Arc<dyn TaskQueue>,
    /// Creates one sandbox per session.
    pub sandboxes: Arc<dyn SandboxFactory>,
    /// Live sandboxes, keyed by session id.
    pub registry: Arc<SandboxRegistry>,
    /// Model client.
    pub llm: Arc<dyn LlmClient>,
    /// Control plane issuing credentials and opening PRs.
    pub control_plane: Option<Arc<dyn ControlPlane>>,
}

/// Long-running queue consumer.
pub struct Worker {
    services: WorkerServices,
    engine: WorkflowEngine,
    limits: EngineConfig,
    poll_timeout: Duration,
}

impl Worker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        services: WorkerServices,
        engine: WorkflowEngine,
        limits: EngineConfig,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            services,
            engine,
            limits,
            poll_timeout,
        }
    }

    /// Consume the queue until `cancel` fires.
    ///
    /// A session in progress when `cancel` fires is finished first.
    pub async fn run(&self, cancel: CancellationToken) {
        self.report_stale_sessions().await;
        info!("worker started, polling for sessions");

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = self.services.queue.dequeue(self.poll_timeout) => next,
            };

            match next {
                Ok(Some(message)) => self.process_guarded(message).await,
                Ok(None) => {}
                Err(err) => {
                    error!(%err, "worker queue error");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("worker shutting down");
    }

    /// Warn about sessions left `RUNNING`, most likely by a crashed worker.
    /// They are not re-enqueued.
    pub async fn report_stale_sessions(&self) {
        match self.services.store.list_stale_running().await {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => warn!(
                count = ids.len(),
                sessions = ?ids,
                "sessions still marked RUNNING from a previous worker"
            ),
            Err(err) => warn!(%err, "could not list stale sessions"),
        }
    }

    /// Run one session, converting a panic into a `FAILED` session.
    pub async fn process_guarded(&self, message: TaskMessage) {
        let session_id = message.session_id.clone();
        let outcome = AssertUnwindSafe(self.process_message(message))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            error!(session_id, "session processing panicked");
            let store = self.services.store.as_ref();
            if let Err(err) = store.set_status(&session_id, SessionStatus::Failed).await {
                error!(session_id, %err, "failed to mark panicked session as failed");
            }
            if let Err(err) = store.set_result(&session_id, FAILED_RESULT).await {
                error!(session_id, %err, "failed to record panicked session result");
            }
            self.log(&session_id, "Session failed: panic").await;
            self.release_sandbox(&session_id).await;
        }
    }

    /// Run one session from the queue to a stopping point.
    ///
    /// Failures are recorded on the session, never returned.
    pub async fn process_message(&self, message: TaskMessage) {
        let span = info_span!("session", session_id = %message.session_id);
        async {
            let store = self.services.store.as_ref();
            let session_id = message.session_id.as_str();

            if let Err(err) = self.run_session(&message).await {
                error!(%err, "session failed");
                if let Err(status_err) = store.set_status(session_id, SessionStatus::Failed).await {
                    error!(err = %status_err, "failed to mark session as failed");
                }
                self.log(session_id, &format!("Session failed: {err}")).await;
            }

            self.release_sandbox(session_id).await;
        }
        .instrument(span)
        .await;
    }

    /// Drop the session's sandbox from the registry and tear it down.
    async fn release_sandbox(&self, session_id: &str) {
        if let Some(sandbox) = self.services.registry.unregister(session_id) {
            if let Err(err) = sandbox.teardown().await {
                warn!(session_id, %err, "sandbox teardown failed");
            }
        }
    }

    async fn run_session(&self, message: &TaskMessage) -> Result<()> {
        let store = self.services.store.as_ref();
        let session_id = message.session_id.as_str();
        let repo_url = message.repo_url.as_deref().filter(|url| !url.is_empty());

        store.set_status(session_id, SessionStatus::Running).await?;
        self.log(
            session_id,
            &format!(
                "Worker picked up session: {} on repo {} (base branch: {}, mode: {})",
                message.goal,
                repo_url.unwrap_or("(none)"),
                message.base_branch,
                message.mode
            ),
        )
        .await;

        let credentials = self.fetch_credentials(message).await;

        // Registered before setup so every exit path can release it.
        let sandbox = self.services.sandboxes.create(session_id)?;
        self.services.registry.register(session_id, Arc::clone(&sandbox));
        self.log(session_id, "Setting up sandbox...").await;
        sandbox.setup().await?;

        let (author_name, author_email) = credentials
            .as_ref()
            .map_or((DEFAULT_AUTHOR_NAME, DEFAULT_AUTHOR_EMAIL), GitCredentials::author);
        git::configure_identity(sandbox.as_ref(), author_name, author_email).await?;

        if let Some(url) = repo_url {
            if let Some(creds) = credentials.as_ref().filter(|creds| !creds.token.is_empty()) {
                git::configure_credentials(sandbox.as_ref(), url, creds.token_username(), &creds.token)
                    .await?;
            }
            self.log(session_id, &format!("Initializing repository: {url}...")).await;
            let path = git::prepare_repository(sandbox.as_ref(), url, &message.base_branch).await?;
            self.log(session_id, &format!("Repository ready at {}.", path.display()))
                .await;
        } else {
            let scratch = sandbox.root_path().join(SCRATCH_DIR);
            tokio::fs::create_dir_all(&scratch).await?;
            sandbox.set_cwd(&scratch)?;
        }

        self.log(session_id, "Sandbox ready.").await;

        // The API persists the initial state, so a saved state with no
        // steps is still a fresh start.
        let state = match store.get_state(session_id).await? {
            Some(state) => {
                if state.steps_taken > 0 {
                    self.log(session_id, "Resumed session from saved state.").await;
                }
                state
            }
            None => {
                let mut state = SessionState::new(
                    session_id.to_owned(),
                    message.goal.clone(),
                    message.repo_url.clone(),
                    message.base_branch.clone(),
                    message.mode,
                );
                state.worker_token.clone_from(&message.worker_token);
                state
            }
        };

        let ctx = ExecutionContext {
            session_id: session_id.to_owned(),
            sandbox,
            llm: Arc::clone(&self.services.llm),
            store: Arc::clone(&self.services.store),
            control_plane: self.services.control_plane.clone(),
            credentials,
            limits: self.limits,
        };

        let final_state = self.engine.run(&ctx, state).await?;
        self.record_outcome(&final_state).await
    }

    async fn fetch_credentials(&self, message: &TaskMessage) -> Option<GitCredentials> {
        let session_id = message.session_id.as_str();
        let Some(token) = message.worker_token.as_deref().filter(|token| !token.is_empty()) else {
            self.log(session_id, "No worker token available, skipping credential fetch")
                .await;
            return None;
        };
        let control_plane = self.services.control_plane.as_ref()?;

        match control_plane.git_credentials(session_id, token).await {
            Ok(Some(creds)) => {
                self.log(
                    session_id,
                    &format!("Fetched Git credentials (author: {})", creds.author().0),
                )
                .await;
                Some(creds)
            }
            Ok(None) => {
                self.log(session_id, "No Git credentials configured for this session")
                    .await;
                None
            }
            Err(err) => {
                self.log(session_id, &format!("Warning: Could not fetch credentials: {err}"))
                    .await;
                None
            }
        }
    }

    async fn record_outcome(&self, state: &SessionState) -> Result<()> {
        let store = self.services.store.as_ref();
        let session_id = state.session_id.as_str();
        match state.status {
            WorkflowStatus::Completed => {
                store.set_status(session_id, SessionStatus::Completed).await?;
                store.set_result(session_id, COMPLETED_RESULT).await?;
            }
            WorkflowStatus::WaitingForUser => {
                store.save_state(state).await?;
                store.set_status(session_id, SessionStatus::WaitingForUser).await?;
            }
            _ => {
                store.set_status(session_id, SessionStatus::Failed).await?;
                store.set_result(session_id, FAILED_RESULT).await?;
            }
        }
        info!(status = %state.status, steps = state.steps_taken, "session finished");
        Ok(())
    }

    async fn log(&self, session_id: &str, line: &str) {
        info!("{line}");
        if let Err(err) = self.services.store.append_log(session_id, line).await {
            warn!(%err, "failed to append session log");
        }
    }
}
