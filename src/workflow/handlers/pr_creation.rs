//! Opens the pull request through the control plane. Failures are logged
//! and never fail the session: the code is already pushed.

use futures_util::future::BoxFuture;

use super::StepHandler;
use crate::control_plane::PullRequestRequest;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::workflow::context::ExecutionContext;
use crate::Result;

/// Characters of the goal used as a fallback PR title.
const FALLBACK_TITLE_CHARS: usize = 50;

/// Title and body derived from the commit message, or from the goal.
#[must_use]
pub fn title_and_body(state: &SessionState) -> (String, String) {
    match state.commit_message.as_deref() {
        Some(message) if !message.trim().is_empty() => match message.split_once('\n') {
            Some((title, body)) => (title.to_owned(), body.trim().to_owned()),
            None => (message.to_owned(), String::new()),
        },
        _ => (
            state.goal.chars().take(FALLBACK_TITLE_CHARS).collect(),
            state.goal.clone(),
        ),
    }
}

/// Requests the pull request for the pushed branch.
pub struct PrCreation;

impl StepHandler for PrCreation {
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            state.status = WorkflowStatus::Completed;
            ctx.log(state, "Starting PR creation process...").await;

            let Some(token) = state.worker_token.clone() else {
                ctx.log(state, "Error: Worker token not found. Cannot create PR.").await;
                return Ok(());
            };
            let Some(control_plane) = ctx.control_plane.clone() else {
                ctx.log(state, "Error: No control plane configured. Cannot create PR.")
                    .await;
                return Ok(());
            };
            let Some(head) = state.branch_name.clone() else {
                ctx.log(state, "Error: Branch name not found in state.").await;
                return Ok(());
            };

            if state.commit_message.is_none() {
                ctx.log(state, "Warning: No commit message found. Using goal as title.")
                    .await;
            }
            let (title, body) = title_and_body(state);
            let base = if state.base_branch.is_empty() {
                "main".to_owned()
            } else {
                state.base_branch.clone()
            };
            let request = PullRequestRequest {
                title,
                body,
                head,
                base,
            };

            match control_plane
                .open_pull_request(&state.session_id, &token, &request)
                .await
            {
                Ok(response) => {
                    let url = response.url.clone().unwrap_or_default();
                    if response.already_existed() {
                        ctx.log(state, format!("Pull Request already exists: {url}")).await;
                    } else {
                        ctx.log(state, format!("Successfully created Pull Request: {url}"))
                            .await;
                    }
                    state.pr_url = response.url;
                }
                Err(err) => {
                    ctx.log(state, format!("PR Creation Failed: {err}")).await;
                }
            }
            Ok(())
        })
    }
}
