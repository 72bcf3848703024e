//! Session lifecycle through the service layer.
//!
//! Validates:
//! - start persists, logs and enqueues a `QUEUED` session
//! - resume only applies to paused sessions and honours `next_status`
//! - input to a running session is held, input to a paused one re-plans

use std::sync::Arc;
use std::time::Duration;

use swe_agent::models::session::SessionStatus;
use swe_agent::models::state::{SessionMode, WorkflowStatus};
use swe_agent::orchestrator::{InputDisposition, SessionService, StartRequest};
use swe_agent::persistence::queue::{SqliteTaskQueue, TaskQueue};
use swe_agent::persistence::state_store::{SqliteStateStore, StateStore};
use swe_agent::AppError;

use super::test_helpers::memory_store;

struct Fixture {
    store: Arc<SqliteStateStore>,
    queue: Arc<SqliteTaskQueue>,
    service: SessionService,
}

async fn fixture() -> Fixture {
    let (db, store) = memory_store().await;
    let queue = Arc::new(SqliteTaskQueue::new(db));
    let service = SessionService::new(store.clone(), queue.clone());
    Fixture {
        store,
        queue,
        service,
    }
}

fn request(goal: &str, mode: SessionMode) -> StartRequest {
    StartRequest {
        goal: goal.to_owned(),
        repo_url: Some("https://github.com/acme/widgets.git".to_owned()),
        base_branch: None,
        mode,
    }
}

/// Start a session, drain its queue message and park it as the worker would.
async fn paused_session(fx: &Fixture, next: Option<WorkflowStatus>) -> String {
    let id = fx
        .service
        .start_session(request("Add a README", SessionMode::Review))
        .await
        .expect("start");
    fx.queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .expect("message");

    let mut state = fx.store.get_state(&id).await.expect("get").expect("state");
    state.status = WorkflowStatus::WaitingForUser;
    state.next_status = next;
    state.codebase_tree = Some("README.md".into());
    state.steps_taken = 3;
    fx.store.save_state(&state).await.expect("save");
    fx.store
        .set_status(&id, SessionStatus::WaitingForUser)
        .await
        .expect("status");
    id
}

#[tokio::test]
async fn start_queues_a_fresh_session() {
    let fx = fixture().await;

    let id = fx
        .service
        .start_session(request("  Add a README  ", SessionMode::Auto))
        .await
        .expect("start");

    let report = fx.service.get_status(&id).await.expect("status");
    assert_eq!(report.status, SessionStatus::Queued);
    assert_eq!(report.logs, vec!["Session queued.".to_owned()]);
    assert!(report.result.is_none());

    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert_eq!(state.goal, "Add a README");
    assert_eq!(state.base_branch, "main");
    assert_eq!(state.status, WorkflowStatus::Planning);
    assert_eq!(state.steps_taken, 0);

    let message = fx
        .queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .expect("message");
    assert_eq!(message.session_id, id);
    assert_eq!(message.worker_token, state.worker_token);
    assert!(message.worker_token.is_some_and(|token| token.len() == 32));
}

#[tokio::test]
async fn empty_goal_is_rejected() {
    let fx = fixture().await;

    let err = fx
        .service
        .start_session(request("   ", SessionMode::Auto))
        .await
        .expect_err("empty goal");

    assert!(matches!(err, AppError::BadRequest(_)), "{err}");
    assert!(fx
        .queue
        .dequeue(Duration::from_millis(10))
        .await
        .expect("dequeue")
        .is_none());
}

#[tokio::test]
async fn blank_repo_url_means_no_repository() {
    let fx = fixture().await;
    let mut start = request("Write a script", SessionMode::Auto);
    start.repo_url = Some(String::new());
    start.base_branch = Some("develop".into());

    let id = fx.service.start_session(start).await.expect("start");

    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert!(state.repo_url.is_none());
    assert_eq!(state.base_branch, "develop");
}

#[tokio::test]
async fn resume_requires_a_paused_session() {
    let fx = fixture().await;
    let id = fx
        .service
        .start_session(request("Add a README", SessionMode::Auto))
        .await
        .expect("start");

    let err = fx.service.resume_session(&id).await.expect_err("not paused");
    match err {
        AppError::InvalidState(msg) => assert!(msg.contains("status: PLANNING"), "{msg}"),
        other => panic!("expected invalid state, got {other}"),
    }

    let err = fx.service.resume_session("nope").await.expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");
}

#[tokio::test]
async fn resume_continues_at_next_status() {
    let fx = fixture().await;
    let id = paused_session(&fx, Some(WorkflowStatus::BranchNaming)).await;

    fx.service.resume_session(&id).await.expect("resume");

    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert_eq!(state.status, WorkflowStatus::BranchNaming);
    assert!(state.next_status.is_none());
    assert_eq!(state.steps_taken, 3);

    let report = fx.service.get_status(&id).await.expect("status");
    assert_eq!(report.status, SessionStatus::Queued);
    assert_eq!(
        report.logs.last().map(String::as_str),
        Some("Session resumed at BRANCH_NAMING.")
    );
    assert!(fx
        .queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .is_some());
}

#[tokio::test]
async fn resume_without_next_status_goes_to_coding() {
    let fx = fixture().await;
    let id = paused_session(&fx, None).await;

    fx.service.resume_session(&id).await.expect("resume");

    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert_eq!(state.status, WorkflowStatus::Coding);
}

#[tokio::test]
async fn input_for_running_session_is_held() {
    let fx = fixture().await;
    let id = fx
        .service
        .start_session(request("Add a README", SessionMode::Auto))
        .await
        .expect("start");
    fx.queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue");

    let disposition = fx
        .service
        .add_session_input(&id, "also add a license")
        .await
        .expect("input");

    assert_eq!(disposition, InputDisposition::Queued);
    assert_eq!(
        fx.store.get_pending_inputs(&id).await.expect("pending"),
        vec!["also add a license".to_owned()]
    );
    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert_eq!(state.goal, "Add a README");
    assert!(fx
        .queue
        .dequeue(Duration::from_millis(10))
        .await
        .expect("dequeue")
        .is_none());
    let logs = fx.store.get_logs(&id).await.expect("logs");
    assert_eq!(
        logs.last().map(String::as_str),
        Some("User input queued: also add a license")
    );
}

#[tokio::test]
async fn input_for_paused_session_replans() {
    let fx = fixture().await;
    let id = paused_session(&fx, Some(WorkflowStatus::BranchNaming)).await;
    fx.store
        .append_pending_input(&id, "earlier note")
        .await
        .expect("pending");

    let disposition = fx
        .service
        .add_session_input(&id, "use British spelling")
        .await
        .expect("input");

    assert_eq!(disposition, InputDisposition::Requeued);
    let state = fx.store.get_state(&id).await.expect("get").expect("state");
    assert_eq!(
        state.goal,
        "Add a README\n\n[User Input]: earlier note\nuse British spelling"
    );
    assert_eq!(state.status, WorkflowStatus::Planning);
    assert!(state.next_status.is_none());
    assert!(state.pending_inputs.is_empty());

    let message = fx
        .queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .expect("message");
    assert!(message.goal.ends_with("use British spelling"));
    assert_eq!(
        fx.service.get_status(&id).await.expect("status").status,
        SessionStatus::Queued
    );
}

#[tokio::test]
async fn input_validation() {
    let fx = fixture().await;

    let err = fx
        .service
        .add_session_input("nope", "hello")
        .await
        .expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");

    let err = fx
        .service
        .add_session_input("nope", "  ")
        .await
        .expect_err("empty");
    assert!(matches!(err, AppError::BadRequest(_)), "{err}");

    let err = fx.service.get_status("nope").await.expect_err("unknown");
    assert!(matches!(err, AppError::NotFound(_)), "{err}");
}
