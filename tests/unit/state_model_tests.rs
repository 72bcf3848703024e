use swe_agent::models::session::SessionStatus;
use swe_agent::models::state::{SessionMode, SessionState, WorkflowStatus, USER_INPUT_MARKER};
use swe_agent::models::task::TaskMessage;

fn fresh(goal: &str) -> SessionState {
    SessionState::new(
        "abcdef12-0000-4000-8000-000000000000".into(),
        goal.into(),
        Some("https://github.com/acme/widgets.git".into()),
        "main".into(),
        SessionMode::Auto,
    )
}

#[test]
fn new_state_starts_planning_uninitialized() {
    let state = fresh("Add README");
    assert_eq!(state.status, WorkflowStatus::Planning);
    assert!(state.codebase_tree.is_none());
    assert!(state.branch_name.is_none());
    assert_eq!(state.review_count, 0);
    assert_eq!(state.steps_taken, 0);
}

#[test]
fn terminal_statuses() {
    let terminal = [
        WorkflowStatus::WaitingForUser,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
    ];
    let running = [
        WorkflowStatus::Planning,
        WorkflowStatus::PlanCritic,
        WorkflowStatus::BranchNaming,
        WorkflowStatus::Coding,
        WorkflowStatus::Testing,
        WorkflowStatus::Reviewing,
        WorkflowStatus::Committing,
        WorkflowStatus::PrCreation,
    ];
    assert!(terminal.iter().all(|status| status.is_terminal()));
    assert!(running.iter().all(|status| !status.is_terminal()));
}

#[test]
fn status_serializes_screaming_snake_case() {
    let json = serde_json::to_string(&WorkflowStatus::WaitingForUser).expect("serialize");
    assert_eq!(json, "\"WAITING_FOR_USER\"");
    assert_eq!(WorkflowStatus::PrCreation.to_string(), "PR_CREATION");

    let parsed: WorkflowStatus = serde_json::from_str("\"PLAN_CRITIC\"").expect("deserialize");
    assert_eq!(parsed, WorkflowStatus::PlanCritic);
}

#[test]
fn mode_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&SessionMode::Review).expect("serialize"), "\"review\"");
    assert_eq!(SessionMode::default(), SessionMode::Auto);
    assert_eq!(SessionMode::Auto.to_string(), "auto");
}

#[test]
fn fold_inputs_appends_to_goal_and_replans() {
    let mut state = fresh("Add README");
    state.status = WorkflowStatus::Completed;

    state.fold_inputs(&["also add a license".to_owned(), "use MIT".to_owned()]);

    assert_eq!(
        state.goal,
        format!("Add README{USER_INPUT_MARKER}also add a license\nuse MIT")
    );
    assert_eq!(state.status, WorkflowStatus::Planning);
}

#[test]
fn fold_of_nothing_changes_nothing() {
    let mut state = fresh("Add README");
    state.status = WorkflowStatus::Reviewing;

    state.fold_inputs(&[]);

    assert_eq!(state.goal, "Add README");
    assert_eq!(state.status, WorkflowStatus::Reviewing);
}

#[test]
fn older_state_json_fills_defaults() {
    let json = r#"{"session_id":"s1","goal":"g","status":"CODING"}"#;
    let state: SessionState = serde_json::from_str(json).expect("deserialize");
    assert_eq!(state.base_branch, "main");
    assert_eq!(state.mode, SessionMode::Auto);
    assert!(state.logs.is_empty());
}

#[test]
fn store_status_follows_workflow_stop() {
    assert_eq!(
        SessionStatus::from(WorkflowStatus::WaitingForUser),
        SessionStatus::WaitingForUser
    );
    assert_eq!(SessionStatus::from(WorkflowStatus::Completed), SessionStatus::Completed);
    assert_eq!(SessionStatus::from(WorkflowStatus::Failed), SessionStatus::Failed);
    assert_eq!(SessionStatus::from(WorkflowStatus::Coding), SessionStatus::Running);
}

#[test]
fn store_status_round_trips_through_text() {
    for status in [
        SessionStatus::Queued,
        SessionStatus::Running,
        SessionStatus::WaitingForUser,
        SessionStatus::Completed,
        SessionStatus::Failed,
    ] {
        assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(SessionStatus::parse("PAUSED"), None);
    assert!(SessionStatus::Failed.is_finished());
    assert!(!SessionStatus::WaitingForUser.is_finished());
}

#[test]
fn task_message_carries_session_identity() {
    let mut state = fresh("Add README");
    state.mode = SessionMode::Review;
    state.worker_token = Some("tok".into());

    let message = TaskMessage::from(&state);
    assert_eq!(message.session_id, state.session_id);
    assert_eq!(message.goal, "Add README");
    assert_eq!(message.base_branch, "main");
    assert_eq!(message.mode, SessionMode::Review);
    assert_eq!(message.worker_token.as_deref(), Some("tok"));
}
