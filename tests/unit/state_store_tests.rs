use std::sync::Arc;

use swe_agent::models::session::SessionStatus;
use swe_agent::models::state::{SessionMode, SessionState, WorkflowStatus};
use swe_agent::persistence::db;
use swe_agent::persistence::state_store::{SqliteStateStore, StateStore};
use swe_agent::AppError;

async fn store() -> SqliteStateStore {
    let pool = db::connect_memory().await.expect("db connect");
    SqliteStateStore::new(Arc::new(pool))
}

fn state(id: &str) -> SessionState {
    SessionState::new(id.into(), "Add README".into(), None, "main".into(), SessionMode::Auto)
}

#[tokio::test]
async fn in_memory_connect_creates_tables() {
    let pool = db::connect_memory().await.expect("db connect");
    for table in ["session", "session_log", "pending_input", "task_queue"] {
        let query = format!("SELECT COUNT(*) FROM {table}");
        let row: (i64,) = sqlx::query_as(&query)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("table '{table}' should be queryable: {e}"));
        assert_eq!(row.0, 0, "table '{table}' should start empty");
    }
}

#[tokio::test]
async fn file_database_is_created_with_parent_dir() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("swe-agent.db");
    let pool = db::connect(&path).await.expect("file db");
    let store = SqliteStateStore::new(Arc::new(pool));

    store.save_state(&state("s1")).await.expect("save");
    assert!(path.exists());
}

#[tokio::test]
async fn saved_state_round_trips() {
    let store = store().await;
    let mut original = state("s1");
    original.plan = Some("1. write README".into());
    original.status = WorkflowStatus::Coding;
    original.steps_taken = 6;

    store.save_state(&original).await.expect("save");
    let loaded = store.get_state("s1").await.expect("load").expect("present");

    assert_eq!(loaded, original);
    assert_eq!(
        store.get_status("s1").await.expect("status"),
        Some(SessionStatus::Queued),
        "first save creates a queued row"
    );
}

#[tokio::test]
async fn unknown_session_reads_as_absent() {
    let store = store().await;
    assert!(store.get_state("nope").await.expect("load").is_none());
    assert!(store.get_status("nope").await.expect("status").is_none());
    assert!(store.get_result("nope").await.expect("result").is_none());
    assert!(store.get_logs("nope").await.expect("logs").is_empty());
}

#[tokio::test]
async fn set_status_requires_a_session() {
    let store = store().await;
    let err = store
        .set_status("nope", SessionStatus::Running)
        .await
        .expect_err("missing session");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn resaving_keeps_store_status() {
    let store = store().await;
    let mut session = state("s1");
    store.save_state(&session).await.expect("save");
    store.set_status("s1", SessionStatus::Running).await.expect("running");

    session.status = WorkflowStatus::Testing;
    store.save_state(&session).await.expect("resave");

    assert_eq!(
        store.get_status("s1").await.expect("status"),
        Some(SessionStatus::Running)
    );
    let loaded = store.get_state("s1").await.expect("load").expect("present");
    assert_eq!(loaded.status, WorkflowStatus::Testing);
}

#[tokio::test]
async fn finishing_records_finished_at() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let store = SqliteStateStore::new(Arc::clone(&pool));

    store.save_state(&state("s1")).await.expect("save");
    store.set_status("s1", SessionStatus::Completed).await.expect("complete");
    store.set_result("s1", "done").await.expect("result");

    assert_eq!(store.get_result("s1").await.expect("result").as_deref(), Some("done"));
    assert_eq!(
        store.get_status("s1").await.expect("status"),
        Some(SessionStatus::Completed)
    );
    let (finished_at,): (Option<String>,) =
        sqlx::query_as("SELECT finished_at FROM session WHERE id = 's1'")
            .fetch_one(pool.as_ref())
            .await
            .expect("row");
    assert!(finished_at.is_some());
}

#[tokio::test]
async fn logs_keep_insertion_order() {
    let store = store().await;
    store.append_log("s1", "first").await.expect("log");
    store.append_log("s1", "second").await.expect("log");
    store.append_log("s2", "other").await.expect("log");

    assert_eq!(store.get_logs("s1").await.expect("logs"), vec!["first", "second"]);
}

#[tokio::test]
async fn pending_inputs_are_kept_out_of_the_state_blob() {
    let store = store().await;
    let mut session = state("s1");
    session.pending_inputs = vec!["stale copy".into()];
    store.save_state(&session).await.expect("save");
    store.append_pending_input("s1", "also add docs").await.expect("input");

    let loaded = store.get_state("s1").await.expect("load").expect("present");
    assert_eq!(loaded.pending_inputs, vec!["also add docs"]);
}

#[tokio::test]
async fn prefix_removal_keeps_later_inputs() {
    let store = store().await;
    for message in ["a", "b", "c"] {
        store.append_pending_input("s1", message).await.expect("input");
    }

    assert!(store.remove_pending_prefix("s1", 2).await.expect("remove"));
    assert_eq!(store.get_pending_inputs("s1").await.expect("pending"), vec!["c"]);
}

#[tokio::test]
async fn prefix_removal_refuses_when_queue_shrank() {
    let store = store().await;
    store.append_pending_input("s1", "a").await.expect("input");

    assert!(!store.remove_pending_prefix("s1", 2).await.expect("remove"));
    assert_eq!(store.get_pending_inputs("s1").await.expect("pending"), vec!["a"]);
}

#[tokio::test]
async fn clear_pending_inputs_empties_one_session() {
    let store = store().await;
    store.append_pending_input("s1", "a").await.expect("input");
    store.append_pending_input("s2", "b").await.expect("input");

    store.clear_pending_inputs("s1").await.expect("clear");

    assert!(store.get_pending_inputs("s1").await.expect("pending").is_empty());
    assert_eq!(store.get_pending_inputs("s2").await.expect("pending"), vec!["b"]);
}

#[tokio::test]
async fn stale_running_lists_only_running_sessions() {
    let store = store().await;
    for id in ["s1", "s2", "s3"] {
        store.save_state(&state(id)).await.expect("save");
    }
    store.set_status("s1", SessionStatus::Running).await.expect("running");
    store.set_status("s3", SessionStatus::Failed).await.expect("failed");

    assert_eq!(store.list_stale_running().await.expect("stale"), vec!["s1"]);
}

#[tokio::test]
async fn corrupt_state_is_a_serialization_error() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let store = SqliteStateStore::new(Arc::clone(&pool));
    store.save_state(&state("s1")).await.expect("save");
    sqlx::query("UPDATE session SET state = '{not json' WHERE id = 's1'")
        .execute(pool.as_ref())
        .await
        .expect("corrupt");

    let err = store.get_state("s1").await.expect_err("corrupt");
    assert!(matches!(err, AppError::Serialization(ref msg) if msg.contains("corrupt state")));
}
