//! Integration tests for the retention purge.
//!
//! Validates:
//! - Sessions finished before the cutoff lose their state, log and input
//! - Recent and unfinished sessions remain untouched

use chrono::{Duration, Utc};

use swe_agent::models::session::SessionStatus;
use swe_agent::models::state::{SessionMode, SessionState};
use swe_agent::persistence::retention;
use swe_agent::persistence::state_store::StateStore;

use super::test_helpers::memory_store;

fn state(id: &str) -> SessionState {
    SessionState::new(
        id.to_owned(),
        "retention test".to_owned(),
        None,
        "main".to_owned(),
        SessionMode::Auto,
    )
}

#[tokio::test]
async fn purge_removes_only_expired_finished_sessions() {
    let (db, store) = memory_store().await;

    for (id, status) in [
        ("old-done", SessionStatus::Completed),
        ("old-failed", SessionStatus::Failed),
        ("recent-done", SessionStatus::Completed),
        ("running", SessionStatus::Running),
    ] {
        store.save_state(&state(id)).await.expect("save");
        store.set_status(id, status).await.expect("status");
        store.append_log(id, "line").await.expect("log");
        store.append_pending_input(id, "input").await.expect("input");
    }

    let expired = (Utc::now() - Duration::days(45)).to_rfc3339();
    sqlx::query("UPDATE session SET finished_at = ?1 WHERE id IN ('old-done', 'old-failed')")
        .bind(&expired)
        .execute(db.as_ref())
        .await
        .expect("age sessions");
    sqlx::query("UPDATE session SET created_at = ?1 WHERE id = 'running'")
        .bind(&expired)
        .execute(db.as_ref())
        .await
        .expect("age running session");

    let removed = retention::purge(&db, 30).await.expect("purge");
    assert_eq!(removed, 2);

    for id in ["old-done", "old-failed"] {
        assert!(store.get_state(id).await.expect("get").is_none(), "{id}");
        assert!(store.get_logs(id).await.expect("logs").is_empty(), "{id}");
        assert!(store.get_pending_inputs(id).await.expect("pending").is_empty(), "{id}");
    }
    for id in ["recent-done", "running"] {
        assert!(store.get_state(id).await.expect("get").is_some(), "{id}");
        assert_eq!(store.get_logs(id).await.expect("logs"), vec!["line".to_owned()]);
    }
}

#[tokio::test]
async fn purge_on_empty_database_is_a_no_op() {
    let (db, _store) = memory_store().await;
    assert_eq!(retention::purge(&db, 30).await.expect("purge"), 0);
}
