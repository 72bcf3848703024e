use std::sync::Arc;
use std::time::{Duration, Instant};

use swe_agent::models::state::SessionMode;
use swe_agent::models::task::TaskMessage;
use swe_agent::persistence::db;
use swe_agent::persistence::queue::{SqliteTaskQueue, TaskQueue};
use swe_agent::AppError;

fn message(id: &str) -> TaskMessage {
    TaskMessage {
        session_id: id.into(),
        goal: format!("goal for {id}"),
        repo_url: None,
        base_branch: "main".into(),
        mode: SessionMode::Auto,
        worker_token: Some("tok".into()),
    }
}

#[tokio::test]
async fn messages_are_delivered_in_order_once() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let queue = SqliteTaskQueue::new(pool);

    queue.enqueue(&message("s1")).await.expect("enqueue");
    queue.enqueue(&message("s2")).await.expect("enqueue");

    let first = queue.dequeue(Duration::from_millis(10)).await.expect("dequeue");
    let second = queue.dequeue(Duration::from_millis(10)).await.expect("dequeue");
    let third = queue.dequeue(Duration::from_millis(10)).await.expect("dequeue");

    assert_eq!(first, Some(message("s1")));
    assert_eq!(second, Some(message("s2")));
    assert_eq!(third, None);
}

#[tokio::test]
async fn empty_queue_waits_for_the_timeout() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let queue = SqliteTaskQueue::new(pool);

    let started = Instant::now();
    let next = queue.dequeue(Duration::from_millis(300)).await.expect("dequeue");

    assert!(next.is_none());
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn named_queues_are_independent() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    let main = SqliteTaskQueue::new(Arc::clone(&pool));
    let other = SqliteTaskQueue::with_name(pool, "other_tasks");

    other.enqueue(&message("s1")).await.expect("enqueue");

    assert!(main.dequeue(Duration::from_millis(10)).await.expect("dequeue").is_none());
    assert!(other.dequeue(Duration::from_millis(10)).await.expect("dequeue").is_some());
}

#[tokio::test]
async fn malformed_payload_is_a_queue_error() {
    let pool = Arc::new(db::connect_memory().await.expect("db connect"));
    sqlx::query(
        "INSERT INTO task_queue (queue_name, payload, enqueued_at) VALUES ('swe_agent_tasks', 'garbage', '2026-01-01T00:00:00Z')",
    )
    .execute(pool.as_ref())
    .await
    .expect("insert");
    let queue = SqliteTaskQueue::new(pool);

    let err = queue
        .dequeue(Duration::from_millis(10))
        .await
        .expect_err("malformed");
    assert!(matches!(err, AppError::Queue(ref msg) if msg.contains("malformed")));
}
