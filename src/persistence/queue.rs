//! Task queue carrying session start/continue messages to workers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tokio::time::Instant;

use crate::models::task::TaskMessage;
use crate::{AppError, Result};

use super::db::Database;

/// Queue name shared by the API and the workers.
pub const TASK_QUEUE_NAME: &str = "swe_agent_tasks";

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Single-delivery queue of [`TaskMessage`]s.
pub trait TaskQueue: Send + Sync {
    /// Push a message to the back of the queue.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the message cannot be stored.
    fn enqueue<'a>(&'a self, message: &'a TaskMessage) -> BoxFuture<'a, Result<()>>;

    /// Pop the oldest message, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Queue` if the queue cannot be read or a message
    /// cannot be decoded.
    fn dequeue(&self, timeout: Duration) -> BoxFuture<'_, Result<Option<TaskMessage>>>;
}

/// `SQLite`-backed [`TaskQueue`] with atomic delete-on-read delivery.
#[derive(Clone)]
pub struct SqliteTaskQueue {
    db: Arc<Database>,
    queue_name: String,
}

impl SqliteTaskQueue {
    /// Create a queue handle for [`TASK_QUEUE_NAME`].
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_name(db, TASK_QUEUE_NAME)
    }

    /// Create a queue handle for a custom queue name.
    #[must_use]
    pub fn with_name(db: Arc<Database>, queue_name: &str) -> Self {
        Self {
            db,
            queue_name: queue_name.to_owned(),
        }
    }

    async fn try_pop(&self) -> Result<Option<TaskMessage>> {
        let row: Option<(String,)> = sqlx::query_as(
            "DELETE FROM task_queue WHERE id =
             (SELECT id FROM task_queue WHERE queue_name = ?1 ORDER BY id ASC LIMIT 1)
             RETURNING payload",
        )
        .bind(&self.queue_name)
        .fetch_optional(self.db.as_ref())
        .await
        .map_err(|err| AppError::Queue(format!("dequeue failed: {err}")))?;

        row.map(|(payload,)| {
            serde_json::from_str(&payload)
                .map_err(|err| AppError::Queue(format!("malformed task message: {err}")))
        })
        .transpose()
    }
}

impl TaskQueue for SqliteTaskQueue {
    fn enqueue<'a>(&'a self, message: &'a TaskMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let payload = serde_json::to_string(message)?;
            sqlx::query("INSERT INTO task_queue (queue_name, payload, enqueued_at) VALUES (?1, ?2, ?3)")
                .bind(&self.queue_name)
                .bind(&payload)
                .bind(Utc::now().to_rfc3339())
                .execute(self.db.as_ref())
                .await
                .map_err(|err| AppError::Queue(format!("enqueue failed: {err}")))?;
            Ok(())
        })
    }

    fn dequeue(&self, timeout: Duration) -> BoxFuture<'_, Result<Option<TaskMessage>>> {
        Box::pin(async move {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(message) = self.try_pop().await? {
                    return Ok(Some(message));
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
            }
        })
    }
}
