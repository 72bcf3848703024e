//! Persisted session state, status, logs, results and pending input.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::models::session::SessionStatus;
use crate::models::state::SessionState;
use crate::{AppError, Result};

use super::db::Database;

/// Read/write contract shared by the lifecycle manager, the worker and
/// the engine. The persisted state is the only cross-process coordination
/// point.
pub trait StateStore: Send + Sync {
    /// Store-level status, or `None` for an unknown session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn get_status<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionStatus>>>;

    /// Overwrite the store-level status.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session has never been saved.
    fn set_status<'a>(&'a self, session_id: &'a str, status: SessionStatus) -> BoxFuture<'a, Result<()>>;

    /// Append one trace line to the session log.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    fn append_log<'a>(&'a self, session_id: &'a str, line: &'a str) -> BoxFuture<'a, Result<()>>;

    /// All trace lines in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn get_logs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Record the final result text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the session has never been saved.
    fn set_result<'a>(&'a self, session_id: &'a str, result: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Final result text, if recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn get_result<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    /// Insert or replace the session state. Pending input is stored
    /// separately and never overwritten by this call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` or `AppError::Serialization` on failure.
    fn save_state<'a>(&'a self, state: &'a SessionState) -> BoxFuture<'a, Result<()>>;

    /// Load the session state with its pending input attached.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` if the stored record is not a
    /// valid state.
    fn get_state<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionState>>>;

    /// Queue one human input for the session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    fn append_pending_input<'a>(&'a self, session_id: &'a str, message: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Pending input, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn get_pending_inputs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Atomically remove the `count` oldest pending inputs. Returns `false`
    /// without removing anything when fewer than `count` remain.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the transaction fails.
    fn remove_pending_prefix<'a>(&'a self, session_id: &'a str, count: usize) -> BoxFuture<'a, Result<bool>>;

    /// Drop all pending input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    fn clear_pending_inputs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Sessions currently marked `RUNNING`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    fn list_stale_running(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}

/// `SQLite`-backed [`StateStore`].
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Arc<Database>,
}

impl SqliteStateStore {
    /// Create a new store instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn to_i64(count: usize) -> Result<i64> {
    i64::try_from(count).map_err(|_| AppError::Db(format!("count out of range: {count}")))
}

impl StateStore for SqliteStateStore {
    fn get_status<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionStatus>>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as("SELECT status FROM session WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(self.db.as_ref())
                .await?;

            row.map(|(raw,)| {
                SessionStatus::parse(&raw)
                    .ok_or_else(|| AppError::Db(format!("invalid session status: {raw}")))
            })
            .transpose()
        })
    }

    fn set_status<'a>(&'a self, session_id: &'a str, status: SessionStatus) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let now = Utc::now().to_rfc3339();
            let finished_at = status.is_finished().then(|| now.clone());

            let result = sqlx::query(
                "UPDATE session SET status = ?1, updated_at = ?2, finished_at = ?3 WHERE id = ?4",
            )
            .bind(status.as_str())
            .bind(&now)
            .bind(finished_at)
            .bind(session_id)
            .execute(self.db.as_ref())
            .await?;

            if result.rows_affected() == 0 {
                return Err(AppError::NotFound(format!("session {session_id} not found")));
            }
            debug!(session_id, status = status.as_str(), "session status updated");
            Ok(())
        })
    }

    fn append_log<'a>(&'a self, session_id: &'a str, line: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("INSERT INTO session_log (session_id, line, created_at) VALUES (?1, ?2, ?3)")
                .bind(session_id)
                .bind(line)
                .bind(Utc::now().to_rfc3339())
                .execute(self.db.as_ref())
                .await?;
            Ok(())
        })
    }

    fn get_logs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT line FROM session_log WHERE session_id = ?1 ORDER BY id ASC")
                    .bind(session_id)
                    .fetch_all(self.db.as_ref())
                    .await?;
            Ok(rows.into_iter().map(|(line,)| line).collect())
        })
    }

    fn set_result<'a>(&'a self, session_id: &'a str, result: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let outcome = sqlx::query("UPDATE session SET result = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(result)
                .bind(Utc::now().to_rfc3339())
                .bind(session_id)
                .execute(self.db.as_ref())
                .await?;

            if outcome.rows_affected() == 0 {
                return Err(AppError::NotFound(format!("session {session_id} not found")));
            }
            Ok(())
        })
    }

    fn get_result<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            let row: Option<(Option<String>,)> =
                sqlx::query_as("SELECT result FROM session WHERE id = ?1")
                    .bind(session_id)
                    .fetch_optional(self.db.as_ref())
                    .await?;
            Ok(row.and_then(|(result,)| result))
        })
    }

    fn save_state<'a>(&'a self, state: &'a SessionState) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // Pending input lives in its own table.
            let mut record = state.clone();
            record.pending_inputs.clear();
            let json = serde_json::to_string(&record)?;
            let now = Utc::now().to_rfc3339();

            sqlx::query(
                "INSERT INTO session (id, status, state, created_at, updated_at)
                 VALUES (?1, 'QUEUED', ?2, ?3, ?3)
                 ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
            )
            .bind(&state.session_id)
            .bind(&json)
            .bind(&now)
            .execute(self.db.as_ref())
            .await?;
            Ok(())
        })
    }

    fn get_state<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Option<SessionState>>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as("SELECT state FROM session WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(self.db.as_ref())
                .await?;

            let Some((json,)) = row else {
                return Ok(None);
            };

            let mut state: SessionState = serde_json::from_str(&json).map_err(|err| {
                AppError::Serialization(format!("corrupt state for session {session_id}: {err}"))
            })?;
            state.pending_inputs = self.get_pending_inputs(session_id).await?;
            Ok(Some(state))
        })
    }

    fn append_pending_input<'a>(&'a self, session_id: &'a str, message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO pending_input (session_id, message, created_at) VALUES (?1, ?2, ?3)",
            )
            .bind(session_id)
            .bind(message)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
            Ok(())
        })
    }

    fn get_pending_inputs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT message FROM pending_input WHERE session_id = ?1 ORDER BY id ASC",
            )
            .bind(session_id)
            .fetch_all(self.db.as_ref())
            .await?;
            Ok(rows.into_iter().map(|(message,)| message).collect())
        })
    }

    fn remove_pending_prefix<'a>(&'a self, session_id: &'a str, count: usize) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            if count == 0 {
                return Ok(true);
            }
            let limit = to_i64(count)?;
            let mut tx = self.db.begin().await?;

            let (available,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM pending_input WHERE session_id = ?1")
                    .bind(session_id)
                    .fetch_one(&mut *tx)
                    .await?;

            if available < limit {
                tx.rollback().await?;
                return Ok(false);
            }

            sqlx::query(
                "DELETE FROM pending_input WHERE id IN
                 (SELECT id FROM pending_input WHERE session_id = ?1 ORDER BY id ASC LIMIT ?2)",
            )
            .bind(session_id)
            .bind(limit)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(true)
        })
    }

    fn clear_pending_inputs<'a>(&'a self, session_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM pending_input WHERE session_id = ?1")
                .bind(session_id)
                .execute(self.db.as_ref())
                .await?;
            Ok(())
        })
    }

    fn list_stale_running(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT id FROM session WHERE status = 'RUNNING' ORDER BY updated_at ASC")
                    .fetch_all(self.db.as_ref())
                    .await?;
            Ok(rows.into_iter().map(|(id,)| id).collect())
        })
    }
}
