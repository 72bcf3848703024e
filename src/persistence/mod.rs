//! Persistence layer modules.

pub mod db;
pub mod queue;
pub mod retention;
pub mod schema;
pub mod state_store;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
