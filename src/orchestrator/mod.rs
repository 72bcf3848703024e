//! Session orchestration.
//!
//! Covers the API-facing session lifecycle and the queue-consuming
//! worker that drives sessions through the workflow.

pub mod lifecycle;
pub mod worker;

pub use lifecycle::{InputDisposition, SessionService, StartRequest};
pub use worker::{Worker, WorkerServices};
