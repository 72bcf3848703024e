//! Workflow state machine: routing, step handlers and the engine loop.

pub mod context;
pub mod engine;
pub mod handlers;
pub mod router;

pub use context::ExecutionContext;
pub use engine::WorkflowEngine;
pub use handlers::{Node, NodeRegistry, StepHandler};
