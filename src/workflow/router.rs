//! Transition table from workflow status to the next node.

use super::handlers::Node;
use crate::models::state::{SessionState, WorkflowStatus};

/// Node to run next, or `None` when the pass must stop.
///
/// A planning session without a codebase tree has not been initialized
/// yet and goes to the initializer first.
#[must_use]
pub fn route(state: &SessionState) -> Option<Node> {
    match state.status {
        WorkflowStatus::Planning if state.codebase_tree.is_none() => Some(Node::Initializer),
        WorkflowStatus::Planning => Some(Node::Planner),
        WorkflowStatus::PlanCritic => Some(Node::PlanCritic),
        WorkflowStatus::BranchNaming => Some(Node::BranchNaming),
        WorkflowStatus::Coding => Some(Node::Programmer),
        WorkflowStatus::Testing => Some(Node::Tester),
        WorkflowStatus::Reviewing => Some(Node::Reviewer),
        WorkflowStatus::Committing => Some(Node::CommitAndPush),
        WorkflowStatus::PrCreation => Some(Node::PrCreation),
        WorkflowStatus::WaitingForUser | WorkflowStatus::Completed | WorkflowStatus::Failed => None,
    }
}
