//! Step handlers: one per workflow node.
//!
//! A handler reads the [`SessionState`], does its work through the
//! [`ExecutionContext`] and leaves the state with an updated status. The
//! [`NodeRegistry`] maps each [`Node`] to its handler; tests replace
//! entries with scripted handlers.

pub mod branch_naming;
pub mod commit;
pub mod initializer;
pub mod plan_critic;
pub mod planner;
pub mod pr_creation;
pub mod programmer;
pub mod reviewer;
pub mod tester;

use std::collections::HashMap;

use futures_util::future::BoxFuture;

use super::context::ExecutionContext;
use crate::models::state::{SessionState, WorkflowStatus};
use crate::Result;

/// Sentinel a critic or reviewer emits to accept the work.
pub const APPROVED: &str = "APPROVED";
/// Sentinel the programmer emits when its iteration is done.
pub const CHANGES_COMPLETE: &str = "CHANGES_COMPLETE";
/// Sentinel the tester emits when the checks pass.
pub const TESTS_PASSED: &str = "TESTS_PASSED";

/// A named step of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    /// Builds the repository tree and reads `AGENTS.md`.
    Initializer,
    /// Drafts or refines the plan.
    Planner,
    /// Accepts or rejects the plan.
    PlanCritic,
    /// Creates or re-checks out the work branch.
    BranchNaming,
    /// Implements the plan.
    Programmer,
    /// Runs the tests.
    Tester,
    /// Reviews the changes.
    Reviewer,
    /// Commits and pushes.
    CommitAndPush,
    /// Opens the pull request.
    PrCreation,
}

impl Node {
    /// Every node, in workflow order.
    pub const ALL: [Self; 9] = [
        Self::Initializer,
        Self::Planner,
        Self::PlanCritic,
        Self::BranchNaming,
        Self::Programmer,
        Self::Tester,
        Self::Reviewer,
        Self::CommitAndPush,
        Self::PrCreation,
    ];

    /// Stable name used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Initializer => "initializer",
            Self::Planner => "planner",
            Self::PlanCritic => "plan_critic",
            Self::BranchNaming => "branch_naming",
            Self::Programmer => "programmer",
            Self::Tester => "tester",
            Self::Reviewer => "reviewer",
            Self::CommitAndPush => "commit_and_push",
            Self::PrCreation => "pr_creation",
        }
    }

    /// Statuses this node may leave the session in.
    #[must_use]
    pub fn successors(self) -> &'static [WorkflowStatus] {
        use WorkflowStatus::{
            BranchNaming, Coding, Committing, Completed, Failed, PlanCritic, Planning, PrCreation,
            Reviewing, Testing, WaitingForUser,
        };
        match self {
            Self::Initializer => &[Planning, Failed],
            Self::Planner => &[PlanCritic],
            Self::PlanCritic => &[Planning, BranchNaming, WaitingForUser],
            Self::BranchNaming => &[Coding, Failed],
            Self::Programmer => &[Testing, Failed],
            Self::Tester => &[Reviewing, Coding],
            Self::Reviewer => &[Committing, Coding, Failed],
            Self::CommitAndPush => &[PrCreation, Completed, Failed],
            Self::PrCreation => &[Completed],
        }
    }

    /// Whether leaving the session in `status` is a legal edge.
    #[must_use]
    pub fn allows(self, status: WorkflowStatus) -> bool {
        self.successors().contains(&status)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Work performed at one node.
pub trait StepHandler: Send + Sync {
    /// Advance `state` by one step.
    ///
    /// Domain outcomes (rejection, failing tests) are expressed through
    /// the new status.
    ///
    /// # Errors
    ///
    /// Any error is fatal for the session; the engine marks it `FAILED`.
    fn run<'a>(
        &'a self,
        state: &'a mut SessionState,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Node to handler dispatch table.
pub struct NodeRegistry {
    handlers: HashMap<Node, Box<dyn StepHandler>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl NodeRegistry {
    /// Registry with no handlers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the production handler of every node.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_handler(Node::Initializer, initializer::Initializer)
            .with_handler(Node::Planner, planner::Planner)
            .with_handler(Node::PlanCritic, plan_critic::PlanCritic)
            .with_handler(Node::BranchNaming, branch_naming::BranchNaming)
            .with_handler(Node::Programmer, programmer::Programmer)
            .with_handler(Node::Tester, tester::Tester)
            .with_handler(Node::Reviewer, reviewer::Reviewer)
            .with_handler(Node::CommitAndPush, commit::CommitAndPush)
            .with_handler(Node::PrCreation, pr_creation::PrCreation)
    }

    /// Replace the handler of `node`.
    #[must_use]
    pub fn with_handler(mut self, node: Node, handler: impl StepHandler + 'static) -> Self {
        self.handlers.insert(node, Box::new(handler));
        self
    }

    /// Handler registered for `node`.
    #[must_use]
    pub fn get(&self, node: Node) -> Option<&dyn StepHandler> {
        self.handlers.get(&node).map(|handler| &**handler)
    }
}
