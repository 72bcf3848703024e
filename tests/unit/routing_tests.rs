use swe_agent::models::state::{SessionMode, SessionState, WorkflowStatus};
use swe_agent::workflow::router::route;
use swe_agent::workflow::{Node, NodeRegistry};

fn state_at(status: WorkflowStatus, initialized: bool) -> SessionState {
    let mut state = SessionState::new(
        "s1".into(),
        "goal".into(),
        None,
        "main".into(),
        SessionMode::Auto,
    );
    state.status = status;
    if initialized {
        state.codebase_tree = Some("README.md".into());
    }
    state
}

#[test]
fn uninitialized_planning_goes_to_initializer() {
    assert_eq!(
        route(&state_at(WorkflowStatus::Planning, false)),
        Some(Node::Initializer)
    );
    assert_eq!(
        route(&state_at(WorkflowStatus::Planning, true)),
        Some(Node::Planner)
    );
}

#[test]
fn every_working_status_has_a_node() {
    let table = [
        (WorkflowStatus::PlanCritic, Node::PlanCritic),
        (WorkflowStatus::BranchNaming, Node::BranchNaming),
        (WorkflowStatus::Coding, Node::Programmer),
        (WorkflowStatus::Testing, Node::Tester),
        (WorkflowStatus::Reviewing, Node::Reviewer),
        (WorkflowStatus::Committing, Node::CommitAndPush),
        (WorkflowStatus::PrCreation, Node::PrCreation),
    ];
    for (status, node) in table {
        assert_eq!(route(&state_at(status, true)), Some(node), "{status}");
    }
}

#[test]
fn terminal_statuses_do_not_route() {
    for status in [
        WorkflowStatus::WaitingForUser,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
    ] {
        assert_eq!(route(&state_at(status, true)), None, "{status}");
    }
}

#[test]
fn successor_edges_match_the_workflow() {
    assert!(Node::PlanCritic.allows(WorkflowStatus::WaitingForUser));
    assert!(Node::Tester.allows(WorkflowStatus::Coding));
    assert!(Node::Reviewer.allows(WorkflowStatus::Committing));
    assert!(Node::CommitAndPush.allows(WorkflowStatus::Completed));

    assert!(!Node::Planner.allows(WorkflowStatus::Completed));
    assert!(!Node::Tester.allows(WorkflowStatus::Failed));
    assert!(!Node::PrCreation.allows(WorkflowStatus::Failed));
    assert!(!Node::Programmer.allows(WorkflowStatus::Reviewing));
}

#[test]
fn standard_registry_covers_every_node() {
    let registry = NodeRegistry::standard();
    for node in Node::ALL {
        assert!(registry.get(node).is_some(), "no handler for {node}");
    }
    assert!(NodeRegistry::empty().get(Node::Planner).is_none());
}

#[test]
fn node_names_are_snake_case() {
    assert_eq!(Node::CommitAndPush.to_string(), "commit_and_push");
    assert_eq!(Node::PlanCritic.name(), "plan_critic");
}
