//! Workflow state carried through every step of a session.

use serde::{Deserialize, Serialize};

/// Workflow position of a session; decides which handler runs next.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    /// Drafting or refining the plan.
    Planning,
    /// Plan awaiting critique.
    PlanCritic,
    /// Choosing or re-checking out the work branch.
    BranchNaming,
    /// Programmer agent editing files.
    Coding,
    /// Tester agent running the test suite.
    Testing,
    /// Reviewer agent inspecting the changes.
    Reviewing,
    /// Staging, committing and pushing.
    Committing,
    /// Opening the pull request.
    PrCreation,
    /// Paused until a human approves or adds input.
    WaitingForUser,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
}

impl WorkflowStatus {
    /// Whether the engine must stop its current pass at this status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::WaitingForUser | Self::Completed | Self::Failed)
    }

    /// Wire representation used in logs and JSON.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "PLANNING",
            Self::PlanCritic => "PLAN_CRITIC",
            Self::BranchNaming => "BRANCH_NAMING",
            Self::Coding => "CODING",
            Self::Testing => "TESTING",
            Self::Reviewing => "REVIEWING",
            Self::Committing => "COMMITTING",
            Self::PrCreation => "PR_CREATION",
            Self::WaitingForUser => "WAITING_FOR_USER",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval mode chosen when the session starts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Run straight through to a pull request.
    #[default]
    Auto,
    /// Pause for human approval once the plan is accepted.
    Review,
}

impl SessionMode {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full persisted state of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    /// Unique session identifier.
    pub session_id: String,
    /// Goal text; human input is appended, never replacing it.
    pub goal: String,
    /// Repository to clone, if any.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Branch the work is based on and the PR targets.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Current workflow position.
    pub status: WorkflowStatus,
    /// Approval mode.
    #[serde(default)]
    pub mode: SessionMode,
    /// Current plan.
    #[serde(default)]
    pub plan: Option<String>,
    /// Latest critic rejection.
    #[serde(default)]
    pub plan_critic_feedback: Option<String>,
    /// Latest reviewer or tester rejection.
    #[serde(default)]
    pub review_feedback: Option<String>,
    /// Message of the last commit.
    #[serde(default)]
    pub commit_message: Option<String>,
    /// Work branch; never regenerated once set.
    #[serde(default)]
    pub branch_name: Option<String>,
    /// URL of the opened pull request.
    #[serde(default)]
    pub pr_url: Option<String>,
    /// Rendered repository tree from the initializer.
    #[serde(default)]
    pub codebase_tree: Option<String>,
    /// Contents of the repository's `AGENTS.md`.
    #[serde(default)]
    pub agents_md_content: Option<String>,
    /// Status to resume into after a pause.
    #[serde(default)]
    pub next_status: Option<WorkflowStatus>,
    /// Human input not yet folded into the goal.
    #[serde(default)]
    pub pending_inputs: Vec<String>,
    /// Number of reviewer rejections so far.
    #[serde(default)]
    pub review_count: u32,
    /// Handler invocations consumed from the lifetime budget.
    #[serde(default)]
    pub steps_taken: u32,
    /// Bearer token for control-plane calls on behalf of this session.
    #[serde(default)]
    pub worker_token: Option<String>,
    /// Session trace lines.
    #[serde(default)]
    pub logs: Vec<String>,
}

fn default_base_branch() -> String {
    "main".into()
}

/// Prefix placed before folded human input inside the goal.
pub const USER_INPUT_MARKER: &str = "\n\n[User Input]: ";

impl SessionState {
    /// Build the initial state of a freshly started session.
    #[must_use]
    pub fn new(
        session_id: String,
        goal: String,
        repo_url: Option<String>,
        base_branch: String,
        mode: SessionMode,
    ) -> Self {
        Self {
            session_id,
            goal,
            repo_url,
            base_branch,
            status: WorkflowStatus::Planning,
            mode,
            plan: None,
            plan_critic_feedback: None,
            review_feedback: None,
            commit_message: None,
            branch_name: None,
            pr_url: None,
            codebase_tree: None,
            agents_md_content: None,
            next_status: None,
            pending_inputs: Vec::new(),
            review_count: 0,
            steps_taken: 0,
            worker_token: None,
            logs: Vec::new(),
        }
    }

    /// Append human inputs to the goal and send the session back to planning.
    pub fn fold_inputs(&mut self, inputs: &[String]) {
        if inputs.is_empty() {
            return;
        }
        self.goal.push_str(USER_INPUT_MARKER);
        self.goal.push_str(&inputs.join("\n"));
        self.status = WorkflowStatus::Planning;
    }
}
