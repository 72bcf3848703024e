//! Tools offered to tool-calling agents and their execution against a
//! sandbox.
//!
//! Tool failures are reported back to the model as text; only the agent
//! loop's own failures (LLM transport) surface as errors.

pub mod agent_loop;

use serde::Deserialize;
use serde_json::json;

use crate::control_plane::GitCredentials;
use crate::git;
use crate::llm::ToolDefinition;
use crate::sandbox::Sandbox;

pub use agent_loop::{run_agent, AgentRun, AgentTask};

/// Characters of tool output kept in the session log.
pub const LOGGED_OUTPUT_LIMIT: usize = 1000;

/// A capability an agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Read a file.
    ReadFile,
    /// Create or overwrite a file.
    WriteFile,
    /// List a directory.
    ListFiles,
    /// Run a shell command.
    RunCommand,
    /// Show `git status`.
    GitStatus,
    /// Show the working-tree diff.
    GitDiff,
}

impl Tool {
    /// Name the model calls the tool by.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::ListFiles => "list_files",
            Self::RunCommand => "run_command",
            Self::GitStatus => "git_status",
            Self::GitDiff => "git_diff",
        }
    }

    /// Definition sent to the model.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let (description, parameters) = match self {
            Self::ReadFile => (
                "Read the contents of a file in the workspace.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"],
                }),
            ),
            Self::WriteFile => (
                "Create or overwrite a file in the workspace with the given content.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" },
                    },
                    "required": ["path", "content"],
                }),
            ),
            Self::ListFiles => (
                "List the entries of a directory in the workspace. Defaults to the current directory.",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                }),
            ),
            Self::RunCommand => (
                "Run a shell command in the repository and return its output.",
                json!({
                    "type": "object",
                    "properties": { "command": { "type": "string" } },
                    "required": ["command"],
                }),
            ),
            Self::GitStatus => (
                "Show the working tree status.",
                json!({ "type": "object", "properties": {} }),
            ),
            Self::GitDiff => (
                "Show the diff of all changes against HEAD.",
                json!({ "type": "object", "properties": {} }),
            ),
        };

        ToolDefinition {
            name: self.name().to_owned(),
            description: description.to_owned(),
            parameters,
        }
    }
}

/// Ordered set of tools available to one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSet {
    tools: Vec<Tool>,
}

impl ToolSet {
    /// File, command and read-only git tools. Committing and pushing are
    /// left to the commit step.
    #[must_use]
    pub fn programmer() -> Self {
        Self {
            tools: vec![
                Tool::ReadFile,
                Tool::WriteFile,
                Tool::ListFiles,
                Tool::RunCommand,
                Tool::GitStatus,
                Tool::GitDiff,
            ],
        }
    }

    /// Inspection tools plus command execution.
    #[must_use]
    pub fn inspector() -> Self {
        Self {
            tools: vec![Tool::ReadFile, Tool::ListFiles, Tool::RunCommand],
        }
    }

    /// Look up a tool of this set by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Tool> {
        self.tools.iter().copied().find(|tool| tool.name() == name)
    }

    /// Definitions of every tool in the set.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|tool| tool.definition()).collect()
    }
}

#[derive(Deserialize)]
struct PathArgs {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

fn parse<T: for<'de> Deserialize<'de>>(arguments: &str) -> Result<T, String> {
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|err| format!("Error: invalid arguments: {err}"))
}

/// Append the co-author trailer from `credentials` to `message`.
#[must_use]
pub fn with_co_author(message: &str, credentials: Option<&GitCredentials>) -> String {
    match credentials.and_then(GitCredentials::co_author_trailer) {
        Some(trailer) if !message.contains(&trailer) => format!("{message}\n\n{trailer}"),
        _ => message.to_owned(),
    }
}

/// Execute `tool` and render its result as text for the model.
pub async fn execute(tool: Tool, arguments: &str, sandbox: &dyn Sandbox) -> String {
    match run_tool(tool, arguments, sandbox).await {
        Ok(text) | Err(text) => text,
    }
}

async fn run_tool(tool: Tool, arguments: &str, sandbox: &dyn Sandbox) -> Result<String, String> {
    let text = |err: crate::AppError| format!("Error: {err}");
    match tool {
        Tool::ReadFile => {
            let args: PathArgs = parse(arguments)?;
            let path = args.path.ok_or("Error: missing path")?;
            sandbox.read_file(&path).await.map_err(text)
        }
        Tool::WriteFile => {
            let args: WriteArgs = parse(arguments)?;
            sandbox
                .write_file(&args.path, &args.content)
                .await
                .map(|()| format!("Wrote {} bytes to {}", args.content.len(), args.path))
                .map_err(text)
        }
        Tool::ListFiles => {
            let args: PathArgs = parse(arguments)?;
            let path = args.path.unwrap_or_else(|| ".".to_owned());
            sandbox
                .list_dir(&path)
                .await
                .map(|entries| entries.join("\n"))
                .map_err(text)
        }
        Tool::RunCommand => {
            let args: CommandArgs = parse(arguments)?;
            sandbox
                .run_command(&args.command, None, &[])
                .await
                .map(|output| output.combined())
                .map_err(text)
        }
        Tool::GitStatus => git::status(sandbox).await.map_err(text),
        Tool::GitDiff => git::diff(sandbox).await.map_err(text),
    }
}

/// Cut `text` to `limit` characters, marking the cut.
#[must_use]
pub fn truncate_output(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_owned(),
    }
}
