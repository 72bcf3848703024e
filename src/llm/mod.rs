//! Chat-completion client abstraction used by the step handlers.

pub mod openai;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use openai::OpenAiClient;

/// One message in a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// Human or orchestrator turn.
    User(String),
    /// Model turn, optionally requesting tool calls.
    Assistant {
        /// Text content.
        content: Option<String>,
        /// Tool invocations requested by the model.
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool call.
    Tool {
        /// Identifier of the call this answers.
        tool_call_id: String,
        /// Tool output text.
        content: String,
    },
}

impl ChatMessage {
    /// Plain user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(text.into())
    }
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier echoed in the tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// Tool the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// One completion request with a fresh context.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System prompt.
    pub system_prompt: String,
    /// Transcript after the system prompt.
    pub messages: Vec<ChatMessage>,
    /// Tools offered to the model; empty for plain completions.
    pub tools: Vec<ToolDefinition>,
}

impl CompletionRequest {
    /// Single-turn request without tools.
    #[must_use]
    pub fn simple(system_prompt: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: vec![ChatMessage::user(user)],
            tools: Vec::new(),
        }
    }
}

/// Model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Text content.
    pub content: Option<String>,
    /// Requested tool calls.
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionResponse {
    /// Text content, or an empty string.
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Stateless LLM client; each call is independent.
pub trait LlmClient: Send + Sync {
    /// Send one completion request.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Llm` on transport failures, API errors or
    /// malformed responses.
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<CompletionResponse>>;
}

/// Run a single-turn completion and return the trimmed reply text.
///
/// # Errors
///
/// Propagates the client's error.
pub async fn ask(llm: &dyn LlmClient, system_prompt: &str, user: &str) -> Result<String> {
    let request = CompletionRequest::simple(system_prompt, user);
    let response = llm.complete(&request).await?;
    Ok(response.text().trim().to_owned())
}
