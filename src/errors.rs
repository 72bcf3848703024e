//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Task queue enqueue/dequeue failure.
    Queue(String),
    /// Sandbox command or file operation failure.
    Sandbox(String),
    /// LLM request or response failure.
    Llm(String),
    /// Git operation failure.
    Git(String),
    /// Push refused because the target branch is protected.
    ProtectedBranch(String),
    /// Operation not permitted in the session's current state.
    InvalidState(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Malformed caller input.
    BadRequest(String),
    /// Control-plane API (credentials, pull requests) failure.
    ControlPlane(String),
    /// JSON encoding or decoding failure.
    Serialization(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Workflow engine failure outside any single handler.
    Workflow(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Queue(msg) => write!(f, "queue: {msg}"),
            Self::Sandbox(msg) => write!(f, "sandbox: {msg}"),
            Self::Llm(msg) => write!(f, "llm: {msg}"),
            Self::Git(msg) => write!(f, "git: {msg}"),
            Self::ProtectedBranch(msg) => write!(f, "protected branch: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::ControlPlane(msg) => write!(f, "control plane: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Workflow(msg) => write!(f, "workflow: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::ControlPlane(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
