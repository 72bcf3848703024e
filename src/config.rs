//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keychain service name used for secret lookup.
const KEYRING_SERVICE: &str = "swe-agent";

/// HTTP API server settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Interface address the API binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TCP port for the API; 0 lets the OS choose.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            http_port: default_http_port(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".into()
}

fn default_http_port() -> u16 {
    8000
}

/// Worker process settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Directory under which per-session sandboxes are created.
    pub workspace_root: PathBuf,
    /// Seconds a blocking dequeue waits before polling again.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
    /// Base URL of the control-plane API issuing credentials and PRs.
    #[serde(default)]
    pub control_plane_url: Option<String>,
}

fn default_poll_timeout() -> u64 {
    5
}

/// Workflow engine budgets and thresholds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Lifetime handler-invocation budget per session.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Optional cap on handler invocations within a single engine pass.
    #[serde(default)]
    pub recursion_limit: Option<u32>,
    /// Character budget for diffs shown to the commit-message generator.
    #[serde(default = "default_diff_char_budget")]
    pub diff_char_budget: usize,
    /// Tracked-file count above which the initializer shortens the tree.
    #[serde(default = "default_file_count_threshold")]
    pub file_count_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            recursion_limit: None,
            diff_char_budget: default_diff_char_budget(),
            file_count_threshold: default_file_count_threshold(),
        }
    }
}

fn default_max_steps() -> u32 {
    50
}

fn default_diff_char_budget() -> usize {
    10_000
}

fn default_file_count_threshold() -> usize {
    1000
}

/// OpenAI-compatible LLM endpoint settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Base URL of the chat-completions API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Maximum completion tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    7
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory holding the `SQLite` database.
    pub data_dir: PathBuf,
    /// HTTP API settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Worker settings.
    pub worker: WorkerConfig,
    /// Engine budgets.
    #[serde(default)]
    pub engine: EngineConfig,
    /// LLM endpoint.
    pub llm: LlmConfig,
    /// Days after a session finishes before its records are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the LLM API key from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides the key.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.llm.api_key = load_credential("llm_api_key", "LLM_API_KEY").await?;
        Ok(())
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("swe-agent.db")
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_steps == 0 {
            return Err(AppError::Config("engine.max_steps must be greater than zero".into()));
        }

        if self.engine.recursion_limit == Some(0) {
            return Err(AppError::Config(
                "engine.recursion_limit must be greater than zero when set".into(),
            ));
        }

        if self.engine.diff_char_budget == 0 {
            return Err(AppError::Config(
                "engine.diff_char_budget must be greater than zero".into(),
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(AppError::Config("llm.model must not be empty".into()));
        }

        if self.worker.poll_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker.poll_timeout_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(key = keyring_key, ?err, "keychain lookup failed, trying env var");
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
