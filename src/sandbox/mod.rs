//! Isolated per-session workspaces that handlers run commands in.
//!
//! The [`Sandbox`] trait is the only capability the workflow needs from an
//! execution backend. [`LocalSandbox`] runs commands as child processes in
//! a directory under the worker's workspace root.

pub mod local;
pub mod path_safety;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;

use crate::Result;

pub use local::{LocalSandbox, LocalSandboxFactory};

/// Captured result of a shell command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; `-1` when killed by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr, in the form shown to agents and logs.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        if !self.success() {
            let _ = write!(text, "\n(exit code {})", self.exit_code);
        }
        text
    }
}

/// Execution backend owned by one session.
pub trait Sandbox: Send + Sync {
    /// Run `command` through the shell.
    ///
    /// A non-zero exit is reported in [`CommandOutput`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if the process cannot be spawned or the
    /// working directory is outside the workspace.
    fn run_command<'a>(
        &'a self,
        command: &'a str,
        cwd: Option<&'a Path>,
        env: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<CommandOutput>>;

    /// Read a UTF-8 file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` for paths outside the workspace or
    /// unreadable files.
    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Write a file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` for paths outside the workspace or
    /// write failures.
    fn write_file<'a>(&'a self, path: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Entry names of a directory, sorted, with `/` after subdirectories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` for paths outside the workspace or
    /// unreadable directories.
    fn list_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    /// Current working directory for relative paths and commands.
    fn cwd(&self) -> PathBuf;

    /// Change the working directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if `path` is not a directory inside the
    /// workspace.
    fn set_cwd(&self, path: &Path) -> Result<()>;

    /// Workspace root directory.
    fn root_path(&self) -> &Path;

    /// Prepare the sandbox before first use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if preparation fails.
    fn setup(&self) -> BoxFuture<'_, Result<()>>;

    /// Release resources held by the sandbox.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if cleanup fails.
    fn teardown(&self) -> BoxFuture<'_, Result<()>>;
}

/// Creates sandboxes for sessions picked up by a worker.
pub trait SandboxFactory: Send + Sync {
    /// Create (but not set up) a sandbox for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if the backend cannot allocate one.
    fn create(&self, session_id: &str) -> Result<Arc<dyn Sandbox>>;
}

/// Process-local map of live sandboxes keyed by session id.
#[derive(Default)]
pub struct SandboxRegistry {
    inner: Mutex<HashMap<String, Arc<dyn Sandbox>>>,
}

impl SandboxRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `sandbox` as the live sandbox of `session_id`.
    pub fn register(&self, session_id: &str, sandbox: Arc<dyn Sandbox>) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.to_owned(), sandbox);
    }

    /// Stop tracking the sandbox of `session_id`, handing it back for
    /// teardown.
    pub fn unregister(&self, session_id: &str) -> Option<Arc<dyn Sandbox>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    /// Number of live sandboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no sandboxes are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
