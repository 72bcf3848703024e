//! Child-process sandbox rooted in a directory on the worker host.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::process::Command;
use tracing::{debug, info};

use super::path_safety::resolve_within;
use super::{CommandOutput, Sandbox, SandboxFactory};
use crate::{AppError, Result};

/// Upper bound on a single shell command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Sandbox running `sh -c` commands inside a private directory.
///
/// Commands see `HOME` pointed at a directory inside the sandbox so global
/// git configuration and the credential store stay per session.
pub struct LocalSandbox {
    root: PathBuf,
    home: PathBuf,
    cwd: Mutex<PathBuf>,
    remove_on_teardown: bool,
}

impl LocalSandbox {
    /// Create the sandbox directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sandbox` if the directory cannot be created.
    pub fn new(root: impl AsRef<Path>, remove_on_teardown: bool) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())
            .map_err(|err| AppError::Sandbox(format!("failed to create workspace: {err}")))?;
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|err| AppError::Sandbox(format!("workspace root invalid: {err}")))?;

        Ok(Self {
            home: root.join(".home"),
            cwd: Mutex::new(root.clone()),
            root,
            remove_on_teardown,
        })
    }

    fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        resolve_within(&self.root, &self.cwd(), path)
    }
}

impl Sandbox for LocalSandbox {
    fn run_command<'a>(
        &'a self,
        command: &'a str,
        cwd: Option<&'a Path>,
        env: &'a [(String, String)],
    ) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            let dir = match cwd {
                Some(path) => self.resolve(path)?,
                None => self.cwd(),
            };
            debug!(command, dir = %dir.display(), "running sandbox command");

            let mut cmd = Command::new("sh");
            cmd.arg("-c")
                .arg(command)
                .current_dir(&dir)
                .env("HOME", &self.home)
                .env("GIT_TERMINAL_PROMPT", "0")
                .stdin(Stdio::null())
                .kill_on_drop(true);
            for (key, value) in env {
                cmd.env(key, value);
            }

            let output = tokio::time::timeout(COMMAND_TIMEOUT, cmd.output())
                .await
                .map_err(|_| AppError::Sandbox(format!("command timed out: {command}")))?
                .map_err(|err| AppError::Sandbox(format!("failed to spawn command: {err}")))?;

            Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }

    fn read_file<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let resolved = self.resolve(path)?;
            tokio::fs::read_to_string(&resolved)
                .await
                .map_err(|err| AppError::Sandbox(format!("cannot read {path}: {err}")))
        })
    }

    fn write_file<'a>(&'a self, path: &'a str, content: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let resolved = self.resolve(path)?;
            if let Some(parent) = resolved.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| AppError::Sandbox(format!("cannot create {path}: {err}")))?;
            }
            tokio::fs::write(&resolved, content)
                .await
                .map_err(|err| AppError::Sandbox(format!("cannot write {path}: {err}")))
        })
    }

    fn list_dir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let resolved = self.resolve(path)?;
            let mut entries = tokio::fs::read_dir(&resolved)
                .await
                .map_err(|err| AppError::Sandbox(format!("cannot list {path}: {err}")))?;

            let mut names = Vec::new();
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| AppError::Sandbox(format!("cannot list {path}: {err}")))?
            {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                if entry.file_type().await.is_ok_and(|kind| kind.is_dir()) {
                    name.push('/');
                }
                names.push(name);
            }
            names.sort();
            Ok(names)
        })
    }

    fn cwd(&self) -> PathBuf {
        self.cwd.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_cwd(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path)?;
        if !resolved.is_dir() {
            return Err(AppError::Sandbox(format!(
                "not a directory: {}",
                path.display()
            )));
        }
        *self.cwd.lock().unwrap_or_else(PoisonError::into_inner) = resolved;
        Ok(())
    }

    fn root_path(&self) -> &Path {
        &self.root
    }

    fn setup(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.home)
                .await
                .map_err(|err| AppError::Sandbox(format!("failed to prepare sandbox home: {err}")))?;
            info!(root = %self.root.display(), "local sandbox ready");
            Ok(())
        })
    }

    fn teardown(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.remove_on_teardown {
                return Ok(());
            }
            match tokio::fs::remove_dir_all(&self.root).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(AppError::Sandbox(format!("failed to remove workspace: {err}"))),
            }
        })
    }
}

/// Creates one [`LocalSandbox`] per session under a shared root.
///
/// Workspaces are kept after teardown so a resumed session reuses its
/// clone.
#[derive(Debug, Clone)]
pub struct LocalSandboxFactory {
    workspace_root: PathBuf,
}

impl LocalSandboxFactory {
    /// Create a factory placing sandboxes under `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

impl SandboxFactory for LocalSandboxFactory {
    fn create(&self, session_id: &str) -> Result<Arc<dyn Sandbox>> {
        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::Sandbox(format!("invalid session id: {session_id}")));
        }
        let sandbox = LocalSandbox::new(self.workspace_root.join(session_id), false)?;
        Ok(Arc::new(sandbox))
    }
}
