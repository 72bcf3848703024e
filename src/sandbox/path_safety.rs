//! Path confinement for sandbox file operations.
//!
//! Every file path handed to a sandbox resolves inside its workspace root.
//! `..` segments may not climb above the root and existing symlinks may not
//! point outside it.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Resolve `candidate` against `base` and check it stays under `root`.
///
/// Relative candidates are joined to `base` (the sandbox's current
/// directory, itself under the canonical `root`); absolute candidates are
/// taken as-is. Returns the resolved absolute path.
///
/// # Errors
///
/// Returns `AppError::Sandbox` if the root cannot be canonicalized, the
/// path escapes the root lexically, or an existing path resolves through
/// a symlink to somewhere outside it.
pub fn resolve_within(root: &Path, base: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::Sandbox(format!("workspace root invalid: {err}")))?;

    let candidate = candidate.as_ref();
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::Sandbox("path escapes the workspace".into()));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if !normalized.starts_with(&root) {
        return Err(AppError::Sandbox(format!(
            "path outside workspace: {}",
            candidate.display()
        )));
    }

    if normalized.exists() {
        let canonical = normalized
            .canonicalize()
            .map_err(|err| AppError::Sandbox(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::Sandbox("symlink target escapes workspace".into()));
        }
        return Ok(canonical);
    }

    Ok(normalized)
}
