//! Path validation — filesystem sandboxing to a tool root.
//!
//! File and note tools take paths relative to a configured root. Requests
//! are rejected before touching the filesystem if they are absolute or
//! contain `..`; the resolved path is then canonicalized so a symlink cannot
//! lead outside the root.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the allowed root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' must be relative and cannot contain '..'")]
    PathTraversal { path: String },

    #[error("Root '{root}' is invalid: {reason}")]
    InvalidRoot { root: String, reason: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Normalize separators and reject absolute or traversing requests.
fn check_relative(requested: &str) -> Result<String, PathValidationError> {
    let trimmed = requested.trim().replace('\\', "/");
    let has_drive = trimmed.len() > 1 && trimmed.as_bytes()[1] == b':';
    if trimmed.contains("..") || trimmed.starts_with('/') || has_drive {
        warn!(path = %requested, "Rejected absolute or traversing path");
        return Err(PathValidationError::PathTraversal {
            path: requested.into(),
        });
    }
    Ok(trimmed)
}

fn canonical_root(root: &Path) -> Result<PathBuf, PathValidationError> {
    root.canonicalize()
        .map_err(|e| PathValidationError::InvalidRoot {
            root: root.display().to_string(),
            reason: e.to_string(),
        })
}

/// Resolve an existing path under `root`.
///
/// The target must exist (reads and listings). Returns the canonical path.
pub fn resolve_under_root(root: &Path, requested: &str) -> Result<PathBuf, PathValidationError> {
    let root = canonical_root(root)?;
    let relative = check_relative(requested)?;
    let canonical = root
        .join(&relative)
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: requested.into(),
            reason: e.to_string(),
        })?;

    if !canonical.starts_with(&root) {
        warn!(path = %requested, root = %root.display(), "Path resolves outside the root");
        return Err(PathValidationError::OutsideRoot {
            path: requested.into(),
        });
    }
    Ok(canonical)
}

/// Resolve a path under `root` that may not exist yet (writes).
///
/// The nearest existing ancestor is canonicalized and must lie under the
/// root; missing components below it are appended as given.
pub fn resolve_under_root_for_write(
    root: &Path,
    requested: &str,
) -> Result<PathBuf, PathValidationError> {
    let root = canonical_root(root)?;
    let relative = check_relative(requested)?;
    if relative.is_empty() {
        return Err(PathValidationError::PathTraversal {
            path: requested.into(),
        });
    }
    let full = root.join(&relative);

    let mut existing = full.as_path();
    let mut missing = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved =
        existing
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: requested.into(),
                reason: e.to_string(),
            })?;
    if !resolved.starts_with(&root) {
        warn!(path = %requested, root = %root.display(), "Write path resolves outside the root");
        return Err(PathValidationError::OutsideRoot {
            path: requested.into(),
        });
    }
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
