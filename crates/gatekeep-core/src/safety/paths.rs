//! Path containment checks for executor targets.

use std::path::{Component, Path, PathBuf};

use crate::domain::ExecutorError;

/// Lexically normalize `path`: drop `.` and fold `..` into its parent.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor of `path` and re-append the
/// rest, so symlinks in already-existing directories are followed.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    resolved
}

/// Resolve a repository-relative path and require it to stay inside
/// `repo_root`.
///
/// Returns the absolute target path. Absolute inputs, `..` escapes and
/// symlinked directories pointing outside the root are all rejected.
pub fn resolve_within(repo_root: &Path, relative: &str) -> Result<PathBuf, ExecutorError> {
    let traversal = || ExecutorError::PathTraversal {
        path: relative.to_string(),
    };

    let root = repo_root
        .canonicalize()
        .map_err(|e| ExecutorError::io(repo_root, e))?;

    let candidate = Path::new(relative);
    if candidate.is_absolute() || relative.trim().is_empty() {
        return Err(traversal());
    }

    let joined = normalize_lexically(&root.join(candidate));
    let resolved = resolve_existing_prefix(&joined);
    if resolved.starts_with(&root) && resolved != root {
        Ok(resolved)
    } else {
        Err(traversal())
    }
}

/// `/`-separated form of `path` relative to `root`, for logs and diffs.
pub fn display_relative(root: &Path, path: &Path) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    path.strip_prefix(&root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
