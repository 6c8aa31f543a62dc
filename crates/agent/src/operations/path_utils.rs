//! Keeping file access inside the pipeline root

use std::path::{Component, Path, PathBuf};

use super::OperationError;

/// Resolve `path` against `root` and refuse anything that lands outside it.
///
/// Relative paths are taken relative to the root, `~/` expands to the home
/// directory. Existing paths are canonicalized so symlinks cannot escape;
/// missing ones are normalized lexically.
pub async fn resolve_within_root(path: &str, root: &Path) -> Result<PathBuf, OperationError> {
    let canonical_root = tokio::fs::canonicalize(root)
        .await
        .unwrap_or_else(|_| normalize(root));

    let expanded = expand_tilde(path);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        canonical_root.join(expanded)
    };

    let resolved = match tokio::fs::canonicalize(&joined).await {
        Ok(p) => p,
        Err(_) => normalize(&joined),
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(OperationError::OutsideRoot {
            path: path.to_string(),
            root: canonical_root,
        });
    }
    Ok(resolved)
}

/// `path` relative to `root` for display, or the full path if unrelated
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
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

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
