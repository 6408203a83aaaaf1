//! Path validation against the served root.

use crate::error::CheckError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` at the filesystem root stays at the root.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir | Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
        }
    }
    out
}

/// Join a URL-style path onto `root`, returning `None` if the result
/// escapes `root` lexically.
#[must_use]
pub fn join_under_root(root: &Path, relative: &str) -> Option<PathBuf> {
    let root = normalize_lexically(root);
    let joined = normalize_lexically(&root.join(relative.trim_start_matches('/')));
    joined.starts_with(&root).then_some(joined)
}

/// Resolve symlinks in `path` and require the result to stay under
/// `canonical_root`, which must itself be canonical.
///
/// # Errors
///
/// Returns `CheckError::OutsideRoot` for an escaping path and
/// `CheckError::NotFound`/`CheckError::Io` when resolution fails.
pub async fn canonicalize_under(
    canonical_root: &Path,
    path: &Path,
) -> Result<PathBuf, CheckError> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|source| io_error(path, source))?;

    if !canonical.starts_with(canonical_root) {
        return Err(CheckError::OutsideRoot(path.to_path_buf()));
    }

    Ok(canonical)
}

/// Canonical form of a root directory.
///
/// # Errors
///
/// Returns `CheckError` if the root cannot be resolved.
pub async fn canonical_root(root: &Path) -> Result<PathBuf, CheckError> {
    tokio::fs::canonicalize(root)
        .await
        .map_err(|source| io_error(root, source))
}

/// Validates that combo files exist and live under a root.
#[async_trait]
pub trait PathChecker: Send + Sync {
    /// Fails on the first invalid file.
    async fn check(&self, root: &Path, files: &[PathBuf]) -> Result<(), CheckError>;
}

/// Default checker: lexical containment, symlink containment, regular file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootChecker;

impl RootChecker {
    /// Create a checker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn check_one(root: &Path, canonical_root: &Path, file: &Path) -> Result<(), CheckError> {
        if !normalize_lexically(file).starts_with(normalize_lexically(root)) {
            return Err(CheckError::OutsideRoot(file.to_path_buf()));
        }

        let canonical = canonicalize_under(canonical_root, file).await?;

        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(|source| io_error(file, source))?;

        if !metadata.is_file() {
            return Err(CheckError::NotAFile(file.to_path_buf()));
        }

        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CheckError {
    if source.kind() == ErrorKind::NotFound {
        CheckError::NotFound(path.to_path_buf())
    } else {
        CheckError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl PathChecker for RootChecker {
    async fn check(&self, root: &Path, files: &[PathBuf]) -> Result<(), CheckError> {
        let canonical_root = canonical_root(root).await?;

        for file in files {
            tracing::trace!("Checking {:?}", file);
            Self::check_one(root, &canonical_root, file).await?;
        }

        Ok(())
    }
}
