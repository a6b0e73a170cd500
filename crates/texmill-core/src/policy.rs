use crate::error::{Error, Result};
use crate::paths;
use std::path::{Path, PathBuf};

/// Workspace containment and feature gates applied to every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspacePolicy {
    /// When set, every path a request touches must live under this directory.
    pub root: Option<PathBuf>,
    /// Whether `-shell-escape` may be passed to the engine.
    pub allow_shell_escape: bool,
}

impl WorkspacePolicy {
    /// A policy that accepts every path and forbids shell escape.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(paths::normalize(root.as_ref())),
            allow_shell_escape: false,
        }
    }

    /// Returns the absolute, normalized form of `path` if the policy admits it.
    ///
    /// # Errors
    ///
    /// [`Error::OutsideWorkspace`] when a root is configured and `path` is
    /// neither the root itself nor beneath it.
    pub fn ensure_inside(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let abs = paths::normalize(path.as_ref());
        let Some(root) = &self.root else {
            return Ok(abs);
        };
        if is_within(&abs, root) {
            Ok(abs)
        } else {
            Err(Error::OutsideWorkspace {
                path: abs,
                root: root.clone(),
            })
        }
    }
}

#[cfg(windows)]
fn is_within(path: &Path, root: &Path) -> bool {
    let p = path.to_string_lossy().to_lowercase();
    let r = root.to_string_lossy().to_lowercase();
    Path::new(&p).starts_with(Path::new(&r))
}

#[cfg(not(windows))]
fn is_within(path: &Path, root: &Path) -> bool {
    // Component-wise, so `/work-other` is not inside `/work`.
    path.starts_with(root)
}
