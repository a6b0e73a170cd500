use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the texmill crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort an operation.
///
/// Tool-level problems (non-zero exit codes, timeouts, unparseable output) are
/// not represented here: they are folded into structured results instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A request referenced a path outside the configured workspace root.
    #[error("path escapes workspace root: {} (root={})", path.display(), root.display())]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    /// An external program could not be started at all.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// No watch session is registered under this id.
    #[error("no watch with id {0}")]
    UnknownSession(String),

    /// The configuration file exists but could not be decoded.
    #[error("invalid configuration file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
