//! Layered configuration: defaults, then `<workspace>/.texmill.json`, then
//! environment variables.

use crate::error::{Error, Result};
use crate::policy::WorkspacePolicy;
use crate::toolchain::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional per-workspace configuration file.
pub const CONFIG_FILE_NAME: &str = ".texmill.json";

/// Default capacity of a watch session's line buffer.
pub const DEFAULT_WATCH_BUFFER_LINES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Paths outside this directory are rejected when set.
    pub workspace_root: Option<PathBuf>,
    pub allow_shell_escape: bool,
    pub default_engine: Engine,
    pub watch_buffer_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: None,
            allow_shell_escape: false,
            default_engine: Engine::Pdflatex,
            watch_buffer_lines: DEFAULT_WATCH_BUFFER_LINES,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

impl Config {
    /// Loads configuration from the process environment and the working
    /// directory (or the workspace root named by the environment).
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_with(&cwd, |key| std::env::var(key).ok())
    }

    /// Loads configuration using `env` for variable lookups. `fallback_dir`
    /// is searched for the config file when no workspace root is set.
    pub fn load_with(fallback_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_root = env("TEXMILL_WORKSPACE_ROOT")
            .or_else(|| env("WORKSPACE_ROOT"))
            .filter(|v| !v.trim().is_empty())
            .map(|v| crate::paths::normalize(Path::new(v.trim())));

        let search_dir = env_root.clone().unwrap_or_else(|| fallback_dir.to_path_buf());
        let config_path = search_dir.join(CONFIG_FILE_NAME);
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(text) => Self::from_json(&text).map_err(|source| Error::Config {
                path: config_path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };

        if let Some(root) = env_root {
            config.workspace_root = Some(root);
        }
        if let Some(flag) = env("TEXMILL_ALLOW_SHELL_ESCAPE") {
            config.allow_shell_escape = truthy(&flag);
        }
        log::debug!("loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Parses a configuration file body. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn policy(&self) -> WorkspacePolicy {
        WorkspacePolicy {
            root: self
                .workspace_root
                .as_deref()
                .map(crate::paths::normalize),
            allow_shell_escape: self.allow_shell_escape,
        }
    }
}
