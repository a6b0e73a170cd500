use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use texmill_core::{Engine, Interaction};
use texmill_log::Diagnostic;

fn default_true() -> bool {
    true
}

/// One compile of one root document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub root: PathBuf,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub synctex: bool,
    /// Only honoured when the workspace policy allows it.
    #[serde(default)]
    pub shell_escape: bool,
    #[serde(default)]
    pub interaction: Interaction,
    #[serde(default)]
    pub halt_on_error: bool,
    #[serde(default)]
    pub jobname: Option<String>,
}

impl CompileRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            engine: Engine::default(),
            out_dir: None,
            synctex: true,
            shell_escape: false,
            interaction: Interaction::default(),
            halt_on_error: false,
            jobname: None,
        }
    }
}

/// Outcome of a [`CompileRequest`].
///
/// `diagnostics` is a function of `raw_log` alone. Warnings about how the
/// request itself was adjusted live in `policy_warnings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub success: bool,
    pub pdf_path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_warnings: Vec<Diagnostic>,
    pub raw_log: String,
    /// Program of the final pass.
    pub command: String,
    pub args: Vec<String>,
    pub code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanRequest {
    pub root: PathBuf,
    /// Also remove generated PDFs (`-C` instead of `-c`).
    #[serde(default)]
    pub deep: bool,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanResult {
    pub cleaned: bool,
    pub command: String,
    pub args: Vec<String>,
    pub code: Option<i32>,
}
