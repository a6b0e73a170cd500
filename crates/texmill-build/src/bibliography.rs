use crate::compiler::{Compiler, ENGINE_PASS_TIMEOUT};
use crate::strategy::PreparedRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use texmill_core::process::{RunOptions, RunOutput};
use texmill_core::{Result, paths};

pub const BIB_BUILD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibTool {
    Biber,
    Bibtex,
}

impl BibTool {
    pub fn executable(self) -> &'static str {
        match self {
            BibTool::Biber => "biber",
            BibTool::Bibtex => "bibtex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibRequest {
    pub tool: BibTool,
    /// The root `.tex` or its `.aux`; only directory and base name are used.
    pub root_or_aux: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibResult {
    pub command: String,
    pub args: Vec<String>,
    pub code: Option<i32>,
    pub output: String,
}

/// Whether an `.aux` file records citations or a bibliography database.
pub fn aux_needs_bibtex(aux: &str) -> bool {
    aux.contains("\\citation") || aux.contains("\\bibdata")
}

impl Compiler {
    /// The bibliography pass between two direct engine runs.
    ///
    /// biber runs when pass one left a `.bcf` control file; otherwise bibtex
    /// runs when the `.aux` file mentions citations. Returns `None` when
    /// neither applies.
    pub(crate) async fn fallback_bibliography(
        &self,
        prepared: &PreparedRequest,
    ) -> Option<RunOutput> {
        let tool = if prepared.artifact("bcf").is_file() {
            BibTool::Biber
        } else {
            let aux = tokio::fs::read(prepared.artifact("aux")).await.ok()?;
            if !aux_needs_bibtex(&String::from_utf8_lossy(&aux)) {
                return None;
            }
            BibTool::Bibtex
        };

        let exe = self.resolver().resolve_or_name(tool.executable());
        let opts = RunOptions::with_timeout(ENGINE_PASS_TIMEOUT).cwd(prepared.artifact_dir());
        Some(self.run_tool(&exe, &[prepared.job_base()], &opts).await)
    }

    /// Runs biber or bibtex for a document, in the document's directory.
    ///
    /// # Errors
    ///
    /// Only when the path lies outside the workspace.
    pub async fn build_bibliography(&self, req: &BibRequest) -> Result<BibResult> {
        let full = self.policy().ensure_inside(&req.root_or_aux)?;
        let dir = paths::parent_dir(&full);
        let base = paths::job_base(&full, None);

        let exe = self.resolver().resolve_or_name(req.tool.executable());
        let opts = RunOptions::with_timeout(BIB_BUILD_TIMEOUT).cwd(dir);
        let out = self.run_tool(&exe, &[base], &opts).await;
        Ok(BibResult {
            output: out.combined(),
            command: out.command,
            args: out.args,
            code: out.code,
        })
    }
}
