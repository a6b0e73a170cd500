use crate::compiler::Compiler;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use texmill_core::process::RunOptions;
use texmill_core::Result;

pub const LATEXINDENT: &str = "latexindent";
pub const FORMAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reported when an in-place run prints nothing.
pub const IN_PLACE_MESSAGE: &str = "formatted in-place";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRequest {
    pub file: PathBuf,
    /// Settings file passed with `-l`.
    #[serde(default)]
    pub config: Option<PathBuf>,
    /// Overwrite the file (`-w`) instead of returning the formatted text.
    #[serde(default)]
    pub in_place: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatResult {
    pub output: String,
}

impl Compiler {
    /// Runs latexindent over one file.
    ///
    /// The result carries latexindent's stdout, which is the formatted
    /// source unless `in_place` is set.
    ///
    /// # Errors
    ///
    /// When the file or the settings path lies outside the workspace.
    pub async fn format(&self, req: &FormatRequest) -> Result<FormatResult> {
        let mut args = Vec::new();
        if let Some(cfg) = &req.config {
            args.push("-l".to_string());
            args.push(self.policy().ensure_inside(cfg)?.display().to_string());
        }
        let file = self.policy().ensure_inside(&req.file)?;
        if req.in_place {
            args.push("-w".to_string());
        }
        args.push(file.display().to_string());

        let exe = self.resolver().resolve_or_name(LATEXINDENT);
        let out = self
            .run_tool(&exe, &args, &RunOptions::with_timeout(FORMAT_TIMEOUT))
            .await;
        if !out.success() {
            log::warn!("latexindent exited with {:?}: {}", out.code, out.stderr.trim());
        }

        let output = if req.in_place && out.stdout.is_empty() {
            IN_PLACE_MESSAGE.to_string()
        } else {
            out.stdout
        };
        Ok(FormatResult { output })
    }
}
