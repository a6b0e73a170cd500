use crate::compiler::Compiler;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use texmill_core::pool::run_bounded;
use texmill_core::process::RunOptions;
use texmill_core::Result;
use texmill_log::{Diagnostic, DiagnosticCode};

pub const CHKTEX: &str = "chktex";
pub const LINT_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum number of concurrent chktex processes.
pub const LINT_CONCURRENCY: usize = 4;

/// `-f` format making each chktex finding one `file:line:col:message` line.
const CHKTEX_FORMAT: &str = "%f:%l:%c:%m\n";

static FINDING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*?):(\d*):(\d*):(.*)$").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintRequest {
    pub files: Vec<PathBuf>,
    /// chktexrc passed with `-l`.
    #[serde(default)]
    pub config: Option<PathBuf>,
    /// Parse findings into diagnostics instead of returning chktex's text.
    #[serde(default)]
    pub structured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LintResult {
    Structured { diagnostics: Vec<Diagnostic> },
    Raw { output: String },
}

/// Parses output produced with [`CHKTEX_FORMAT`].
pub fn parse_chktex(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let caps = FINDING_RE.captures(line)?;
            Some(
                Diagnostic::warning(caps[4].trim())
                    .with_file(Some(&caps[1]))
                    .with_line(caps[2].parse().ok().filter(|n| *n > 0))
                    .with_column(caps[3].parse().ok().filter(|n| *n > 0))
                    .with_code(DiagnosticCode::Chktex)
                    .normalized(),
            )
        })
        .collect()
}

impl Compiler {
    /// Runs chktex over every file, a few at a time.
    ///
    /// # Errors
    ///
    /// When any file or the config path lies outside the workspace. Nothing
    /// is run in that case.
    pub async fn lint(&self, req: &LintRequest) -> Result<LintResult> {
        let files = req
            .files
            .iter()
            .map(|f| self.policy().ensure_inside(f))
            .collect::<Result<Vec<_>>>()?;
        let config = match &req.config {
            Some(c) => Some(self.policy().ensure_inside(c)?),
            None => None,
        };

        let exe = self.resolver().resolve_or_name(CHKTEX);
        let structured = req.structured;
        let compiler = self.clone();

        let outputs = run_bounded(LINT_CONCURRENCY, files, move |file| {
            let compiler = compiler.clone();
            let exe = exe.clone();
            let config = config.clone();
            async move {
                let mut args = Vec::new();
                if let Some(cfg) = &config {
                    args.push("-l".to_string());
                    args.push(cfg.display().to_string());
                }
                if structured {
                    args.extend(["-q".to_string(), "-f".to_string(), CHKTEX_FORMAT.to_string()]);
                }
                args.push(file.display().to_string());
                let out = compiler
                    .run_tool(&exe, &args, &RunOptions::with_timeout(LINT_TIMEOUT))
                    .await;
                (file, out)
            }
        })
        .await;

        if structured {
            let diagnostics = outputs
                .iter()
                .flat_map(|(_, out)| parse_chktex(&out.stdout))
                .collect();
            return Ok(LintResult::Structured { diagnostics });
        }

        let output = outputs
            .iter()
            .map(|(file, out)| format!(">>> {}\n{}", file.display(), out.combined()))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(LintResult::Raw { output })
    }
}
