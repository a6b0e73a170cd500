use crate::request::{CleanRequest, CleanResult, CompileRequest, CompileResult};
use crate::strategy::{BuildStrategy, LATEXMK, PreparedRequest};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use texmill_core::process::{CommandRunner, RunOptions, RunOutput, TokioRunner};
use texmill_core::toolchain::{ToolResolver, WhichResolver};
use texmill_core::{paths, Result, WorkspacePolicy};
use texmill_log::{Diagnostic, DiagnosticCode, missing_script_engine, parse_log};

/// Budget for a full latexmk run.
pub const MANAGED_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for each direct engine pass and the bibliography pass between them.
pub const ENGINE_PASS_TIMEOUT: Duration = Duration::from_secs(90);
pub const CLEAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives the TeX toolchain for compile and clean requests.
///
/// Tool failures (non-zero exit, timeouts, missing executables) are folded
/// into the returned result. Only workspace violations surface as `Err`.
#[derive(Debug, Clone)]
pub struct Compiler {
    runner: Arc<dyn CommandRunner>,
    resolver: Arc<dyn ToolResolver>,
    policy: WorkspacePolicy,
}

impl Compiler {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn ToolResolver>,
        policy: WorkspacePolicy,
    ) -> Self {
        Self {
            runner,
            resolver,
            policy,
        }
    }

    /// A compiler using `tokio::process` and the `PATH`-based resolver.
    pub fn with_policy(policy: WorkspacePolicy) -> Self {
        Self::new(Arc::new(TokioRunner), Arc::new(WhichResolver), policy)
    }

    pub fn policy(&self) -> &WorkspacePolicy {
        &self.policy
    }

    pub fn resolver(&self) -> &Arc<dyn ToolResolver> {
        &self.resolver
    }

    /// Runs a tool, turning a failed spawn into an unsuccessful output.
    pub(crate) async fn run_tool(
        &self,
        program: &Path,
        args: &[String],
        opts: &RunOptions,
    ) -> RunOutput {
        log::info!("running {} {}", program.display(), args.join(" "));
        match self.runner.run(program, args, opts).await {
            Ok(out) => {
                if out.timed_out {
                    log::warn!("{} timed out", program.display());
                }
                out
            }
            Err(e) => {
                log::warn!("{}", e);
                RunOutput::spawn_failure(program, args, &e)
            }
        }
    }

    /// Compiles one document.
    ///
    /// # Errors
    ///
    /// Only when the root or output directory lies outside the workspace.
    pub async fn compile(&self, req: &CompileRequest) -> Result<CompileResult> {
        let prepared = PreparedRequest::new(req, &self.policy)?;
        let strategy = BuildStrategy::select(self.resolver.as_ref(), &prepared.request);
        log::debug!("compile strategy for {}: {:?}", prepared.root().display(), strategy);

        let mut result = match &strategy {
            BuildStrategy::Managed { latexmk } => self.compile_managed(latexmk, &prepared).await,
            BuildStrategy::Direct { engine } => self.compile_direct(engine, &prepared).await,
        };
        result.policy_warnings = prepared.warnings;
        Ok(result)
    }

    async fn compile_managed(&self, latexmk: &Path, prepared: &PreparedRequest) -> CompileResult {
        let args = prepared.latexmk_args();
        let opts =
            RunOptions::with_timeout(MANAGED_TIMEOUT).cwd(paths::parent_dir(prepared.root()));
        let out = self.run_tool(latexmk, &args, &opts).await;

        let raw_log = format!("{}\n{}", out.stdout, out.stderr);
        let mut diagnostics = parse_log(&raw_log);
        if missing_script_engine(&raw_log) {
            diagnostics.push(
                Diagnostic::error("MiKTeX could not find the script engine 'perl' required by latexmk.")
                    .with_code(DiagnosticCode::MissingPerl)
                    .with_hint("Install Strawberry Perl (https://strawberryperl.com/) and ensure perl is on PATH, or follow MiKTeX KB: https://miktex.org/kb/fix-script-engine-not-found"),
            );
        }

        finish(prepared, out, raw_log, diagnostics, false)
    }

    async fn compile_direct(&self, engine: &Path, prepared: &PreparedRequest) -> CompileResult {
        let args = prepared.engine_args();
        let opts =
            RunOptions::with_timeout(ENGINE_PASS_TIMEOUT).cwd(paths::parent_dir(prepared.root()));

        let first = self.run_tool(engine, &args, &opts).await;
        let mut raw_log = first.combined();
        let mut timed_out = first.timed_out;

        if let Some(bib) = self.fallback_bibliography(prepared).await {
            raw_log.push('\n');
            raw_log.push_str(&bib.combined());
            timed_out |= bib.timed_out;
        }

        let second = self.run_tool(engine, &args, &opts).await;
        raw_log.push('\n');
        raw_log.push_str(&second.combined());

        let diagnostics = parse_log(&raw_log);
        finish(prepared, second, raw_log, diagnostics, timed_out)
    }

    /// Removes auxiliary files with `latexmk -c` (or `-C` when `deep`).
    pub async fn clean(&self, req: &CleanRequest) -> Result<CleanResult> {
        let root = self.policy.ensure_inside(&req.root)?;
        let mut args = Vec::new();
        if let Some(out) = &req.out_dir {
            args.push(format!("-outdir={}", self.policy.ensure_inside(out)?.display()));
        }
        args.push(if req.deep { "-C" } else { "-c" }.to_string());
        args.push(root.display().to_string());

        let latexmk = self.resolver.resolve_or_name(LATEXMK);
        let opts = RunOptions::with_timeout(CLEAN_TIMEOUT).cwd(paths::parent_dir(&root));
        let out = self.run_tool(&latexmk, &args, &opts).await;
        Ok(CleanResult {
            cleaned: out.success(),
            command: out.command,
            args: out.args,
            code: out.code,
        })
    }
}

fn finish(
    prepared: &PreparedRequest,
    last: RunOutput,
    raw_log: String,
    diagnostics: Vec<Diagnostic>,
    earlier_timeout: bool,
) -> CompileResult {
    let success = last.success() && !diagnostics.iter().any(Diagnostic::is_error);
    CompileResult {
        success,
        pdf_path: prepared.pdf_path(),
        diagnostics,
        policy_warnings: Vec::new(),
        raw_log,
        command: last.command,
        args: last.args,
        code: last.code,
        timed_out: earlier_timeout || last.timed_out,
    }
}
