use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use texmill_build::*;
use texmill_core::process::{CommandRunner, RunOptions, RunOutput};
use texmill_core::toolchain::StaticResolver;
use texmill_core::{Error, WorkspacePolicy};
use texmill_log::{DiagnosticCode, DiagnosticKind};

#[derive(Debug, Clone, PartialEq)]
struct Call {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

type Script = dyn Fn(&Call) -> texmill_core::Result<(i32, String, String)> + Send + Sync;

/// Records every invocation and answers from a script.
struct MockRunner {
    calls: Mutex<Vec<Call>>,
    script: Box<Script>,
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner").finish()
    }
}

impl MockRunner {
    fn new(
        script: impl Fn(&Call) -> texmill_core::Result<(i32, String, String)> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script: Box::new(script),
        })
    }

    fn ok(stdout: &'static str) -> Arc<Self> {
        Self::new(move |_| Ok((0, stdout.to_string(), String::new())))
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn programs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| c.program.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        opts: &RunOptions,
    ) -> texmill_core::Result<RunOutput> {
        let call = Call {
            program: program.to_path_buf(),
            args: args.to_vec(),
            cwd: opts.cwd.clone(),
        };
        self.calls.lock().unwrap().push(call.clone());
        let (code, stdout, stderr) = (self.script)(&call)?;
        Ok(RunOutput {
            command: program.display().to_string(),
            args: args.to_vec(),
            code: Some(code),
            stdout,
            stderr,
            timed_out: false,
        })
    }
}

fn with_latexmk() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new()
            .with_tool("latexmk", "/tex/bin/latexmk")
            .with_tool("biber", "/tex/bin/biber")
            .with_tool("bibtex", "/tex/bin/bibtex")
            .with_tool("chktex", "/tex/bin/chktex")
            .with_tool("latexindent", "/tex/bin/latexindent"),
    )
}

fn without_latexmk() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new()
            .with_tool("pdflatex", "/tex/bin/pdflatex")
            .with_tool("biber", "/tex/bin/biber")
            .with_tool("bibtex", "/tex/bin/bibtex"),
    )
}

fn project() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("main.tex");
    std::fs::write(&root, "\\documentclass{article}\\begin{document}x\\end{document}").unwrap();
    (dir, root)
}

#[tokio::test]
async fn test_managed_compile_succeeds() {
    let (dir, root) = project();
    let runner = MockRunner::ok("Latexmk: All targets are up-to-date\n");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::with_root(dir.path()));

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert!(res.success);
    assert_eq!(res.code, Some(0));
    assert_eq!(res.command, "/tex/bin/latexmk");
    assert_eq!(res.pdf_path, texmill_core::paths::normalize(&dir.path().join("main.pdf")));
    assert!(res.args.contains(&"-pdf".to_string()));
    assert!(res.args.contains(&"-synctex=1".to_string()));
    assert_eq!(runner.calls().len(), 1);
    assert_eq!(
        runner.calls()[0].cwd,
        Some(texmill_core::paths::normalize(dir.path()))
    );
}

#[tokio::test]
async fn test_error_in_log_fails_even_with_zero_exit() {
    let (_dir, root) = project();
    let runner = MockRunner::ok("! Undefined control sequence.\nl.5 \\foo\n");
    let compiler = Compiler::new(runner, with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert!(!res.success);
    assert_eq!(res.diagnostics.len(), 1);
    assert_eq!(res.diagnostics[0].line, Some(5));
    assert_eq!(res.diagnostics, texmill_log::parse_log(&res.raw_log));
}

#[tokio::test]
async fn test_missing_perl_is_reported() {
    let (_dir, root) = project();
    let runner = MockRunner::new(|_| {
        Ok((
            1,
            String::new(),
            "latexmk: MiKTeX could not find the script engine 'perl' which is required to execute 'latexmk'.".into(),
        ))
    });
    let compiler = Compiler::new(runner, with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert!(!res.success);
    let last = res.diagnostics.last().unwrap();
    assert_eq!(last.code, Some(DiagnosticCode::MissingPerl));
    assert_eq!(last.kind, DiagnosticKind::Error);
    assert!(last.hint.as_ref().unwrap().contains("perl"));
}

#[tokio::test]
async fn test_direct_fallback_runs_biber_between_passes() {
    let (dir, root) = project();
    let bcf = dir.path().join("main.bcf");
    let runner = MockRunner::new(move |call| {
        let name = call.program.file_name().unwrap().to_string_lossy().into_owned();
        if name == "pdflatex" {
            std::fs::write(&bcf, "<bcf/>").unwrap();
        }
        Ok((0, format!("{} ran", name), String::new()))
    });
    let compiler = Compiler::new(runner.clone(), without_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert_eq!(runner.programs(), vec!["pdflatex", "biber", "pdflatex"]);
    assert_eq!(res.raw_log, "pdflatex ran\nbiber ran\npdflatex ran");
    assert_eq!(res.command, "/tex/bin/pdflatex");
    assert!(res.success);

    let calls = runner.calls();
    let biber = &calls[1];
    assert_eq!(biber.args, vec!["main"]);
    assert_eq!(biber.cwd, Some(texmill_core::paths::normalize(dir.path())));
}

#[tokio::test]
async fn test_direct_fallback_runs_bibtex_for_cited_aux() {
    let (dir, root) = project();
    let out_dir = dir.path().join("build");
    std::fs::create_dir(&out_dir).unwrap();
    let aux = out_dir.join("final.aux");
    let runner = MockRunner::new(move |_| {
        std::fs::write(&aux, "\\relax\n\\citation{knuth84}\n").unwrap();
        Ok((0, String::new(), String::new()))
    });
    let compiler = Compiler::new(runner.clone(), without_latexmk(), WorkspacePolicy::unrestricted());

    let mut req = CompileRequest::new(&root);
    req.out_dir = Some(out_dir.clone());
    req.jobname = Some("final".into());
    let res = compiler.compile(&req).await.unwrap();

    assert_eq!(runner.programs(), vec!["pdflatex", "bibtex", "pdflatex"]);
    assert_eq!(runner.calls()[1].args, vec!["final"]);
    assert_eq!(res.pdf_path, texmill_core::paths::normalize(&out_dir.join("final.pdf")));
}

#[tokio::test]
async fn test_direct_fallback_without_bibliography_runs_two_passes() {
    let (_dir, root) = project();
    let runner = MockRunner::ok("Output written on main.pdf (1 page).");
    let compiler = Compiler::new(runner.clone(), without_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert_eq!(runner.programs(), vec!["pdflatex", "pdflatex"]);
    assert!(res.success);
    assert!(res.args.contains(&"-interaction=nonstopmode".to_string()));
}

#[tokio::test]
async fn test_spawn_failure_degrades_to_unsuccessful_result() {
    let (_dir, root) = project();
    let runner = MockRunner::new(|call| {
        Err(Error::Spawn {
            program: call.program.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        })
    });
    let compiler = Compiler::new(runner, with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler.compile(&CompileRequest::new(&root)).await.unwrap();

    assert!(!res.success);
    assert_eq!(res.code, None);
    assert!(res.raw_log.contains("failed to start"));
}

#[tokio::test]
async fn test_shell_escape_downgrade_is_a_policy_warning() {
    let (_dir, root) = project();
    let runner = MockRunner::ok("");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::unrestricted());

    let mut req = CompileRequest::new(&root);
    req.shell_escape = true;
    let res = compiler.compile(&req).await.unwrap();

    assert!(res.success);
    assert!(res.diagnostics.is_empty());
    assert_eq!(res.policy_warnings.len(), 1);
    assert_eq!(res.policy_warnings[0].code, Some(DiagnosticCode::ShellEscapeDisabled));
    assert!(!runner.calls()[0].args.contains(&"-shell-escape".to_string()));
}

#[tokio::test]
async fn test_outside_workspace_runs_nothing() {
    let (_dir, root) = project();
    let other = tempfile::tempdir().unwrap();
    let runner = MockRunner::ok("");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::with_root(other.path()));

    let err = compiler.compile(&CompileRequest::new(&root)).await.unwrap_err();

    assert!(matches!(err, Error::OutsideWorkspace { .. }));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_clean_reports_by_exit_code() {
    let (_dir, root) = project();
    let runner = MockRunner::new(|_| Ok((12, String::new(), "boom".into())));
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler
        .clean(&CleanRequest {
            root: root.clone(),
            deep: true,
            out_dir: None,
        })
        .await
        .unwrap();

    assert!(!res.cleaned);
    assert_eq!(res.code, Some(12));
    assert_eq!(res.args[0], "-C");
    assert_eq!(res.args[1], texmill_core::paths::normalize(&root).display().to_string());
}

#[tokio::test]
async fn test_bibliography_build_uses_base_name_and_directory() {
    let (dir, _root) = project();
    let runner = MockRunner::ok("INFO - Found 3 citekeys");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler
        .build_bibliography(&BibRequest {
            tool: BibTool::Biber,
            root_or_aux: dir.path().join("thesis.aux"),
        })
        .await
        .unwrap();

    assert_eq!(res.command, "/tex/bin/biber");
    assert_eq!(res.args, vec!["thesis"]);
    assert_eq!(res.output, "INFO - Found 3 citekeys");
    assert_eq!(runner.calls()[0].cwd, Some(texmill_core::paths::normalize(dir.path())));
}

#[tokio::test]
async fn test_structured_lint_keeps_file_order() {
    let (dir, _root) = project();
    let runner = MockRunner::new(|call| {
        let file = call.args.last().unwrap().clone();
        Ok((2, format!("{}:1:2:Command terminated with space.\n", file), String::new()))
    });
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::unrestricted());

    let files: Vec<PathBuf> = (0..6).map(|i| dir.path().join(format!("f{}.tex", i))).collect();
    let res = compiler
        .lint(&LintRequest {
            files: files.clone(),
            config: None,
            structured: true,
        })
        .await
        .unwrap();

    let LintResult::Structured { diagnostics } = res else {
        panic!("expected structured output");
    };
    assert_eq!(diagnostics.len(), 6);
    for (diag, file) in diagnostics.iter().zip(&files) {
        assert_eq!(diag.file.as_deref(), Some(file.display().to_string().as_str()));
        assert_eq!(diag.code, Some(DiagnosticCode::Chktex));
    }
    assert!(runner.calls()[0].args.contains(&"-q".to_string()));
}

#[tokio::test]
async fn test_raw_lint_output_is_headed_per_file() {
    let (_dir, root) = project();
    let runner = MockRunner::ok("Warning 1 in main.tex line 1");
    let compiler = Compiler::new(runner, with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler
        .lint(&LintRequest {
            files: vec![root.clone()],
            ..Default::default()
        })
        .await
        .unwrap();

    let LintResult::Raw { output } = res else {
        panic!("expected raw output");
    };
    assert!(output.starts_with(&format!(">>> {}\n", texmill_core::paths::normalize(&root).display())));
    assert!(output.ends_with("Warning 1 in main.tex line 1"));
}

#[tokio::test]
async fn test_format_returns_formatted_text() {
    let (dir, root) = project();
    let settings = dir.path().join("indent.yaml");
    let runner = MockRunner::ok("\\documentclass{article}\n\\begin{document}\n  x\n\\end{document}\n");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::with_root(dir.path()));

    let res = compiler
        .format(&FormatRequest {
            file: root.clone(),
            config: Some(settings.clone()),
            in_place: false,
        })
        .await
        .unwrap();

    assert!(res.output.starts_with("\\documentclass{article}\n"));
    let call = &runner.calls()[0];
    assert_eq!(call.program, PathBuf::from("/tex/bin/latexindent"));
    assert_eq!(
        call.args,
        vec![
            "-l".to_string(),
            texmill_core::paths::normalize(&settings).display().to_string(),
            texmill_core::paths::normalize(&root).display().to_string(),
        ]
    );
}

#[tokio::test]
async fn test_format_in_place_reports_when_silent() {
    let (_dir, root) = project();
    let runner = MockRunner::ok("");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::unrestricted());

    let res = compiler
        .format(&FormatRequest {
            file: root.clone(),
            config: None,
            in_place: true,
        })
        .await
        .unwrap();

    assert_eq!(res.output, "formatted in-place");
    assert_eq!(runner.calls()[0].args[0], "-w");
    assert_eq!(runner.calls()[0].args.len(), 2);
}

#[tokio::test]
async fn test_format_settings_outside_workspace_runs_nothing() {
    let (dir, root) = project();
    let other = tempfile::tempdir().unwrap();
    let runner = MockRunner::ok("");
    let compiler = Compiler::new(runner.clone(), with_latexmk(), WorkspacePolicy::with_root(dir.path()));

    let err = compiler
        .format(&FormatRequest {
            file: root,
            config: Some(other.path().join("indent.yaml")),
            in_place: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::OutsideWorkspace { .. }));
    assert!(runner.calls().is_empty());
}
