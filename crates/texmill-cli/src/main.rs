use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use texmill_build::bibliography::{BibRequest, BibTool};
use texmill_build::lint::{LintRequest, LintResult};
use texmill_build::{CleanRequest, CompileRequest, Compiler, FormatRequest};
use texmill_core::process::TokioRunner;
use texmill_core::toolchain::{detect_toolchain, WhichResolver};
use texmill_core::{Config, Engine, Interaction, WorkspacePolicy};
use texmill_project::{compute_out_of_date, detect_root, DetectRootOptions, OutOfDateRequest};
use texmill_watch::WatchRegistry;

/// How often `watch` polls the session buffer for new lines.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "texmill")]
#[command(about = "LaTeX build orchestration tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Root .tex document
    #[arg(value_name = "ROOT")]
    root: PathBuf,
    /// pdflatex, xelatex or lualatex (defaults to the configured engine)
    #[arg(long)]
    engine: Option<Engine>,
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
    /// Do not write SyncTeX data
    #[arg(long)]
    no_synctex: bool,
    /// Request -shell-escape (still subject to workspace policy)
    #[arg(long)]
    shell_escape: bool,
    /// batchmode, nonstopmode, scrollmode or errorstopmode
    #[arg(long, default_value = "nonstopmode")]
    interaction: Interaction,
    #[arg(long)]
    halt_on_error: bool,
    #[arg(long)]
    jobname: Option<String>,
}

impl CompileArgs {
    fn into_request(self, config: &Config) -> CompileRequest {
        CompileRequest {
            root: self.root,
            engine: self.engine.unwrap_or(config.default_engine),
            out_dir: self.out_dir,
            synctex: !self.no_synctex,
            shell_escape: self.shell_escape,
            interaction: self.interaction,
            halt_on_error: self.halt_on_error,
            jobname: self.jobname,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BibToolArg {
    Biber,
    Bibtex,
}

impl From<BibToolArg> for BibTool {
    fn from(arg: BibToolArg) -> Self {
        match arg {
            BibToolArg::Biber => BibTool::Biber,
            BibToolArg::Bibtex => BibTool::Bibtex,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a document and emit the result as JSON
    Compile(CompileArgs),
    /// Remove auxiliary files with latexmk
    Clean {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
        /// Also remove generated PDFs
        #[arg(long)]
        deep: bool,
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },
    /// Print the include/graphics/bibliography graph of a document
    Graph {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },
    /// Check whether the PDF is older than any of its sources
    Outdated {
        #[arg(value_name = "ROOT")]
        root: PathBuf,
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        jobname: Option<String>,
        /// Compare against this PDF instead of the computed one
        #[arg(long, value_name = "FILE")]
        pdf: Option<PathBuf>,
    },
    /// Guess the root document of a project
    Root {
        /// File or directory to start from (defaults to the current directory)
        #[arg(value_name = "START")]
        start: Option<PathBuf>,
        /// Use this file if it exists
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Parse a TeX log file and emit diagnostics as JSON
    ParseLog {
        /// Path to the .log file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// List TeX tools found on this machine with their versions
    Toolchain,
    /// Run ChkTeX over one or more files
    Lint {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
        /// chktexrc to use
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Emit diagnostics as JSON instead of ChkTeX's own output
        #[arg(long)]
        structured: bool,
    },
    /// Reformat a file with latexindent
    Format {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// latexindent settings file
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Overwrite the file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },
    /// Run biber or bibtex for a document
    Bib {
        #[arg(value_enum)]
        tool: BibToolArg,
        /// Root .tex or its .aux file
        #[arg(value_name = "ROOT_OR_AUX")]
        root_or_aux: PathBuf,
    },
    /// Rebuild on change with latexmk -pvc until interrupted
    Watch {
        #[command(flatten)]
        args: CompileArgs,
        /// Lines of earlier output to show when attaching
        #[arg(long, default_value_t = texmill_watch::DEFAULT_TAIL_LINES)]
        tail: usize,
    },
}

/// Builds a freshness request with every path checked against the workspace.
fn outdated_request(
    policy: &WorkspacePolicy,
    root: PathBuf,
    out_dir: Option<PathBuf>,
    jobname: Option<String>,
    pdf: Option<PathBuf>,
) -> anyhow::Result<OutOfDateRequest> {
    Ok(OutOfDateRequest {
        root: policy.ensure_inside(&root)?,
        out_dir: out_dir.map(|d| policy.ensure_inside(d)).transpose()?,
        jobname,
        pdf_path: pdf.map(|p| policy.ensure_inside(p)).transpose()?,
    })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let policy = config.policy();
    log::debug!("workspace policy: {:?}", policy);
    let compiler = Compiler::with_policy(policy.clone());

    match cli.command {
        Commands::Compile(args) => {
            let result = compiler.compile(&args.into_request(&config)).await?;
            print_json(&result)?;
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Clean { root, deep, out_dir } => {
            let result = compiler.clean(&CleanRequest { root, deep, out_dir }).await?;
            print_json(&result)?;
        }
        Commands::Graph { root } => {
            let root = policy.ensure_inside(&root)?;
            print_json(&texmill_project::build_dependency_graph(&root))?;
        }
        Commands::Outdated {
            root,
            out_dir,
            jobname,
            pdf,
        } => {
            let req = outdated_request(&policy, root, out_dir, jobname, pdf)?;
            print_json(&compute_out_of_date(&req))?;
        }
        Commands::Root { start, file } => {
            let start = start.map(|s| policy.ensure_inside(s)).transpose()?;
            let file = file.map(|f| policy.ensure_inside(f)).transpose()?;
            print_json(&detect_root(&DetectRootOptions {
                file,
                start_path: start,
            }))?;
        }
        Commands::ParseLog { path } => {
            let content = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let diagnostics = texmill_log::parse_log(&String::from_utf8_lossy(&content));
            print_json(&diagnostics)?;
        }
        Commands::Toolchain => {
            let tools = detect_toolchain(Arc::new(WhichResolver), Arc::new(TokioRunner)).await;
            print_json(&tools)?;
        }
        Commands::Lint {
            files,
            config: chktexrc,
            structured,
        } => {
            let req = LintRequest {
                files,
                config: chktexrc,
                structured,
            };
            match compiler.lint(&req).await? {
                LintResult::Raw { output } => println!("{}", output),
                structured => print_json(&structured)?,
            }
        }
        Commands::Format {
            file,
            config: settings,
            in_place,
        } => {
            let result = compiler
                .format(&FormatRequest {
                    file,
                    config: settings,
                    in_place,
                })
                .await?;
            if result.output.ends_with('\n') {
                print!("{}", result.output);
            } else {
                println!("{}", result.output);
            }
        }
        Commands::Bib { tool, root_or_aux } => {
            let result = compiler
                .build_bibliography(&BibRequest {
                    tool: tool.into(),
                    root_or_aux,
                })
                .await?;
            print_json(&result)?;
        }
        Commands::Watch { args, tail } => {
            let registry = WatchRegistry::from_config(&config);
            watch(&registry, args.into_request(&config), tail).await?;
        }
    }
    Ok(())
}

/// Runs one watch session in the foreground, echoing its output until the
/// process exits or Ctrl-C is pressed.
async fn watch(registry: &WatchRegistry, req: CompileRequest, tail: usize) -> anyhow::Result<()> {
    let info = registry.start(&req)?;
    eprintln!("watching {} (session {})", info.root.display(), info.id);
    for warning in &info.policy_warnings {
        eprintln!("warning: {}", warning.message);
    }

    let mut cursor = 0;
    let mut first = true;
    loop {
        let (lines, next) = registry.read_since(&info.id, cursor)?;
        let skip = if first { lines.len().saturating_sub(tail) } else { 0 };
        for line in lines.iter().skip(skip) {
            println!("{}", line);
        }
        cursor = next;
        first = false;

        if registry.is_running(&info.id) != Some(true) {
            registry.stop(&info.id);
            bail!("watch process exited");
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(FOLLOW_INTERVAL) => {}
        }
    }

    registry.stop(&info.id);
    eprintln!("stopped session {}", info.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compile_flags() {
        let cli = Cli::try_parse_from([
            "texmill",
            "compile",
            "main.tex",
            "--engine",
            "xelatex",
            "--no-synctex",
            "--jobname",
            "final",
        ])
        .unwrap();
        let Commands::Compile(args) = cli.command else {
            panic!("expected compile");
        };
        let req = args.into_request(&Config::default());
        assert_eq!(req.engine, Engine::Xelatex);
        assert!(!req.synctex);
        assert_eq!(req.jobname.as_deref(), Some("final"));
        assert_eq!(req.interaction, Interaction::Nonstopmode);
    }

    #[test]
    fn test_engine_defaults_to_config() {
        let cli = Cli::try_parse_from(["texmill", "watch", "main.tex"]).unwrap();
        let Commands::Watch { args, tail } = cli.command else {
            panic!("expected watch");
        };
        let config = Config {
            default_engine: Engine::Lualatex,
            ..Config::default()
        };
        assert_eq!(args.into_request(&config).engine, Engine::Lualatex);
        assert_eq!(tail, 200);
    }

    #[test]
    fn test_lint_requires_files() {
        assert!(Cli::try_parse_from(["texmill", "lint"]).is_err());
        assert!(Cli::try_parse_from(["texmill", "bib", "biber", "main.aux"]).is_ok());
        assert!(Cli::try_parse_from(["texmill", "bib", "makeindex", "main.aux"]).is_err());
    }

    #[test]
    fn test_format_flags() {
        let cli = Cli::try_parse_from([
            "texmill",
            "format",
            "main.tex",
            "--config",
            "indent.yaml",
            "--in-place",
        ])
        .unwrap();
        let Commands::Format {
            file,
            config,
            in_place,
        } = cli.command
        else {
            panic!("expected format");
        };
        assert_eq!(file, PathBuf::from("main.tex"));
        assert_eq!(config, Some(PathBuf::from("indent.yaml")));
        assert!(in_place);
        assert!(Cli::try_parse_from(["texmill", "format"]).is_err());
    }

    #[test]
    fn test_outdated_paths_must_stay_in_workspace() {
        let ws = tempfile::tempdir().unwrap();
        let policy = WorkspacePolicy::with_root(ws.path());
        let root = ws.path().join("main.tex");
        let outside = tempfile::tempdir().unwrap();

        let req = outdated_request(
            &policy,
            root.clone(),
            Some(ws.path().join("build")),
            None,
            None,
        )
        .unwrap();
        assert!(req.out_dir.unwrap().starts_with(ws.path()));

        let err = outdated_request(
            &policy,
            root.clone(),
            Some(outside.path().to_path_buf()),
            None,
            None,
        );
        assert!(err.is_err());

        let err = outdated_request(
            &policy,
            root,
            None,
            None,
            Some(outside.path().join("main.pdf")),
        );
        assert!(err.is_err());
    }
}
