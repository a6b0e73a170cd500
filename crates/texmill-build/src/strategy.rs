use crate::request::CompileRequest;
use serde::Serialize;
use std::path::{Path, PathBuf};
use texmill_core::toolchain::ToolResolver;
use texmill_core::{paths, Result, WorkspacePolicy};
use texmill_log::{Diagnostic, DiagnosticCode};

pub const LATEXMK: &str = "latexmk";

/// How a compile is carried out, decided once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuildStrategy {
    /// latexmk sequences engine and bibliography passes itself.
    Managed { latexmk: PathBuf },
    /// Engine, optional biber/bibtex, engine again.
    Direct { engine: PathBuf },
}

impl BuildStrategy {
    pub fn select(resolver: &dyn ToolResolver, req: &CompileRequest) -> Self {
        match resolver.resolve(LATEXMK) {
            Some(latexmk) => BuildStrategy::Managed { latexmk },
            None => BuildStrategy::Direct {
                engine: resolver.resolve_or_name(req.engine.executable()),
            },
        }
    }
}

/// A [`CompileRequest`] after workspace checks and path normalization.
///
/// `request.shell_escape` holds the effective value: a request the policy
/// refuses is downgraded and the downgrade recorded in `warnings`.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub request: CompileRequest,
    pub warnings: Vec<Diagnostic>,
}

impl PreparedRequest {
    /// # Errors
    ///
    /// [`texmill_core::Error::OutsideWorkspace`] when the root or output
    /// directory escapes the workspace.
    pub fn new(req: &CompileRequest, policy: &WorkspacePolicy) -> Result<Self> {
        let mut request = req.clone();
        request.root = policy.ensure_inside(&req.root)?;
        request.out_dir = match &req.out_dir {
            Some(dir) => Some(policy.ensure_inside(dir)?),
            None => None,
        };

        let mut warnings = Vec::new();
        if request.shell_escape && !policy.allow_shell_escape {
            log::warn!(
                "shell escape requested for {} but disabled by policy",
                request.root.display()
            );
            request.shell_escape = false;
            warnings.push(
                Diagnostic::warning("Shell escape was requested but is disabled by workspace policy; compiling without it.")
                    .with_code(DiagnosticCode::ShellEscapeDisabled)
                    .with_hint("Set allowShellEscape in .texmill.json or TEXMILL_ALLOW_SHELL_ESCAPE=1 to permit -shell-escape."),
            );
        }

        Ok(Self { request, warnings })
    }

    pub fn root(&self) -> &Path {
        &self.request.root
    }

    /// Directory holding generated artifacts.
    pub fn artifact_dir(&self) -> PathBuf {
        match &self.request.out_dir {
            Some(dir) => dir.clone(),
            None => paths::parent_dir(&self.request.root),
        }
    }

    pub fn job_base(&self) -> String {
        paths::job_base(&self.request.root, self.request.jobname.as_deref())
    }

    pub fn artifact(&self, ext: &str) -> PathBuf {
        paths::artifact_path(
            &self.request.root,
            self.request.out_dir.as_deref(),
            self.request.jobname.as_deref(),
            ext,
        )
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.artifact("pdf")
    }

    fn latexmk_common(&self) -> Vec<String> {
        let req = &self.request;
        let mut args = Vec::new();
        if let Some(out) = &req.out_dir {
            args.push(format!("-outdir={}", out.display()));
        }
        if req.synctex {
            args.push("-synctex=1".into());
        }
        if req.shell_escape {
            args.push("-shell-escape".into());
        }
        if req.halt_on_error {
            args.push("-halt-on-error".into());
        }
        if let Some(job) = &req.jobname {
            args.push(format!("-jobname={}", job));
        }
        args.push(req.engine.latexmk_switch().into());
        args.push(format!("-interaction={}", req.interaction.as_str()));
        args
    }

    /// Arguments for a one-shot latexmk build.
    pub fn latexmk_args(&self) -> Vec<String> {
        let mut args = self.latexmk_common();
        args.push(self.request.root.display().to_string());
        args
    }

    /// Arguments for a persistent `latexmk -pvc` session.
    pub fn watch_args(&self) -> Vec<String> {
        let mut args = self.latexmk_common();
        args.push("-pvc".into());
        args.push(self.request.root.display().to_string());
        args
    }

    /// Arguments for one direct engine pass.
    pub fn engine_args(&self) -> Vec<String> {
        let req = &self.request;
        let mut args = Vec::new();
        if req.synctex {
            args.push("-synctex=1".into());
        }
        args.push(format!("-interaction={}", req.interaction.as_str()));
        if req.shell_escape {
            args.push("-shell-escape".into());
        }
        if req.halt_on_error {
            args.push("-halt-on-error".into());
        }
        if let Some(job) = &req.jobname {
            args.push(format!("-jobname={}", job));
        }
        if let Some(out) = &req.out_dir {
            args.push(format!("-output-directory={}", out.display()));
        }
        args.push(req.root.display().to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texmill_core::Engine;
    use texmill_core::toolchain::StaticResolver;

    #[test]
    fn test_strategy_selection() {
        let req = CompileRequest::new("main.tex");
        let with = StaticResolver::new().with_tool("latexmk", "/tex/latexmk");
        assert_eq!(
            BuildStrategy::select(&with, &req),
            BuildStrategy::Managed {
                latexmk: PathBuf::from("/tex/latexmk")
            }
        );

        let mut req = CompileRequest::new("main.tex");
        req.engine = Engine::Xelatex;
        let without = StaticResolver::new();
        assert_eq!(
            BuildStrategy::select(&without, &req),
            BuildStrategy::Direct {
                engine: PathBuf::from("xelatex")
            }
        );
    }

    #[test]
    fn test_shell_escape_downgrade() {
        let mut req = CompileRequest::new("main.tex");
        req.shell_escape = true;

        let denied = PreparedRequest::new(&req, &WorkspacePolicy::unrestricted()).unwrap();
        assert!(!denied.request.shell_escape);
        assert_eq!(denied.warnings.len(), 1);
        assert_eq!(denied.warnings[0].code, Some(DiagnosticCode::ShellEscapeDisabled));
        assert!(!denied.latexmk_args().contains(&"-shell-escape".to_string()));

        let policy = WorkspacePolicy {
            allow_shell_escape: true,
            ..WorkspacePolicy::unrestricted()
        };
        let allowed = PreparedRequest::new(&req, &policy).unwrap();
        assert!(allowed.warnings.is_empty());
        assert!(allowed.engine_args().contains(&"-shell-escape".to_string()));
    }

    #[test]
    #[cfg(unix)]
    fn test_latexmk_argument_order() {
        let mut req = CompileRequest::new("/w/thesis.tex");
        req.engine = Engine::Lualatex;
        req.out_dir = Some("/w/build".into());
        req.halt_on_error = true;
        req.jobname = Some("final".into());

        let p = PreparedRequest::new(&req, &WorkspacePolicy::unrestricted()).unwrap();
        assert_eq!(
            p.latexmk_args(),
            vec![
                "-outdir=/w/build",
                "-synctex=1",
                "-halt-on-error",
                "-jobname=final",
                "-pdflua",
                "-interaction=nonstopmode",
                "/w/thesis.tex",
            ]
        );
        assert_eq!(p.watch_args()[6], "-pvc");
        assert_eq!(p.pdf_path(), PathBuf::from("/w/build/final.pdf"));
    }

    #[test]
    #[cfg(unix)]
    fn test_engine_arguments() {
        let mut req = CompileRequest::new("/w/a.tex");
        req.synctex = false;
        req.out_dir = Some("/w/out".into());
        let p = PreparedRequest::new(&req, &WorkspacePolicy::unrestricted()).unwrap();
        assert_eq!(
            p.engine_args(),
            vec!["-interaction=nonstopmode", "-output-directory=/w/out", "/w/a.tex"]
        );
        assert_eq!(p.artifact("aux"), PathBuf::from("/w/out/a.aux"));
    }

    #[test]
    #[cfg(unix)]
    fn test_paths_outside_workspace_are_rejected() {
        let policy = WorkspacePolicy::with_root("/w");
        assert!(PreparedRequest::new(&CompileRequest::new("/etc/x.tex"), &policy).is_err());

        let mut req = CompileRequest::new("/w/a.tex");
        req.out_dir = Some("/tmp/out".into());
        assert!(PreparedRequest::new(&req, &policy).is_err());
    }
}
