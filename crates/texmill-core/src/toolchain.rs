//! Locating TeX executables and probing their versions.
//!
//! Everything that needs an executable path goes through a [`ToolResolver`],
//! so orchestration logic can be exercised with a [`StaticResolver`] and no
//! TeX distribution installed.

use crate::process::{CommandRunner, RunOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// The TeX engines a compile request may select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Pdflatex,
    Xelatex,
    Lualatex,
}

impl Engine {
    /// Executable name of the engine.
    pub fn executable(self) -> &'static str {
        match self {
            Engine::Pdflatex => "pdflatex",
            Engine::Xelatex => "xelatex",
            Engine::Lualatex => "lualatex",
        }
    }

    /// The latexmk switch that makes latexmk drive this engine.
    pub fn latexmk_switch(self) -> &'static str {
        match self {
            Engine::Pdflatex => "-pdf",
            Engine::Xelatex => "-pdfxe",
            Engine::Lualatex => "-pdflua",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdflatex" => Ok(Engine::Pdflatex),
            "xelatex" => Ok(Engine::Xelatex),
            "lualatex" => Ok(Engine::Lualatex),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// TeX interaction mode passed as `-interaction=<mode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interaction {
    Batchmode,
    #[default]
    Nonstopmode,
    Scrollmode,
    Errorstopmode,
}

impl Interaction {
    pub fn as_str(self) -> &'static str {
        match self {
            Interaction::Batchmode => "batchmode",
            Interaction::Nonstopmode => "nonstopmode",
            Interaction::Scrollmode => "scrollmode",
            Interaction::Errorstopmode => "errorstopmode",
        }
    }
}

impl FromStr for Interaction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batchmode" => Ok(Interaction::Batchmode),
            "nonstopmode" => Ok(Interaction::Nonstopmode),
            "scrollmode" => Ok(Interaction::Scrollmode),
            "errorstopmode" => Ok(Interaction::Errorstopmode),
            other => Err(format!("unknown interaction mode '{}'", other)),
        }
    }
}

/// Maps a logical tool name (`latexmk`, `biber`, ...) to an executable path.
pub trait ToolResolver: Send + Sync + fmt::Debug {
    /// Returns the absolute path of `tool`, or `None` if it is not installed.
    fn resolve(&self, tool: &str) -> Option<PathBuf>;

    /// Like [`resolve`](Self::resolve) but falls back to the bare tool name,
    /// leaving the final lookup to the operating system.
    fn resolve_or_name(&self, tool: &str) -> PathBuf {
        self.resolve(tool).unwrap_or_else(|| PathBuf::from(tool))
    }
}

/// Resolver backed by `PATH` plus the usual TeX distribution directories.
#[derive(Debug, Default)]
pub struct WhichResolver;

#[cfg(not(windows))]
const EXTRA_DIRS: &[&str] = &[
    "/Library/TeX/texbin",
    "/usr/texbin",
    "/opt/texbin",
    "/usr/local/texlive/bin",
    "/usr/local/bin",
    "/usr/bin",
];

#[cfg(windows)]
const EXTRA_DIRS: &[&str] = &[
    r"C:\Program Files\MiKTeX\miktex\bin\x64",
    r"C:\Program Files\MiKTeX 2.9\miktex\bin\x64",
    r"C:\Program Files (x86)\MiKTeX 2.9\miktex\bin",
    r"C:\texlive\2024\bin\windows",
    r"C:\texlive\2023\bin\windows",
    r"C:\texlive\2022\bin\win32",
];

impl WhichResolver {
    fn executable_name(tool: &str) -> String {
        if cfg!(windows) && !tool.to_ascii_lowercase().ends_with(".exe") {
            format!("{}.exe", tool)
        } else {
            tool.to_string()
        }
    }

    fn search_extra_dirs(tool: &str) -> Option<PathBuf> {
        let name = Self::executable_name(tool);
        for dir in EXTRA_DIRS {
            let candidate = Path::new(dir).join(&name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // TeX Live installs binaries under an architecture subdirectory.
        let arch_root = Path::new("/usr/local/texlive/bin");
        if let Ok(entries) = std::fs::read_dir(arch_root) {
            for entry in entries.flatten() {
                let candidate = entry.path().join(&name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }
}

impl ToolResolver for WhichResolver {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool)
            .ok()
            .or_else(|| Self::search_extra_dirs(tool))
    }
}

/// Resolver answering from a fixed table. Unknown tools are absent.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    tools: HashMap<String, PathBuf>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(tool.to_string(), path.into());
        self
    }
}

impl ToolResolver for StaticResolver {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        self.tools.get(tool).cloned()
    }
}

/// Presence and version of one toolchain executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
}

/// Tools reported by [`detect_toolchain`], in output order.
pub const KNOWN_TOOLS: &[&str] = &[
    "perl",
    "texstudio",
    "latexmk",
    "pdflatex",
    "xelatex",
    "lualatex",
    "bibtex",
    "biber",
    "chktex",
    "latexindent",
    "kpsewhich",
    "texdoc",
    "tlmgr",
    "mpm",
];

/// Budget for a single version probe.
pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_millis(1200);

fn version_flag(tool: &str) -> &'static str {
    match tool {
        "perl" | "latexmk" => "-v",
        _ => "--version",
    }
}

async fn try_version(runner: &dyn CommandRunner, exe: &Path, flag: &str) -> Option<String> {
    let opts = RunOptions::with_timeout(VERSION_PROBE_TIMEOUT);
    let output = runner.run(exe, &[flag.to_string()], &opts).await.ok()?;
    let text = if output.stdout.trim().is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("[timeout]"))
        .map(str::to_string)
}

async fn probe(
    resolver: Arc<dyn ToolResolver>,
    runner: Arc<dyn CommandRunner>,
    tool: &'static str,
) -> ToolInfo {
    let path = resolver.resolve(tool);
    let mut version = None;
    if let Some(exe) = &path {
        version = try_version(runner.as_ref(), exe, version_flag(tool)).await;
        if version.is_none() && tool == "latexmk" {
            version = try_version(runner.as_ref(), exe, "--version").await;
        }
    }
    ToolInfo {
        name: tool.to_string(),
        path,
        version,
    }
}

/// Resolves every tool in [`KNOWN_TOOLS`] and probes its version.
///
/// Probes run concurrently, each under its own timeout, so a hanging tool
/// only costs its own budget.
pub async fn detect_toolchain(
    resolver: Arc<dyn ToolResolver>,
    runner: Arc<dyn CommandRunner>,
) -> Vec<ToolInfo> {
    let mut set = JoinSet::new();
    for (idx, tool) in KNOWN_TOOLS.iter().copied().enumerate() {
        let resolver = resolver.clone();
        let runner = runner.clone();
        set.spawn(async move { (idx, probe(resolver, runner, tool).await) });
    }

    let mut slots: Vec<Option<ToolInfo>> = vec![None; KNOWN_TOOLS.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, info)) => slots[idx] = Some(info),
            Err(e) => log::warn!("toolchain probe task failed: {}", e),
        }
    }

    slots
        .into_iter()
        .zip(KNOWN_TOOLS)
        .map(|(slot, name)| {
            slot.unwrap_or_else(|| ToolInfo {
                name: name.to_string(),
                path: None,
                version: None,
            })
        })
        .collect()
}
