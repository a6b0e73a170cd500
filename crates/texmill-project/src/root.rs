use crate::scan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use texmill_core::paths;
use walkdir::WalkDir;

/// Per-file read limit while looking for root markers.
pub const ROOT_READ_LIMIT: u64 = 64 * 1024;

/// Conventional entry document names, checked before any other file.
pub const COMMON_ROOTS: &[&str] = &[
    "main.tex",
    "thesis.tex",
    "report.tex",
    "paper.tex",
    "dissertation.tex",
    "book.tex",
    "article.tex",
];

const LATEXMKRC: &str = ".latexmkrc";

static MAGIC_ROOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^%\s*!?\s*TeX\s+root\s*=\s*(.+)$").unwrap());
static DOCUMENTCLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{[^}]+\}").unwrap());

/// How [`detect_root`] arrived at its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMethod {
    Explicit,
    Magic,
    Latexmkrc,
    Heuristic,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRootOptions {
    /// Wins outright when the file exists.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// File or directory to search from. A file means its directory.
    /// Defaults to the current directory.
    #[serde(default)]
    pub start_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectRootResult {
    pub root: Option<PathBuf>,
    pub method: RootMethod,
    /// Files inspected along the way, in inspection order.
    pub candidates: Vec<PathBuf>,
}

impl DetectRootResult {
    fn found(root: PathBuf, method: RootMethod, candidates: Vec<PathBuf>) -> Self {
        Self {
            root: Some(root),
            method,
            candidates,
        }
    }
}

/// Extracts the target of a `% !TeX root = path` comment.
pub fn magic_root_comment(text: &str) -> Option<String> {
    let caps = MAGIC_ROOT_RE.captures(text)?;
    let value = caps[1].trim();
    let value = value.strip_prefix('"').unwrap_or(value);
    let value = value.strip_suffix('"').unwrap_or(value);
    Some(value.to_string())
}

fn start_dir(start: Option<&Path>) -> PathBuf {
    let start = match start {
        Some(p) => paths::normalize(p),
        None => paths::normalize(Path::new(".")),
    };
    if start.is_dir() {
        start
    } else {
        paths::parent_dir(&start)
    }
}

/// `.tex` files directly inside `dir`, conventional names first, then the
/// rest sorted by file name.
fn scan_order(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = COMMON_ROOTS
        .iter()
        .map(|name| dir.join(name))
        .filter(|p| p.is_file())
        .collect();

    let others = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("tex"))
        });
    for path in others {
        if !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

/// Finds the entry document of a project.
///
/// Checks, first match wins:
///
/// 1. `opts.file`, if it exists
/// 2. a `% !TeX root = ...` comment in any scanned file, resolved against the
///    start directory
/// 3. `.latexmkrc` next to a `main.tex`
/// 4. the first scanned file declaring `\documentclass`
/// 5. a bare `main.tex`
///
/// Scanned files are the conventional names in [`COMMON_ROOTS`] followed by
/// every other `.tex` file in the start directory.
pub fn detect_root(opts: &DetectRootOptions) -> DetectRootResult {
    if let Some(file) = &opts.file {
        let root = paths::normalize(file);
        if root.is_file() {
            return DetectRootResult::found(root.clone(), RootMethod::Explicit, vec![root]);
        }
        log::debug!("explicit root {} does not exist", root.display());
    }

    let dir = start_dir(opts.start_path.as_deref());
    let scanned: Vec<(PathBuf, String)> = scan_order(&dir)
        .into_iter()
        .map(|p| {
            let text = scan::read_prefix(&p, ROOT_READ_LIMIT).unwrap_or_default();
            (p, text)
        })
        .collect();
    let mut candidates: Vec<PathBuf> = scanned.iter().map(|(p, _)| p.clone()).collect();

    for (_, text) in &scanned {
        if let Some(target) = magic_root_comment(text) {
            let resolved = paths::resolve_from(&dir, Path::new(&target));
            if resolved.is_file() {
                return DetectRootResult::found(resolved, RootMethod::Magic, candidates);
            }
        }
    }

    let main = dir.join("main.tex");
    let rc = dir.join(LATEXMKRC);
    if rc.is_file() && main.is_file() {
        return DetectRootResult::found(main.clone(), RootMethod::Latexmkrc, vec![main, rc]);
    }

    if let Some((path, _)) = scanned
        .iter()
        .find(|(_, text)| DOCUMENTCLASS_RE.is_match(text))
    {
        return DetectRootResult::found(path.clone(), RootMethod::Heuristic, candidates);
    }

    if main.is_file() {
        if !candidates.contains(&main) {
            candidates.push(main.clone());
        }
        return DetectRootResult::found(main, RootMethod::Heuristic, candidates);
    }

    DetectRootResult {
        root: None,
        method: RootMethod::None,
        candidates,
    }
}
