use crate::scan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use texmill_core::paths;

/// Per-file read limit while scanning for directives.
pub const GRAPH_READ_LIMIT: u64 = 512 * 1024;

const TEX_EXTS: &[&str] = &["tex"];
const GRAPHICS_EXTS: &[&str] = &["pdf", "png", "jpg", "jpeg", "eps"];
const BIB_EXTS: &[&str] = &["bib"];

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(include|input|subfile)\{([^}]+)\}").unwrap());
static GRAPHICS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\includegraphics(?:\[[^\]]*\])?\{([^}]+)\}").unwrap());
static BIB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:bibliography|addbibresource(?:\[[^\]]*\])?)\{([^}]+)\}").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Include,
    Input,
    Subfile,
    Graphics,
    Bib,
}

impl EdgeKind {
    fn from_macro(name: &str) -> Self {
        match name {
            "include" => EdgeKind::Include,
            "subfile" => EdgeKind::Subfile,
            _ => EdgeKind::Input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: PathBuf,
    pub to: PathBuf,
    pub kind: EdgeKind,
}

/// Files reachable from a root document.
///
/// `nodes` holds every visited source file once, in visit order. Graphics and
/// bibliography targets only appear as edge endpoints since they are never
/// scanned themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphResult {
    pub nodes: Vec<PathBuf>,
    pub edges: Vec<GraphEdge>,
    pub missing: Vec<PathBuf>,
}

impl GraphResult {
    fn add_missing(&mut self, path: PathBuf) {
        if !self.missing.contains(&path) {
            self.missing.push(path);
        }
    }
}

/// Resolves `target` relative to `dir`, trying the literal path first and then
/// each extension in turn.
fn resolve_candidate(dir: &Path, target: &str, exts: &[&str]) -> Option<PathBuf> {
    let raw = paths::resolve_from(dir, Path::new(target));
    if raw.is_file() {
        return Some(raw);
    }
    exts.iter()
        .map(|ext| with_extension_appended(&raw, ext))
        .find(|p| p.is_file())
}

fn with_extension_appended(path: &Path, ext: &str) -> PathBuf {
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case(ext)) {
        return path.to_path_buf();
    }
    let mut s = OsString::from(path.as_os_str());
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Builds the include graph of the document at `root`.
///
/// Traversal is breadth-first and keyed by normalized absolute path, so cyclic
/// includes terminate. Only the first [`GRAPH_READ_LIMIT`] bytes of each file
/// are scanned and commented-out directives are ignored. Targets that resolve
/// under none of their extensions are listed in `missing` once each and do
/// not stop the traversal.
pub fn build_dependency_graph(root: &Path) -> GraphResult {
    let start = paths::normalize(root);
    let mut graph = GraphResult::default();

    if !start.is_file() {
        graph.missing.push(start);
        return graph;
    }

    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        graph.nodes.push(current.clone());

        let dir = paths::parent_dir(&current);
        let Some(raw) = scan::read_prefix(&current, GRAPH_READ_LIMIT) else {
            continue;
        };
        let text = scan::strip_comments(&raw);

        for caps in INCLUDE_RE.captures_iter(&text) {
            let kind = EdgeKind::from_macro(&caps[1]);
            let target = caps[2].trim();
            match resolve_candidate(&dir, target, TEX_EXTS) {
                Some(to) => {
                    graph.edges.push(GraphEdge {
                        from: current.clone(),
                        to: to.clone(),
                        kind,
                    });
                    queue.push_back(to);
                }
                None => graph.add_missing(paths::resolve_from(&dir, Path::new(target))),
            }
        }

        for caps in GRAPHICS_RE.captures_iter(&text) {
            let target = caps[1].trim();
            match resolve_candidate(&dir, target, GRAPHICS_EXTS) {
                Some(to) => graph.edges.push(GraphEdge {
                    from: current.clone(),
                    to,
                    kind: EdgeKind::Graphics,
                }),
                None => graph.add_missing(paths::resolve_from(&dir, Path::new(target))),
            }
        }

        for caps in BIB_RE.captures_iter(&text) {
            for name in caps[1].split(',').map(str::trim).filter(|n| !n.is_empty()) {
                match resolve_candidate(&dir, name, BIB_EXTS) {
                    Some(to) => graph.edges.push(GraphEdge {
                        from: current.clone(),
                        to,
                        kind: EdgeKind::Bib,
                    }),
                    None => graph.add_missing(paths::resolve_from(&dir, Path::new(name))),
                }
            }
        }
    }

    log::debug!(
        "graph: {} nodes, {} edges, {} missing",
        graph.nodes.len(),
        graph.edges.len(),
        graph.missing.len()
    );
    graph
}
