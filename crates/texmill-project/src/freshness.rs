use crate::graph::build_dependency_graph;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use texmill_core::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfDateRequest {
    pub root: PathBuf,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default)]
    pub jobname: Option<String>,
    /// Overrides the computed artifact location.
    #[serde(default)]
    pub pdf_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutOfDateResult {
    pub pdf_path: PathBuf,
    /// Artifact modification time in milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_mtime: Option<u64>,
    pub newer_sources: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub up_to_date: bool,
}

/// Where a compile of `root` writes its PDF.
pub fn expected_pdf_path(root: &Path, out_dir: Option<&Path>, jobname: Option<&str>) -> PathBuf {
    paths::artifact_path(root, out_dir, jobname, "pdf")
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn epoch_millis(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}

/// Compares the artifact's modification time against every file in the
/// dependency graph of `req.root`.
///
/// A source counts as newer only when strictly newer than the artifact. With
/// no artifact on disk every source is newer.
pub fn compute_out_of_date(req: &OutOfDateRequest) -> OutOfDateResult {
    let pdf_path = match &req.pdf_path {
        Some(p) => paths::normalize(p),
        None => expected_pdf_path(&req.root, req.out_dir.as_deref(), req.jobname.as_deref()),
    };
    let pdf_time = modified(&pdf_path);
    let graph = build_dependency_graph(&req.root);

    let newer_sources: Vec<PathBuf> = match pdf_time {
        Some(pdf_time) => graph
            .nodes
            .iter()
            .filter(|node| modified(node).is_some_and(|t| t > pdf_time))
            .cloned()
            .collect(),
        None => graph.nodes.clone(),
    };

    let up_to_date = newer_sources.is_empty() && graph.missing.is_empty();
    OutOfDateResult {
        pdf_path,
        pdf_mtime: pdf_time.and_then(epoch_millis),
        newer_sources,
        missing: graph.missing,
        up_to_date,
    }
}
