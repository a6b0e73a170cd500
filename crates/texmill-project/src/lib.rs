//! # texmill Project
//!
//! Models a multi-file LaTeX document on disk.
//!
//! - [`graph`] - breadth-first scan of `\input`, `\include`, `\subfile`,
//!   `\includegraphics` and bibliography directives
//! - [`root`] - finds the entry document of a project directory
//! - [`freshness`] - decides whether the compiled PDF is older than its sources
//!
//! All operations read the filesystem synchronously and never fail: files that
//! cannot be read or resolved are reported, not raised.

pub mod freshness;
pub mod graph;
pub mod root;
mod scan;

pub use freshness::{compute_out_of_date, expected_pdf_path, OutOfDateRequest, OutOfDateResult};
pub use graph::{build_dependency_graph, EdgeKind, GraphEdge, GraphResult};
pub use root::{detect_root, DetectRootOptions, DetectRootResult, RootMethod};
