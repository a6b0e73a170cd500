//! # texmill Build
//!
//! Compile orchestration for LaTeX documents.
//!
//! A [`Compiler`] turns a [`CompileRequest`] into a [`CompileResult`] using
//! one of two strategies, picked once per request:
//!
//! - **Managed**: a single `latexmk` run, which sequences engine and
//!   bibliography passes itself.
//! - **Direct**: when latexmk is not installed, engine pass, then biber (if a
//!   `.bcf` exists) or bibtex (if the `.aux` cites anything), then a second
//!   engine pass. The passes are strictly sequential.
//!
//! Either way the combined output is fed to [`texmill_log::parse_log`]. A
//! compile succeeds when the last pass exits with 0 and no diagnostic is an
//! error.
//!
//! The same [`Compiler`] also cleans auxiliary files, runs standalone
//! bibliography builds, lints with ChkTeX and formats with latexindent.

pub mod bibliography;
pub mod compiler;
pub mod format;
pub mod lint;
pub mod request;
pub mod strategy;

pub use bibliography::{BibRequest, BibResult, BibTool};
pub use compiler::Compiler;
pub use format::{FormatRequest, FormatResult};
pub use lint::{LintRequest, LintResult};
pub use request::{CleanRequest, CleanResult, CompileRequest, CompileResult};
pub use strategy::{BuildStrategy, PreparedRequest};
