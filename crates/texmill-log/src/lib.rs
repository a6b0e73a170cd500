//! # texmill Log Parser
//!
//! Turns the unstructured output of TeX engines and latexmk into structured
//! [`Diagnostic`](ir::Diagnostic)s.
//!
//! ## Overview
//!
//! The parser is a pure, total function over text: it never fails, and lines
//! it does not recognise simply produce nothing. It handles:
//!
//! - **File stack tracking**: `(file.tex` pushes, a bare `)` line pops
//! - **Line references**: `l.123 ...` markers attached to the error they follow
//! - **Errors**: `! ...` lines, undefined control sequences, missing files and packages
//! - **Warnings**: LaTeX/class/package warnings, citation and rerun hints, over/underfull boxes
//!
//! ## Architecture
//!
//! ```text
//! log text ──lines──► LogParser::track ──► LineContext ──► rules::RULES ──► Vec<Diagnostic>
//!                     (file stack,                          (first match
//!                      last l.<n>)                           wins)
//! ```
//!
//! The classification rules live in [`rules`], each one independently
//! testable against a single [`LineContext`](rules::LineContext).
//!
//! ## Example
//!
//! ```
//! use texmill_log::{parse_log, DiagnosticCode};
//!
//! let log = "! Undefined control sequence.\nl.123 \\foo\n";
//! let diags = parse_log(log);
//!
//! assert_eq!(diags.len(), 1);
//! assert_eq!(diags[0].line, Some(123));
//! assert_eq!(diags[0].code, Some(DiagnosticCode::UndefinedControlSequence));
//! ```
//!
//! ## Serialization
//!
//! Diagnostics implement `serde::Serialize`; the kind is emitted as `type`
//! and codes in kebab-case (`"overfull-hbox"`).

/// Diagnostic data model.
pub mod ir;
/// Line state machine.
pub mod parser;
/// Per-line classification rules.
pub mod rules;


pub use ir::{Diagnostic, DiagnosticCode, DiagnosticKind};
pub use parser::{LogParser, parse_log};
pub use rules::missing_script_engine;
