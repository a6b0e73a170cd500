use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Error,
    Warning,
    Info,
}

/// Machine-readable classification attached to well-understood diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    UndefinedControlSequence,
    MissingPackage,
    MissingFile,
    CitationUndefined,
    Rerun,
    OverfullHbox,
    UnderfullHbox,
    Kpathsea,
    /// latexmk could not find the Perl interpreter it runs on.
    MissingPerl,
    /// `-shell-escape` was requested but the workspace policy forbids it.
    ShellEscapeDisabled,
    /// Finding reported by ChkTeX.
    Chktex,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UndefinedControlSequence => "undefined-control-sequence",
            DiagnosticCode::MissingPackage => "missing-package",
            DiagnosticCode::MissingFile => "missing-file",
            DiagnosticCode::CitationUndefined => "citation-undefined",
            DiagnosticCode::Rerun => "rerun",
            DiagnosticCode::OverfullHbox => "overfull-hbox",
            DiagnosticCode::UnderfullHbox => "underfull-hbox",
            DiagnosticCode::Kpathsea => "kpathsea",
            DiagnosticCode::MissingPerl => "missing-perl",
            DiagnosticCode::ShellEscapeDisabled => "shell-escape-disabled",
            DiagnosticCode::Chktex => "chktex",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured finding extracted from tool output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based source line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-based source column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<DiagnosticCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            code: None,
            hint: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message)
    }

    pub fn with_file(mut self, file: Option<impl Into<String>>) -> Self {
        self.file = file.map(Into::into);
        self
    }

    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn with_column(mut self, column: Option<u32>) -> Self {
        self.column = column;
        self
    }

    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }

    /// Collapses whitespace runs in the message to single spaces and trims it.
    pub fn normalized(mut self) -> Self {
        self.message = self.message.split_whitespace().collect::<Vec<_>>().join(" ");
        self
    }
}
