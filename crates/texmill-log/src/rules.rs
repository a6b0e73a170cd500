//! Per-line classification rules.
//!
//! Each rule inspects one log line (plus its neighbours and the parser state
//! captured in [`LineContext`]) and either claims it by returning a
//! [`Diagnostic`] or passes. [`RULES`] fixes the priority order; the first
//! rule that claims a line wins.

use crate::ir::{Diagnostic, DiagnosticCode};
use once_cell::sync::Lazy;
use regex::Regex;

/// How far past a `! ` line to look for its `l.<n>` marker.
const ERROR_BLOCK_LOOKAHEAD: usize = 12;

static FILE_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.*):(\d+):").unwrap());
static L_DOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^l\.(\d+)\b").unwrap());
static PUSH_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()\s][^()]*\.(?:tex|sty|cls|bib))\b").unwrap());
static POP_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\)\s*$").unwrap());
static UNDEFINED_CS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^Undefined control sequence\.?").unwrap());
static LATEX_FILE_NOT_FOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"LaTeX Error:\s*File\s*`([^']+)'\s*not found\.").unwrap());
static KPATHSEA_NOT_FOUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"kpathsea:.*?:\s*file\s*`([^']+)'\s*not found").unwrap());
static WARNING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(LaTeX(\s+Font)?\s+Warning:|(Package|Class)\s+.*\s+Warning:)").unwrap()
});
static WARNING_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.*Warning:\s*").unwrap());
static CITATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(Citation|Reference)\s+[`'].*'\s+.*undefined|There were undefined (references|citations)")
        .unwrap()
});
static RERUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Label\(s\) may have changed|Rerun to get cross-references right").unwrap()
});
static BOX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Overfull|Underfull) \\hbox\s*\([^)]*\)\s+in paragraph at lines\s+(\d+)(?:--(\d+))?")
        .unwrap()
});
static MISSING_PERL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)script engine 'perl'.*required|perl\b.*not found").unwrap()
});

/// Everything a rule may look at for one line.
#[derive(Debug, Clone, Copy)]
pub struct LineContext<'a> {
    /// All lines of the log.
    pub lines: &'a [&'a str],
    /// Index of the line being classified.
    pub index: usize,
    /// Innermost file on the parser's file stack.
    pub current_file: Option<&'a str>,
    /// Most recent `l.<n>` marker seen at or before this line.
    pub last_line: Option<u32>,
}

impl<'a> LineContext<'a> {
    pub fn line(&self) -> &'a str {
        self.lines[self.index]
    }

    fn neighbour(&self, offset: isize) -> &'a str {
        let idx = self.index as isize + offset;
        if idx < 0 {
            return "";
        }
        self.lines.get(idx as usize).copied().unwrap_or("")
    }

    fn file(&self) -> Option<String> {
        self.current_file.map(str::to_string)
    }
}

pub type Rule = fn(&LineContext<'_>) -> Option<Diagnostic>;

/// Classification rules in priority order.
pub const RULES: &[(&str, Rule)] = &[
    ("error", error_line),
    ("missing-file", missing_file),
    ("warning", warning),
    ("box", box_report),
    ("kpathsea", kpathsea),
];

/// Runs [`RULES`] against one line and returns the first match.
pub fn classify(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    RULES.iter().find_map(|(_, rule)| rule(ctx))
}

/// Files opened on this line (`(./chapter.tex`, `(article.cls`, ...).
pub fn opened_files(line: &str) -> impl Iterator<Item = &str> {
    PUSH_FILE_RE
        .captures_iter(line)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
}

/// Whether the line closes the innermost file (a bare `)`).
pub fn closes_file(line: &str) -> bool {
    POP_FILE_RE.is_match(line)
}

/// The `<n>` of an `l.<n>` marker line.
pub fn line_marker(line: &str) -> Option<u32> {
    L_DOT_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Whether tool output shows latexmk failing to find its Perl interpreter.
pub fn missing_script_engine(text: &str) -> bool {
    MISSING_PERL_RE.is_match(text)
}

fn package_name(missing: &str) -> Option<String> {
    let name = missing.trim().trim_matches('`');
    let lower = name.to_ascii_lowercase();
    lower
        .strip_suffix(".sty")
        .map(|_| name[..name.len() - 4].to_string())
}

fn missing_hint(pkg: Option<&str>, high_level: bool) -> String {
    match pkg {
        Some(pkg) => format!(
            "Package missing: try tlmgr install {} (TeX Live) or install via MiKTeX Package Manager",
            pkg
        ),
        None if high_level => {
            "File missing: check the path is correct and included (e.g., via \\graphicspath)".into()
        }
        None => "File missing: verify relative paths and working directory; \
                 consider \\graphicspath for images."
            .into(),
    }
}

fn missing_diagnostic(
    message: String,
    missing: &str,
    file: Option<String>,
    high_level: bool,
) -> Diagnostic {
    let pkg = package_name(missing);
    let code = if pkg.is_some() {
        DiagnosticCode::MissingPackage
    } else {
        DiagnosticCode::MissingFile
    };
    Diagnostic::error(message)
        .with_file(file)
        .with_code(code)
        .with_hint(missing_hint(pkg.as_deref(), high_level))
}

/// Finds the `l.<n>` marker belonging to the error block that starts at the
/// current line. The block ends at the next `! ` line.
fn block_line_marker(ctx: &LineContext<'_>) -> Option<u32> {
    ctx.lines
        .iter()
        .skip(ctx.index + 1)
        .take(ERROR_BLOCK_LOOKAHEAD)
        .take_while(|l| !l.starts_with("! "))
        .find_map(|l| line_marker(l))
}

fn file_line_pattern(text: &str) -> Option<(String, u32)> {
    let caps = FILE_LINE_RE.captures(text)?;
    let line = caps.get(2)?.as_str().parse().ok()?;
    Some((caps.get(1)?.as_str().to_string(), line))
}

/// `! <message>`: a hard TeX error.
pub fn error_line(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    let message = ctx.line().strip_prefix("! ")?.trim();

    let mut file = None;
    let mut line = block_line_marker(ctx).or(ctx.last_line);
    if line.is_none() {
        if let Some((f, l)) = file_line_pattern(ctx.neighbour(-1))
            .or_else(|| file_line_pattern(ctx.neighbour(1)))
        {
            file = Some(f);
            line = Some(l);
        }
    }
    let file = file.or_else(|| ctx.file());

    if UNDEFINED_CS_RE.is_match(message) {
        return Some(
            Diagnostic::error(message)
                .with_file(file)
                .with_line(line)
                .with_code(DiagnosticCode::UndefinedControlSequence)
                .with_hint("Check for typos or missing packages providing this command"),
        );
    }

    if let Some(caps) = LATEX_FILE_NOT_FOUND_RE.captures(message) {
        let missing = &caps[1];
        return Some(
            missing_diagnostic(message.to_string(), missing, file, true)
                .with_line(line),
        );
    }

    Some(Diagnostic::error(message).with_file(file).with_line(line))
}

/// `LaTeX Error: File `x' not found.` or the kpathsea equivalent.
pub fn missing_file(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    let line = ctx.line();
    if let Some(caps) = LATEX_FILE_NOT_FOUND_RE.captures(line) {
        let missing = &caps[1];
        return Some(missing_diagnostic(
            format!("Missing file: {}", missing),
            missing,
            ctx.file(),
            true,
        ));
    }
    if let Some(caps) = KPATHSEA_NOT_FOUND_RE.captures(line) {
        let missing = &caps[1];
        return Some(missing_diagnostic(
            format!("Missing: {}", missing),
            missing,
            ctx.file(),
            false,
        ));
    }
    None
}

/// Document, class and package warnings.
pub fn warning(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    let line = ctx.line();
    if !WARNING_RE.is_match(line) {
        return None;
    }
    let message = WARNING_PREFIX_RE.replace(line, "").trim().to_string();
    let mut diag = Diagnostic::warning(message).with_file(ctx.file());

    if CITATION_RE.is_match(line) {
        diag = diag.with_code(DiagnosticCode::CitationUndefined).with_hint(
            "Run bibliography tool (biber/bibtex) and rerun LaTeX (latexmk handles this automatically).",
        );
    } else if RERUN_RE.is_match(line) {
        diag = diag
            .with_code(DiagnosticCode::Rerun)
            .with_hint("Rerun LaTeX so cross-references update (latexmk does this automatically).");
    }
    Some(diag)
}

/// `Overfull \hbox (...) in paragraph at lines N--M`.
pub fn box_report(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    let line = ctx.line();
    let caps = BOX_RE.captures(line)?;
    let start: Option<u32> = caps[2].parse().ok();
    let end: Option<u32> = match caps.get(3) {
        Some(m) => m.as_str().parse().ok(),
        None => start,
    };
    let code = if &caps[1] == "Overfull" {
        DiagnosticCode::OverfullHbox
    } else {
        DiagnosticCode::UnderfullHbox
    };

    let mut diag = Diagnostic::warning(line.trim())
        .with_file(ctx.file())
        .with_line(start)
        .with_code(code);
    if let (Some(start), Some(end)) = (start, end) {
        if end != start {
            diag = diag.with_hint(format!("Paragraph spans lines {}-{}", start, end));
        }
    }
    Some(diag)
}

/// Any other `kpathsea:` line.
pub fn kpathsea(ctx: &LineContext<'_>) -> Option<Diagnostic> {
    let line = ctx.line();
    if !line.starts_with("kpathsea:") {
        return None;
    }
    Some(
        Diagnostic::error(line.trim())
            .with_file(ctx.file())
            .with_code(DiagnosticCode::Kpathsea),
    )
}
