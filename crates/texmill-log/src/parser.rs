use crate::ir::Diagnostic;
use crate::rules::{self, LineContext};

/// Line-oriented diagnostics extractor for TeX and latexmk output.
///
/// `LogParser` is a small state machine. For every line it first updates its
/// state, then hands the line to the classification rules:
///
/// - **File stack**: `(path.tex` style tokens push, a bare `)` line pops. This
///   approximates the engine's own nesting trace, so attribution is best-effort.
/// - **Last line number**: updated whenever an `l.<n>` marker is seen.
///
/// Lines no rule recognises are skipped; parsing never fails.
#[derive(Debug, Default)]
pub struct LogParser {
    file_stack: Vec<String>,
    last_line: Option<u32>,
}

impl LogParser {
    /// Creates a new, empty `LogParser`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a complete log and returns its diagnostics in log order.
    ///
    /// # Arguments
    ///
    /// * `input` - The full text of the log (any mix of `\n` and `\r\n`).
    pub fn parse(mut self, input: &str) -> Vec<Diagnostic> {
        let lines: Vec<&str> = input.lines().collect();
        let mut diagnostics = Vec::new();

        for index in 0..lines.len() {
            self.track(lines[index]);

            let ctx = LineContext {
                lines: &lines,
                index,
                current_file: self.file_stack.last().map(String::as_str),
                last_line: self.last_line,
            };
            if let Some(diag) = rules::classify(&ctx) {
                diagnostics.push(diag.normalized());
            }
        }

        diagnostics
    }

    fn track(&mut self, line: &str) {
        for path in rules::opened_files(line) {
            self.file_stack.push(path.to_string());
        }
        if rules::closes_file(line) {
            self.file_stack.pop();
        }
        if let Some(n) = rules::line_marker(line) {
            self.last_line = Some(n);
        }
    }
}

/// Parses `text` with a fresh [`LogParser`].
pub fn parse_log(text: &str) -> Vec<Diagnostic> {
    LogParser::new().parse(text)
}
