//! Structured compiler diagnostics and a rustc-style reporter.
//!
//! Every stage of the DSL front-end ([`crate::dsl::parser`],
//! [`crate::dsl::analyzer`]) collects [`Diagnostic`]s rather than failing
//! fast: a single source file can surface many independent errors in one
//! pass. [`DiagnosticReporter`] turns the collected list into the
//! human-readable text a terminal shows, or into the JSON form consumed by
//! editor integrations.
//!
//! # Example
//!
//! ```rust
//! use streetrace::diagnostics::{Diagnostic, DiagnosticReporter, Severity};
//!
//! let mut reporter = DiagnosticReporter::new();
//! reporter.add_source("my_agent.sr", "agent:\n    using model \"fast\"\n");
//!
//! let diag = Diagnostic::error("undefined reference to model 'fast'", "my_agent.sr", 2, 18)
//!     .with_span_length(4)
//!     .with_help("defined models are: main, compact");
//!
//! let text = reporter.format_diagnostic(&diag);
//! assert!(text.contains("error: undefined reference to model 'fast'"));
//! assert!(text.contains("--> my_agent.sr:2:19"));
//! ```

use std::collections::HashMap;
use std::fmt;

const GUTTER_WIDTH: usize = 5;
const CONTEXT_LINES: usize = 1;

/// Severity of a single [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured diagnostic produced by the parser or analyzer.
///
/// `line` is 1-based; `column` is 0-based (matching the JSON wire format in
/// `spec.md` §6 — textual reports display `column + 1`).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub end_line: Option<usize>,
    pub end_column: Option<usize>,
    pub span_length: usize,
    pub help_text: Option<String>,
    pub related: Vec<Diagnostic>,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        message: impl Into<String>,
        file: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            file: file.into(),
            line,
            column,
            end_line: None,
            end_column: None,
            span_length: 1,
            help_text: None,
            related: Vec::new(),
        }
    }

    /// Build an error-severity diagnostic.
    pub fn error(message: impl Into<String>, file: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Error, message, file, line, column)
    }

    /// Build a warning-severity diagnostic.
    pub fn warning(message: impl Into<String>, file: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Warning, message, file, line, column)
    }

    /// Build a note-severity diagnostic, typically attached via [`Diagnostic::with_related`].
    pub fn note(message: impl Into<String>, file: impl Into<String>, line: usize, column: usize) -> Self {
        Self::new(Severity::Note, message, file, line, column)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_span_length(mut self, span_length: usize) -> Self {
        self.span_length = span_length.max(1);
        self
    }

    pub fn with_end(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    pub fn with_help(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = Some(help_text.into());
        self
    }

    pub fn with_related(mut self, related: Diagnostic) -> Self {
        self.related.push(related);
        self
    }

    /// Render as the JSON object described in `spec.md` §6 (`Diagnostic = {...}`).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "severity": self.severity.as_str(),
            "code": self.code,
            "message": self.message,
            "file": self.file,
            "line": self.line,
            "column": self.column,
            "end_line": self.end_line,
            "end_column": self.end_column,
            "help_text": self.help_text,
            "related": self.related.iter().map(Diagnostic::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Formats diagnostics in rustc style and as the consumer-facing JSON schema.
///
/// Source text is cached per file path so multiple diagnostics against the
/// same file don't require the caller to re-supply it.
#[derive(Default)]
pub struct DiagnosticReporter {
    source_cache: HashMap<String, String>,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register source text for a file path so later diagnostics against it
    /// can render a caret-annotated context window.
    pub fn add_source(&mut self, file_path: impl Into<String>, source: impl Into<String>) {
        self.source_cache.insert(file_path.into(), source.into());
    }

    /// Format a single diagnostic, rustc-style.
    ///
    /// ```text
    /// error[E0001]: undefined reference to model 'fast'
    ///   --> my_agent.sr:15:18
    ///    |
    /// 15 |     using model "fast"
    ///    |                  ^^^^
    ///    |
    ///    = help: defined models are: main, compact
    /// ```
    pub fn format_diagnostic(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        self.write_header(&mut out, diagnostic);
        self.write_location(&mut out, diagnostic);
        self.write_source_context(&mut out, diagnostic);
        if let Some(help) = &diagnostic.help_text {
            out.push_str(&format!("{}= help: {}\n", " ".repeat(GUTTER_WIDTH), help));
        }
        for related in &diagnostic.related {
            out.push('\n');
            self.write_note(&mut out, related);
        }
        out
    }

    /// Format a full diagnostic list with a trailing summary line.
    pub fn format_diagnostics(&self, diagnostics: &[Diagnostic], include_summary: bool) -> String {
        if diagnostics.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for (i, diagnostic) in diagnostics.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&self.format_diagnostic(diagnostic));
        }
        if include_summary {
            out.push('\n');
            out.push_str(&self.summary_line(diagnostics));
        }
        out
    }

    /// Render the consumer-facing JSON schema from `spec.md` §6.
    pub fn format_json(
        &self,
        diagnostics: &[Diagnostic],
        file: &str,
        stats: Option<&serde_json::Value>,
    ) -> serde_json::Value {
        let errors: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(Diagnostic::to_json)
            .collect();
        let warnings: Vec<_> = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(Diagnostic::to_json)
            .collect();

        let mut result = serde_json::json!({
            "version": "1.0",
            "file": file,
            "valid": errors.is_empty(),
            "errors": errors,
            "warnings": warnings,
        });
        if let Some(stats) = stats {
            result["stats"] = stats.clone();
        }
        result
    }

    fn write_header(&self, out: &mut String, diagnostic: &Diagnostic) {
        match &diagnostic.code {
            Some(code) => out.push_str(&format!(
                "{}[{}]: {}\n",
                diagnostic.severity, code, diagnostic.message
            )),
            None => out.push_str(&format!("{}: {}\n", diagnostic.severity, diagnostic.message)),
        }
    }

    fn write_location(&self, out: &mut String, diagnostic: &Diagnostic) {
        out.push_str(&format!(
            "  --> {}:{}:{}\n",
            diagnostic.file,
            diagnostic.line,
            diagnostic.column + 1
        ));
    }

    fn write_source_context(&self, out: &mut String, diagnostic: &Diagnostic) {
        let gutter = " ".repeat(GUTTER_WIDTH);
        let Some(source) = self.source_cache.get(&diagnostic.file) else {
            out.push_str(&format!("{}|\n", gutter));
            return;
        };
        let lines: Vec<&str> = source.split('\n').collect();
        if diagnostic.line == 0 || diagnostic.line > lines.len() {
            out.push_str(&format!("{}|\n", gutter));
            return;
        }
        let line_idx = diagnostic.line - 1;
        let start = line_idx.saturating_sub(CONTEXT_LINES);
        let end = (line_idx + CONTEXT_LINES + 1).min(lines.len());

        out.push_str(&format!("{}|\n", gutter));
        for idx in start..end {
            let line_num = idx + 1;
            let content = lines[idx];
            out.push_str(&format!("{:>width$} | {}\n", line_num, content, width = GUTTER_WIDTH - 1));
            if idx == line_idx {
                self.write_caret_line(out, diagnostic, content);
            }
        }
        out.push_str(&format!("{}|\n", gutter));
    }

    fn write_caret_line(&self, out: &mut String, diagnostic: &Diagnostic, source_line: &str) {
        let span_length = if let (Some(end_col), Some(end_line)) = (diagnostic.end_column, diagnostic.end_line) {
            if end_line == diagnostic.line {
                (end_col.saturating_sub(diagnostic.column)).max(1)
            } else {
                Self::guess_span_length(source_line, diagnostic.column)
            }
        } else {
            Self::guess_span_length(source_line, diagnostic.column)
        };

        let col = diagnostic.column;
        let chars: Vec<char> = source_line.chars().collect();
        let prefix: String = chars
            .iter()
            .take(col.min(chars.len()))
            .map(|&c| if c == '\t' { '\t' } else { ' ' })
            .collect();

        out.push_str(&format!(
            "{}| {}{}\n",
            " ".repeat(GUTTER_WIDTH),
            prefix,
            "^".repeat(span_length)
        ));
    }

    /// Guess a caret span by extending to the next whitespace boundary.
    fn guess_span_length(line: &str, column: usize) -> usize {
        let chars: Vec<char> = line.chars().collect();
        if column >= chars.len() {
            return 1;
        }
        let mut end = column;
        while end < chars.len() && !chars[end].is_whitespace() {
            end += 1;
        }
        (end - column).max(1)
    }

    fn write_note(&self, out: &mut String, note: &Diagnostic) {
        out.push_str(&format!(
            "note: {}\n  --> {}:{}:{}\n",
            note.message,
            note.file,
            note.line,
            note.column + 1
        ));
    }

    fn summary_line(&self, diagnostics: &[Diagnostic]) -> String {
        let errors = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
        let warnings = diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();
        if errors == 0 && warnings == 0 {
            return String::new();
        }

        let mut files: Vec<&str> = diagnostics.iter().map(|d| d.file.as_str()).collect();
        files.sort_unstable();
        files.dedup();

        let mut parts = Vec::new();
        if errors > 0 {
            parts.push(format!("{} error{}", errors, if errors == 1 { "" } else { "s" }));
        }
        if warnings > 0 {
            parts.push(format!("{} warning{}", warnings, if warnings == 1 { "" } else { "s" }));
        }
        let summary = parts.join(" and ");

        if files.len() == 1 {
            format!("Found {} in {}\n", summary, files[0])
        } else {
            format!("Found {} in {} files\n", summary, files.len())
        }
    }
}

/// Format a success summary for a DSL file that compiled with no errors.
///
/// Returns `"valid"` when all counts are zero, otherwise `"valid (N models,
/// M agents, ...)"`.
pub fn format_success_message(models: usize, agents: usize, flows: usize, handlers: usize) -> String {
    let mut parts = Vec::new();
    if models > 0 {
        parts.push(format!("{} model{}", models, if models == 1 { "" } else { "s" }));
    }
    if agents > 0 {
        parts.push(format!("{} agent{}", agents, if agents == 1 { "" } else { "s" }));
    }
    if flows > 0 {
        parts.push(format!("{} flow{}", flows, if flows == 1 { "" } else { "s" }));
    }
    if handlers > 0 {
        parts.push(format!("{} handler{}", handlers, if handlers == 1 { "" } else { "s" }));
    }
    if parts.is_empty() {
        "valid".to_string()
    } else {
        format!("valid ({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_rustc_style_with_caret() {
        let mut reporter = DiagnosticReporter::new();
        reporter.add_source("my_agent.sr", "agent:\n    using model \"fast\"\n");
        let diag = Diagnostic::error("undefined reference to model 'fast'", "my_agent.sr", 2, 18)
            .with_span_length(4)
            .with_help("defined models are: main, compact");

        let text = reporter.format_diagnostic(&diag);
        assert!(text.starts_with("error: undefined reference to model 'fast'\n"));
        assert!(text.contains("  --> my_agent.sr:2:19\n"));
        assert!(text.contains("= help: defined models are: main, compact"));
    }

    #[test]
    fn json_schema_splits_errors_and_warnings() {
        let reporter = DiagnosticReporter::new();
        let diagnostics = vec![
            Diagnostic::error("bad thing", "f.sr", 1, 0),
            Diagnostic::warning("maybe bad", "f.sr", 2, 0),
        ];
        let json = reporter.format_json(&diagnostics, "f.sr", None);
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"].as_array().unwrap().len(), 1);
        assert_eq!(json["warnings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn summary_pluralizes_counts() {
        let reporter = DiagnosticReporter::new();
        let diagnostics = vec![
            Diagnostic::error("a", "f.sr", 1, 0),
            Diagnostic::error("b", "f.sr", 2, 0),
            Diagnostic::warning("c", "g.sr", 1, 0),
        ];
        let text = reporter.format_diagnostics(&diagnostics, true);
        assert!(text.contains("Found 2 errors and 1 warning in 2 files\n"));
    }

    #[test]
    fn success_message_variants() {
        assert_eq!(format_success_message(0, 0, 0, 0), "valid");
        assert_eq!(format_success_message(1, 2, 1, 0), "valid (1 model, 2 agents, 1 flow)");
    }
}
