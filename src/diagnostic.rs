use crate::ast::Pos;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// One reported problem. Produced by a rule or the shellcheck bridge and
/// never modified afterwards; the aggregator only filters and reorders.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub rule_id: String,
    pub message: String,
    pub severity: Severity,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    /// The source line the diagnostic points into, when known.
    pub snippet: Option<String>,
}

impl Diagnostic {
    pub fn new(
        rule_id: &str,
        severity: Severity,
        file: PathBuf,
        pos: Pos,
        message: impl Into<String>,
    ) -> Self {
        Diagnostic {
            rule_id: rule_id.to_string(),
            message: message.into(),
            severity,
            file,
            line: pos.line,
            column: pos.col,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: Option<String>) -> Self {
        self.snippet = snippet;
        self
    }

    pub fn pos(&self) -> Pos {
        Pos::new(self.line, self.column)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {} [{}]",
            self.file.display(),
            self.line,
            self.column,
            self.message,
            self.rule_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Warning,
    Failed,
}

/// Final, ordered result for one document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub path: PathBuf,
    pub status: Status,
    pub diagnostics: Vec<Diagnostic>,
    /// Number of diagnostics dropped by ignore patterns.
    pub ignored: usize,
    pub passed: bool,
}

impl Report {
    pub fn new(path: PathBuf, diagnostics: Vec<Diagnostic>, ignored: usize, strict: bool) -> Self {
        let status = compute_status(&diagnostics, strict);
        Report {
            path,
            status,
            diagnostics,
            ignored,
            passed: status == Status::Passed,
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Count errors, warnings, and info diagnostics in a single pass.
    ///
    /// Returns `(errors, warnings, info)`.
    pub fn count_by_severity(&self) -> (usize, usize, usize) {
        self.diagnostics
            .iter()
            .fold((0, 0, 0), |(e, w, i), d| match d.severity {
                Severity::Error => (e + 1, w, i),
                Severity::Warning => (e, w + 1, i),
                Severity::Info => (e, w, i + 1),
            })
    }
}

fn compute_status(diagnostics: &[Diagnostic], strict: bool) -> Status {
    let (has_errors, has_warnings) =
        diagnostics
            .iter()
            .fold((false, false), |(e, w), d| match d.severity {
                Severity::Error => (true, w),
                Severity::Warning => (e, true),
                Severity::Info => (e, w),
            });

    if has_errors {
        Status::Failed
    } else if has_warnings {
        if strict {
            Status::Failed
        } else {
            Status::Warning
        }
    } else {
        Status::Passed
    }
}
