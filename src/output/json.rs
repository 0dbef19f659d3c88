//! JSON output formatter.
//!
//! Produces a pretty-printed JSON array with one object per linted file:
//! its status, a severity summary and the ordered diagnostics.

use crate::diagnostic::{Diagnostic, Report, Status};
use std::path::Path;

#[derive(serde::Serialize)]
struct JsonFile<'a> {
    path: &'a Path,
    status: Status,
    passed: bool,
    summary: Summary,
    diagnostics: &'a [Diagnostic],
}

#[derive(serde::Serialize)]
struct Summary {
    errors: usize,
    warnings: usize,
    info: usize,
    ignored: usize,
}

/// Formats reports as pretty-printed JSON.
///
/// # Panics
///
/// Panics if the reports cannot be serialized (should not happen with valid data).
pub fn format(reports: &[Report]) -> String {
    let files: Vec<JsonFile<'_>> = reports
        .iter()
        .map(|report| {
            let (errors, warnings, info) = report.count_by_severity();
            JsonFile {
                path: &report.path,
                status: report.status,
                passed: report.passed,
                summary: Summary {
                    errors,
                    warnings,
                    info,
                    ignored: report.ignored,
                },
                diagnostics: &report.diagnostics,
            }
        })
        .collect();

    let mut out = serde_json::to_string_pretty(&files).expect("JSON serialization failed");
    out.push('\n');
    out
}
