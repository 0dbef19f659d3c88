//! Output formatting for lint reports.
//!
//! Three formats are supported:
//!
//! | Format | Module | Use case |
//! |--------|--------|----------|
//! | [`Pretty`](OutputFormat::Pretty) | [`pretty`] | Terminal / human review |
//! | [`Json`](OutputFormat::Json)     | [`json`]   | Automation / scripting  |
//! | [`Sarif`](OutputFormat::Sarif)   | [`sarif`]  | Code scanning upload    |
//!
//! Use [`format_reports`] to render the reports of one run in any of the
//! above formats.

pub mod json;
pub mod pretty;
pub mod sarif;

use crate::diagnostic::Report;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Colored `file:line:col: message [rule]` lines with source snippets.
    Pretty,
    /// Machine-readable JSON.
    Json,
    /// [SARIF 2.1.0](https://sarifweb.azurewebsites.net/) for code scanning tools.
    Sarif,
}

/// Formats the reports of one run in the requested [`OutputFormat`].
///
/// # Examples
///
/// ```rust,no_run
/// use wflint::output::{format_reports, OutputFormat};
/// # use wflint::diagnostic::Report;
/// # fn example(reports: &[Report]) {
/// let json = format_reports(reports, OutputFormat::Json);
/// println!("{json}");
/// # }
/// ```
pub fn format_reports(reports: &[Report], format: OutputFormat) -> String {
    match format {
        OutputFormat::Pretty => pretty::format(reports),
        OutputFormat::Json => json::format(reports),
        OutputFormat::Sarif => sarif::format(reports),
    }
}
