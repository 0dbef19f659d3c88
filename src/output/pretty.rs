//! Human-readable colored text formatter.
//!
//! Every diagnostic is one `file:line:col: message [rule]` line followed by
//! the source line it points into and a caret under the column. A one-line
//! summary closes the output.

use crate::diagnostic::{Diagnostic, Report, Severity};
use colored::Colorize;

/// Formats reports as human-readable, ANSI-colored text.
pub fn format(reports: &[Report]) -> String {
    let mut out = String::new();

    for report in reports {
        for d in &report.diagnostics {
            render(d, &mut out);
        }
    }

    let (errors, warnings, info, ignored) =
        reports
            .iter()
            .fold((0, 0, 0, 0), |(e, w, i, ig), r| {
                let (re, rw, ri) = r.count_by_severity();
                (e + re, w + rw, i + ri, ig + r.ignored)
            });
    let failed = reports.iter().filter(|r| !r.passed).count();

    let status = if failed > 0 {
        "FAILED".red().bold().to_string()
    } else if warnings > 0 {
        "WARNING".yellow().bold().to_string()
    } else {
        "PASSED".green().bold().to_string()
    };
    out.push_str(&format!(
        "Result: {status}  |  {} files, {} errors, {} warnings, {} info, {} ignored\n",
        reports.len(),
        errors,
        warnings,
        info,
        ignored,
    ));

    out
}

fn render(d: &Diagnostic, out: &mut String) {
    let location = format!("{}:{}:{}:", d.file.display(), d.line, d.column);
    let message = match d.severity {
        Severity::Error => d.message.normal(),
        Severity::Warning => d.message.yellow(),
        Severity::Info => d.message.blue(),
    };
    out.push_str(&format!(
        "{} {} {}\n",
        location.bold(),
        message,
        format!("[{}]", d.rule_id).dimmed()
    ));
    if let Some(ref snippet) = d.snippet {
        out.push_str(&format!("  {} {}\n", "|".dimmed(), snippet));
        // columns count characters, so the caret lines up on non-ASCII lines too
        let pad = " ".repeat(d.column.saturating_sub(1));
        out.push_str(&format!("  {} {}{}\n", "|".dimmed(), pad, "^".green().bold()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Pos;
    use std::path::PathBuf;

    #[test]
    fn diagnostic_line_and_caret() {
        colored::control::set_override(false);
        let d = Diagnostic::new(
            "job-needs",
            Severity::Error,
            PathBuf::from("ci.yaml"),
            Pos::new(4, 12),
            "job \"a\" needs job \"b\" which does not exist",
        )
        .with_snippet(Some("    needs: [b]".to_string()));
        let report = Report::new(PathBuf::from("ci.yaml"), vec![d], 0, false);
        let text = format(&[report]);
        assert!(text.contains("ci.yaml:4:12: job \"a\" needs job \"b\" which does not exist [job-needs]"));
        assert!(text.contains("|            ^"));
        assert!(text.contains("1 files, 1 errors"));
    }
}
