//! Lint orchestration.
//!
//! [`Linter`] is the entry point for checking workflow documents. It owns
//! the enabled rule set and, when the external checker is usable, a
//! [`Bridge`] whose worker pool is shared by every document it lints.

use crate::config::LintOptions;
use crate::context::ContextIndex;
use crate::diagnostic::{Diagnostic, Report, Severity};
use crate::parse::{self, SYNTAX_RULE};
use crate::project::LocalCallees;
use crate::rules::{self, action, Rule};
use crate::shellcheck::{self, Bridge, BridgeError};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct Linter {
    options: LintOptions,
    rules: Vec<Box<dyn Rule>>,
    bridge: Option<Bridge>,
    callees: LocalCallees,
}

impl Linter {
    /// Builds a linter from resolved options.
    ///
    /// The shellcheck bridge is only set up when it is enabled and its
    /// executable can be found; otherwise script checks are skipped with a
    /// warning in the log.
    ///
    /// # Errors
    ///
    /// Fails only when the bridge's worker pool cannot be created.
    pub fn new(options: LintOptions) -> Result<Self, BridgeError> {
        let rules: Vec<_> = rules::all_rules()
            .into_iter()
            .filter(|r| options.is_rule_enabled(r.name()))
            .collect();

        let bridge = match &options.shellcheck {
            Some(opts) if shellcheck::is_available(&opts.executable) => Some(Bridge::new(opts)?),
            Some(opts) => {
                tracing::warn!(
                    executable = %opts.executable,
                    "shellcheck not found; scripts in run steps will not be checked"
                );
                None
            }
            None => None,
        };

        Ok(Linter {
            options,
            rules,
            bridge,
            callees: LocalCallees::new(),
        })
    }

    pub fn options(&self) -> &LintOptions {
        &self.options
    }

    /// `true` when run scripts are sent to shellcheck.
    pub fn has_bridge(&self) -> bool {
        self.bridge.is_some()
    }

    /// Lints one document.
    ///
    /// # Pipeline
    ///
    /// 1. Parses `source`. A structural failure becomes a single
    ///    `syntax-check` diagnostic and nothing else runs.
    /// 2. Builds the [`ContextIndex`] for the workflow.
    /// 3. Runs the enabled rules **in parallel** while the bridge checks the
    ///    run scripts on its own pool. Local `./` callees are checked with
    ///    the rules.
    /// 4. Aggregates: see [`aggregate`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use wflint::{config::LintOptions, lint::Linter};
    ///
    /// let linter = Linter::new(LintOptions::default()).unwrap();
    /// let report = linter.lint_source(Path::new("ci.yaml"), "on: push\njobs: {}\n");
    /// assert!(report.diagnostics.is_empty());
    /// ```
    pub fn lint_source(&self, path: &Path, source: &str) -> Report {
        let started = Instant::now();
        tracing::debug!(path = %path.display(), "linting document");

        let raw = match parse::parse(path, source) {
            Ok(doc) => {
                let ctx = ContextIndex::build(&doc.workflow);
                let (mut from_rules, from_bridge) = rayon::join(
                    || {
                        let mut found = self
                            .rules
                            .par_iter()
                            .flat_map_iter(|rule| {
                                let t = Instant::now();
                                let found = rule.check(&doc, &ctx);
                                tracing::debug!(
                                    rule = rule.name(),
                                    found = found.len(),
                                    elapsed_us = t.elapsed().as_micros() as u64,
                                    "rule finished"
                                );
                                found
                            })
                            .collect::<Vec<_>>();
                        if self.options.is_rule_enabled(action::RULE) {
                            found.extend(self.callees.check(&doc));
                        }
                        found
                    },
                    || {
                        self.bridge
                            .as_ref()
                            .map(|b| b.check(&doc))
                            .unwrap_or_default()
                    },
                );
                from_rules.extend(from_bridge);
                from_rules
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "document could not be parsed");
                let pos = e.pos();
                let snippet = source
                    .lines()
                    .nth(pos.line.saturating_sub(1))
                    .map(str::to_string);
                vec![Diagnostic::new(
                    SYNTAX_RULE,
                    Severity::Error,
                    path.to_path_buf(),
                    pos,
                    e.to_string(),
                )
                .with_snippet(snippet)]
            }
        };

        let (diagnostics, ignored) = aggregate(raw, &self.options);
        tracing::debug!(
            path = %path.display(),
            diagnostics = diagnostics.len(),
            ignored,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document done"
        );
        Report::new(path.to_path_buf(), diagnostics, ignored, self.options.strict)
    }

    /// Reads and lints a file from disk.
    pub fn lint_file(&self, path: &Path) -> std::io::Result<Report> {
        let source = std::fs::read_to_string(path)?;
        Ok(self.lint_source(path, &source))
    }

    /// Lints many documents in parallel. Reports come back in input order.
    pub fn lint_inputs(&self, inputs: &[(PathBuf, String)]) -> Vec<Report> {
        inputs
            .par_iter()
            .map(|(path, source)| self.lint_source(path, source))
            .collect()
    }
}

/// Filters and orders the raw diagnostics of one document.
///
/// Drops diagnostics of disabled rules and those whose message matches an
/// ignore pattern, removes repeated (line, column, message) entries and
/// sorts by line, column, rule id and message. Returns the final list and
/// the number of diagnostics the ignore patterns dropped.
pub fn aggregate(raw: Vec<Diagnostic>, options: &LintOptions) -> (Vec<Diagnostic>, usize) {
    let mut ignored = 0;
    let mut kept: Vec<Diagnostic> = raw
        .into_iter()
        .filter(|d| options.is_rule_enabled(&d.rule_id))
        .filter(|d| {
            let drop = options.is_ignored(&d.message);
            if drop {
                ignored += 1;
            }
            !drop
        })
        .collect();

    kept.sort_by(|a, b| {
        (a.line, a.column, &a.rule_id, &a.message).cmp(&(b.line, b.column, &b.rule_id, &b.message))
    });

    let mut seen = HashSet::new();
    kept.retain(|d| seen.insert((d.line, d.column, d.message.clone())));
    (kept, ignored)
}
