//! Workflow rules.
//!
//! Every rule implements the [`Rule`] trait. Rules only read the parsed
//! [`Document`] and the shared [`ContextIndex`]; they never talk to each
//! other, so the linter runs them in parallel and the order in which they
//! finish has no effect on the final report.
//!
//! Use [`all_rules`] to obtain every registered rule and [`all_rule_info`]
//! to list them (including the `shellcheck` bridge, which is not a [`Rule`]).

pub mod action;
pub mod deprecated_commands;
pub mod env_var;
pub mod events;
pub mod expression;
pub mod id;
pub mod if_cond;
pub mod job_needs;
pub mod matrix;
pub mod permissions;
pub mod schema;
pub mod shell_name;

use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

/// A semantic check over one document.
///
/// Implementers **must** be [`Send`] + [`Sync`] because
/// [`Linter`](crate::lint::Linter) runs rules in parallel via [rayon].
pub trait Rule: Send + Sync {
    /// Rule identifier, e.g. `"job-needs"`. Used for enabling and disabling
    /// the rule and printed next to every diagnostic it produces.
    fn name(&self) -> &'static str;

    /// Short, human-readable description.
    fn description(&self) -> &'static str;

    /// Checks `doc` and returns its diagnostics in any order.
    fn check(&self, doc: &Document, ctx: &ContextIndex) -> Vec<Diagnostic>;
}

/// Returns every registered [`Rule`].
pub fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(schema::SchemaRule),
        Box::new(job_needs::JobNeedsRule),
        Box::new(matrix::MatrixRule),
        Box::new(expression::ExpressionRule),
        Box::new(if_cond::IfCondRule),
        Box::new(action::ActionRule),
        Box::new(events::EventsRule),
        Box::new(permissions::PermissionsRule),
        Box::new(id::IdRule),
        Box::new(env_var::EnvVarRule),
        Box::new(shell_name::ShellNameRule),
        Box::new(deprecated_commands::DeprecatedCommandsRule),
    ]
}

/// Metadata for one rule, used by `list-rules` and `explain`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RuleInfo {
    /// Unique rule identifier (e.g., `"job-needs"`).
    pub id: &'static str,
    /// Severity as a string (`"error"`, `"warning"`, `"info"`).
    pub severity: &'static str,
    /// Short description of what the rule checks.
    pub message: &'static str,
    /// Guidance on how to fix a violation.
    pub remediation: &'static str,
}

/// Aggregates [`RuleInfo`] from every rule module and the shellcheck bridge.
pub fn all_rule_info() -> Vec<RuleInfo> {
    let mut rules = vec![
        schema::info(),
        job_needs::info(),
        matrix::info(),
        expression::info(),
        if_cond::info(),
        action::info(),
        events::info(),
        permissions::info(),
        id::info(),
        env_var::info(),
        shell_name::info(),
        deprecated_commands::info(),
    ];
    rules.push(crate::shellcheck::info());
    rules
}

/// Every valid rule id.
pub fn rule_ids() -> Vec<&'static str> {
    all_rule_info().into_iter().map(|r| r.id).collect()
}

/// `true` if `s` is a valid job, step or matrix identifier.
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses `src` and runs a single rule over it.
#[cfg(test)]
pub(crate) fn run_rule(rule: &dyn Rule, src: &str) -> Vec<Diagnostic> {
    let doc = crate::parse::parse(std::path::Path::new("test.yaml"), src)
        .expect("test workflow should parse");
    let ctx = ContextIndex::build(&doc.workflow);
    rule.check(&doc, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_match_info() {
        let infos = all_rule_info();
        for rule in all_rules() {
            assert!(
                infos.iter().any(|i| i.id == rule.name()),
                "missing info for {}",
                rule.name()
            );
        }
        assert_eq!(infos.len(), all_rules().len() + 1);
    }

    #[test]
    fn rule_ids_are_unique() {
        let mut ids = rule_ids();
        ids.sort();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("build_and-test"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier(""));
    }
}
