//! Constant-true `if:` conditions.
//!
//! When an `if:` value mixes `${{ }}` with other text, the whole value is a
//! non-empty string after substitution and therefore always truthy.

use super::{Rule, RuleInfo};
use crate::ast::Str;
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

const RULE: &str = "if-cond";

pub struct IfCondRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "\"if\" condition that is always true because of text around ${{ }}",
        remediation: "Remove the text around ${{ }} or move the whole condition inside one ${{ }}",
    }
}

impl Rule for IfCondRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Conditions that always evaluate to true"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let conds = doc.workflow.jobs.iter().flat_map(|job| {
            job.if_cond
                .iter()
                .chain(job.steps.iter().filter_map(|s| s.if_cond.as_ref()))
        });
        conds
            .filter(|c| always_true(c))
            .map(|c| {
                doc.error(
                    RULE,
                    c.pos,
                    format!(
                        "if: condition {:?} is always evaluated to true because extra characters are around ${{{{ }}}}",
                        c.value
                    ),
                )
            })
            .collect()
    }
}

fn always_true(cond: &Str) -> bool {
    cond.contains_expression() && !cond.is_expression_only()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    fn wf(cond: &str) -> String {
        format!("on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - if: {cond}\n        run: echo\n")
    }

    #[test]
    fn text_around_expression() {
        let d = run_rule(&IfCondRule, &wf("${{ github.ref == 'main' }} && true"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("always evaluated to true"));
        assert_eq!(d[0].line, 6);
    }

    #[test]
    fn two_fragments_are_always_true() {
        let d = run_rule(&IfCondRule, &wf("${{ success() }} ${{ failure() }}"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn well_formed_conditions() {
        assert!(run_rule(&IfCondRule, &wf("${{ success() }}")).is_empty());
        assert!(run_rule(&IfCondRule, &wf("github.ref == 'refs/heads/main'")).is_empty());
    }

    #[test]
    fn job_level_condition() {
        let d = run_rule(
            &IfCondRule,
            "on: push\njobs:\n  a:\n    if: x ${{ true }}\n    runs-on: x\n    steps: [{run: a}]\n",
        );
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].line, 4);
    }
}
