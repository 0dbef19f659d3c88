//! Environment variable names in every `env:` section.

use super::{Rule, RuleInfo};
use crate::ast::{Env, EnvVar};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

const RULE: &str = "env-var";

pub struct EnvVarRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Environment variable names containing \"&\", \"=\" or spaces",
        remediation: "Rename the variable so it contains none of \"&\", \"=\" or whitespace",
    }
}

impl Rule for EnvVarRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Environment variable names"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let wf = &doc.workflow;
        let mut sections: Vec<&Env> = wf.env.iter().collect();
        for job in &wf.jobs {
            sections.extend(&job.env);
            if let Some(c) = &job.container {
                sections.extend(&c.env);
            }
            for svc in &job.services {
                sections.extend(&svc.container.env);
            }
            for step in &job.steps {
                sections.extend(&step.env);
            }
        }
        sections
            .into_iter()
            .flat_map(|e| &e.vars)
            .filter(|v| is_invalid(v))
            .map(|v| {
                doc.error(
                    RULE,
                    v.name.pos,
                    format!(
                        "environment variable name {:?} is invalid. '&', '=' and spaces should not be contained",
                        v.name.value
                    ),
                )
            })
            .collect()
    }
}

fn is_invalid(var: &EnvVar) -> bool {
    !var.name.contains_expression()
        && var
            .name
            .value
            .chars()
            .any(|c| c == '&' || c == '=' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    #[test]
    fn invalid_names_everywhere() {
        let d = run_rule(
            &EnvVarRule,
            "on: push\nenv:\n  'A B': 1\njobs:\n  a:\n    runs-on: x\n    env:\n      OK: 1\n    steps:\n      - run: a\n        env:\n          'X=Y': 2\n",
        );
        assert_eq!(d.len(), 2, "{d:?}");
        assert_eq!(d[0].line, 3);
        assert_eq!(d[1].line, 12);
    }

    #[test]
    fn expression_names_are_skipped() {
        let d = run_rule(
            &EnvVarRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    env:\n      ${{ matrix.name }} x: 1\n    steps: [{run: a}]\n",
        );
        assert!(d.is_empty(), "{d:?}");
    }
}
