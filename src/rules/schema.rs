//! Key-combination checks.
//!
//! Reports everything the parser collected while projecting the YAML tree
//! (unknown keys, duplicates, wrong value shapes) together with combinations
//! of keys that are individually valid but not together.

use super::{Rule, RuleInfo};
use crate::ast::{InputType, Job, Step};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::{Document, SYNTAX_RULE};

pub struct SchemaRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: SYNTAX_RULE,
        severity: "error",
        message: "Workflow structure: unknown or duplicated keys, wrong value types and invalid key combinations",
        remediation: "Fix the reported key. Each step needs exactly one of \"run\" or \"uses\"; a job either calls a reusable workflow with \"uses\" or has \"runs-on\" and \"steps\"",
    }
}

impl Rule for SchemaRule {
    fn name(&self) -> &'static str {
        SYNTAX_RULE
    }

    fn description(&self) -> &'static str {
        "Workflow keys, value types and key combinations"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = doc.syntax_errors.clone();
        let wf = &doc.workflow;

        if let Some(d) = wf.workflow_dispatch() {
            for input in &d.inputs {
                if input.input_type != InputType::Choice && !input.options.is_empty() {
                    out.push(doc.error(
                        SYNTAX_RULE,
                        input.name.pos,
                        format!(
                            "\"options\" can be specified only for \"choice\" input type but input {:?} is not",
                            input.name.value
                        ),
                    ));
                }
            }
        }

        for job in &wf.jobs {
            check_job(doc, job, &mut out);
            for step in &job.steps {
                check_step(doc, step, &mut out);
            }
        }
        out
    }
}

const CALL_JOB_KEYS: &str = "\"name\", \"uses\", \"with\", \"secrets\", \"needs\", \"if\", \"permissions\", \"concurrency\" and \"strategy\"";

fn check_job(doc: &Document, job: &Job, out: &mut Vec<Diagnostic>) {
    if job.workflow_call.is_some() {
        let mut forbidden = Vec::new();
        if job.runs_on.is_some() {
            forbidden.push("runs-on");
        }
        if job.has_steps {
            forbidden.push("steps");
        }
        if job.env.is_some() {
            forbidden.push("env");
        }
        if job.container.is_some() {
            forbidden.push("container");
        }
        if !job.services.is_empty() {
            forbidden.push("services");
        }
        if job.defaults.is_some() {
            forbidden.push("defaults");
        }
        if job.timeout_minutes.is_some() {
            forbidden.push("timeout-minutes");
        }
        if job.environment.is_some() {
            forbidden.push("environment");
        }
        if !job.outputs.is_empty() {
            forbidden.push("outputs");
        }
        for key in forbidden {
            out.push(doc.error(
                SYNTAX_RULE,
                job.pos,
                format!(
                    "when a reusable workflow is called with \"uses\", {:?} is not available in job {:?}. only following keys are allowed: {}",
                    key, job.id.value, CALL_JOB_KEYS
                ),
            ));
        }
        return;
    }

    if job.runs_on.is_none() {
        out.push(doc.error(
            SYNTAX_RULE,
            job.pos,
            format!("\"runs-on\" section is missing in job {:?}", job.id.value),
        ));
    }
    if !job.has_steps {
        out.push(doc.error(
            SYNTAX_RULE,
            job.pos,
            format!("\"steps\" section is missing in job {:?}", job.id.value),
        ));
    }
    for key in &job.stray_call_keys {
        out.push(doc.error(
            SYNTAX_RULE,
            key.pos,
            format!(
                "{:?} is only available for a job calling a reusable workflow with \"uses\"",
                key.value
            ),
        ));
    }
}

fn check_step(doc: &Document, step: &Step, out: &mut Vec<Diagnostic>) {
    match (&step.run, &step.action) {
        (Some(_), Some(_)) => out.push(doc.error(
            SYNTAX_RULE,
            step.pos,
            "step must run script with \"run\" section or run action with \"uses\" section, not both",
        )),
        (None, None) => out.push(doc.error(
            SYNTAX_RULE,
            step.pos,
            "step must run script with \"run\" section or run action with \"uses\" section",
        )),
        _ => {}
    }
    for key in &step.stray_keys {
        let needs = if key.value == "with" { "uses" } else { "run" };
        out.push(doc.error(
            SYNTAX_RULE,
            key.pos,
            format!(
                "{:?} is only available for a step with {:?}",
                key.value, needs
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    #[test]
    fn valid_workflow_has_no_errors() {
        let d = run_rule(
            &SchemaRule,
            "on: push\njobs:\n  a:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo hi\n",
        );
        assert!(d.is_empty(), "{d:?}");
    }

    #[test]
    fn step_with_run_and_uses() {
        let d = run_rule(
            &SchemaRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: echo\n        uses: actions/checkout@v4\n",
        );
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("not both"));
        assert_eq!(d[0].line, 6);
    }

    #[test]
    fn missing_runs_on_and_steps() {
        let d = run_rule(&SchemaRule, "on: push\njobs:\n  a:\n    name: x\n");
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn reusable_workflow_job_with_steps() {
        let d = run_rule(
            &SchemaRule,
            "on: push\njobs:\n  a:\n    uses: o/r/.github/workflows/x.yml@v1\n    runs-on: x\n",
        );
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("\"runs-on\" is not available"));
    }

    #[test]
    fn parser_errors_are_included() {
        let d = run_rule(
            &SchemaRule,
            "on: push\nfoo: 1\njobs:\n  a:\n    runs-on: x\n    steps: [{run: a}]\n",
        );
        assert_eq!(d.len(), 1);
        assert_eq!(d[0].rule_id, "syntax-check");
    }
}
