//! Job and step id naming, and duplicate step ids within a job.

use super::{is_identifier, Rule, RuleInfo};
use crate::ast::Str;
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;
use std::collections::HashMap;

const RULE: &str = "id";

pub struct IdRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Job and step ids: invalid characters and duplicate step ids",
        remediation: "Start ids with a letter or _ and use only alphanumeric characters, - and _; give every step in a job a distinct id",
    }
}

impl Rule for IdRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Job and step id format"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for job in &doc.workflow.jobs {
            check_format(doc, "job", &job.id, &mut out);

            let mut seen: HashMap<String, &Str> = HashMap::new();
            for id in job.steps.iter().filter_map(|s| s.id.as_ref()) {
                if id.contains_expression() {
                    continue;
                }
                check_format(doc, "step", id, &mut out);
                let key = id.value.to_ascii_lowercase();
                match seen.get(&key) {
                    Some(prev) => out.push(doc.error(
                        RULE,
                        id.pos,
                        format!(
                            "step ID {:?} duplicates. previously defined at line:{},col:{}. step ID must be unique within a job. note that step ID is case insensitive",
                            id.value, prev.pos.line, prev.pos.col
                        ),
                    )),
                    None => {
                        seen.insert(key, id);
                    }
                }
            }
        }
        out
    }
}

fn check_format(doc: &Document, what: &str, id: &Str, out: &mut Vec<Diagnostic>) {
    if !is_identifier(&id.value) {
        out.push(doc.error(
            RULE,
            id.pos,
            format!(
                "invalid {what} ID {:?}. {what} ID must start with a letter or _ and contain only alphanumeric characters, - or _",
                id.value
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    #[test]
    fn valid_ids() {
        let d = run_rule(
            &IdRule,
            "on: push\njobs:\n  build_1:\n    runs-on: x\n    steps:\n      - id: a-b\n        run: a\n      - id: c\n        run: b\n",
        );
        assert!(d.is_empty(), "{d:?}");
    }

    #[test]
    fn invalid_job_id() {
        let d = run_rule(&IdRule, "on: push\njobs:\n  1build:\n    runs-on: x\n    steps: [{run: a}]\n");
        assert_eq!(d.len(), 1);
        assert!(d[0].message.starts_with("invalid job ID \"1build\""));
    }

    #[test]
    fn duplicate_step_ids_are_case_insensitive() {
        let d = run_rule(
            &IdRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - id: Step\n        run: a\n      - id: step\n        run: b\n",
        );
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("duplicates"));
        assert_eq!(d[0].line, 8);
    }
}
