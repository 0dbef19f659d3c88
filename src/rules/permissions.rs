//! `permissions:` scopes and access levels, at workflow and job level.

use super::{Rule, RuleInfo};
use crate::ast::Permissions;
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

const RULE: &str = "permissions";

const READ_WRITE: &[&str] = &["read", "write", "none"];

/// Known scopes and the access levels each accepts.
const SCOPES: &[(&str, &[&str])] = &[
    ("actions", READ_WRITE),
    ("attestations", READ_WRITE),
    ("checks", READ_WRITE),
    ("contents", READ_WRITE),
    ("deployments", READ_WRITE),
    ("discussions", READ_WRITE),
    ("id-token", &["write", "none"]),
    ("issues", READ_WRITE),
    ("models", &["read", "none"]),
    ("packages", READ_WRITE),
    ("pages", READ_WRITE),
    ("pull-requests", READ_WRITE),
    ("repository-projects", READ_WRITE),
    ("security-events", READ_WRITE),
    ("statuses", READ_WRITE),
];

pub struct PermissionsRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Permissions: unknown scopes and invalid access levels",
        remediation: "Use \"read-all\", \"write-all\" or a mapping of known scopes to \"read\", \"write\" or \"none\"",
    }
}

impl Rule for PermissionsRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Permission scopes and levels"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let wf = &doc.workflow;
        let mut out = Vec::new();
        let sections = wf
            .permissions
            .iter()
            .chain(wf.jobs.iter().filter_map(|j| j.permissions.as_ref()));
        for p in sections {
            check_permissions(doc, p, &mut out);
        }
        out
    }
}

fn check_permissions(doc: &Document, p: &Permissions, out: &mut Vec<Diagnostic>) {
    if let Some(all) = &p.all {
        if all.value != "read-all" && all.value != "write-all" {
            out.push(doc.error(
                RULE,
                all.pos,
                format!(
                    "{:?} is invalid for permission for all the scopes. available values are \"read-all\" and \"write-all\"",
                    all.value
                ),
            ));
        }
        return;
    }
    for (scope, level) in &p.scopes {
        let Some((_, levels)) = SCOPES.iter().find(|(s, _)| *s == scope.value) else {
            let names = SCOPES
                .iter()
                .map(|(s, _)| format!("{s:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push(doc.error(
                RULE,
                scope.pos,
                format!("unknown permission scope {:?}. all available permission scopes are {}", scope.value, names),
            ));
            continue;
        };
        if !levels.contains(&level.value.as_str()) {
            let allowed = levels
                .iter()
                .map(|l| format!("{l:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            out.push(doc.error(
                RULE,
                level.pos,
                format!(
                    "The value {:?} is not allowed for permission scope {:?}. available values are {}",
                    level.value, scope.value, allowed
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    fn wf(perms: &str) -> String {
        format!("on: push\npermissions:{perms}\njobs:\n  a:\n    runs-on: x\n    steps: [{{run: a}}]\n")
    }

    #[test]
    fn valid_permissions() {
        assert!(run_rule(&PermissionsRule, &wf(" read-all")).is_empty());
        assert!(run_rule(&PermissionsRule, &wf("\n  contents: read\n  id-token: write")).is_empty());
    }

    #[test]
    fn invalid_shorthand() {
        let d = run_rule(&PermissionsRule, &wf(" read"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("permission for all the scopes"));
    }

    #[test]
    fn unknown_scope() {
        let d = run_rule(&PermissionsRule, &wf("\n  content: read"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("unknown permission scope \"content\""));
    }

    #[test]
    fn invalid_level_for_scope() {
        let d = run_rule(&PermissionsRule, &wf("\n  id-token: read"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("\"read\" is not allowed"));
        assert_eq!(d[0].line, 3);
    }

    #[test]
    fn job_level_permissions() {
        let d = run_rule(
            &PermissionsRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    permissions:\n      issues: admin\n    steps: [{run: a}]\n",
        );
        assert_eq!(d.len(), 1);
    }
}
