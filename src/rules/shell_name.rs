//! `shell:` names, with the runner OS taken into account.

use super::{Rule, RuleInfo};
use crate::ast::Str;
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

const RULE: &str = "shell-name";

const PORTABLE_SHELLS: &[&str] = &["bash", "pwsh", "python", "sh"];
const WINDOWS_SHELLS: &[&str] = &["cmd", "powershell"];

pub struct ShellNameRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Unknown shell names and Windows-only shells on other runners",
        remediation: "Use bash, pwsh, python or sh (cmd and powershell on Windows only), or a custom command containing {0}",
    }
}

impl Rule for ShellNameRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Shell names in run steps and defaults"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let wf = &doc.workflow;
        let mut out = Vec::new();
        if let Some(shell) = wf.defaults.as_ref().and_then(|d| d.shell.as_ref()) {
            // the runner OS is unknown at workflow level
            check_shell(doc, shell, None, &mut out);
        }
        for job in &wf.jobs {
            let windows = job
                .runs_on
                .as_ref()
                .filter(|r| !r.labels.iter().any(Str::contains_expression))
                .map(|_| job.runs_on_windows());
            if let Some(shell) = job.defaults.as_ref().and_then(|d| d.shell.as_ref()) {
                check_shell(doc, shell, windows, &mut out);
            }
            for step in &job.steps {
                if let Some(shell) = step.run.as_ref().and_then(|r| r.shell.as_ref()) {
                    check_shell(doc, shell, windows, &mut out);
                }
            }
        }
        out
    }
}

/// `windows` is `None` when the runner OS cannot be told statically.
fn check_shell(doc: &Document, shell: &Str, windows: Option<bool>, out: &mut Vec<Diagnostic>) {
    if shell.contains_expression() || shell.value.contains("{0}") {
        return;
    }
    let name = shell.value.split_whitespace().next().unwrap_or_default();
    if PORTABLE_SHELLS.contains(&name) {
        return;
    }
    if WINDOWS_SHELLS.contains(&name) {
        if windows == Some(false) {
            out.push(doc.error(
                RULE,
                shell.pos,
                format!(
                    "shell name {:?} is only available on Windows runners. available names for this runner are {}",
                    name,
                    quoted(PORTABLE_SHELLS)
                ),
            ));
        }
        return;
    }
    let mut available: Vec<&str> = PORTABLE_SHELLS.to_vec();
    if windows != Some(false) {
        available.extend(WINDOWS_SHELLS);
    }
    out.push(doc.error(
        RULE,
        shell.pos,
        format!(
            "shell name {:?} is invalid. available names are {}, or a custom shell command containing \"{{0}}\"",
            name,
            quoted(&available)
        ),
    ));
}

fn quoted(items: &[&str]) -> String {
    items
        .iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    fn wf(runs_on: &str, shell: &str) -> String {
        format!(
            "on: push\njobs:\n  a:\n    runs-on: {runs_on}\n    steps:\n      - run: echo\n        shell: {shell}\n"
        )
    }

    #[test]
    fn known_shells() {
        for shell in ["bash", "sh -e {0}", "python", "pwsh", "perl {0}"] {
            assert!(run_rule(&ShellNameRule, &wf("ubuntu-latest", shell)).is_empty(), "{shell}");
        }
    }

    #[test]
    fn windows_only_shell_on_linux() {
        let d = run_rule(&ShellNameRule, &wf("ubuntu-latest", "powershell"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("only available on Windows"));
        assert!(run_rule(&ShellNameRule, &wf("windows-latest", "cmd")).is_empty());
    }

    #[test]
    fn unknown_shell() {
        let d = run_rule(&ShellNameRule, &wf("ubuntu-latest", "zsh"));
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("shell name \"zsh\" is invalid"));
        assert_eq!(d[0].line, 7);
    }

    #[test]
    fn runner_from_expression_is_unknown() {
        assert!(run_rule(&ShellNameRule, &wf("${{ matrix.os }}", "cmd")).is_empty());
    }
}
