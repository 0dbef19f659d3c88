//! Workflow commands that were turned off in favor of environment files.

use super::{Rule, RuleInfo};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;
use regex::Regex;
use std::sync::LazyLock;

const RULE: &str = "deprecated-commands";

static DEPRECATED_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::(set-output|save-state|set-env|add-path)(\s|::)").unwrap());

pub struct DeprecatedCommandsRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Disabled workflow commands ::set-output, ::save-state, ::set-env and ::add-path in run scripts",
        remediation: "Append to the files named by $GITHUB_OUTPUT, $GITHUB_STATE, $GITHUB_ENV or $GITHUB_PATH instead",
    }
}

fn replacement(command: &str) -> &'static str {
    match command {
        "set-output" => "echo \"{name}={value}\" >> $GITHUB_OUTPUT",
        "save-state" => "echo \"{name}={value}\" >> $GITHUB_STATE",
        "set-env" => "echo \"{name}={value}\" >> $GITHUB_ENV",
        _ => "echo \"{path}\" >> $GITHUB_PATH",
    }
}

impl Rule for DeprecatedCommandsRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Disabled workflow commands in scripts"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let scripts = doc
            .workflow
            .jobs
            .iter()
            .flat_map(|j| &j.steps)
            .filter_map(|s| s.run.as_ref());
        for run in scripts {
            for caps in DEPRECATED_COMMAND.captures_iter(&run.run.value) {
                let (Some(whole), Some(cmd)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                out.push(doc.error(
                    RULE,
                    run.run.pos_at(whole.start()),
                    format!(
                        "workflow command {:?} was deprecated. use `{}` instead: https://docs.github.com/en/actions/using-workflows/workflow-commands-for-github-actions",
                        cmd.as_str(),
                        replacement(cmd.as_str())
                    ),
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::run_rule;

    #[test]
    fn set_output_in_block_script() {
        let d = run_rule(
            &DeprecatedCommandsRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: |\n          echo ok\n          echo \"::set-output name=x::1\"\n",
        );
        assert_eq!(d.len(), 1);
        assert!(d[0].message.contains("$GITHUB_OUTPUT"));
        assert_eq!(d[0].line, 8);
        assert_eq!(d[0].column, 17);
    }

    #[test]
    fn every_command_is_reported() {
        let d = run_rule(
            &DeprecatedCommandsRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: |\n          echo '::save-state name=a::b'\n          echo '::set-env name=a::b'\n          echo '::add-path::/bin'\n",
        );
        assert_eq!(d.len(), 3, "{d:?}");
    }

    #[test]
    fn current_commands_are_fine() {
        let d = run_rule(
            &DeprecatedCommandsRule,
            "on: push\njobs:\n  a:\n    runs-on: x\n    steps:\n      - run: echo \"x=1\" >> $GITHUB_OUTPUT\n",
        );
        assert!(d.is_empty());
    }
}
