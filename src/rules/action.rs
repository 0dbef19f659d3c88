//! `uses:` references.
//!
//! Checks the format of action and reusable-workflow references and, for a
//! fixed set of popular actions whose inputs are known, that every required
//! input is given and no unknown input is passed. Nothing is fetched; remote
//! actions outside the table only get the format check. Local `./` callees
//! are read from the repository by [`project`](crate::project).

use super::{Rule, RuleInfo};
use crate::ast::{ActionStep, Job, Str};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;

pub const RULE: &str = "action";

pub struct ActionRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "\"uses\" format of actions and reusable workflows, and inputs of well-known actions",
        remediation: "Use \"owner/repo@ref\", \"owner/repo/path@ref\", \"./path\" or \"docker://image\", pass every required input and remove unknown ones",
    }
}

/// Input of a known action: (name, required).
type Input = (&'static str, bool);

struct ActionSpec {
    /// Lowercase `owner/repo`.
    repo: &'static str,
    name: &'static str,
    inputs: &'static [Input],
}

const POPULAR_ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        repo: "actions/checkout",
        name: "Checkout",
        inputs: &[
            ("repository", false),
            ("ref", false),
            ("token", false),
            ("ssh-key", false),
            ("ssh-known-hosts", false),
            ("ssh-strict", false),
            ("ssh-user", false),
            ("persist-credentials", false),
            ("path", false),
            ("clean", false),
            ("filter", false),
            ("sparse-checkout", false),
            ("sparse-checkout-cone-mode", false),
            ("fetch-depth", false),
            ("fetch-tags", false),
            ("show-progress", false),
            ("lfs", false),
            ("submodules", false),
            ("set-safe-directory", false),
            ("github-server-url", false),
        ],
    },
    ActionSpec {
        repo: "actions/setup-node",
        name: "Setup Node.js environment",
        inputs: &[
            ("always-auth", false),
            ("node-version", false),
            ("node-version-file", false),
            ("architecture", false),
            ("check-latest", false),
            ("registry-url", false),
            ("scope", false),
            ("token", false),
            ("cache", false),
            ("cache-dependency-path", false),
            ("package-manager-cache", false),
            ("mirror", false),
            ("mirror-token", false),
        ],
    },
    ActionSpec {
        repo: "actions/cache",
        name: "Cache",
        inputs: &[
            ("path", true),
            ("key", true),
            ("restore-keys", false),
            ("upload-chunk-size", false),
            ("enablecrossosarchive", false),
            ("fail-on-cache-miss", false),
            ("lookup-only", false),
            ("save-always", false),
        ],
    },
    ActionSpec {
        repo: "actions/upload-artifact",
        name: "Upload a Build Artifact",
        inputs: &[
            ("name", false),
            ("path", true),
            ("if-no-files-found", false),
            ("retention-days", false),
            ("compression-level", false),
            ("overwrite", false),
            ("include-hidden-files", false),
        ],
    },
    ActionSpec {
        repo: "actions/download-artifact",
        name: "Download a Build Artifact",
        inputs: &[
            ("name", false),
            ("path", false),
            ("pattern", false),
            ("merge-multiple", false),
            ("github-token", false),
            ("repository", false),
            ("run-id", false),
            ("artifact-ids", false),
        ],
    },
    ActionSpec {
        repo: "actions/setup-python",
        name: "Setup Python",
        inputs: &[
            ("python-version", false),
            ("python-version-file", false),
            ("cache", false),
            ("architecture", false),
            ("check-latest", false),
            ("token", false),
            ("cache-dependency-path", false),
            ("update-environment", false),
            ("allow-prereleases", false),
            ("freethreaded", false),
            ("pip-version", false),
            ("pip-install", false),
        ],
    },
    ActionSpec {
        repo: "actions/github-script",
        name: "GitHub Script",
        inputs: &[
            ("script", true),
            ("github-token", false),
            ("debug", false),
            ("user-agent", false),
            ("previews", false),
            ("result-encoding", false),
            ("retries", false),
            ("retry-exempt-status-codes", false),
            ("base-url", false),
        ],
    },
    ActionSpec {
        repo: "actions/setup-go",
        name: "Setup Go environment",
        inputs: &[
            ("go-version", false),
            ("go-version-file", false),
            ("check-latest", false),
            ("token", false),
            ("cache", false),
            ("cache-dependency-path", false),
            ("architecture", false),
        ],
    },
    ActionSpec {
        repo: "actions/setup-java",
        name: "Setup Java JDK",
        inputs: &[
            ("java-version", false),
            ("java-version-file", false),
            ("distribution", true),
            ("java-package", false),
            ("architecture", false),
            ("jdkfile", false),
            ("check-latest", false),
            ("server-id", false),
            ("server-username", false),
            ("server-password", false),
            ("settings-path", false),
            ("overwrite-settings", false),
            ("gpg-private-key", false),
            ("gpg-passphrase", false),
            ("cache", false),
            ("cache-dependency-path", false),
            ("job-status", false),
            ("token", false),
            ("mvn-toolchain-id", false),
            ("mvn-toolchain-vendor", false),
        ],
    },
];

impl Rule for ActionRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Action and reusable workflow references"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for job in &doc.workflow.jobs {
            check_workflow_call(doc, job, &mut out);
            for step in &job.steps {
                if let Some(action) = &step.action {
                    check_action(doc, action, &mut out);
                }
            }
        }
        out
    }
}

/// Why `uses` is not a valid `owner/repo[/path]@ref`, if it is not.
fn repository_ref_problem(uses: &str) -> Option<&'static str> {
    let Some((target, git_ref)) = uses.split_once('@') else {
        return Some("ref is missing");
    };
    if git_ref.is_empty() {
        return Some("ref is empty");
    }
    let mut parts = target.splitn(3, '/');
    let owner = parts.next().unwrap_or_default();
    let repo = parts.next().unwrap_or_default();
    if owner.is_empty() || repo.is_empty() {
        return Some("owner or repository is missing");
    }
    if parts.next().is_some_and(str::is_empty) {
        return Some("path after the repository is empty");
    }
    None
}

fn check_action(doc: &Document, action: &ActionStep, out: &mut Vec<Diagnostic>) {
    let uses = &action.uses;
    if uses.contains_expression() || uses.value.starts_with("./") {
        return;
    }
    if let Some(image) = uses.value.strip_prefix("docker://") {
        if image.is_empty() {
            out.push(doc.error(RULE, uses.pos, "Docker image name is empty in \"uses\""));
        }
        return;
    }
    if let Some(reason) = repository_ref_problem(&uses.value) {
        out.push(doc.error(
            RULE,
            uses.pos,
            format!(
                "specifying action {:?} in invalid format because {}. available formats are \"{{owner}}/{{repo}}@{{ref}}\" or \"{{owner}}/{{repo}}/{{path}}@{{ref}}\"",
                uses.value, reason
            ),
        ));
        return;
    }
    if let Some(spec) = popular_action(&uses.value) {
        check_inputs(doc, uses, spec.name, spec.inputs, &action.inputs, out);
    }
}

fn popular_action(uses: &str) -> Option<&'static ActionSpec> {
    let (target, _) = uses.split_once('@')?;
    let target = target.to_ascii_lowercase();
    POPULAR_ACTIONS.iter().find(|a| a.repo == target)
}

/// Compares the `with:` inputs of an action step against the action's
/// declared `(name, required)` inputs. Names compare case-insensitively.
pub(crate) fn check_inputs(
    doc: &Document,
    uses: &Str,
    action_name: &str,
    declared: &[(&str, bool)],
    given: &[(Str, Str)],
    out: &mut Vec<Diagnostic>,
) {
    for (name, _) in given {
        if name.contains_expression() {
            continue;
        }
        if !declared.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name.value)) {
            out.push(doc.error(
                RULE,
                name.pos,
                format!(
                    "input {:?} is not defined in action {:?} defined at {:?}. {}",
                    name.value,
                    action_name,
                    uses.value,
                    available("inputs", declared.iter().map(|(n, _)| *n))
                ),
            ));
        }
    }
    for (required, _) in declared.iter().filter(|(_, req)| *req) {
        if !given.iter().any(|(n, _)| n.value.eq_ignore_ascii_case(required)) {
            out.push(doc.error(
                RULE,
                uses.pos,
                format!(
                    "missing input {:?} which is required by action {:?} defined at {:?}",
                    required, action_name, uses.value
                ),
            ));
        }
    }
}

/// `available inputs are "a", "b"`, or `no inputs are defined`.
pub(crate) fn available<'a>(what: &str, names: impl Iterator<Item = &'a str>) -> String {
    let list = names.map(|n| format!("{n:?}")).collect::<Vec<_>>();
    if list.is_empty() {
        format!("no {what} are defined")
    } else {
        format!("available {what} are {}", list.join(", "))
    }
}

fn check_workflow_call(doc: &Document, job: &Job, out: &mut Vec<Diagnostic>) {
    let Some(call) = &job.workflow_call else {
        return;
    };
    let uses = &call.uses;
    if uses.contains_expression() {
        return;
    }
    let valid = if let Some(path) = uses.value.strip_prefix("./") {
        !path.contains('@') && is_workflow_file(path)
    } else {
        match uses.value.split_once('@') {
            Some((target, git_ref)) => {
                let parts: Vec<&str> = target.splitn(3, '/').collect();
                !git_ref.is_empty()
                    && parts.len() == 3
                    && parts.iter().all(|p| !p.is_empty())
                    && is_workflow_file(parts[2])
            }
            None => false,
        }
    };
    if !valid {
        out.push(doc.error(
            RULE,
            uses.pos,
            format!(
                "reusable workflow call {:?} at \"uses\" is not following the format \"owner/repo/path/to/workflow.yml@ref\" nor \"./path/to/workflow.yml\"",
                uses.value
            ),
        ));
    }
}

fn is_workflow_file(path: &str) -> bool {
    path.ends_with(".yml") || path.ends_with(".yaml")
}
