//! Repository-local lookups.
//!
//! A `./path` in `uses:` points into the repository the workflow lives in,
//! so the callee can be read from disk without any network access. The
//! repository root is the nearest ancestor of the calling document that
//! has a `.github` directory:
//!
//! - a local action is read from `<root>/<path>/action.yml` (or `.yaml`);
//! - a local reusable workflow is read from `<root>/<path>` and its
//!   `on.workflow_call` inputs and secrets become the signature.
//!
//! [`LocalCallees`] caches every lookup, so a callee shared by many
//! documents is read once per [`Linter`](crate::lint::Linter).

use crate::ast::{Event, Str, WorkflowCall};
use crate::diagnostic::Diagnostic;
use crate::parse::{self, Document};
use crate::rules::action::{self, RULE};
use crate::yaml::{self, Node};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const GITHUB_DIR: &str = ".github";

/// Returns the nearest ancestor of `from` (itself included) that contains a
/// `.github` directory. Relative paths are resolved against the current
/// directory first.
pub fn project_root(from: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(from).unwrap_or_else(|_| from.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(GITHUB_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// A declared input or secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Required and without a default.
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Action { name: String, inputs: Vec<Param> },
    Workflow { inputs: Vec<Param>, secrets: Vec<Param> },
}

#[derive(Debug, Clone)]
enum Lookup {
    /// Not in the tree. A local action may be created by an earlier step
    /// (for example a checkout into a subdirectory), so this is not reported.
    Absent,
    Found(Arc<Signature>),
    /// Exists but cannot be used; the message is reported at `uses`.
    Broken(String),
}

/// Cached signatures of local actions and reusable workflows.
#[derive(Default)]
pub struct LocalCallees {
    cache: Mutex<HashMap<PathBuf, Lookup>>,
}

impl LocalCallees {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every local `uses:` of `doc` against its callee. Documents
    /// outside any repository are skipped.
    pub fn check(&self, doc: &Document) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let Some(root) = project_root(&doc.path) else {
            return out;
        };

        for job in &doc.workflow.jobs {
            if let Some(call) = &job.workflow_call {
                // Malformed references are the `action` rule's format check.
                let rel = local_path(&call.uses).filter(|p| {
                    !p.contains('@') && (p.ends_with(".yml") || p.ends_with(".yaml"))
                });
                if let Some(rel) = rel {
                    match self.lookup(&root, rel, load_workflow) {
                        Lookup::Found(sig) => check_call(doc, call, &sig, &mut out),
                        Lookup::Broken(msg) => out.push(doc.error(RULE, call.uses.pos, msg)),
                        Lookup::Absent => out.push(doc.error(
                            RULE,
                            call.uses.pos,
                            format!(
                                "reusable workflow file {:?} does not exist in the repository",
                                call.uses.value
                            ),
                        )),
                    }
                }
            }

            for step in &job.steps {
                let Some(step_action) = &step.action else {
                    continue;
                };
                let Some(rel) = local_path(&step_action.uses) else {
                    continue;
                };
                match self.lookup(&root, rel, load_action) {
                    Lookup::Found(sig) => {
                        if let Signature::Action { name, inputs } = sig.as_ref() {
                            let declared: Vec<(&str, bool)> =
                                inputs.iter().map(|p| (p.name.as_str(), p.required)).collect();
                            action::check_inputs(
                                doc,
                                &step_action.uses,
                                name,
                                &declared,
                                &step_action.inputs,
                                &mut out,
                            );
                        }
                    }
                    Lookup::Broken(msg) => out.push(doc.error(RULE, step_action.uses.pos, msg)),
                    Lookup::Absent => {}
                }
            }
        }
        out
    }

    fn lookup(&self, root: &Path, rel: &str, load: fn(&Path, &str) -> Lookup) -> Lookup {
        let target = root.join(rel);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
        {
            return hit.clone();
        }

        // Loaded outside the lock; two documents racing on the same callee
        // both read it and the second insert wins with an equal value.
        let loaded = load(&target, rel);
        tracing::debug!(callee = %target.display(), ?loaded, "local callee loaded");
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target, loaded.clone());
        loaded
    }
}

/// The repository-relative path of a `./` reference, unless the reference
/// is built from an expression.
fn local_path(uses: &Str) -> Option<&str> {
    if uses.contains_expression() {
        return None;
    }
    uses.value
        .strip_prefix("./")
        .map(|p| p.trim_end_matches('/'))
}

fn load_workflow(path: &Path, rel: &str) -> Lookup {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Lookup::Absent,
        Err(e) => return Lookup::Broken(format!("could not read reusable workflow \"./{rel}\": {e}")),
    };
    let callee = match parse::parse(path, &source) {
        Ok(doc) => doc,
        Err(e) => {
            return Lookup::Broken(format!("could not parse reusable workflow \"./{rel}\": {e}"))
        }
    };
    let Some(call) = callee.workflow.on.iter().find_map(|ev| match ev {
        Event::WorkflowCall(c) => Some(c),
        _ => None,
    }) else {
        return Lookup::Broken(format!(
            "reusable workflow \"./{rel}\" does not define \"workflow_call\" event in \"on\" section"
        ));
    };

    Lookup::Found(Arc::new(Signature::Workflow {
        inputs: call
            .inputs
            .iter()
            .map(|i| Param {
                name: i.name.value.clone(),
                required: i.required && i.default.is_none(),
            })
            .collect(),
        secrets: call
            .secrets
            .iter()
            .map(|s| Param {
                name: s.name.value.clone(),
                required: s.required,
            })
            .collect(),
    }))
}

fn load_action(dir: &Path, rel: &str) -> Lookup {
    if !dir.is_dir() {
        return Lookup::Absent;
    }
    let Some((file, source)) = ["action.yml", "action.yaml"]
        .iter()
        .find_map(|f| std::fs::read_to_string(dir.join(f)).ok().map(|s| (*f, s)))
    else {
        return Lookup::Broken(format!(
            "neither action.yml nor action.yaml is found in local action directory \"./{rel}\""
        ));
    };

    let entries = match yaml::load(&source) {
        Ok(Some(Node::Mapping(entries, _))) => entries,
        Ok(_) => {
            return Lookup::Broken(format!(
                "action metadata \"./{rel}/{file}\" must be a mapping"
            ))
        }
        Err(e) => {
            return Lookup::Broken(format!(
                "could not parse action metadata \"./{rel}/{file}\": {}",
                e.message
            ))
        }
    };

    let mut name = format!("./{rel}");
    let mut inputs = Vec::new();
    for (key, value) in &entries {
        match (key.value.as_str(), value) {
            ("name", Node::Scalar(s)) if !s.is_null() => name = s.value.clone(),
            ("inputs", Node::Mapping(declared, _)) => {
                inputs = declared
                    .iter()
                    .map(|(input, spec)| Param {
                        name: input.value.clone(),
                        required: action_input_required(spec),
                    })
                    .collect();
            }
            _ => {}
        }
    }
    Lookup::Found(Arc::new(Signature::Action { name, inputs }))
}

/// `required: true` with no `default`.
fn action_input_required(spec: &Node) -> bool {
    let Node::Mapping(fields, _) = spec else {
        return false;
    };
    let field = |name: &str| fields.iter().find(|(k, _)| k.value == name).map(|(_, v)| v);
    let required = matches!(field("required"), Some(Node::Scalar(s)) if s.value == "true");
    let has_default = field("default").is_some_and(|v| !v.is_null());
    required && !has_default
}

fn check_call(doc: &Document, call: &WorkflowCall, sig: &Signature, out: &mut Vec<Diagnostic>) {
    let Signature::Workflow { inputs, secrets } = sig else {
        return;
    };
    let uses = &call.uses;

    check_params(doc, uses, "input", "with", inputs, &call.inputs, out);
    if !call.inherit_secrets {
        check_params(doc, uses, "secret", "secrets", secrets, &call.secrets, out);
    }
}

fn check_params(
    doc: &Document,
    uses: &Str,
    what: &str,
    section: &str,
    declared: &[Param],
    given: &[(Str, Str)],
    out: &mut Vec<Diagnostic>,
) {
    for (name, _) in given {
        if name.contains_expression() {
            continue;
        }
        if !declared.iter().any(|p| p.name.eq_ignore_ascii_case(&name.value)) {
            out.push(doc.error(
                RULE,
                name.pos,
                format!(
                    "{what} {:?} is not defined in {:?} reusable workflow. {}",
                    name.value,
                    uses.value,
                    action::available(&format!("{what}s"), declared.iter().map(|p| p.name.as_str()))
                ),
            ));
        }
    }
    for param in declared.iter().filter(|p| p.required) {
        if !given.iter().any(|(n, _)| n.value.eq_ignore_ascii_case(&param.name)) {
            out.push(doc.error(
                RULE,
                uses.pos,
                format!(
                    "{what} {:?} is required by {:?} reusable workflow but it is not specified in \"{section}\"",
                    param.name, uses.value
                ),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".github/workflows")).unwrap();
        dir
    }

    #[test]
    fn root_is_nearest_dir_with_github() {
        let dir = repo();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let root = project_root(&nested.join("x.yaml")).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn workflow_signature() {
        let dir = repo();
        let path = dir.path().join(".github/workflows/callee.yml");
        fs::write(
            &path,
            "on:\n  workflow_call:\n    inputs:\n      need:\n        type: string\n        required: true\n      opt:\n        type: string\n        required: true\n        default: x\n    secrets:\n      token:\n        required: true\njobs: {}\n",
        )
        .unwrap();
        let Lookup::Found(sig) = load_workflow(&path, ".github/workflows/callee.yml") else {
            panic!("expected signature");
        };
        let Signature::Workflow { inputs, secrets } = sig.as_ref() else {
            panic!("expected workflow signature");
        };
        assert_eq!(
            inputs,
            &vec![
                Param { name: "need".into(), required: true },
                Param { name: "opt".into(), required: false },
            ]
        );
        assert_eq!(secrets, &vec![Param { name: "token".into(), required: true }]);
    }

    #[test]
    fn workflow_without_call_event_is_broken() {
        let dir = repo();
        let path = dir.path().join(".github/workflows/push.yml");
        fs::write(&path, "on: push\njobs: {}\n").unwrap();
        let Lookup::Broken(msg) = load_workflow(&path, ".github/workflows/push.yml") else {
            panic!("expected broken lookup");
        };
        assert!(msg.contains("workflow_call"), "{msg}");
    }

    #[test]
    fn action_metadata() {
        let dir = repo();
        let action_dir = dir.path().join("tools/greet");
        fs::create_dir_all(&action_dir).unwrap();
        fs::write(
            action_dir.join("action.yaml"),
            "name: Greet\ninputs:\n  who:\n    required: true\n  greeting:\n    required: true\n    default: hi\n  loud:\nruns:\n  using: node20\n  main: index.js\n",
        )
        .unwrap();
        let Lookup::Found(sig) = load_action(&action_dir, "tools/greet") else {
            panic!("expected signature");
        };
        assert_eq!(
            sig.as_ref(),
            &Signature::Action {
                name: "Greet".into(),
                inputs: vec![
                    Param { name: "who".into(), required: true },
                    Param { name: "greeting".into(), required: false },
                    Param { name: "loud".into(), required: false },
                ],
            }
        );
    }

    #[test]
    fn missing_action_dir_is_absent() {
        let dir = repo();
        assert!(matches!(
            load_action(&dir.path().join("nope"), "nope"),
            Lookup::Absent
        ));
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        assert!(matches!(
            load_action(&dir.path().join("empty"), "empty"),
            Lookup::Broken(_)
        ));
    }
}
