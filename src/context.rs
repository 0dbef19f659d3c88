//! Context availability.
//!
//! Which contexts (`github`, `matrix`, `steps`, ...) and which special
//! functions an expression may use depends on the workflow key it appears in.
//! [`ContextIndex`] is built once per document from the parsed workflow and
//! hands out a read-only [`ContextTable`] for each expression position.

use crate::ast::{InputType, Job, Matrix, Workflow};
use crate::expr::types::{ExprType, ObjectType};
use std::collections::{BTreeMap, HashMap};

/// Every context name the expression language knows.
pub const ALL_CONTEXTS: &[&str] = &[
    "env", "github", "inputs", "job", "jobs", "matrix", "needs", "runner", "secrets", "steps",
    "strategy", "vars",
];

const STEP_CONTEXTS: &[&str] = &[
    "github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "secrets", "steps",
    "inputs",
];

const STATUS_FUNCTIONS: &[&str] = &["always", "cancelled", "failure", "success"];

/// (key, contexts, special functions)
const AVAILABILITY: &[(&str, &[&str], &[&str])] = &[
    ("run-name", &["github", "inputs", "vars"], &[]),
    ("concurrency", &["github", "inputs", "vars"], &[]),
    ("env", &["github", "secrets", "inputs", "vars"], &[]),
    ("on.workflow_call.inputs.<inputs_id>.default", &["github", "inputs", "vars"], &[]),
    ("on.workflow_call.outputs.<output_id>.value", &["github", "jobs", "vars", "inputs"], &[]),
    (
        "jobs.<job_id>.concurrency",
        &["github", "needs", "strategy", "matrix", "inputs", "vars"],
        &[],
    ),
    (
        "jobs.<job_id>.container",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.container.credentials",
        &["github", "needs", "strategy", "matrix", "env", "vars", "secrets", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.container.env.<env_id>",
        &["github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "secrets", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.continue-on-error",
        &["github", "needs", "strategy", "vars", "matrix", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.defaults.run",
        &["github", "needs", "strategy", "matrix", "env", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.env",
        &["github", "needs", "strategy", "matrix", "vars", "secrets", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.environment",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.environment.url",
        &["github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "steps", "inputs"],
        &[],
    ),
    ("jobs.<job_id>.if", &["github", "needs", "vars", "inputs"], STATUS_FUNCTIONS),
    (
        "jobs.<job_id>.name",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.outputs.<output_id>",
        &["github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "secrets", "steps", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.runs-on",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.secrets.<secrets_id>",
        &["github", "needs", "strategy", "matrix", "secrets", "inputs", "vars"],
        &[],
    ),
    (
        "jobs.<job_id>.services",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.services.<service_id>.credentials",
        &["github", "needs", "strategy", "matrix", "env", "vars", "secrets", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.services.<service_id>.env.<env_id>",
        &["github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "secrets", "inputs"],
        &[],
    ),
    ("jobs.<job_id>.steps.continue-on-error", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.steps.env", STEP_CONTEXTS, &["hashfiles"]),
    (
        "jobs.<job_id>.steps.if",
        &["github", "needs", "strategy", "matrix", "job", "runner", "env", "vars", "steps", "inputs"],
        &["always", "cancelled", "failure", "success", "hashfiles"],
    ),
    ("jobs.<job_id>.steps.name", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.steps.run", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.steps.timeout-minutes", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.steps.with", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.steps.working-directory", STEP_CONTEXTS, &["hashfiles"]),
    ("jobs.<job_id>.strategy", &["github", "needs", "vars", "inputs"], &[]),
    (
        "jobs.<job_id>.timeout-minutes",
        &["github", "needs", "strategy", "matrix", "vars", "inputs"],
        &[],
    ),
    (
        "jobs.<job_id>.with.<with_id>",
        &["github", "needs", "strategy", "matrix", "inputs", "vars"],
        &[],
    ),
];

/// Contexts and special functions allowed at `key`.
pub fn availability(key: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    AVAILABILITY
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, ctx, funcs)| (*ctx, *funcs))
}

/// Workflow keys where the special function `lowercase_name` is allowed.
pub fn function_keys(lowercase_name: &str) -> Vec<&'static str> {
    AVAILABILITY
        .iter()
        .filter(|(_, _, funcs)| funcs.contains(&lowercase_name))
        .map(|(k, _, _)| *k)
        .collect()
}

/// What an expression at one position may refer to.
#[derive(Debug, Clone)]
pub struct ContextTable {
    /// Workflow key this table was built for, e.g. `jobs.<job_id>.steps.run`.
    pub key: &'static str,
    /// Available contexts and their types, keyed by lowercase name.
    pub vars: BTreeMap<String, ExprType>,
    /// Contexts that exist but are not allowed at this key.
    pub unavailable: Vec<&'static str>,
    /// Special functions allowed at this key, lowercase.
    pub functions: &'static [&'static str],
    /// Ids of steps in the current job that have not run yet at this
    /// position, lowercase.
    pub later_steps: Vec<String>,
}

impl ContextTable {
    /// A table allowing every context with the default types, used when
    /// checking expressions outside a workflow.
    pub fn permissive() -> Self {
        let mut vars = BTreeMap::new();
        for name in ALL_CONTEXTS {
            vars.insert(name.to_string(), global_context(name).unwrap_or(ExprType::Any));
        }
        for name in ["inputs", "matrix", "needs", "steps", "jobs"] {
            vars.insert(name.to_string(), ExprType::open_object(ExprType::Any));
        }
        ContextTable {
            key: "",
            vars,
            unavailable: Vec::new(),
            functions: crate::expr::functions::SPECIAL_FUNCTIONS,
            later_steps: Vec::new(),
        }
    }

    pub fn var(&self, name: &str) -> Option<&ExprType> {
        self.vars.get(&name.to_ascii_lowercase())
    }

    pub fn allows_function(&self, lowercase_name: &str) -> bool {
        self.functions.contains(&lowercase_name)
    }

    pub fn is_later_step(&self, id: &str) -> bool {
        self.later_steps.iter().any(|s| s.eq_ignore_ascii_case(id))
    }
}

/// Types of the contexts whose shape does not depend on the workflow.
fn global_context(name: &str) -> Option<ExprType> {
    use ExprType::{Any, Bool, Number, String};
    let ty = match name {
        "github" => {
            let mut props: BTreeMap<std::string::String, ExprType> = [
                "action",
                "action_path",
                "action_ref",
                "action_repository",
                "action_status",
                "actor",
                "actor_id",
                "api_url",
                "base_ref",
                "env",
                "event_name",
                "event_path",
                "graphql_url",
                "head_ref",
                "job",
                "job_workflow_sha",
                "path",
                "ref",
                "ref_name",
                "ref_type",
                "repository",
                "repository_id",
                "repository_owner",
                "repository_owner_id",
                "repositoryurl",
                "retention_days",
                "run_attempt",
                "run_id",
                "run_number",
                "secret_source",
                "server_url",
                "sha",
                "token",
                "triggering_actor",
                "workflow",
                "workflow_ref",
                "workflow_sha",
                "workspace",
            ]
            .into_iter()
            .map(|k| (k.to_string(), String))
            .collect();
            props.insert("event".into(), ExprType::open_object(Any));
            props.insert("ref_protected".into(), Bool);
            ExprType::Object(ObjectType::known(props))
        }
        "runner" => ExprType::object([
            ("name", String),
            ("os", String),
            ("arch", String),
            ("temp", String),
            ("tool_cache", String),
            ("debug", String),
            ("environment", String),
        ]),
        "job" => ExprType::object([
            (
                "container",
                ExprType::object([("id", String), ("network", String)]),
            ),
            (
                "services",
                ExprType::open_object(ExprType::object([
                    ("id", String),
                    ("network", String),
                    ("ports", ExprType::open_object(String)),
                ])),
            ),
            ("status", String),
        ]),
        "strategy" => ExprType::object([
            ("fail-fast", Bool),
            ("job-index", Number),
            ("job-total", Number),
            ("max-parallel", Number),
        ]),
        "env" | "secrets" | "vars" => ExprType::open_object(String),
        _ => return None,
    };
    Some(ty)
}

#[derive(Debug)]
struct JobScope {
    matrix: ExprType,
    needs: ExprType,
    /// Lowercased step ids by step index.
    step_ids: Vec<Option<String>>,
}

/// Workflow-derived context types, built once per document.
#[derive(Debug)]
pub struct ContextIndex {
    globals: BTreeMap<&'static str, ExprType>,
    inputs: ExprType,
    jobs: ExprType,
    job_scopes: HashMap<String, JobScope>,
}

impl ContextIndex {
    pub fn build(wf: &Workflow) -> Self {
        let globals = ALL_CONTEXTS
            .iter()
            .filter_map(|name| global_context(name).map(|t| (*name, t)))
            .collect();

        let mut inputs = BTreeMap::new();
        if let Some(d) = wf.workflow_dispatch() {
            for i in &d.inputs {
                inputs.insert(i.name.value.clone(), input_type(i.input_type));
            }
        }
        if let Some(c) = wf.workflow_call() {
            for i in &c.inputs {
                inputs.insert(i.name.value.clone(), input_type(i.input_type));
            }
        }

        let job_results: BTreeMap<String, ExprType> = wf
            .jobs
            .iter()
            .map(|j| (j.id.value.clone(), job_result(j)))
            .collect();

        let job_scopes = wf
            .jobs
            .iter()
            .map(|job| {
                let needs = job
                    .needs
                    .iter()
                    .filter_map(|n| {
                        let dep = wf.job(&n.value)?;
                        Some((dep.id.value.clone(), job_result(dep)))
                    })
                    .collect();
                let scope = JobScope {
                    matrix: matrix_type(job.matrix()),
                    needs: ExprType::Object(ObjectType::known(needs)),
                    step_ids: job
                        .steps
                        .iter()
                        .map(|s| s.id.as_ref().map(|id| id.value.to_ascii_lowercase()))
                        .collect(),
                };
                (job.id.value.to_ascii_lowercase(), scope)
            })
            .collect();

        ContextIndex {
            globals,
            inputs: ExprType::Object(ObjectType::known(inputs)),
            jobs: ExprType::Object(ObjectType::known(job_results)),
            job_scopes,
        }
    }

    /// The table for an expression at `key`, inside `job` and, for step
    /// keys, at step index `step`. Steps before `step` are visible in the
    /// `steps` context; with no step index every step of the job is.
    pub fn table(&self, key: &'static str, job: Option<&Job>, step: Option<usize>) -> ContextTable {
        let (allowed, functions) = availability(key).unwrap_or((ALL_CONTEXTS, &[]));
        let scope = job.and_then(|j| self.job_scopes.get(&j.id.value.to_ascii_lowercase()));

        let mut vars = BTreeMap::new();
        for name in allowed {
            let ty = match *name {
                "inputs" => self.inputs.clone(),
                "jobs" => self.jobs.clone(),
                "matrix" => scope
                    .map(|s| s.matrix.clone())
                    .unwrap_or_else(ExprType::empty_object),
                "needs" => scope
                    .map(|s| s.needs.clone())
                    .unwrap_or_else(ExprType::empty_object),
                "steps" => steps_type(scope, step),
                other => self.globals.get(other).cloned().unwrap_or(ExprType::Any),
            };
            vars.insert(name.to_string(), ty);
        }

        let later_steps = match (scope, step) {
            (Some(s), Some(n)) => s.step_ids.iter().skip(n).flatten().cloned().collect(),
            _ => Vec::new(),
        };

        ContextTable {
            key,
            vars,
            unavailable: ALL_CONTEXTS
                .iter()
                .copied()
                .filter(|c| !allowed.contains(c))
                .collect(),
            functions,
            later_steps,
        }
    }
}

fn input_type(t: InputType) -> ExprType {
    match t {
        InputType::Boolean => ExprType::Bool,
        InputType::Number => ExprType::Number,
        _ => ExprType::String,
    }
}

/// `needs.<id>` / `jobs.<id>` entry for a job.
fn job_result(job: &Job) -> ExprType {
    let outputs = job
        .outputs
        .iter()
        .map(|(k, _)| (k.value.clone(), ExprType::String))
        .collect();
    ExprType::object([
        ("outputs", ExprType::Object(ObjectType::known(outputs))),
        ("result", ExprType::String),
    ])
}

fn steps_type(scope: Option<&JobScope>, step: Option<usize>) -> ExprType {
    let Some(scope) = scope else {
        return ExprType::empty_object();
    };
    let visible = step.unwrap_or(scope.step_ids.len());
    let step_result = ExprType::object([
        ("outputs", ExprType::open_object(ExprType::String)),
        ("conclusion", ExprType::String),
        ("outcome", ExprType::String),
    ]);
    let props = scope
        .step_ids
        .iter()
        .take(visible)
        .flatten()
        .map(|id| (id.clone(), step_result.clone()))
        .collect();
    ExprType::Object(ObjectType::known(props))
}

fn matrix_type(matrix: Option<&Matrix>) -> ExprType {
    let Some(m) = matrix else {
        return ExprType::empty_object();
    };
    if m.expression.is_some() {
        return ExprType::open_object(ExprType::Any);
    }
    let mut props: BTreeMap<String, ExprType> = BTreeMap::new();
    for axis in &m.axes {
        let ty = match &axis.values {
            Some(values) => values
                .iter()
                .map(ExprType::from_raw)
                .reduce(|a, b| a.merge(&b))
                .unwrap_or(ExprType::Any),
            None => ExprType::Any,
        };
        props.insert(axis.name.value.clone(), ty);
    }
    if let Some(include) = &m.include {
        for (_, row) in &include.rows {
            for (k, v) in row {
                let ty = ExprType::from_raw(v);
                let merged = match props.get(&k.value) {
                    Some(existing) => existing.merge(&ty),
                    None => ty,
                };
                props.insert(k.value.clone(), merged);
            }
        }
    }
    let mut obj = ObjectType::known(props);
    if m.is_dynamic() {
        obj.shape = crate::expr::Shape::Open(Box::new(ExprType::Any));
    }
    ExprType::Object(obj)
}
