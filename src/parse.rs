//! Typed projection of the generic YAML tree.
//!
//! [`parse`] is the Document Parser entry point. It runs in two phases:
//! [`yaml::load`] builds the generic tree, then a [`Projector`] walks it and
//! fills the [`Workflow`] model. Only an unreadable document is a hard
//! [`ParseError`]; unknown keys, duplicated keys and values of the wrong shape
//! are collected as `syntax-check` diagnostics while the rest of the
//! document is still projected, so later rules see as much as possible.

use crate::ast::*;
use crate::diagnostic::{Diagnostic, Severity};
use crate::yaml::{self, Node, Scalar};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const SYNTAX_RULE: &str = "syntax-check";

/// Structural failure: the document cannot be analyzed at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("could not parse as YAML: {message}")]
    Yaml { message: String, pos: Pos },

    #[error("workflow is empty")]
    Empty,

    #[error("workflow must be a mapping but found {found}")]
    NotMapping { found: &'static str, pos: Pos },
}

impl ParseError {
    pub fn pos(&self) -> Pos {
        match self {
            ParseError::Yaml { pos, .. } | ParseError::NotMapping { pos, .. } => *pos,
            ParseError::Empty => Pos::new(1, 1),
        }
    }
}

/// A parsed document: the typed workflow plus everything rules need to
/// anchor diagnostics.
#[derive(Debug)]
pub struct Document {
    pub path: PathBuf,
    pub workflow: Workflow,
    lines: Vec<String>,
    /// Diagnostics found while projecting the tree.
    pub syntax_errors: Vec<Diagnostic>,
}

impl Document {
    /// Returns the 1-indexed source line, if it exists.
    pub fn line(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map(String::as_str)
    }

    /// Builds a diagnostic for this document with the source line attached.
    pub fn diag(
        &self,
        rule_id: &str,
        severity: Severity,
        pos: Pos,
        message: impl Into<String>,
    ) -> Diagnostic {
        Diagnostic::new(rule_id, severity, self.path.clone(), pos, message)
            .with_snippet(self.line(pos.line).map(str::to_string))
    }

    pub fn error(&self, rule_id: &str, pos: Pos, message: impl Into<String>) -> Diagnostic {
        self.diag(rule_id, Severity::Error, pos, message)
    }
}

/// Parses `source` into a [`Document`].
///
/// `path` is used for labeling only.
pub fn parse(path: &Path, source: &str) -> Result<Document, ParseError> {
    let root = yaml::load(source)
        .map_err(|e| ParseError::Yaml {
            message: e.message,
            pos: e.pos,
        })?
        .ok_or(ParseError::Empty)?;

    let entries = match &root {
        Node::Mapping(entries, _) => entries,
        Node::Scalar(s) if s.is_null() => return Err(ParseError::Empty),
        other => {
            return Err(ParseError::NotMapping {
                found: other.kind(),
                pos: other.pos(),
            })
        }
    };

    let mut projector = Projector::default();
    let workflow = projector.workflow(entries, root.pos());

    let mut doc = Document {
        path: path.to_path_buf(),
        workflow,
        lines: source.lines().map(str::to_string).collect(),
        syntax_errors: Vec::new(),
    };
    doc.syntax_errors = projector
        .errors
        .into_iter()
        .map(|(pos, msg)| doc.error(SYNTAX_RULE, pos, msg))
        .collect();
    Ok(doc)
}

const WORKFLOW_KEYS: &[&str] = &[
    "name",
    "run-name",
    "on",
    "permissions",
    "env",
    "defaults",
    "concurrency",
    "jobs",
];

const JOB_KEYS: &[&str] = &[
    "name",
    "needs",
    "runs-on",
    "permissions",
    "environment",
    "concurrency",
    "outputs",
    "env",
    "defaults",
    "if",
    "steps",
    "timeout-minutes",
    "strategy",
    "continue-on-error",
    "container",
    "services",
    "uses",
    "with",
    "secrets",
];

const STEP_KEYS: &[&str] = &[
    "id",
    "if",
    "name",
    "uses",
    "run",
    "shell",
    "working-directory",
    "with",
    "env",
    "continue-on-error",
    "timeout-minutes",
];

const WEBHOOK_KEYS: &[&str] = &[
    "types",
    "branches",
    "branches-ignore",
    "tags",
    "tags-ignore",
    "paths",
    "paths-ignore",
    "workflows",
];

const CONTAINER_KEYS: &[&str] = &["image", "credentials", "env", "ports", "volumes", "options"];

#[derive(Default)]
struct Projector {
    errors: Vec<(Pos, String)>,
}

impl Projector {
    fn error(&mut self, pos: Pos, msg: impl Into<String>) {
        self.errors.push((pos, msg.into()));
    }

    fn unexpected(&mut self, key: &Scalar, section: &str, expected: &[&str]) {
        let expected = expected
            .iter()
            .map(|k| format!("{k:?}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.error(
            key.pos,
            format!(
                "unexpected key {:?} for {:?} section. expected one of {}",
                key.value, section, expected
            ),
        );
    }

    /// Mapping entries of `node` with duplicates reported. Null yields an
    /// empty slice; any other non-mapping is reported.
    fn entries<'n>(&mut self, node: &'n Node, section: &str) -> &'n [(Scalar, Node)] {
        match node {
            Node::Mapping(entries, _) => {
                self.check_duplicates(entries, section, false);
                entries
            }
            n if n.is_null() => &[],
            other => {
                self.error(
                    other.pos(),
                    format!(
                        "{:?} section must be a mapping but found {}",
                        section,
                        other.kind()
                    ),
                );
                &[]
            }
        }
    }

    fn check_duplicates(&mut self, entries: &[(Scalar, Node)], section: &str, ignore_case: bool) {
        let mut seen: HashMap<String, Pos> = HashMap::new();
        for (k, _) in entries {
            let key = if ignore_case {
                k.value.to_ascii_lowercase()
            } else {
                k.value.clone()
            };
            if let Some(prev) = seen.get(&key) {
                let note = if ignore_case {
                    ". note that this key is case insensitive"
                } else {
                    ""
                };
                self.error(
                    k.pos,
                    format!(
                        "key {:?} is duplicated in {:?} section. previously defined at line:{},col:{}{}",
                        k.value, section, prev.line, prev.col, note
                    ),
                );
            } else {
                seen.insert(key, k.pos);
            }
        }
    }

    fn string(&mut self, node: &Node, what: &str) -> Option<Str> {
        match node {
            Node::Scalar(s) if !s.is_null() => Some(s.to_str()),
            Node::Scalar(s) => {
                self.error(s.pos, format!("{what:?} must not be empty"));
                None
            }
            other => {
                self.error(
                    other.pos(),
                    format!("expected scalar node for {:?} but found {}", what, other.kind()),
                );
                None
            }
        }
    }

    /// A scalar or a sequence of scalars.
    fn strings(&mut self, node: &Node, what: &str) -> Vec<Str> {
        match node {
            Node::Sequence(items, _) => items.iter().filter_map(|i| self.string(i, what)).collect(),
            n if n.is_null() => Vec::new(),
            n => self.string(n, what).into_iter().collect(),
        }
    }

    fn flag(&mut self, node: &Node, what: &str) -> Option<Flag> {
        let s = self.string(node, what)?;
        if s.contains_expression() {
            return Some(Flag::Expr(s));
        }
        match s.value.as_str() {
            "true" => Some(Flag::Literal(true, s.pos)),
            "false" => Some(Flag::Literal(false, s.pos)),
            other => {
                self.error(
                    s.pos,
                    format!("expecting a boolean value for {what:?} but found {other:?}"),
                );
                None
            }
        }
    }

    fn number(&mut self, node: &Node, what: &str) -> Option<Number> {
        let s = self.string(node, what)?;
        if s.contains_expression() {
            return Some(Number::Expr(s));
        }
        match s.value.parse::<f64>() {
            Ok(n) => Some(Number::Literal(n, s.pos)),
            Err(_) => {
                self.error(
                    s.pos,
                    format!("expecting a number for {:?} but found {:?}", what, s.value),
                );
                None
            }
        }
    }

    fn raw(&mut self, node: &Node) -> RawValue {
        match node {
            Node::Scalar(s) => RawValue::Scalar(s.to_str()),
            Node::Sequence(items, pos) => {
                RawValue::Sequence(items.iter().map(|i| self.raw(i)).collect(), *pos)
            }
            Node::Mapping(entries, pos) => RawValue::Mapping(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_str(), self.raw(v)))
                    .collect(),
                *pos,
            ),
        }
    }

    /// `name: value` mapping where every value is a scalar.
    fn string_map(&mut self, node: &Node, section: &str) -> Vec<(Str, Str)> {
        let entries = self.entries(node, section);
        let mut out = Vec::new();
        for (k, v) in entries {
            let value = match v {
                // `key:` with no value is an empty string
                Node::Scalar(s) if s.is_null() => Str::new("", s.pos),
                _ => match self.string(v, &k.value) {
                    Some(s) => s,
                    None => continue,
                },
            };
            out.push((k.to_str(), value));
        }
        out
    }

    // -----------------------------------------------------------------------
    // Workflow
    // -----------------------------------------------------------------------

    fn workflow(&mut self, entries: &[(Scalar, Node)], pos: Pos) -> Workflow {
        self.check_duplicates(entries, "workflow", false);
        let mut wf = Workflow {
            pos,
            ..Workflow::default()
        };
        let (mut has_on, mut has_jobs) = (false, false);

        for (k, v) in entries {
            match k.value.as_str() {
                "name" => wf.name = self.string(v, "name"),
                "run-name" => wf.run_name = self.string(v, "run-name"),
                "on" => {
                    has_on = true;
                    wf.on = self.events(v);
                }
                "permissions" => wf.permissions = self.permissions(v),
                "env" => wf.env = self.env(v),
                "defaults" => wf.defaults = self.defaults(v),
                "concurrency" => wf.concurrency = self.concurrency(v),
                "jobs" => {
                    has_jobs = true;
                    wf.jobs = self.jobs(v);
                }
                _ => self.unexpected(k, "workflow", WORKFLOW_KEYS),
            }
        }

        if !has_on {
            self.error(pos, "\"on\" section is missing in workflow");
        }
        if !has_jobs {
            self.error(pos, "\"jobs\" section is missing in workflow");
        }
        wf
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    fn events(&mut self, node: &Node) -> Vec<Event> {
        match node {
            Node::Scalar(s) if !s.is_null() => self.event_by_name(s, None).into_iter().collect(),
            Node::Sequence(items, _) => {
                let mut out = Vec::new();
                for item in items {
                    if let Some(s) = self.string(item, "on") {
                        let scalar = Scalar {
                            value: s.value,
                            pos: s.pos,
                            style: yaml::ScalarStyle::Plain,
                        };
                        out.extend(self.event_by_name(&scalar, None));
                    }
                }
                out
            }
            Node::Mapping(entries, _) => {
                self.check_duplicates(entries, "on", false);
                entries
                    .iter()
                    .filter_map(|(k, v)| self.event_by_name(k, Some(v)))
                    .collect()
            }
            other => {
                self.error(other.pos(), "\"on\" section must not be empty");
                Vec::new()
            }
        }
    }

    fn event_by_name(&mut self, name: &Scalar, config: Option<&Node>) -> Option<Event> {
        match name.value.as_str() {
            "schedule" => match config {
                Some(node) => Some(Event::Schedule(self.schedule(node, name.pos))),
                None => {
                    self.error(name.pos, "\"schedule\" event must be a mapping with \"cron\" entries");
                    None
                }
            },
            "workflow_dispatch" => Some(Event::WorkflowDispatch(self.dispatch(config, name.pos))),
            "workflow_call" => Some(Event::WorkflowCall(self.workflow_call(config, name.pos))),
            _ => Some(Event::Webhook(self.webhook(name.to_str(), config))),
        }
    }

    fn webhook(&mut self, name: Str, config: Option<&Node>) -> WebhookEvent {
        let mut ev = WebhookEvent {
            name,
            types: Vec::new(),
            branches: None,
            branches_ignore: None,
            tags: None,
            tags_ignore: None,
            paths: None,
            paths_ignore: None,
            workflows: Vec::new(),
        };
        let Some(node) = config else {
            return ev;
        };
        let section = ev.name.value.clone();
        for (k, v) in self.entries(node, &section) {
            let filter = |p: &mut Self| {
                Some(Filter {
                    name: k.to_str(),
                    values: p.strings(v, &k.value),
                })
            };
            match k.value.as_str() {
                "types" => ev.types = self.strings(v, "types"),
                "branches" => ev.branches = filter(self),
                "branches-ignore" => ev.branches_ignore = filter(self),
                "tags" => ev.tags = filter(self),
                "tags-ignore" => ev.tags_ignore = filter(self),
                "paths" => ev.paths = filter(self),
                "paths-ignore" => ev.paths_ignore = filter(self),
                "workflows" => ev.workflows = self.strings(v, "workflows"),
                _ => self.unexpected(k, &section, WEBHOOK_KEYS),
            }
        }
        ev
    }

    fn schedule(&mut self, node: &Node, pos: Pos) -> ScheduleEvent {
        let mut cron = Vec::new();
        match node {
            Node::Sequence(items, _) => {
                for item in items {
                    for (k, v) in self.entries(item, "schedule") {
                        if k.value == "cron" {
                            cron.extend(self.string(v, "cron"));
                        } else {
                            self.unexpected(k, "schedule", &["cron"]);
                        }
                    }
                }
            }
            other => self.error(
                other.pos(),
                format!("\"schedule\" section must be a sequence but found {}", other.kind()),
            ),
        }
        ScheduleEvent { cron, pos }
    }

    fn dispatch(&mut self, config: Option<&Node>, pos: Pos) -> DispatchEvent {
        let mut ev = DispatchEvent {
            inputs: Vec::new(),
            pos,
        };
        let Some(node) = config else {
            return ev;
        };
        for (k, v) in self.entries(node, "workflow_dispatch") {
            if k.value != "inputs" {
                self.unexpected(k, "workflow_dispatch", &["inputs"]);
                continue;
            }
            for (name, spec) in self.entries(v, "inputs") {
                let mut input = DispatchInput {
                    name: name.to_str(),
                    description: None,
                    required: None,
                    default: None,
                    input_type: InputType::String,
                    options: Vec::new(),
                };
                for (ik, iv) in self.entries(spec, "inputs") {
                    match ik.value.as_str() {
                        "description" => input.description = self.string(iv, "description"),
                        "required" => input.required = self.flag(iv, "required"),
                        "default" => input.default = self.string(iv, "default"),
                        "type" => input.input_type = self.input_type(iv),
                        "options" => input.options = self.strings(iv, "options"),
                        "deprecationMessage" => {}
                        _ => self.unexpected(
                            ik,
                            "inputs",
                            &["description", "required", "default", "type", "options"],
                        ),
                    }
                }
                ev.inputs.push(input);
            }
        }
        ev
    }

    fn input_type(&mut self, node: &Node) -> InputType {
        let Some(s) = self.string(node, "type") else {
            return InputType::String;
        };
        InputType::parse(&s.value).unwrap_or_else(|| {
            self.error(
                s.pos,
                format!(
                    "input type must be one of \"boolean\", \"choice\", \"environment\", \"number\", \"string\" but got {:?}",
                    s.value
                ),
            );
            InputType::String
        })
    }

    fn workflow_call(&mut self, config: Option<&Node>, pos: Pos) -> WorkflowCallEvent {
        let mut ev = WorkflowCallEvent {
            inputs: Vec::new(),
            secrets: Vec::new(),
            outputs: Vec::new(),
            pos,
        };
        let Some(node) = config else {
            return ev;
        };
        for (k, v) in self.entries(node, "workflow_call") {
            match k.value.as_str() {
                "inputs" => {
                    for (name, spec) in self.entries(v, "inputs") {
                        let mut input = CallInput {
                            name: name.to_str(),
                            required: false,
                            default: None,
                            input_type: InputType::String,
                        };
                        let mut has_type = false;
                        for (ik, iv) in self.entries(spec, "inputs") {
                            match ik.value.as_str() {
                                "description" => {}
                                "required" => {
                                    input.required =
                                        matches!(self.flag(iv, "required"), Some(Flag::Literal(true, _)))
                                }
                                "default" => input.default = self.string(iv, "default"),
                                "type" => {
                                    has_type = true;
                                    input.input_type = self.input_type(iv);
                                }
                                _ => self.unexpected(
                                    ik,
                                    "inputs",
                                    &["description", "required", "default", "type"],
                                ),
                            }
                        }
                        if !has_type {
                            self.error(
                                name.pos,
                                format!("\"type\" is missing at {:?} input of workflow_call event", name.value),
                            );
                        }
                        ev.inputs.push(input);
                    }
                }
                "secrets" => {
                    for (name, spec) in self.entries(v, "secrets") {
                        let mut secret = CallSecret {
                            name: name.to_str(),
                            required: false,
                        };
                        for (sk, sv) in self.entries(spec, "secrets") {
                            match sk.value.as_str() {
                                "description" => {}
                                "required" => {
                                    secret.required =
                                        matches!(self.flag(sv, "required"), Some(Flag::Literal(true, _)))
                                }
                                _ => self.unexpected(sk, "secrets", &["description", "required"]),
                            }
                        }
                        ev.secrets.push(secret);
                    }
                }
                "outputs" => {
                    for (name, spec) in self.entries(v, "outputs") {
                        let mut output = CallOutput {
                            name: name.to_str(),
                            value: None,
                        };
                        for (ok, ov) in self.entries(spec, "outputs") {
                            match ok.value.as_str() {
                                "description" => {}
                                "value" => output.value = self.string(ov, "value"),
                                _ => self.unexpected(ok, "outputs", &["description", "value"]),
                            }
                        }
                        if output.value.is_none() {
                            self.error(
                                name.pos,
                                format!("\"value\" is missing at {:?} output of workflow_call event", name.value),
                            );
                        }
                        ev.outputs.push(output);
                    }
                }
                _ => self.unexpected(k, "workflow_call", &["inputs", "secrets", "outputs"]),
            }
        }
        ev
    }

    // -----------------------------------------------------------------------
    // Shared sections
    // -----------------------------------------------------------------------

    fn permissions(&mut self, node: &Node) -> Option<Permissions> {
        match node {
            Node::Scalar(s) if !s.is_null() => Some(Permissions {
                all: Some(s.to_str()),
                scopes: Vec::new(),
                pos: s.pos,
            }),
            _ => Some(Permissions {
                all: None,
                scopes: self.string_map(node, "permissions"),
                pos: node.pos(),
            }),
        }
    }

    fn env(&mut self, node: &Node) -> Option<Env> {
        match node {
            Node::Scalar(s) if !s.is_null() => {
                let value = s.to_str();
                if !value.is_expression_only() {
                    self.error(
                        s.pos,
                        "\"env\" section must be a mapping or a single ${{ }} expression",
                    );
                    return None;
                }
                Some(Env {
                    vars: Vec::new(),
                    expression: Some(value),
                    pos: s.pos,
                })
            }
            _ => Some(Env {
                vars: self
                    .string_map(node, "env")
                    .into_iter()
                    .map(|(name, value)| EnvVar { name, value })
                    .collect(),
                expression: None,
                pos: node.pos(),
            }),
        }
    }

    fn defaults(&mut self, node: &Node) -> Option<Defaults> {
        let mut d = Defaults {
            shell: None,
            working_directory: None,
            pos: node.pos(),
        };
        for (k, v) in self.entries(node, "defaults") {
            if k.value != "run" {
                self.unexpected(k, "defaults", &["run"]);
                continue;
            }
            for (rk, rv) in self.entries(v, "run") {
                match rk.value.as_str() {
                    "shell" => d.shell = self.string(rv, "shell"),
                    "working-directory" => d.working_directory = self.string(rv, "working-directory"),
                    _ => self.unexpected(rk, "run", &["shell", "working-directory"]),
                }
            }
        }
        Some(d)
    }

    fn concurrency(&mut self, node: &Node) -> Option<Concurrency> {
        if let Node::Scalar(s) = node {
            return Some(Concurrency {
                group: self.string(node, "concurrency"),
                cancel_in_progress: None,
                pos: s.pos,
            });
        }
        let mut c = Concurrency {
            group: None,
            cancel_in_progress: None,
            pos: node.pos(),
        };
        for (k, v) in self.entries(node, "concurrency") {
            match k.value.as_str() {
                "group" => c.group = self.string(v, "group"),
                "cancel-in-progress" => c.cancel_in_progress = self.flag(v, "cancel-in-progress"),
                _ => self.unexpected(k, "concurrency", &["group", "cancel-in-progress"]),
            }
        }
        if c.group.is_none() {
            self.error(c.pos, "\"group\" is required in \"concurrency\" section");
        }
        Some(c)
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    fn jobs(&mut self, node: &Node) -> Vec<Job> {
        let entries = match node {
            Node::Mapping(entries, _) => entries,
            other => {
                self.error(
                    other.pos(),
                    format!("\"jobs\" section must be a mapping but found {}", other.kind()),
                );
                return Vec::new();
            }
        };
        if entries.is_empty() {
            self.error(node.pos(), "\"jobs\" section should not be empty");
        }
        self.check_duplicates(entries, "jobs", true);

        let mut seen = std::collections::HashSet::new();
        let mut jobs = Vec::new();
        for (id, spec) in entries {
            if !seen.insert(id.value.to_ascii_lowercase()) {
                continue;
            }
            jobs.push(self.job(id, spec));
        }
        jobs
    }

    fn job(&mut self, id: &Scalar, node: &Node) -> Job {
        let mut job = Job {
            id: id.to_str(),
            name: None,
            needs: Vec::new(),
            runs_on: None,
            permissions: None,
            environment: None,
            concurrency: None,
            outputs: Vec::new(),
            env: None,
            defaults: None,
            if_cond: None,
            steps: Vec::new(),
            has_steps: false,
            timeout_minutes: None,
            strategy: None,
            continue_on_error: None,
            container: None,
            services: Vec::new(),
            workflow_call: None,
            stray_call_keys: Vec::new(),
            pos: id.pos,
        };
        let mut call_inputs = None;
        let mut call_secrets = None;
        let mut uses = None;

        let section = format!("jobs.{}", id.value);
        for (k, v) in self.entries(node, &section) {
            match k.value.as_str() {
                "name" => job.name = self.string(v, "name"),
                "needs" => job.needs = self.strings(v, "needs"),
                "runs-on" => job.runs_on = self.runner(v),
                "permissions" => job.permissions = self.permissions(v),
                "environment" => job.environment = self.environment(v),
                "concurrency" => job.concurrency = self.concurrency(v),
                "outputs" => job.outputs = self.string_map(v, "outputs"),
                "env" => job.env = self.env(v),
                "defaults" => job.defaults = self.defaults(v),
                "if" => job.if_cond = self.string(v, "if"),
                "steps" => {
                    job.has_steps = true;
                    job.steps = self.steps(v);
                }
                "timeout-minutes" => job.timeout_minutes = self.number(v, "timeout-minutes"),
                "strategy" => job.strategy = self.strategy(v),
                "continue-on-error" => job.continue_on_error = self.flag(v, "continue-on-error"),
                "container" => job.container = self.container(v),
                "services" => {
                    for (name, spec) in self.entries(v, "services") {
                        if let Some(container) = self.container(spec) {
                            job.services.push(Service {
                                name: name.to_str(),
                                container,
                            });
                        }
                    }
                }
                "uses" => uses = self.string(v, "uses"),
                "with" => call_inputs = Some((k.to_str(), self.string_map(v, "with"))),
                "secrets" => call_secrets = Some((k.to_str(), v)),
                _ => self.unexpected(k, "job", JOB_KEYS),
            }
        }

        match uses {
            Some(uses) => {
                let (secrets, inherit_secrets) = match call_secrets {
                    Some((_, Node::Scalar(s))) if s.value == "inherit" => (Vec::new(), true),
                    Some((_, node)) => (self.string_map(node, "secrets"), false),
                    None => (Vec::new(), false),
                };
                job.workflow_call = Some(WorkflowCall {
                    uses,
                    inputs: call_inputs.map(|(_, i)| i).unwrap_or_default(),
                    secrets,
                    inherit_secrets,
                });
            }
            None => {
                job.stray_call_keys.extend(call_inputs.map(|(k, _)| k));
                job.stray_call_keys.extend(call_secrets.map(|(k, _)| k));
            }
        }
        job
    }

    fn runner(&mut self, node: &Node) -> Option<Runner> {
        match node {
            Node::Mapping(..) => {
                let mut r = Runner {
                    labels: Vec::new(),
                    group: None,
                    pos: node.pos(),
                };
                for (k, v) in self.entries(node, "runs-on") {
                    match k.value.as_str() {
                        "group" => r.group = self.string(v, "group"),
                        "labels" => r.labels = self.strings(v, "labels"),
                        _ => self.unexpected(k, "runs-on", &["group", "labels"]),
                    }
                }
                Some(r)
            }
            _ => Some(Runner {
                labels: self.strings(node, "runs-on"),
                group: None,
                pos: node.pos(),
            }),
        }
    }

    fn environment(&mut self, node: &Node) -> Option<Environment> {
        if let Node::Scalar(_) = node {
            return self.string(node, "environment").map(|name| Environment { name, url: None });
        }
        let mut name = None;
        let mut url = None;
        for (k, v) in self.entries(node, "environment") {
            match k.value.as_str() {
                "name" => name = self.string(v, "name"),
                "url" => url = self.string(v, "url"),
                _ => self.unexpected(k, "environment", &["name", "url"]),
            }
        }
        match name {
            Some(name) => Some(Environment { name, url }),
            None => {
                self.error(node.pos(), "\"name\" is required in \"environment\" section");
                None
            }
        }
    }

    fn container(&mut self, node: &Node) -> Option<Container> {
        let mut c = Container {
            image: None,
            username: None,
            password: None,
            env: None,
            ports: Vec::new(),
            volumes: Vec::new(),
            options: None,
            pos: node.pos(),
        };
        if let Node::Scalar(_) = node {
            c.image = self.string(node, "container");
            return Some(c);
        }
        for (k, v) in self.entries(node, "container") {
            match k.value.as_str() {
                "image" => c.image = self.string(v, "image"),
                "credentials" => {
                    for (ck, cv) in self.entries(v, "credentials") {
                        match ck.value.as_str() {
                            "username" => c.username = self.string(cv, "username"),
                            "password" => c.password = self.string(cv, "password"),
                            _ => self.unexpected(ck, "credentials", &["username", "password"]),
                        }
                    }
                }
                "env" => c.env = self.env(v),
                "ports" => c.ports = self.strings(v, "ports"),
                "volumes" => c.volumes = self.strings(v, "volumes"),
                "options" => c.options = self.string(v, "options"),
                _ => self.unexpected(k, "container", CONTAINER_KEYS),
            }
        }
        Some(c)
    }

    fn strategy(&mut self, node: &Node) -> Option<Strategy> {
        let mut s = Strategy {
            matrix: None,
            fail_fast: None,
            max_parallel: None,
            pos: node.pos(),
        };
        for (k, v) in self.entries(node, "strategy") {
            match k.value.as_str() {
                "matrix" => s.matrix = self.matrix(v),
                "fail-fast" => s.fail_fast = self.flag(v, "fail-fast"),
                "max-parallel" => s.max_parallel = self.number(v, "max-parallel"),
                _ => self.unexpected(k, "strategy", &["matrix", "fail-fast", "max-parallel"]),
            }
        }
        Some(s)
    }

    fn matrix(&mut self, node: &Node) -> Option<Matrix> {
        let mut m = Matrix {
            axes: Vec::new(),
            include: None,
            exclude: None,
            expression: None,
            pos: node.pos(),
        };
        if let Node::Scalar(s) = node {
            let value = s.to_str();
            if value.is_expression_only() {
                m.expression = Some(value);
                return Some(m);
            }
            self.error(s.pos, "\"matrix\" section must be a mapping or a single ${{ }} expression");
            return None;
        }
        for (k, v) in self.entries(node, "matrix") {
            match k.value.as_str() {
                "include" => m.include = Some(self.combinations(v, "include")),
                "exclude" => m.exclude = Some(self.combinations(v, "exclude")),
                _ => {
                    let axis = match v {
                        Node::Sequence(items, _) => {
                            if items.is_empty() {
                                self.error(
                                    v.pos(),
                                    format!("axis {:?} of matrix must not be empty", k.value),
                                );
                            }
                            MatrixAxis {
                                name: k.to_str(),
                                values: Some(items.iter().map(|i| self.raw(i)).collect()),
                                expression: None,
                            }
                        }
                        Node::Scalar(s) if s.to_str().is_expression_only() => MatrixAxis {
                            name: k.to_str(),
                            values: None,
                            expression: Some(s.to_str()),
                        },
                        other => {
                            self.error(
                                other.pos(),
                                format!(
                                    "axis {:?} of matrix must be a sequence or a ${{{{ }}}} expression but found {}",
                                    k.value,
                                    other.kind()
                                ),
                            );
                            continue;
                        }
                    };
                    m.axes.push(axis);
                }
            }
        }
        Some(m)
    }

    fn combinations(&mut self, node: &Node, section: &str) -> MatrixCombinations {
        let mut c = MatrixCombinations::default();
        match node {
            Node::Scalar(s) if s.to_str().is_expression_only() => c.expression = Some(s.to_str()),
            Node::Sequence(items, _) => {
                for item in items {
                    let row = self
                        .entries(item, section)
                        .iter()
                        .map(|(k, v)| (k.to_str(), self.raw(v)))
                        .collect::<Vec<_>>();
                    c.rows.push((item.pos(), row));
                }
            }
            other => self.error(
                other.pos(),
                format!(
                    "{:?} section of matrix must be a sequence or a ${{{{ }}}} expression but found {}",
                    section,
                    other.kind()
                ),
            ),
        }
        c
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    fn steps(&mut self, node: &Node) -> Vec<Step> {
        match node {
            Node::Sequence(items, _) => {
                if items.is_empty() {
                    self.error(node.pos(), "\"steps\" section should not be empty");
                }
                items.iter().map(|i| self.step(i)).collect()
            }
            other => {
                self.error(
                    other.pos(),
                    format!("\"steps\" section must be a sequence but found {}", other.kind()),
                );
                Vec::new()
            }
        }
    }

    fn step(&mut self, node: &Node) -> Step {
        let mut step = Step {
            id: None,
            if_cond: None,
            name: None,
            env: None,
            continue_on_error: None,
            timeout_minutes: None,
            run: None,
            action: None,
            stray_keys: Vec::new(),
            pos: node.pos(),
        };
        let mut run = None;
        let mut uses = None;
        let mut shell = None;
        let mut working_directory = None;
        let mut with = None;

        for (k, v) in self.entries(node, "step") {
            match k.value.as_str() {
                "id" => step.id = self.string(v, "id"),
                "if" => step.if_cond = self.string(v, "if"),
                "name" => step.name = self.string(v, "name"),
                "uses" => uses = self.string(v, "uses"),
                "run" => run = self.string(v, "run"),
                "shell" => shell = self.string(v, "shell").map(|s| (k.to_str(), s)),
                "working-directory" => {
                    working_directory =
                        self.string(v, "working-directory").map(|s| (k.to_str(), s))
                }
                "with" => with = Some((k.to_str(), self.string_map(v, "with"))),
                "env" => step.env = self.env(v),
                "continue-on-error" => step.continue_on_error = self.flag(v, "continue-on-error"),
                "timeout-minutes" => step.timeout_minutes = self.number(v, "timeout-minutes"),
                _ => self.unexpected(k, "step", STEP_KEYS),
            }
        }

        match run {
            Some(run) => {
                step.run = Some(RunStep {
                    run,
                    shell: shell.map(|(_, s)| s),
                    working_directory: working_directory.map(|(_, s)| s),
                })
            }
            None => {
                step.stray_keys.extend(shell.map(|(k, _)| k));
                step.stray_keys.extend(working_directory.map(|(k, _)| k));
            }
        }
        match uses {
            Some(uses) => {
                step.action = Some(ActionStep {
                    uses,
                    inputs: with.map(|(_, w)| w).unwrap_or_default(),
                })
            }
            None => step.stray_keys.extend(with.map(|(k, _)| k)),
        }
        step
    }
}
