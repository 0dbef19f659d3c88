//! Typed workflow model.
//!
//! Produced by [`parse`](crate::parse) from the generic [`yaml`](crate::yaml)
//! tree. Nothing here is mutated after parsing; rules and the shellcheck bridge
//! only borrow it. Every user-written value keeps its source position so that
//! diagnostics (including ones found *inside* a value, such as an expression
//! or a shell finding) can be anchored to an absolute line and column.

use std::fmt;

/// 1-indexed line and column in the source document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Pos { line, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A string value together with the position of its first content character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Str {
    pub value: String,
    pub pos: Pos,
    /// `true` when written as a `|` or `>` block scalar. Block content keeps
    /// its line structure, so offsets inside it map to later lines.
    pub block: bool,
}

impl Str {
    pub fn new(value: impl Into<String>, pos: Pos) -> Self {
        Str {
            value: value.into(),
            pos,
            block: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Returns `true` if the whole value is exactly one `${{ }}` placeholder.
    pub fn is_expression_only(&self) -> bool {
        let v = self.value.trim();
        v.starts_with("${{") && v.ends_with("}}") && v[3..].find("${{").is_none()
    }

    pub fn contains_expression(&self) -> bool {
        self.value.contains("${{")
    }

    /// Maps a byte offset inside [`value`](Str::value) to a document position.
    pub fn pos_at(&self, offset: usize) -> Pos {
        let offset = offset.min(self.value.len());
        let before = &self.value[..offset];
        match before.rfind('\n') {
            Some(nl) => {
                let lines = before.matches('\n').count();
                let col = before[nl + 1..].chars().count();
                Pos::new(self.pos.line + lines, self.pos.col + col)
            }
            None => Pos::new(self.pos.line, self.pos.col + before.chars().count()),
        }
    }
}

impl fmt::Display for Str {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A boolean field that may instead be an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Flag {
    Literal(bool, Pos),
    Expr(Str),
}

/// A numeric field that may instead be an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
    Literal(f64, Pos),
    Expr(Str),
}

/// Loosely-typed value kept as written, used for matrix rows and entries
/// whose shape is user-defined.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(Str),
    Sequence(Vec<RawValue>, Pos),
    Mapping(Vec<(Str, RawValue)>, Pos),
}

impl RawValue {
    pub fn pos(&self) -> Pos {
        match self {
            RawValue::Scalar(s) => s.pos,
            RawValue::Sequence(_, p) | RawValue::Mapping(_, p) => *p,
        }
    }

    /// Structural equality ignoring positions and case of scalars.
    pub fn equals(&self, other: &RawValue) -> bool {
        match (self, other) {
            (RawValue::Scalar(a), RawValue::Scalar(b)) => a.value == b.value,
            (RawValue::Sequence(a, _), RawValue::Sequence(b, _)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (RawValue::Mapping(a, _), RawValue::Mapping(b, _)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .any(|(k2, v2)| k.value.eq_ignore_ascii_case(&k2.value) && v.equals(v2))
                    })
            }
            _ => false,
        }
    }

    /// `true` for the scalar subset of a mapping: every key in `self` must
    /// exist in `other` with an equal value.
    pub fn is_subset_of(&self, other: &RawValue) -> bool {
        match (self, other) {
            (RawValue::Mapping(a, _), RawValue::Mapping(b, _)) => a.iter().all(|(k, v)| {
                b.iter()
                    .any(|(k2, v2)| k.value.eq_ignore_ascii_case(&k2.value) && v.is_subset_of(v2))
            }),
            _ => self.equals(other),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Scalar(s) => write!(f, "{:?}", s.value),
            RawValue::Sequence(items, _) => {
                f.write_str("[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            RawValue::Mapping(entries, _) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {v}", k.value)?;
                }
                f.write_str("}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub name: Option<Str>,
    pub run_name: Option<Str>,
    pub on: Vec<Event>,
    pub permissions: Option<Permissions>,
    pub env: Option<Env>,
    pub defaults: Option<Defaults>,
    pub concurrency: Option<Concurrency>,
    /// Jobs in document order. Ids are unique (case-insensitively) after
    /// parsing; duplicates are reported and dropped.
    pub jobs: Vec<Job>,
    pub pos: Pos,
}

impl Workflow {
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|j| j.id.value == id)
            .or_else(|| self.jobs.iter().find(|j| j.id.value.eq_ignore_ascii_case(id)))
    }

    pub fn workflow_call(&self) -> Option<&WorkflowCallEvent> {
        self.on.iter().find_map(|e| match e {
            Event::WorkflowCall(c) => Some(c),
            _ => None,
        })
    }

    pub fn workflow_dispatch(&self) -> Option<&DispatchEvent> {
        self.on.iter().find_map(|e| match e {
            Event::WorkflowDispatch(d) => Some(d),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Event {
    Webhook(WebhookEvent),
    Schedule(ScheduleEvent),
    WorkflowDispatch(DispatchEvent),
    WorkflowCall(WorkflowCallEvent),
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::Webhook(w) => &w.name.value,
            Event::Schedule(_) => "schedule",
            Event::WorkflowDispatch(_) => "workflow_dispatch",
            Event::WorkflowCall(_) => "workflow_call",
        }
    }

    pub fn pos(&self) -> Pos {
        match self {
            Event::Webhook(w) => w.name.pos,
            Event::Schedule(s) => s.pos,
            Event::WorkflowDispatch(d) => d.pos,
            Event::WorkflowCall(c) => c.pos,
        }
    }
}

/// A filter such as `branches` together with the position of its key.
#[derive(Debug, Clone)]
pub struct Filter {
    pub name: Str,
    pub values: Vec<Str>,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub name: Str,
    pub types: Vec<Str>,
    pub branches: Option<Filter>,
    pub branches_ignore: Option<Filter>,
    pub tags: Option<Filter>,
    pub tags_ignore: Option<Filter>,
    pub paths: Option<Filter>,
    pub paths_ignore: Option<Filter>,
    pub workflows: Vec<Str>,
}

#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    pub cron: Vec<Str>,
    pub pos: Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    String,
    Boolean,
    Number,
    Choice,
    Environment,
}

impl InputType {
    pub fn parse(s: &str) -> Option<InputType> {
        match s {
            "string" => Some(InputType::String),
            "boolean" => Some(InputType::Boolean),
            "number" => Some(InputType::Number),
            "choice" => Some(InputType::Choice),
            "environment" => Some(InputType::Environment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchInput {
    pub name: Str,
    pub description: Option<Str>,
    pub required: Option<Flag>,
    pub default: Option<Str>,
    pub input_type: InputType,
    pub options: Vec<Str>,
}

#[derive(Debug, Clone)]
pub struct DispatchEvent {
    pub inputs: Vec<DispatchInput>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct CallInput {
    pub name: Str,
    pub required: bool,
    pub default: Option<Str>,
    pub input_type: InputType,
}

#[derive(Debug, Clone)]
pub struct CallSecret {
    pub name: Str,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct CallOutput {
    pub name: Str,
    pub value: Option<Str>,
}

#[derive(Debug, Clone)]
pub struct WorkflowCallEvent {
    pub inputs: Vec<CallInput>,
    pub secrets: Vec<CallSecret>,
    pub outputs: Vec<CallOutput>,
    pub pos: Pos,
}

// ---------------------------------------------------------------------------
// Shared sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Permissions {
    /// `permissions: read-all` style shorthand.
    pub all: Option<Str>,
    pub scopes: Vec<(Str, Str)>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct EnvVar {
    pub name: Str,
    pub value: Str,
}

#[derive(Debug, Clone)]
pub struct Env {
    pub vars: Vec<EnvVar>,
    /// Whole section given as one expression, e.g. `env: ${{ fromJSON(...) }}`.
    pub expression: Option<Str>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct Defaults {
    pub shell: Option<Str>,
    pub working_directory: Option<Str>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct Concurrency {
    pub group: Option<Str>,
    pub cancel_in_progress: Option<Flag>,
    pub pos: Pos,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Runner {
    pub labels: Vec<Str>,
    pub group: Option<Str>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct Environment {
    pub name: Str,
    pub url: Option<Str>,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub image: Option<Str>,
    pub username: Option<Str>,
    pub password: Option<Str>,
    pub env: Option<Env>,
    pub ports: Vec<Str>,
    pub volumes: Vec<Str>,
    pub options: Option<Str>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub name: Str,
    pub container: Container,
}

#[derive(Debug, Clone)]
pub struct Strategy {
    pub matrix: Option<Matrix>,
    pub fail_fast: Option<Flag>,
    pub max_parallel: Option<Number>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct MatrixAxis {
    pub name: Str,
    /// Axis values, or `None` when the whole axis is one expression.
    pub values: Option<Vec<RawValue>>,
    pub expression: Option<Str>,
}

#[derive(Debug, Clone, Default)]
pub struct MatrixCombinations {
    /// Each combination is a mapping of axis name to value.
    pub rows: Vec<(Pos, Vec<(Str, RawValue)>)>,
    pub expression: Option<Str>,
}

#[derive(Debug, Clone)]
pub struct Matrix {
    pub axes: Vec<MatrixAxis>,
    pub include: Option<MatrixCombinations>,
    pub exclude: Option<MatrixCombinations>,
    /// `matrix: ${{ fromJSON(...) }}`
    pub expression: Option<Str>,
    pub pos: Pos,
}

impl Matrix {
    pub fn axis(&self, name: &str) -> Option<&MatrixAxis> {
        self.axes
            .iter()
            .find(|a| a.name.value.eq_ignore_ascii_case(name))
    }

    /// `true` when the shape of `matrix` cannot be known statically.
    pub fn is_dynamic(&self) -> bool {
        self.expression.is_some()
            || self.axes.iter().any(|a| a.expression.is_some())
            || self
                .include
                .as_ref()
                .is_some_and(|c| c.expression.is_some())
    }
}

/// A job that calls a reusable workflow (`jobs.<id>.uses`).
#[derive(Debug, Clone)]
pub struct WorkflowCall {
    pub uses: Str,
    pub inputs: Vec<(Str, Str)>,
    pub secrets: Vec<(Str, Str)>,
    pub inherit_secrets: bool,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Str,
    pub name: Option<Str>,
    /// Dependencies in declaration order.
    pub needs: Vec<Str>,
    pub runs_on: Option<Runner>,
    pub permissions: Option<Permissions>,
    pub environment: Option<Environment>,
    pub concurrency: Option<Concurrency>,
    pub outputs: Vec<(Str, Str)>,
    pub env: Option<Env>,
    pub defaults: Option<Defaults>,
    pub if_cond: Option<Str>,
    pub steps: Vec<Step>,
    /// `true` if a `steps:` key was present, even if empty.
    pub has_steps: bool,
    pub timeout_minutes: Option<Number>,
    pub strategy: Option<Strategy>,
    pub continue_on_error: Option<Flag>,
    pub container: Option<Container>,
    pub services: Vec<Service>,
    pub workflow_call: Option<WorkflowCall>,
    /// `with:` / `secrets:` present on a job without `uses:`.
    pub stray_call_keys: Vec<Str>,
    pub pos: Pos,
}

impl Job {
    pub fn matrix(&self) -> Option<&Matrix> {
        self.strategy.as_ref().and_then(|s| s.matrix.as_ref())
    }

    /// `true` if any runner label looks like a Windows label.
    pub fn runs_on_windows(&self) -> bool {
        self.runs_on.as_ref().is_some_and(|r| {
            r.labels
                .iter()
                .any(|l| l.value.to_ascii_lowercase().contains("windows"))
        })
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunStep {
    pub run: Str,
    pub shell: Option<Str>,
    pub working_directory: Option<Str>,
}

#[derive(Debug, Clone)]
pub struct ActionStep {
    pub uses: Str,
    pub inputs: Vec<(Str, Str)>,
}

/// What a step executes. A well-formed step has exactly one.
#[derive(Debug, Clone)]
pub enum Exec<'a> {
    Run(&'a RunStep),
    Action(&'a ActionStep),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: Option<Str>,
    pub if_cond: Option<Str>,
    pub name: Option<Str>,
    pub env: Option<Env>,
    pub continue_on_error: Option<Flag>,
    pub timeout_minutes: Option<Number>,
    pub run: Option<RunStep>,
    pub action: Option<ActionStep>,
    /// `with:` seen without `uses:`, or `shell:` / `working-directory:`
    /// seen without `run:`. Kept so the schema rule can report them.
    pub stray_keys: Vec<Str>,
    pub pos: Pos,
}

impl Step {
    /// Returns the execution part when the step is well-formed.
    pub fn exec(&self) -> Option<Exec<'_>> {
        match (&self.run, &self.action) {
            (Some(r), None) => Some(Exec::Run(r)),
            (None, Some(a)) => Some(Exec::Action(a)),
            _ => None,
        }
    }
}
