//! Checks every `${{ }}` fragment in the document.
//!
//! Each field is visited with the availability key that applies to it, so an
//! expression in `jobs.<id>.if` is checked against a different
//! [`ContextTable`](crate::context::ContextTable) than one in a step's `run`.
//! Errors inside a fragment are anchored at the exact column of the token
//! that caused them.

use super::{Rule, RuleInfo};
use crate::ast::{Container, Env, Flag, Job, Number, RawValue, Step, Str};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::expr::{self, parse_expression, ExprError, ExprType};
use crate::parse::Document;

const RULE: &str = "expression";

pub struct ExpressionRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Expressions: syntax, undefined contexts and properties, function calls, types and untrusted inputs in scripts",
        remediation: "Fix the expression. Read attacker-controlled values such as github.event.pull_request.title through an environment variable instead of placing them inline in a script",
    }
}

impl Rule for ExpressionRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Syntax and types of ${{ }} expressions"
    }

    fn check(&self, doc: &Document, ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut w = Walker {
            doc,
            ctx,
            out: Vec::new(),
        };
        w.workflow();
        w.out
    }
}

/// How the value of a field is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    /// Interpolated into a string.
    Template,
    /// `if:`; may be written without `${{ }}`.
    Condition,
    /// Must evaluate to a number.
    Number,
    /// Substituted into a script before it runs.
    Script,
}

struct Walker<'a> {
    doc: &'a Document,
    ctx: &'a ContextIndex,
    out: Vec<Diagnostic>,
}

impl Walker<'_> {
    fn workflow(&mut self) {
        let doc = self.doc;
        let wf = &doc.workflow;
        if let Some(s) = &wf.run_name {
            self.field("run-name", None, None, s, Usage::Template);
        }
        if let Some(c) = &wf.concurrency {
            self.opt("concurrency", None, None, c.group.as_ref(), Usage::Template);
            self.flag("concurrency", None, None, c.cancel_in_progress.as_ref());
        }
        if let Some(env) = &wf.env {
            self.env("env", None, None, env);
        }
        if let Some(call) = wf.workflow_call() {
            for input in &call.inputs {
                self.opt(
                    "on.workflow_call.inputs.<inputs_id>.default",
                    None,
                    None,
                    input.default.as_ref(),
                    Usage::Template,
                );
            }
            for output in &call.outputs {
                self.opt(
                    "on.workflow_call.outputs.<output_id>.value",
                    None,
                    None,
                    output.value.as_ref(),
                    Usage::Template,
                );
            }
        }
        for job in &wf.jobs {
            self.job(job);
        }
    }

    fn job(&mut self, job: &Job) {
        let j = Some(job);
        self.opt("jobs.<job_id>.name", j, None, job.name.as_ref(), Usage::Template);
        if let Some(r) = &job.runs_on {
            for label in &r.labels {
                self.field("jobs.<job_id>.runs-on", j, None, label, Usage::Template);
            }
            self.opt("jobs.<job_id>.runs-on", j, None, r.group.as_ref(), Usage::Template);
        }
        if let Some(env) = &job.env {
            self.env("jobs.<job_id>.env", j, None, env);
        }
        if let Some(e) = &job.environment {
            self.field("jobs.<job_id>.environment", j, None, &e.name, Usage::Template);
            self.opt("jobs.<job_id>.environment.url", j, None, e.url.as_ref(), Usage::Template);
        }
        if let Some(c) = &job.concurrency {
            self.opt("jobs.<job_id>.concurrency", j, None, c.group.as_ref(), Usage::Template);
            self.flag("jobs.<job_id>.concurrency", j, None, c.cancel_in_progress.as_ref());
        }
        for (_, value) in &job.outputs {
            self.field("jobs.<job_id>.outputs.<output_id>", j, None, value, Usage::Template);
        }
        if let Some(d) = &job.defaults {
            self.opt("jobs.<job_id>.defaults.run", j, None, d.shell.as_ref(), Usage::Template);
            self.opt(
                "jobs.<job_id>.defaults.run",
                j,
                None,
                d.working_directory.as_ref(),
                Usage::Template,
            );
        }
        self.opt("jobs.<job_id>.if", j, None, job.if_cond.as_ref(), Usage::Condition);
        self.number("jobs.<job_id>.timeout-minutes", j, None, job.timeout_minutes.as_ref());
        self.flag("jobs.<job_id>.continue-on-error", j, None, job.continue_on_error.as_ref());

        if let Some(s) = &job.strategy {
            let key = "jobs.<job_id>.strategy";
            self.flag(key, j, None, s.fail_fast.as_ref());
            self.number(key, j, None, s.max_parallel.as_ref());
            if let Some(m) = &s.matrix {
                self.opt(key, j, None, m.expression.as_ref(), Usage::Template);
                for axis in &m.axes {
                    self.opt(key, j, None, axis.expression.as_ref(), Usage::Template);
                    for v in axis.values.iter().flatten() {
                        self.raw(key, j, v);
                    }
                }
                for c in m.include.iter().chain(m.exclude.iter()) {
                    self.opt(key, j, None, c.expression.as_ref(), Usage::Template);
                    for (_, row) in &c.rows {
                        for (_, v) in row {
                            self.raw(key, j, v);
                        }
                    }
                }
            }
        }

        if let Some(c) = &job.container {
            self.container(
                "jobs.<job_id>.container",
                "jobs.<job_id>.container.credentials",
                "jobs.<job_id>.container.env.<env_id>",
                job,
                c,
            );
        }
        for svc in &job.services {
            self.container(
                "jobs.<job_id>.services",
                "jobs.<job_id>.services.<service_id>.credentials",
                "jobs.<job_id>.services.<service_id>.env.<env_id>",
                job,
                &svc.container,
            );
        }

        if let Some(call) = &job.workflow_call {
            for (_, v) in &call.inputs {
                self.field("jobs.<job_id>.with.<with_id>", j, None, v, Usage::Template);
            }
            for (_, v) in &call.secrets {
                self.field("jobs.<job_id>.secrets.<secrets_id>", j, None, v, Usage::Template);
            }
        }

        for (i, step) in job.steps.iter().enumerate() {
            self.step(job, i, step);
        }
    }

    fn step(&mut self, job: &Job, i: usize, step: &Step) {
        let (j, s) = (Some(job), Some(i));
        self.opt("jobs.<job_id>.steps.name", j, s, step.name.as_ref(), Usage::Template);
        self.opt("jobs.<job_id>.steps.if", j, s, step.if_cond.as_ref(), Usage::Condition);
        if let Some(env) = &step.env {
            self.env("jobs.<job_id>.steps.env", j, s, env);
        }
        self.flag("jobs.<job_id>.steps.continue-on-error", j, s, step.continue_on_error.as_ref());
        self.number("jobs.<job_id>.steps.timeout-minutes", j, s, step.timeout_minutes.as_ref());
        if let Some(run) = &step.run {
            self.field("jobs.<job_id>.steps.run", j, s, &run.run, Usage::Script);
            self.opt(
                "jobs.<job_id>.steps.working-directory",
                j,
                s,
                run.working_directory.as_ref(),
                Usage::Template,
            );
        }
        if let Some(action) = &step.action {
            let is_script_action = action
                .uses
                .value
                .to_ascii_lowercase()
                .starts_with("actions/github-script@");
            for (name, value) in &action.inputs {
                let usage = if is_script_action && name.value == "script" {
                    Usage::Script
                } else {
                    Usage::Template
                };
                self.field("jobs.<job_id>.steps.with", j, s, value, usage);
            }
        }
    }

    fn container(
        &mut self,
        key: &'static str,
        credentials_key: &'static str,
        env_key: &'static str,
        job: &Job,
        c: &Container,
    ) {
        let j = Some(job);
        self.opt(key, j, None, c.image.as_ref(), Usage::Template);
        self.opt(credentials_key, j, None, c.username.as_ref(), Usage::Template);
        self.opt(credentials_key, j, None, c.password.as_ref(), Usage::Template);
        if let Some(env) = &c.env {
            self.env(env_key, j, None, env);
        }
        for s in c.ports.iter().chain(&c.volumes) {
            self.field(key, j, None, s, Usage::Template);
        }
        self.opt(key, j, None, c.options.as_ref(), Usage::Template);
    }

    fn env(&mut self, key: &'static str, job: Option<&Job>, step: Option<usize>, env: &Env) {
        self.opt(key, job, step, env.expression.as_ref(), Usage::Template);
        for var in &env.vars {
            self.field(key, job, step, &var.value, Usage::Template);
        }
    }

    fn raw(&mut self, key: &'static str, job: Option<&Job>, v: &RawValue) {
        match v {
            RawValue::Scalar(s) => self.field(key, job, None, s, Usage::Template),
            RawValue::Sequence(items, _) => items.iter().for_each(|i| self.raw(key, job, i)),
            RawValue::Mapping(entries, _) => entries.iter().for_each(|(_, v)| self.raw(key, job, v)),
        }
    }

    fn opt(
        &mut self,
        key: &'static str,
        job: Option<&Job>,
        step: Option<usize>,
        s: Option<&Str>,
        usage: Usage,
    ) {
        if let Some(s) = s {
            self.field(key, job, step, s, usage);
        }
    }

    fn flag(&mut self, key: &'static str, job: Option<&Job>, step: Option<usize>, f: Option<&Flag>) {
        if let Some(Flag::Expr(s)) = f {
            self.field(key, job, step, s, Usage::Template);
        }
    }

    fn number(&mut self, key: &'static str, job: Option<&Job>, step: Option<usize>, n: Option<&Number>) {
        if let Some(Number::Expr(s)) = n {
            self.field(key, job, step, s, Usage::Number);
        }
    }

    fn field(&mut self, key: &'static str, job: Option<&Job>, step: Option<usize>, s: &Str, usage: Usage) {
        if usage == Usage::Condition && !s.contains_expression() {
            let table = self.ctx.table(key, job, step);
            self.expression(s, &s.value, 0, &table, usage);
            return;
        }
        if !s.contains_expression() {
            return;
        }

        let (frags, unclosed) = expr::fragments(&s.value);
        let table = self.ctx.table(key, job, step);
        let template = !s.is_expression_only();
        for f in &frags {
            let ty = self.expression(s, f.source, f.offset, &table, usage);
            if let Some(ty) = ty {
                if template && matches!(ty, ExprType::Object(_) | ExprType::Array(_)) {
                    self.error(
                        s.pos_at(f.start),
                        format!(
                            "object, array, and null values should not be evaluated in template with ${{{{ }}}} but evaluating the value of type {ty}"
                        ),
                    );
                }
            }
        }
        if let Some(at) = unclosed {
            self.error(
                s.pos_at(at),
                "expression is not closed. \"${{\" must be paired with \"}}\"",
            );
        }
    }

    /// Parses and checks one expression. `offset` is the position of
    /// `source` inside `s`. Returns the inferred type when it parsed.
    fn expression(
        &mut self,
        s: &Str,
        source: &str,
        offset: usize,
        table: &crate::context::ContextTable,
        usage: Usage,
    ) -> Option<ExprType> {
        let e = match parse_expression(source) {
            Ok(e) => e,
            Err(err) => {
                self.expr_error(s, offset, &err);
                return None;
            }
        };
        let result = expr::check(&e, table);
        for err in &result.errors {
            self.expr_error(s, offset, err);
        }
        if usage == Usage::Script {
            for err in expr::untrusted_inputs(&e) {
                self.expr_error(s, offset, &err);
            }
        }
        if usage == Usage::Number && matches!(result.ty, ExprType::Object(_) | ExprType::Array(_)) {
            self.error(
                s.pos_at(offset),
                format!("type of expression must be number but found type {}", result.ty),
            );
        }
        Some(result.ty)
    }

    fn expr_error(&mut self, s: &Str, offset: usize, err: &ExprError) {
        self.error(s.pos_at(offset + err.offset), err.message.clone());
    }

    fn error(&mut self, pos: crate::ast::Pos, msg: impl Into<String>) {
        self.out.push(self.doc.error(RULE, pos, msg));
    }
}
