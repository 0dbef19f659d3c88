//! Type checker.
//!
//! [`check`] infers the type of an expression against a [`ContextTable`] and
//! collects every error it finds instead of stopping at the first one. The
//! result depends only on the expression and the table, so checking the same
//! input twice gives the same answer.

use super::ast::{Expr, ExprKind};
use super::functions::{self, Signature, SPECIAL_FUNCTIONS};
use super::types::{ArrayType, ExprType};
use super::ExprError;
use crate::context::{function_keys, ContextTable};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub ty: ExprType,
    pub errors: Vec<ExprError>,
}

pub fn check(expr: &Expr, table: &ContextTable) -> CheckResult {
    let mut checker = Checker {
        table,
        errors: Vec::new(),
    };
    let ty = checker.visit(expr);
    CheckResult {
        ty,
        errors: checker.errors,
    }
}

struct Checker<'t> {
    table: &'t ContextTable,
    errors: Vec<ExprError>,
}

fn quoted_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|s| format!("{s:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Checker<'_> {
    fn error(&mut self, offset: usize, msg: impl Into<String>) {
        self.errors.push(ExprError::new(offset, msg));
    }

    fn visit(&mut self, e: &Expr) -> ExprType {
        match &e.kind {
            ExprKind::Null => ExprType::Null,
            ExprKind::Bool(_) => ExprType::Bool,
            ExprKind::Int(_) | ExprKind::Float(_) => ExprType::Number,
            ExprKind::String(_) => ExprType::String,
            ExprKind::Variable(name) => self.variable(e.offset, name),
            ExprKind::Property { receiver, name } => {
                let recv = self.visit(receiver);
                let is_steps = matches!(&receiver.kind, ExprKind::Variable(v) if v.eq_ignore_ascii_case("steps"));
                self.property(e.offset, recv, name, is_steps)
            }
            ExprKind::ArrayDeref(receiver) => {
                let recv = self.visit(receiver);
                self.array_deref(e.offset, recv)
            }
            ExprKind::Index { operand, index } => {
                let recv = self.visit(operand);
                let idx = self.visit(index);
                self.index(e.offset, recv, index, idx)
            }
            ExprKind::Not(operand) => {
                self.visit(operand);
                ExprType::Bool
            }
            ExprKind::Compare { op, left, right } => {
                let l = self.visit(left);
                let r = self.visit(right);
                let structured = |t: &ExprType| matches!(t, ExprType::Object(_) | ExprType::Array(_));
                if op.is_ordering() && (structured(&l) || structured(&r)) {
                    self.error(
                        e.offset,
                        format!(
                            "\"{}\" operator cannot compare values of type \"{}\" and \"{}\". objects and arrays cannot be ordered",
                            op.symbol(),
                            l,
                            r
                        ),
                    );
                }
                ExprType::Bool
            }
            ExprKind::Logical { left, right, .. } => {
                let l = self.visit(left);
                let r = self.visit(right);
                l.merge(&r)
            }
            ExprKind::Call { name, args } => {
                let types: Vec<ExprType> = args.iter().map(|a| self.visit(a)).collect();
                self.call(e.offset, name, args, &types)
            }
        }
    }

    fn variable(&mut self, offset: usize, name: &str) -> ExprType {
        if let Some(t) = self.table.var(name) {
            return t.clone();
        }
        let available = quoted_list(self.table.vars.keys().map(String::as_str));
        let lower = name.to_ascii_lowercase();
        if self.table.unavailable.contains(&lower.as_str()) {
            self.error(
                offset,
                format!(
                    "context {:?} is not allowed here. available contexts for {:?} are {}. see https://docs.github.com/en/actions/learn-github-actions/contexts#context-availability for more details",
                    name, self.table.key, available
                ),
            );
        } else {
            self.error(
                offset,
                format!("undefined variable {name:?}. available variables are {available}"),
            );
        }
        ExprType::Any
    }

    fn property(&mut self, offset: usize, recv: ExprType, name: &str, is_steps: bool) -> ExprType {
        match recv {
            ExprType::Any => ExprType::Any,
            ExprType::Object(obj) => match obj.member(name) {
                Some(t) => t,
                None => {
                    if is_steps && self.table.is_later_step(name) {
                        self.error(
                            offset,
                            format!("step {name:?} is referenced before it runs. a step can only refer to outputs of steps that ran before it"),
                        );
                    } else {
                        self.error(
                            offset,
                            format!("property {name:?} is not defined in object type {obj}"),
                        );
                    }
                    ExprType::Any
                }
            },
            ExprType::Array(arr) if arr.deref => {
                let elem = match *arr.elem {
                    ExprType::Any => ExprType::Any,
                    ExprType::Object(obj) => match obj.member(name) {
                        Some(t) => t,
                        None => {
                            self.error(
                                offset,
                                format!("property {name:?} is not defined in object type {obj}"),
                            );
                            ExprType::Any
                        }
                    },
                    other => {
                        self.error(
                            offset,
                            format!(
                                "object filter elements must be objects to access property {name:?} but got \"{other}\""
                            ),
                        );
                        ExprType::Any
                    }
                };
                ExprType::Array(ArrayType {
                    elem: Box::new(elem),
                    deref: true,
                })
            }
            other => {
                self.error(
                    offset,
                    format!("receiver of property access {name:?} must be type of object but got \"{other}\""),
                );
                ExprType::Any
            }
        }
    }

    fn array_deref(&mut self, offset: usize, recv: ExprType) -> ExprType {
        let elem = match recv {
            ExprType::Any => ExprType::Any,
            ExprType::Object(obj) => obj.value_type(),
            ExprType::Array(arr) => *arr.elem,
            other => {
                self.error(
                    offset,
                    format!("object filter \".*\" is only available for object or array but got \"{other}\""),
                );
                return ExprType::Any;
            }
        };
        ExprType::Array(ArrayType {
            elem: Box::new(elem),
            deref: true,
        })
    }

    fn index(&mut self, offset: usize, recv: ExprType, index: &Expr, idx: ExprType) -> ExprType {
        match recv {
            ExprType::Any => ExprType::Any,
            ExprType::Object(obj) => {
                if let ExprKind::String(key) = &index.kind {
                    return self.property(offset, ExprType::Object(obj), key, false);
                }
                if !matches!(idx, ExprType::Any | ExprType::String) {
                    self.error(
                        index.offset,
                        format!("property access of object must be type of string but got \"{idx}\""),
                    );
                }
                match obj.shape {
                    super::types::Shape::Open(elem) => *elem,
                    super::types::Shape::Known => ExprType::Any,
                }
            }
            ExprType::Array(arr) => {
                if !matches!(idx, ExprType::Any | ExprType::Number) {
                    self.error(
                        index.offset,
                        format!("index access of array must be type of number but got \"{idx}\""),
                    );
                }
                *arr.elem
            }
            other => {
                self.error(
                    offset,
                    format!("index access operand must be type of object or array but got \"{other}\""),
                );
                ExprType::Any
            }
        }
    }

    fn call(&mut self, offset: usize, name: &str, args: &[Expr], types: &[ExprType]) -> ExprType {
        let Some(sigs) = functions::lookup(name) else {
            self.error(
                offset,
                format!(
                    "undefined function {:?}. available functions are {}",
                    name,
                    quoted_list(functions::BUILTINS.values().map(|s| s[0].name))
                ),
            );
            return ExprType::Any;
        };

        let lower = name.to_ascii_lowercase();
        if SPECIAL_FUNCTIONS.contains(&lower.as_str()) && !self.table.allows_function(&lower) {
            self.error(
                offset,
                format!(
                    "calling function {:?} is not allowed here. {:?} is only available in {}. see https://docs.github.com/en/actions/learn-github-actions/contexts#context-availability for more details",
                    name,
                    sigs[0].name,
                    quoted_list(function_keys(&lower))
                ),
            );
        }

        let matched = sigs.iter().find(|sig| {
            sig.accepts_arity(types.len())
                && types
                    .iter()
                    .enumerate()
                    .all(|(i, t)| sig.param(i).is_some_and(|p| p.accepts(t)))
        });
        let Some(sig) = matched else {
            self.report_mismatch(offset, sigs, args, types);
            return sigs[0].ret.clone();
        };

        match lower.as_str() {
            "format" => {
                if let Some(ExprKind::String(fmt)) = args.first().map(|a| &a.kind) {
                    self.check_format(args[0].offset, fmt, args.len() - 1);
                }
                sig.ret.clone()
            }
            "fromjson" => match args.first().map(|a| &a.kind) {
                Some(ExprKind::String(json)) => match serde_json::from_str::<serde_json::Value>(json) {
                    Ok(v) => ExprType::from_json(&v),
                    Err(err) => {
                        self.error(
                            args[0].offset,
                            format!("broken JSON string is passed to fromJSON(): {err}"),
                        );
                        ExprType::Any
                    }
                },
                _ => sig.ret.clone(),
            },
            _ => sig.ret.clone(),
        }
    }

    fn report_mismatch(&mut self, offset: usize, sigs: &[Signature], args: &[Expr], types: &[ExprType]) {
        if let [sig] = sigs {
            if !sig.accepts_arity(types.len()) {
                let expected = if sig.rest.is_some() {
                    format!("at least {}", sig.params.len())
                } else {
                    sig.params.len().to_string()
                };
                self.error(
                    offset,
                    format!(
                        "number of arguments is wrong. function \"{}\" takes {} parameters but {} arguments are given",
                        sig,
                        expected,
                        types.len()
                    ),
                );
                return;
            }
            for (i, t) in types.iter().enumerate() {
                if let Some(p) = sig.param(i).filter(|p| !p.accepts(t)) {
                    self.error(
                        args[i].offset,
                        format!(
                            "argument {} of function call is not assignable. \"{}\" cannot be assigned to \"{}\". called function type is \"{}\"",
                            i + 1,
                            t,
                            p,
                            sig
                        ),
                    );
                }
            }
            return;
        }
        let given = types.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let overloads = sigs.iter().map(|s| format!("\"{s}\"")).collect::<Vec<_>>().join(", ");
        self.error(
            offset,
            format!(
                "function {:?} cannot be called with arguments ({}). available overloads are {}",
                sigs[0].name, given, overloads
            ),
        );
    }

    fn check_format(&mut self, offset: usize, fmt: &str, given: usize) {
        let used = placeholders(fmt);
        for n in &used {
            if *n >= given {
                self.error(
                    offset,
                    format!(
                        "format string {fmt:?} contains placeholder {{{n}}} but only {given} arguments are given to format"
                    ),
                );
            }
        }
        for n in 0..given {
            if !used.contains(&n) {
                self.error(
                    offset,
                    format!(
                        "format string {fmt:?} does not contain placeholder {{{n}}}. remove argument which is unused in the format string"
                    ),
                );
            }
        }
    }
}

/// Properties of `github` that an attacker can set through a pull request,
/// issue, comment or commit. `*` matches one path segment.
const UNTRUSTED_INPUTS: &[&str] = &[
    "github.head_ref",
    "github.event.issue.title",
    "github.event.issue.body",
    "github.event.pull_request.title",
    "github.event.pull_request.body",
    "github.event.pull_request.head.ref",
    "github.event.pull_request.head.label",
    "github.event.pull_request.head.repo.default_branch",
    "github.event.comment.body",
    "github.event.review.body",
    "github.event.review_comment.body",
    "github.event.discussion.title",
    "github.event.discussion.body",
    "github.event.pages.*.page_name",
    "github.event.commits.*.message",
    "github.event.commits.*.author.email",
    "github.event.commits.*.author.name",
    "github.event.head_commit.message",
    "github.event.head_commit.author.email",
    "github.event.head_commit.author.name",
    "github.event.workflow_run.head_branch",
    "github.event.workflow_run.head_commit.message",
    "github.event.workflow_run.head_commit.author.email",
    "github.event.workflow_run.head_commit.author.name",
];

fn path_matches(path: &str, pattern: &str) -> bool {
    let mut p = path.split('.');
    let mut q = pattern.split('.');
    loop {
        match (p.next(), q.next()) {
            (None, None) => return true,
            (Some(a), Some(b)) if b == "*" || a == b => continue,
            _ => return false,
        }
    }
}

/// Reports reads of attacker-controlled values. Meant for expressions that
/// are substituted into scripts before they run.
pub fn untrusted_inputs(expr: &Expr) -> Vec<ExprError> {
    let mut reported = BTreeSet::new();
    let mut errors = Vec::new();
    expr.walk(&mut |node| {
        if reported.contains(&node.offset) {
            return;
        }
        let Some(path) = node.property_path() else {
            return;
        };
        if UNTRUSTED_INPUTS.iter().any(|p| path_matches(&path, p)) {
            reported.insert(node.offset);
            errors.push(ExprError::new(
                node.offset,
                format!(
                    "{path:?} is potentially untrusted. avoid using it directly in inline scripts. instead, pass it through an environment variable. see https://docs.github.com/en/actions/security-guides/security-hardening-for-github-actions for more details"
                ),
            ));
        }
    });
    errors
}

/// Indexes of the `{N}` placeholders in a format string. `{{` and `}}`
/// are escaped braces and never open or close a placeholder.
fn placeholders(fmt: &str) -> BTreeSet<usize> {
    let bytes = fmt.as_bytes();
    let mut used = BTreeSet::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => i += 2,
            b'{' => {
                let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                let end = i + 1 + digits;
                if digits > 0 && bytes.get(end) == Some(&b'}') {
                    if let Ok(n) = fmt[i + 1..end].parse() {
                        used.insert(n);
                    }
                    i = end + 1;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_expression;

    fn check_str(src: &str) -> CheckResult {
        check(&parse_expression(src).unwrap(), &ContextTable::permissive())
    }

    #[test]
    fn known_property_types() {
        assert_eq!(check_str("github.ref_protected").ty, ExprType::Bool);
        assert_eq!(check_str("strategy.job-index").ty, ExprType::Number);
        assert!(check_str("github.event.anything.deep").errors.is_empty());
    }

    #[test]
    fn unknown_property_on_known_object() {
        let r = check_str("runner.nope");
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].message.contains("property \"nope\" is not defined"));
    }

    #[test]
    fn undefined_variable() {
        let r = check_str("unknownctx.foo");
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].message.starts_with("undefined variable \"unknownctx\""));
        assert_eq!(r.errors[0].offset, 0);
    }

    #[test]
    fn case_insensitive_context_and_function() {
        assert!(check_str("GitHub.Sha").errors.is_empty());
        assert!(check_str("StartsWith(github.ref, 'refs/tags/')").errors.is_empty());
    }

    #[test]
    fn arity_and_argument_types() {
        assert_eq!(check_str("startsWith('a')").errors.len(), 1);
        let r = check_str("startsWith(github, 'a')");
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].message.contains("not assignable"));
        assert!(check_str("contains(github.event.labels.*.name, 'bug')").errors.is_empty());
    }

    #[test]
    fn unknown_function() {
        let r = check_str("nope(1)");
        assert!(r.errors[0].message.starts_with("undefined function \"nope\""));
    }

    #[test]
    fn format_placeholders() {
        assert!(check_str("format('{0}-{1}', 'a', 'b')").errors.is_empty());
        assert_eq!(check_str("format('{0}-{1}', 'a')").errors.len(), 1);
        assert_eq!(check_str("format('{0}', 'a', 'b')").errors.len(), 1);
        assert!(check_str("format('{{0}} {0}', 'a')").errors.is_empty());
        assert!(check_str("format('{{{0}}}', 'x')").errors.is_empty());
        assert_eq!(check_str("format('{{0}}', 'x')").errors.len(), 1);
        assert_eq!(placeholders("{{{1}}}-{0}{x}{"), BTreeSet::from([0, 1]));
    }

    #[test]
    fn from_json_literal_is_typed() {
        let r = check_str("fromJSON('{\"a\": [1, 2]}').a");
        assert!(r.errors.is_empty());
        assert_eq!(r.ty, ExprType::array(ExprType::Number));
        assert_eq!(check_str("fromJSON('{oops')").errors.len(), 1);
    }

    #[test]
    fn logical_operators_merge_operand_types() {
        assert_eq!(check_str("'a' || 'b'").ty, ExprType::String);
        assert_eq!(check_str("!github.sha").ty, ExprType::Bool);
    }

    #[test]
    fn ordering_objects_is_flagged() {
        assert_eq!(check_str("github < 1").errors.len(), 1);
        assert!(check_str("github == 1").errors.is_empty());
    }

    #[test]
    fn object_filter_maps_properties() {
        let r = check_str("job.services.*.network");
        assert!(r.errors.is_empty());
        let ExprType::Array(a) = r.ty else {
            panic!("expected array");
        };
        assert_eq!(*a.elem, ExprType::String);
    }

    #[test]
    fn index_on_array_requires_number() {
        let r = check_str("fromJSON('[1]')['x']");
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn checking_is_idempotent() {
        let e = parse_expression("format('{0}', unknown.x) == runner.nope").unwrap();
        let table = ContextTable::permissive();
        assert_eq!(check(&e, &table), check(&e, &table));
    }

    #[test]
    fn untrusted_paths() {
        let e = parse_expression("github.event.pull_request.title").unwrap();
        assert_eq!(untrusted_inputs(&e).len(), 1);
        let e = parse_expression("github.event.commits[0].message").unwrap();
        assert_eq!(untrusted_inputs(&e).len(), 1);
        let e = parse_expression("github.event.pull_request.number").unwrap();
        assert!(untrusted_inputs(&e).is_empty());
        let e = parse_expression("format('{0} {1}', github.head_ref, github.event.issue.body)").unwrap();
        assert_eq!(untrusted_inputs(&e).len(), 2);
    }
}
