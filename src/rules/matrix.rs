//! Matrix checks.
//!
//! Works on statically written matrices only. Anything given as a `${{ }}`
//! expression is unknown until the workflow runs and is skipped.

use super::{is_identifier, Rule, RuleInfo};
use crate::ast::{Job, Matrix, MatrixCombinations, RawValue};
use crate::context::ContextIndex;
use crate::diagnostic::Diagnostic;
use crate::parse::Document;
use std::collections::HashMap;

const RULE: &str = "matrix";

/// Upper bound on the number of jobs one matrix may generate.
pub const MAX_COMBINATIONS: usize = 256;

const RESERVED: &[&str] = &["include", "exclude"];

pub struct MatrixRule;

pub fn info() -> RuleInfo {
    RuleInfo {
        id: RULE,
        severity: "error",
        message: "Matrix: duplicate axis values, unknown keys or values in \"exclude\", invalid axis names and oversized matrices",
        remediation: "Remove duplicated values, make every \"exclude\" entry name a declared axis and one of its values, and keep the matrix within 256 combinations",
    }
}

impl Rule for MatrixRule {
    fn name(&self) -> &'static str {
        RULE
    }

    fn description(&self) -> &'static str {
        "Matrix axes, include/exclude entries and size"
    }

    fn check(&self, doc: &Document, _ctx: &ContextIndex) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for job in &doc.workflow.jobs {
            if let Some(m) = job.matrix() {
                if m.expression.is_none() {
                    check_matrix(doc, job, m, &mut out);
                }
            }
        }
        out
    }
}

fn check_matrix(doc: &Document, job: &Job, m: &Matrix, out: &mut Vec<Diagnostic>) {
    let mut names: HashMap<String, &crate::ast::Str> = HashMap::new();
    for axis in &m.axes {
        let name = &axis.name;
        if !is_identifier(&name.value) {
            out.push(doc.error(
                RULE,
                name.pos,
                format!(
                    "matrix axis name {:?} is invalid. it must start with a letter or _ and contain only alphanumeric characters, - or _",
                    name.value
                ),
            ));
        }
        let lower = name.value.to_ascii_lowercase();
        if RESERVED.contains(&lower.as_str()) {
            out.push(doc.error(
                RULE,
                name.pos,
                format!(
                    "matrix axis name {:?} collides with the reserved key {:?}",
                    name.value, lower
                ),
            ));
        }
        if let Some(prev) = names.get(&lower) {
            out.push(doc.error(
                RULE,
                name.pos,
                format!(
                    "matrix axis {:?} duplicates axis {:?} at line:{},col:{}. note that axis names are case insensitive",
                    name.value, prev.value, prev.pos.line, prev.pos.col
                ),
            ));
        } else {
            names.insert(lower, name);
        }

        if let Some(values) = &axis.values {
            for (i, v) in values.iter().enumerate() {
                if let Some(prev) = values[..i].iter().find(|p| p.equals(v)) {
                    let p = prev.pos();
                    out.push(doc.error(
                        RULE,
                        v.pos(),
                        format!(
                            "duplicate value {} is found in matrix {:?}. the same value is at line:{},col:{}",
                            v, name.value, p.line, p.col
                        ),
                    ));
                }
            }
        }
    }

    if let Some(exclude) = &m.exclude {
        check_exclude(doc, m, exclude, out);
    }

    if let Some(n) = combinations(m) {
        if n > MAX_COMBINATIONS {
            out.push(doc.error(
                RULE,
                m.pos,
                format!(
                    "matrix of job {:?} generates {} jobs, more than the limit of {} jobs per workflow run",
                    job.id.value, n, MAX_COMBINATIONS
                ),
            ));
        }
    }
}

fn check_exclude(doc: &Document, m: &Matrix, exclude: &MatrixCombinations, out: &mut Vec<Diagnostic>) {
    if exclude.expression.is_some() || m.is_dynamic() {
        return;
    }
    let include_keys: Vec<&str> = m
        .include
        .iter()
        .flat_map(|c| &c.rows)
        .flat_map(|(_, row)| row.iter().map(|(k, _)| k.value.as_str()))
        .collect();

    for (_, row) in &exclude.rows {
        for (key, value) in row {
            let Some(axis) = m.axis(&key.value) else {
                if !include_keys.iter().any(|k| k.eq_ignore_ascii_case(&key.value)) {
                    let axes = m
                        .axes
                        .iter()
                        .map(|a| format!("{:?}", a.name.value))
                        .collect::<Vec<_>>()
                        .join(", ");
                    out.push(doc.error(
                        RULE,
                        key.pos,
                        format!(
                            "\"exclude\" section has key {:?} which does not exist in matrix. available axes are {}",
                            key.value, axes
                        ),
                    ));
                }
                continue;
            };
            let Some(values) = &axis.values else {
                continue;
            };
            if contains_expression(value) {
                continue;
            }
            let matches_axis = values.iter().any(|v| value.is_subset_of(v));
            let matches_include = m.include.iter().flat_map(|c| &c.rows).any(|(_, row)| {
                row.iter()
                    .any(|(k, v)| k.value.eq_ignore_ascii_case(&key.value) && value.is_subset_of(v))
            });
            if !matches_axis && !matches_include {
                let listed = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                out.push(doc.error(
                    RULE,
                    value.pos(),
                    format!(
                        "value {} in \"exclude\" does not match any value of matrix axis {:?}. available values are {}",
                        value, axis.name.value, listed
                    ),
                ));
            }
        }
    }
}

fn contains_expression(v: &RawValue) -> bool {
    match v {
        RawValue::Scalar(s) => s.contains_expression(),
        RawValue::Sequence(items, _) => items.iter().any(contains_expression),
        RawValue::Mapping(entries, _) => entries.iter().any(|(_, v)| contains_expression(v)),
    }
}

/// Number of jobs the matrix expands to, or `None` when it cannot be known.
///
/// Counts the cartesian product minus excluded rows, plus `include` rows that
/// do not extend an existing combination.
pub fn combinations(m: &Matrix) -> Option<usize> {
    if m.is_dynamic() || m.exclude.as_ref().is_some_and(|c| c.expression.is_some()) {
        return None;
    }
    let mut product: usize = if m.axes.is_empty() { 0 } else { 1 };
    for axis in &m.axes {
        product = product.saturating_mul(axis.values.as_ref()?.len());
    }

    let excluded = m
        .exclude
        .iter()
        .flat_map(|c| &c.rows)
        .map(|(_, row)| {
            // each excluded row removes every combination it matches
            m.axes
                .iter()
                .filter(|a| !row.iter().any(|(k, _)| k.value.eq_ignore_ascii_case(&a.name.value)))
                .map(|a| a.values.as_ref().map_or(1, Vec::len))
                .product::<usize>()
        })
        .sum::<usize>();

    let standalone = m
        .include
        .iter()
        .flat_map(|c| &c.rows)
        .filter(|(_, row)| {
            !row.iter().all(|(k, v)| match m.axis(&k.value) {
                Some(axis) => axis
                    .values
                    .as_ref()
                    .is_some_and(|vals| vals.iter().any(|x| x.equals(v))),
                None => true,
            }) || product == 0
        })
        .count();

    Some(product.saturating_sub(excluded) + standalone)
}
