//! The `${{ }}` expression language: lexing, parsing and type checking.
//!
//! Positions inside expressions are byte offsets relative to the text between
//! `${{` and `}}`. [`Fragment::offset`] turns them into offsets inside the
//! host string, and [`Str::pos_at`](crate::ast::Str::pos_at) turns those into
//! document positions.

pub mod ast;
pub mod checker;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod types;

pub use ast::{Expr, ExprKind};
pub use checker::{check, untrusted_inputs, CheckResult};
pub use parser::parse_expression;
pub use types::{ExprType, ObjectType, Shape};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExprError {
    /// Byte offset inside the expression source.
    pub offset: usize,
    pub message: String,
}

impl ExprError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        ExprError {
            offset,
            message: message.into(),
        }
    }
}

/// One `${{ ... }}` occurrence inside a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    /// Text between the braces.
    pub source: &'a str,
    /// Byte offset of `source` in the host string.
    pub offset: usize,
    /// Byte offset of the opening `${{` in the host string.
    pub start: usize,
    /// Byte offset just past the closing `}}`.
    pub end: usize,
}

/// Splits `s` into its `${{ }}` fragments. A `}}` inside a single-quoted
/// string literal does not close the fragment. On an unclosed `${{`, the
/// fragments found so far are returned along with the offset of the
/// offending `${{`.
pub fn fragments(s: &str) -> (Vec<Fragment<'_>>, Option<usize>) {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(found) = s[from..].find("${{") {
        let start = from + found;
        let inner = start + 3;
        match closing_braces(&s[inner..]) {
            Some(len) => {
                out.push(Fragment {
                    source: &s[inner..inner + len],
                    offset: inner,
                    start,
                    end: inner + len + 2,
                });
                from = inner + len + 2;
            }
            None => return (out, Some(start)),
        }
    }
    (out, None)
}

fn closing_braces(s: &str) -> Option<usize> {
    let b = s.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\'' => in_string = !in_string,
            b'}' if !in_string && b.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Replaces every `${{ }}` span with one underscore per character of the
/// span, so character columns of the surrounding text are unchanged. The
/// byte length differs when the span holds non-ASCII text. An unclosed
/// `${{` is left as is.
pub fn mask_expressions(s: &str) -> String {
    let (frags, _) = fragments(s);
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for f in frags {
        out.push_str(&s[last..f.start]);
        let width = s[f.start..f.end].chars().count();
        out.extend(std::iter::repeat('_').take(width));
        last = f.end;
    }
    out.push_str(&s[last..]);
    out
}
