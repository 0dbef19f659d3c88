//! Builtin function signatures.

use super::types::ExprType;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone)]
pub struct Signature {
    pub name: &'static str,
    pub params: Vec<ExprType>,
    /// Type of the repeated trailing arguments, for variadic functions.
    pub rest: Option<ExprType>,
    pub ret: ExprType,
}

impl Signature {
    fn new(name: &'static str, params: Vec<ExprType>, ret: ExprType) -> Self {
        Signature {
            name,
            params,
            rest: None,
            ret,
        }
    }

    fn variadic(mut self, rest: ExprType) -> Self {
        self.rest = Some(rest);
        self
    }

    pub fn accepts_arity(&self, n: usize) -> bool {
        if self.rest.is_some() {
            n >= self.params.len()
        } else {
            n == self.params.len()
        }
    }

    /// Expected type of the `i`-th argument.
    pub fn param(&self, i: usize) -> Option<&ExprType> {
        self.params.get(i).or(self.rest.as_ref())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        if let Some(rest) = &self.rest {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "{rest}...")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

/// Functions whose availability depends on the workflow key.
pub const SPECIAL_FUNCTIONS: &[&str] = &["always", "cancelled", "failure", "hashfiles", "success"];

/// Overloads keyed by lowercase function name.
pub static BUILTINS: LazyLock<BTreeMap<&'static str, Vec<Signature>>> = LazyLock::new(|| {
    use ExprType::{Any, Bool, String};
    let any_array = || ExprType::array(Any);

    let mut m: BTreeMap<&'static str, Vec<Signature>> = BTreeMap::new();
    m.insert(
        "contains",
        vec![
            Signature::new("contains", vec![String, String], Bool),
            Signature::new("contains", vec![any_array(), Any], Bool),
        ],
    );
    m.insert(
        "startswith",
        vec![Signature::new("startsWith", vec![String, String], Bool)],
    );
    m.insert(
        "endswith",
        vec![Signature::new("endsWith", vec![String, String], Bool)],
    );
    m.insert(
        "format",
        vec![Signature::new("format", vec![String], String).variadic(Any)],
    );
    m.insert(
        "join",
        vec![
            Signature::new("join", vec![any_array()], String),
            Signature::new("join", vec![any_array(), String], String),
            Signature::new("join", vec![String], String),
            Signature::new("join", vec![String, String], String),
        ],
    );
    m.insert("tojson", vec![Signature::new("toJSON", vec![Any], String)]);
    m.insert("fromjson", vec![Signature::new("fromJSON", vec![String], Any)]);
    m.insert(
        "hashfiles",
        vec![Signature::new("hashFiles", vec![String], String).variadic(String)],
    );
    for name in ["success", "always", "cancelled", "failure"] {
        m.insert(name, vec![Signature::new(name, Vec::new(), Bool)]);
    }
    m
});

/// Looks up a function case-insensitively.
pub fn lookup(name: &str) -> Option<&'static [Signature]> {
    BUILTINS
        .get(name.to_ascii_lowercase().as_str())
        .map(Vec::as_slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("StartsWith").is_some());
        assert!(lookup("TOJSON").is_some());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn variadic_arity() {
        let sig = &lookup("hashFiles").unwrap()[0];
        assert!(!sig.accepts_arity(0));
        assert!(sig.accepts_arity(1));
        assert!(sig.accepts_arity(4));
        assert_eq!(sig.param(3), Some(&ExprType::String));
    }

    #[test]
    fn signature_display() {
        let sig = &lookup("format").unwrap()[0];
        assert_eq!(sig.to_string(), "format(string, any...) -> string");
    }
}
