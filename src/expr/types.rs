//! Static types of expression values.
//!
//! The checker is permissive: `Any` flows through every operation without
//! complaint, and an object with an [`Shape::Open`] shape accepts any property
//! name. Only statically known mismatches are reported.

use crate::ast::RawValue;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprType {
    /// Unknown at check time. Also the result of member access that cannot
    /// be resolved statically.
    Any,
    Null,
    Number,
    Bool,
    String,
    Object(ObjectType),
    Array(ArrayType),
}

/// Whether an object's member set is fully known.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Only the listed properties exist. Accessing another one is an error.
    Known,
    /// Unlisted properties exist and have the given type.
    Open(Box<ExprType>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    pub props: BTreeMap<String, ExprType>,
    pub shape: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub elem: Box<ExprType>,
    /// `true` for the result of an object filter (`.*`). Property access on
    /// such an array maps over its elements.
    pub deref: bool,
}

impl ObjectType {
    pub fn known(props: BTreeMap<String, ExprType>) -> Self {
        ObjectType {
            props,
            shape: Shape::Known,
        }
    }

    pub fn open(elem: ExprType) -> Self {
        ObjectType {
            props: BTreeMap::new(),
            shape: Shape::Open(Box::new(elem)),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.shape, Shape::Open(_))
    }

    /// Exact name first, then case-insensitive.
    pub fn prop(&self, name: &str) -> Option<&ExprType> {
        self.props.get(name).or_else(|| {
            self.props
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Type of `obj.name`, or `None` if a known-shape object lacks it.
    pub fn member(&self, name: &str) -> Option<ExprType> {
        match (self.prop(name), &self.shape) {
            (Some(t), _) => Some(t.clone()),
            (None, Shape::Open(elem)) => Some((**elem).clone()),
            (None, Shape::Known) => None,
        }
    }

    /// Merged type of every value this object can hold.
    pub fn value_type(&self) -> ExprType {
        let mut ty = match &self.shape {
            Shape::Open(elem) => Some((**elem).clone()),
            Shape::Known => None,
        };
        for v in self.props.values() {
            ty = Some(match ty {
                Some(t) => t.merge(v),
                None => v.clone(),
            });
        }
        ty.unwrap_or(ExprType::Any)
    }
}

impl ExprType {
    pub fn object(props: impl IntoIterator<Item = (&'static str, ExprType)>) -> Self {
        ExprType::Object(ObjectType::known(
            props.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        ))
    }

    pub fn empty_object() -> Self {
        ExprType::Object(ObjectType::known(BTreeMap::new()))
    }

    pub fn open_object(elem: ExprType) -> Self {
        ExprType::Object(ObjectType::open(elem))
    }

    pub fn array(elem: ExprType) -> Self {
        ExprType::Array(ArrayType {
            elem: Box::new(elem),
            deref: false,
        })
    }

    /// `true` if a value of type `value` may be passed where `self` is
    /// expected.
    pub fn accepts(&self, value: &ExprType) -> bool {
        match (self, value) {
            (ExprType::Any, _) | (_, ExprType::Any) => true,
            (ExprType::Bool, _) => true,
            (ExprType::String, ExprType::String | ExprType::Number) => true,
            (ExprType::Number, ExprType::Number) => true,
            (ExprType::Null, ExprType::Null) => true,
            (ExprType::Object(_), ExprType::Object(_)) => true,
            (ExprType::Array(a), ExprType::Array(b)) => a.elem.accepts(&b.elem),
            _ => false,
        }
    }

    /// Least type that covers both sides. Used for `&&`, `||` and for
    /// inferring element types.
    pub fn merge(&self, other: &ExprType) -> ExprType {
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (ExprType::Any, _) | (_, ExprType::Any) => ExprType::Any,
            (ExprType::Null, t) | (t, ExprType::Null) => t.clone(),
            (ExprType::String, ExprType::Number | ExprType::Bool)
            | (ExprType::Number | ExprType::Bool, ExprType::String) => ExprType::String,
            (ExprType::Object(a), ExprType::Object(b)) => {
                let mut props = a.props.clone();
                for (k, v) in &b.props {
                    let merged = match props.get(k) {
                        Some(existing) => existing.merge(v),
                        None => v.clone(),
                    };
                    props.insert(k.clone(), merged);
                }
                let shape = match (&a.shape, &b.shape) {
                    (Shape::Known, Shape::Known) => Shape::Known,
                    (Shape::Open(x), Shape::Open(y)) => Shape::Open(Box::new(x.merge(y))),
                    (Shape::Open(x), Shape::Known) | (Shape::Known, Shape::Open(x)) => {
                        Shape::Open(x.clone())
                    }
                };
                ExprType::Object(ObjectType { props, shape })
            }
            (ExprType::Array(a), ExprType::Array(b)) => ExprType::Array(ArrayType {
                elem: Box::new(a.elem.merge(&b.elem)),
                deref: a.deref && b.deref,
            }),
            _ => ExprType::Any,
        }
    }

    /// Infers the type of a value written in YAML, e.g. a matrix axis value.
    pub fn from_raw(value: &RawValue) -> ExprType {
        match value {
            RawValue::Scalar(s) => {
                let v = s.value.as_str();
                if s.contains_expression() {
                    ExprType::Any
                } else if matches!(v, "true" | "false") {
                    ExprType::Bool
                } else if matches!(v, "" | "~" | "null") {
                    ExprType::Null
                } else if v.parse::<f64>().is_ok() {
                    ExprType::Number
                } else {
                    ExprType::String
                }
            }
            RawValue::Sequence(items, _) => {
                let elem = items
                    .iter()
                    .map(ExprType::from_raw)
                    .reduce(|a, b| a.merge(&b))
                    .unwrap_or(ExprType::Any);
                ExprType::array(elem)
            }
            RawValue::Mapping(entries, _) => ExprType::Object(ObjectType::known(
                entries
                    .iter()
                    .map(|(k, v)| (k.value.clone(), ExprType::from_raw(v)))
                    .collect(),
            )),
        }
    }

    /// Infers the type of a parsed JSON value, used for `fromJSON('...')`
    /// with a literal argument.
    pub fn from_json(value: &serde_json::Value) -> ExprType {
        match value {
            serde_json::Value::Null => ExprType::Null,
            serde_json::Value::Bool(_) => ExprType::Bool,
            serde_json::Value::Number(_) => ExprType::Number,
            serde_json::Value::String(_) => ExprType::String,
            serde_json::Value::Array(items) => ExprType::array(
                items
                    .iter()
                    .map(ExprType::from_json)
                    .reduce(|a, b| a.merge(&b))
                    .unwrap_or(ExprType::Any),
            ),
            serde_json::Value::Object(map) => ExprType::Object(ObjectType::known(
                map.iter()
                    .map(|(k, v)| (k.clone(), ExprType::from_json(v)))
                    .collect(),
            )),
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprType::Any => f.write_str("any"),
            ExprType::Null => f.write_str("null"),
            ExprType::Number => f.write_str("number"),
            ExprType::Bool => f.write_str("bool"),
            ExprType::String => f.write_str("string"),
            ExprType::Object(o) => write!(f, "{o}"),
            ExprType::Array(a) => write!(f, "array<{}>", a.elem),
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.props.is_empty() {
            return match &self.shape {
                Shape::Known => f.write_str("object"),
                Shape::Open(elem) if **elem == ExprType::Any => f.write_str("object"),
                Shape::Open(elem) => write!(f, "{{string => {elem}}}"),
            };
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.props.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        if let Shape::Open(elem) = &self.shape {
            write!(f, "; string => {elem}")?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Pos, Str};

    #[test]
    fn string_accepts_number_but_not_object() {
        assert!(ExprType::String.accepts(&ExprType::Number));
        assert!(!ExprType::String.accepts(&ExprType::open_object(ExprType::Any)));
        assert!(ExprType::Bool.accepts(&ExprType::String));
        assert!(!ExprType::Number.accepts(&ExprType::String));
    }

    #[test]
    fn merge_rules() {
        assert_eq!(ExprType::Null.merge(&ExprType::Number), ExprType::Number);
        assert_eq!(ExprType::Bool.merge(&ExprType::String), ExprType::String);
        assert_eq!(ExprType::Number.merge(&ExprType::array(ExprType::Any)), ExprType::Any);
        let a = ExprType::object([("x", ExprType::Number)]);
        let b = ExprType::object([("y", ExprType::String)]);
        let ExprType::Object(m) = a.merge(&b) else {
            panic!("expected object");
        };
        assert_eq!(m.props.len(), 2);
        assert!(!m.is_open());
    }

    #[test]
    fn case_insensitive_prop_lookup_prefers_exact() {
        let mut props = BTreeMap::new();
        props.insert("Foo".to_string(), ExprType::Number);
        props.insert("foo".to_string(), ExprType::String);
        let o = ObjectType::known(props);
        assert_eq!(o.prop("foo"), Some(&ExprType::String));
        assert_eq!(o.prop("FOO"), Some(&ExprType::Number));
    }

    #[test]
    fn infers_raw_values() {
        let p = Pos::default();
        let seq = RawValue::Sequence(
            vec![
                RawValue::Scalar(Str::new("1", p)),
                RawValue::Scalar(Str::new("2.5", p)),
            ],
            p,
        );
        assert_eq!(ExprType::from_raw(&seq), ExprType::array(ExprType::Number));
    }

    #[test]
    fn display() {
        let o = ExprType::object([("a", ExprType::String), ("b", ExprType::Number)]);
        assert_eq!(o.to_string(), "{a: string; b: number}");
        assert_eq!(ExprType::open_object(ExprType::String).to_string(), "{string => string}");
    }
}
