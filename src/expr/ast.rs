//! Expression syntax tree.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEq => ">=",
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
        }
    }

    /// `true` for the ordering operators.
    pub fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::NotEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Variable(String),
    /// `receiver.name`
    Property {
        receiver: Box<Expr>,
        name: String,
    },
    /// `receiver.*`
    ArrayDeref(Box<Expr>),
    /// `operand[index]`
    Index {
        operand: Box<Expr>,
        index: Box<Expr>,
    },
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// An expression node. `offset` is the byte offset of the node's first
/// token inside the expression source.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub offset: usize,
    /// Nodes on the longest path from this node down to a leaf.
    pub height: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, offset: usize) -> Self {
        let below = match &kind {
            ExprKind::Property { receiver: e, .. } | ExprKind::ArrayDeref(e) | ExprKind::Not(e) => {
                e.height
            }
            ExprKind::Index { operand: l, index: r }
            | ExprKind::Compare { left: l, right: r, .. }
            | ExprKind::Logical { left: l, right: r, .. } => l.height.max(r.height),
            ExprKind::Call { args, .. } => args.iter().map(|a| a.height).max().unwrap_or(0),
            _ => 0,
        };
        Expr {
            kind,
            offset,
            height: below + 1,
        }
    }

    /// Dotted path of a property chain rooted at a variable, lowercased,
    /// with `.*` and non-literal indexes written as `*`. Returns `None` for
    /// anything that is not such a chain.
    pub fn property_path(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name.to_ascii_lowercase()),
            ExprKind::Property { receiver, name } => receiver
                .property_path()
                .map(|p| format!("{}.{}", p, name.to_ascii_lowercase())),
            ExprKind::ArrayDeref(receiver) => receiver.property_path().map(|p| format!("{p}.*")),
            ExprKind::Index { operand, index } => {
                let base = operand.property_path()?;
                match &index.kind {
                    ExprKind::String(s) => Some(format!("{}.{}", base, s.to_ascii_lowercase())),
                    _ => Some(format!("{base}.*")),
                }
            }
            _ => None,
        }
    }

    /// Calls `f` on this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Property { receiver, .. } | ExprKind::ArrayDeref(receiver) => receiver.walk(f),
            ExprKind::Index { operand, index } => {
                operand.walk(f);
                index.walk(f);
            }
            ExprKind::Not(operand) => operand.walk(f),
            ExprKind::Compare { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    a.walk(f);
                }
            }
            _ => {}
        }
    }
}
