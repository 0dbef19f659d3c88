//! Recursive-descent parser.
//!
//! Precedence, loosest first: `||`, `&&`, `==` `!=`, `<` `<=` `>` `>=`,
//! unary `!`, then postfix `.name`, `.*`, `[index]` and calls.

use super::ast::{CompareOp, Expr, ExprKind, LogicalOp};
use super::lexer::{tokenize, Token, TokenKind};
use super::ExprError;

/// Bound on both parser recursion and the height of the resulting tree.
/// Every later pass walks the tree recursively.
const MAX_DEPTH: usize = 128;

/// Parses one expression (the text between `${{` and `}}`).
pub fn parse_expression(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if p.peek().kind == TokenKind::End {
        return Err(ExprError::new(0, "expression is empty"));
    }
    let expr = p.logical_or()?;
    let next = p.peek();
    if next.kind != TokenKind::End {
        return Err(ExprError::new(
            next.offset,
            format!(
                "parser did not reach end of input after parsing the expression. {} remains",
                describe(next)
            ),
        ));
    }
    Ok(expr)
}

fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Ident | TokenKind::Int | TokenKind::Float => {
            format!("{} {:?}", tok.kind.describe(), tok.text)
        }
        TokenKind::String => format!("string '{}'", tok.text),
        k => k.describe().to_string(),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

fn too_deep(offset: usize) -> ExprError {
    ExprError::new(offset, "expression is nested too deeply")
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token list always ends with End and we never advance past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::End {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, ExprError> {
        let tok = self.next();
        if tok.kind == kind {
            Ok(tok)
        } else {
            Err(ExprError::new(
                tok.offset,
                format!(
                    "unexpected {} while parsing {}. expecting {}",
                    describe(&tok),
                    context,
                    kind.describe()
                ),
            ))
        }
    }

    fn enter(&mut self, offset: usize) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(too_deep(offset));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn node(&self, kind: ExprKind, offset: usize) -> Result<Expr, ExprError> {
        let expr = Expr::new(kind, offset);
        if expr.height > MAX_DEPTH {
            return Err(too_deep(offset));
        }
        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.logical_and()?;
        while self.peek().kind == TokenKind::Or {
            self.next();
            let right = self.logical_and()?;
            let offset = left.offset;
            left = self.node(
                ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            )?;
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.peek().kind == TokenKind::And {
            self.next();
            let right = self.equality()?;
            let offset = left.offset;
            left = self.node(
                ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                offset,
            )?;
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::NotEq,
                _ => return Ok(left),
            };
            self.next();
            let right = self.relational()?;
            left = self.compare(op, left, right)?;
        }
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Less => CompareOp::Less,
                TokenKind::LessEq => CompareOp::LessEq,
                TokenKind::Greater => CompareOp::Greater,
                TokenKind::GreaterEq => CompareOp::GreaterEq,
                _ => return Ok(left),
            };
            self.next();
            let right = self.unary()?;
            left = self.compare(op, left, right)?;
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek().kind == TokenKind::Not {
            let tok = self.next();
            self.enter(tok.offset)?;
            let operand = self.unary()?;
            self.leave();
            return self.node(ExprKind::Not(Box::new(operand)), tok.offset);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.next();
                    let tok = self.next();
                    let offset = expr.offset;
                    expr = match tok.kind {
                        TokenKind::Ident => self.node(
                            ExprKind::Property {
                                receiver: Box::new(expr),
                                name: tok.text,
                            },
                            offset,
                        )?,
                        TokenKind::Star => self.node(ExprKind::ArrayDeref(Box::new(expr)), offset)?,
                        _ => {
                            return Err(ExprError::new(
                                tok.offset,
                                format!(
                                    "unexpected {} after \".\". expecting property name or \"*\"",
                                    describe(&tok)
                                ),
                            ))
                        }
                    };
                }
                TokenKind::LeftBracket => {
                    let open = self.next();
                    self.enter(open.offset)?;
                    let index = self.logical_or()?;
                    self.leave();
                    self.expect(TokenKind::RightBracket, "index access")?;
                    let offset = expr.offset;
                    expr = self.node(
                        ExprKind::Index {
                            operand: Box::new(expr),
                            index: Box::new(index),
                        },
                        offset,
                    )?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let tok = self.next();
        let offset = tok.offset;
        let kind = match tok.kind {
            TokenKind::LeftParen => {
                self.enter(offset)?;
                let inner = self.logical_or()?;
                self.leave();
                self.expect(TokenKind::RightParen, "parenthesized expression")?;
                return Ok(inner);
            }
            TokenKind::String => ExprKind::String(tok.text),
            TokenKind::Int => ExprKind::Int(parse_int(&tok)?),
            TokenKind::Float => match tok.text.parse::<f64>() {
                Ok(f) => ExprKind::Float(f),
                Err(_) => {
                    return Err(ExprError::new(
                        offset,
                        format!("invalid float literal {:?}", tok.text),
                    ))
                }
            },
            TokenKind::Ident => {
                if self.peek().kind == TokenKind::LeftParen {
                    let open = self.next();
                    self.enter(open.offset)?;
                    let args = self.arguments()?;
                    self.leave();
                    ExprKind::Call {
                        name: tok.text,
                        args,
                    }
                } else {
                    match tok.text.as_str() {
                        "null" => ExprKind::Null,
                        "true" => ExprKind::Bool(true),
                        "false" => ExprKind::Bool(false),
                        "NaN" => ExprKind::Float(f64::NAN),
                        "Infinity" => ExprKind::Float(f64::INFINITY),
                        _ => ExprKind::Variable(tok.text),
                    }
                }
            }
            _ => {
                return Err(ExprError::new(
                    offset,
                    format!(
                        "unexpected {} while parsing expression. expecting a literal, variable, function call or \"(\"",
                        describe(&tok)
                    ),
                ))
            }
        };
        self.node(kind, offset)
    }

    fn compare(&self, op: CompareOp, left: Expr, right: Expr) -> Result<Expr, ExprError> {
        let offset = left.offset;
        self.node(
            ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            offset,
        )
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.peek().kind == TokenKind::RightParen {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.logical_or()?);
            let tok = self.next();
            match tok.kind {
                TokenKind::Comma => continue,
                TokenKind::RightParen => return Ok(args),
                _ => {
                    return Err(ExprError::new(
                        tok.offset,
                        format!(
                            "unexpected {} while parsing arguments of function call. expecting \",\" or \")\"",
                            describe(&tok)
                        ),
                    ))
                }
            }
        }
    }
}


fn parse_int(tok: &Token) -> Result<i64, ExprError> {
    let text = tok.text.as_str();
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    };
    parsed
        .map(|n| if neg { -n } else { n })
        .map_err(|_| ExprError::new(tok.offset, format!("invalid integer literal {text:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let e = parse_expression("a || b && c").unwrap();
        let ExprKind::Logical { op, right, .. } = e.kind else {
            panic!("expected logical");
        };
        assert_eq!(op, LogicalOp::Or);
        assert!(matches!(right.kind, ExprKind::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let e = parse_expression("a == 1 && b < 2").unwrap();
        let ExprKind::Logical { left, right, .. } = e.kind else {
            panic!("expected logical");
        };
        assert!(matches!(left.kind, ExprKind::Compare { op: CompareOp::Eq, .. }));
        assert!(matches!(right.kind, ExprKind::Compare { op: CompareOp::Less, .. }));
    }

    #[test]
    fn property_chain_and_index() {
        let e = parse_expression("github.event.commits[0].message").unwrap();
        assert_eq!(e.property_path().unwrap(), "github.event.commits.*.message");
    }

    #[test]
    fn object_filter() {
        let e = parse_expression("github.event.issue.labels.*.name").unwrap();
        assert_eq!(e.property_path().unwrap(), "github.event.issue.labels.*.name");
    }

    #[test]
    fn function_call_with_args() {
        let e = parse_expression("format('{0}-{1}', a, 'b')").unwrap();
        let ExprKind::Call { name, args } = e.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "format");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn literals() {
        assert_eq!(parse_expression("null").unwrap().kind, ExprKind::Null);
        assert_eq!(parse_expression("true").unwrap().kind, ExprKind::Bool(true));
        assert_eq!(parse_expression("0x10").unwrap().kind, ExprKind::Int(16));
        assert_eq!(parse_expression("-3").unwrap().kind, ExprKind::Int(-3));
    }

    #[test]
    fn trailing_tokens_are_an_error() {
        let err = parse_expression("a b").unwrap_err();
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn missing_operand() {
        assert!(parse_expression("a &&").is_err());
        assert!(parse_expression("").is_err());
        assert!(parse_expression("foo(a,").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let src = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        let err = parse_expression(&src).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");

        let err = parse_expression(&"!".repeat(10_000)).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");
    }

    #[test]
    fn long_chains_are_bounded() {
        let src = vec!["a"; 5_000].join(" || ");
        assert!(parse_expression(&src).is_err());
        let src = format!("a{}", ".b".repeat(5_000));
        assert!(parse_expression(&src).is_err());
    }

    #[test]
    fn moderate_nesting_is_fine() {
        let src = format!("{}x{}", "(".repeat(50), ")".repeat(50));
        assert!(parse_expression(&src).is_ok());
        assert!(parse_expression(&vec!["a"; 60].join(" && ")).is_ok());
    }

    #[test]
    fn offsets_point_at_tokens() {
        let e = parse_expression("  !x").unwrap();
        assert_eq!(e.offset, 2);
        let ExprKind::Not(inner) = e.kind else {
            panic!("expected not");
        };
        assert_eq!(inner.offset, 3);
    }
}
