//! Tokenizer for the text between `${{` and `}}`.

use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    String,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    Comma,
    Star,
    Not,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Eq,
    NotEq,
    And,
    Or,
    End,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::LeftParen => "\"(\"",
            TokenKind::RightParen => "\")\"",
            TokenKind::LeftBracket => "\"[\"",
            TokenKind::RightBracket => "\"]\"",
            TokenKind::Dot => "\".\"",
            TokenKind::Comma => "\",\"",
            TokenKind::Star => "\"*\"",
            TokenKind::Not => "\"!\"",
            TokenKind::Less => "\"<\"",
            TokenKind::LessEq => "\"<=\"",
            TokenKind::Greater => "\">\"",
            TokenKind::GreaterEq => "\">=\"",
            TokenKind::Eq => "\"==\"",
            TokenKind::NotEq => "\"!=\"",
            TokenKind::And => "\"&&\"",
            TokenKind::Or => "\"||\"",
            TokenKind::End => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text. For strings, the unescaped content.
    pub text: String,
    /// Byte offset into the lexed source.
    pub offset: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Splits `src` into tokens. The final token is always [`TokenKind::End`].
pub fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while let Some(c) = src[i..].chars().next() {
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        let peek = bytes.get(i + 1).copied();
        let (kind, len) = match c {
            '(' => (TokenKind::LeftParen, 1),
            ')' => (TokenKind::RightParen, 1),
            '[' => (TokenKind::LeftBracket, 1),
            ']' => (TokenKind::RightBracket, 1),
            '.' => (TokenKind::Dot, 1),
            ',' => (TokenKind::Comma, 1),
            '*' => (TokenKind::Star, 1),
            '!' if peek == Some(b'=') => (TokenKind::NotEq, 2),
            '!' => (TokenKind::Not, 1),
            '<' if peek == Some(b'=') => (TokenKind::LessEq, 2),
            '<' => (TokenKind::Less, 1),
            '>' if peek == Some(b'=') => (TokenKind::GreaterEq, 2),
            '>' => (TokenKind::Greater, 1),
            '=' if peek == Some(b'=') => (TokenKind::Eq, 2),
            '&' if peek == Some(b'&') => (TokenKind::And, 2),
            '|' if peek == Some(b'|') => (TokenKind::Or, 2),
            '\'' => {
                let (text, len) = lex_string(src, i)?;
                tokens.push(Token {
                    kind: TokenKind::String,
                    text,
                    offset: i,
                });
                i += len;
                continue;
            }
            '"' => {
                return Err(ExprError::new(
                    i,
                    "string literal must be enclosed in single quotes. double quotes are not allowed",
                ))
            }
            '-' if peek.is_some_and(|b| b.is_ascii_digit()) => lex_number(src, i)?,
            c if c.is_ascii_digit() => lex_number(src, i)?,
            c if is_ident_start(c) => {
                let len = src[i..]
                    .char_indices()
                    .find(|&(_, ch)| !is_ident_char(ch))
                    .map(|(j, _)| j)
                    .unwrap_or(src.len() - i);
                (TokenKind::Ident, len)
            }
            '=' => {
                return Err(ExprError::new(
                    i,
                    "unexpected character \"=\". did you mean \"==\"?",
                ))
            }
            other => {
                return Err(ExprError::new(
                    i,
                    format!("unexpected character {other:?} while lexing expression"),
                ))
            }
        };
        tokens.push(Token {
            kind,
            text: src[i..i + len].to_string(),
            offset: i,
        });
        i += len;
    }

    tokens.push(Token {
        kind: TokenKind::End,
        text: String::new(),
        offset: src.len(),
    });
    Ok(tokens)
}

/// Returns the unescaped content and the number of bytes consumed,
/// including both quotes.
fn lex_string(src: &str, start: usize) -> Result<(String, usize), ExprError> {
    let mut text = String::new();
    let mut chars = src[start + 1..].char_indices().peekable();
    while let Some((j, c)) = chars.next() {
        if c == '\'' {
            if chars.peek().is_some_and(|&(_, n)| n == '\'') {
                chars.next();
                text.push('\'');
                continue;
            }
            return Ok((text, j + 2));
        }
        text.push(c);
    }
    Err(ExprError::new(start, "unterminated string literal"))
}

fn lex_number(src: &str, start: usize) -> Result<(TokenKind, usize), ExprError> {
    let rest = &src[start..];
    let b = rest.as_bytes();
    let mut j = 0;
    if b[0] == b'-' {
        j += 1;
    }
    if rest[j..].starts_with("0x") || rest[j..].starts_with("0X") {
        j += 2;
        let digits_start = j;
        while j < b.len() && b[j].is_ascii_hexdigit() {
            j += 1;
        }
        if j == digits_start {
            return Err(ExprError::new(
                start,
                "hex number must have at least one digit after \"0x\"",
            ));
        }
        return finish_number(rest, start, j, TokenKind::Int);
    }

    let mut kind = TokenKind::Int;
    while j < b.len() && b[j].is_ascii_digit() {
        j += 1;
    }
    if j < b.len() && b[j] == b'.' && b.get(j + 1).is_some_and(u8::is_ascii_digit) {
        kind = TokenKind::Float;
        j += 1;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
    }
    if j < b.len() && (b[j] == b'e' || b[j] == b'E') {
        let mut k = j + 1;
        if k < b.len() && (b[k] == b'+' || b[k] == b'-') {
            k += 1;
        }
        if k < b.len() && b[k].is_ascii_digit() {
            kind = TokenKind::Float;
            while k < b.len() && b[k].is_ascii_digit() {
                k += 1;
            }
            j = k;
        } else {
            return Err(ExprError::new(
                start,
                "exponent of number must have at least one digit",
            ));
        }
    }
    finish_number(rest, start, j, kind)
}

fn finish_number(
    rest: &str,
    start: usize,
    len: usize,
    kind: TokenKind,
) -> Result<(TokenKind, usize), ExprError> {
    if let Some(bad) = rest[len..].chars().next().filter(|&c| is_ident_char(c)) {
        return Err(ExprError::new(
            start,
            format!("invalid character {:?} after number literal {:?}", bad, &rest[..len]),
        ));
    }
    Ok((kind, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn property_access_and_operators() {
        assert_eq!(
            kinds("github.ref == 'main' && !x"),
            vec![
                TokenKind::Ident,
                TokenKind::Dot,
                TokenKind::Ident,
                TokenKind::Eq,
                TokenKind::String,
                TokenKind::And,
                TokenKind::Not,
                TokenKind::Ident,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn escaped_quote_in_string() {
        let toks = tokenize("'it''s' == x").unwrap();
        assert_eq!(toks[0].text, "it's");
        assert_eq!(toks[1].kind, TokenKind::Eq);
        assert_eq!(toks[1].offset, 8);
    }

    #[test]
    fn numbers() {
        let toks = tokenize("1 -2 3.5 0xff 1e3").unwrap();
        assert_eq!(toks[0].kind, TokenKind::Int);
        assert_eq!(toks[1].text, "-2");
        assert_eq!(toks[2].kind, TokenKind::Float);
        assert_eq!(toks[3].text, "0xff");
        assert_eq!(toks[4].kind, TokenKind::Float);
    }

    #[test]
    fn identifiers_may_contain_dashes() {
        let toks = tokenize("steps.my-step.outputs").unwrap();
        assert_eq!(toks[2].text, "my-step");
    }

    #[test]
    fn double_quotes_are_rejected() {
        let err = tokenize("x == \"a\"").unwrap_err();
        assert_eq!(err.offset, 5);
    }

    #[test]
    fn unterminated_string() {
        assert!(tokenize("'abc").is_err());
    }

    #[test]
    fn single_equals_is_rejected() {
        assert!(tokenize("a = b").is_err());
    }
}
