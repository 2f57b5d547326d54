//! Recursive-descent parser for definition text.

use super::{BinaryOp, Expr, UnaryOp};

/// Syntax error with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse error at {position}: {message}")]
pub struct ParseError {
    /// Byte offset in the source text.
    pub position: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self { position, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Text(String),
    Undefined,
    Op(&'static str),
}

const OPERATORS: [&str; 20] = [
    "==", "!=", "<=", ">=", "&&", "||", "=", "<", ">", "!", "+", "-", "*", "/", "^", "(", ")",
    ",", "[", "]",
];

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '\'' | '{' | '}')
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < src.len() {
        let rest = &src[pos..];
        let c = match rest.chars().next() {
            Some(c) => c,
            None => break,
        };
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }
        let start = pos;
        if c.is_ascii_digit() || (c == '.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            let mut end = pos;
            while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
                end += 1;
            }
            if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
                let mut exp = end + 1;
                if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
                    exp += 1;
                }
                if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                    while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                        exp += 1;
                    }
                    end = exp;
                }
            }
            let text = &src[pos..end];
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::new(start, format!("invalid number '{}'", text)))?;
            tokens.push((start, Token::Number(value)));
            pos = end;
        } else if is_ident_start(c) {
            let len: usize = rest
                .chars()
                .take_while(|&ch| is_ident_continue(ch))
                .map(char::len_utf8)
                .sum();
            tokens.push((start, Token::Ident(rest[..len].to_string())));
            pos += len;
        } else if c == '"' {
            let mut text = String::new();
            let mut chars = rest.char_indices().skip(1);
            let mut closed = None;
            while let Some((i, ch)) = chars.next() {
                match ch {
                    '"' => {
                        closed = Some(i + 1);
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, other)) => text.push(other),
                        None => break,
                    },
                    other => text.push(other),
                }
            }
            let len = closed.ok_or_else(|| ParseError::new(start, "unterminated text"))?;
            tokens.push((start, Token::Text(text)));
            pos += len;
        } else if c == '?' {
            tokens.push((start, Token::Undefined));
            pos += 1;
        } else {
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| ParseError::new(start, format!("unexpected character '{}'", c)))?;
            tokens.push((start, Token::Op(op)));
            pos += op.len();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    end: usize,
}

impl Parser {
    fn new(src: &str) -> Result<Self, ParseError> {
        Ok(Self { tokens: tokenize(src)?, index: 0, end: src.len() })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.index).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, t)| t.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &str) -> Result<(), ParseError> {
        if self.eat(op) {
            Ok(())
        } else {
            Err(ParseError::new(self.position(), format!("expected '{}'", op)))
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        if self.index < self.tokens.len() {
            Err(ParseError::new(self.position(), "unexpected trailing input"))
        } else {
            Ok(())
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or()
    }

    fn binary_level<F>(&mut self, ops: &[(&str, BinaryOp)], mut next: F) -> Result<Expr, ParseError>
    where
        F: FnMut(&mut Self) -> Result<Expr, ParseError>,
    {
        let mut lhs = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat(symbol) {
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("||", BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("&&", BinaryOp::And)], Self::comparison)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("*", BinaryOp::Mul), ("/", BinaryOp::Div)], Self::unary)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat("-") {
            return Ok(match self.unary()? {
                Expr::Number(n) => Expr::Number(-n),
                operand => Expr::Unary(UnaryOp::Neg, Box::new(operand)),
            });
        }
        if self.eat("!") {
            let operand = self.unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat("^") {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn arguments(&mut self, close: &str) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.eat(close) {
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.eat(close) {
                return Ok(args);
            }
            self.expect(",")?;
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position();
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Undefined) => Ok(Expr::Number(f64::NAN)),
            Some(Token::Text(t)) => Ok(Expr::Text(t)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ if self.eat("(") || self.eat("[") => {
                    let close = match self.tokens.get(self.index - 1) {
                        Some((_, Token::Op("["))) => "]",
                        _ => ")",
                    };
                    Ok(Expr::Call(name, self.arguments(close)?))
                }
                _ => Ok(Expr::Ident(name)),
            },
            Some(Token::Op("(")) => {
                let first = self.expression()?;
                if self.eat(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(",") {
                    items.push(self.expression()?);
                }
                self.expect(")")?;
                if items.len() > 3 {
                    return Err(ParseError::new(position, "tuples have two or three coordinates"));
                }
                Ok(Expr::Tuple(items))
            }
            Some(_) => Err(ParseError::new(position, "unexpected token")),
            None => Err(ParseError::new(position, "unexpected end of input")),
        }
    }
}

/// Parse an expression.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src)?;
    let expr = parser.expression()?;
    parser.finish()?;
    Ok(expr)
}

/// Parse a command of the form `label = expression` or a bare expression.
pub fn parse_command(src: &str) -> Result<(Option<String>, Expr), ParseError> {
    let mut parser = Parser::new(src)?;
    let label = match (parser.tokens.first(), parser.tokens.get(1)) {
        (Some((_, Token::Ident(name))), Some((_, Token::Op("=")))) => {
            let name = name.clone();
            parser.index = 2;
            Some(name)
        }
        _ => None,
    };
    let expr = parser.expression()?;
    parser.finish()?;
    Ok((label, expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    fn ident(s: &str) -> Box<Expr> {
        Box::new(Expr::Ident(s.to_string()))
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse("a + 2 * b").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                ident("a"),
                Box::new(Expr::Binary(BinaryOp::Mul, num(2.0), ident("b")))
            )
        );
    }

    #[test]
    fn test_power_binds_tighter_than_negation() {
        assert_eq!(
            parse("-a^2").unwrap(),
            Expr::Unary(UnaryOp::Neg, Box::new(Expr::Binary(BinaryOp::Pow, ident("a"), num(2.0))))
        );
    }

    #[test]
    fn test_negative_literal_folds() {
        assert_eq!(parse("-3").unwrap(), Expr::Number(-3.0));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse("1e-3").unwrap(), Expr::Number(0.001));
        assert_eq!(parse(".5").unwrap(), Expr::Number(0.5));
        assert!(matches!(parse("?").unwrap(), Expr::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_tuples_and_calls() {
        assert_eq!(
            parse("(1, 2)").unwrap(),
            Expr::Tuple(vec![Expr::Number(1.0), Expr::Number(2.0)])
        );
        assert_eq!(
            parse("Midpoint[A, B]").unwrap(),
            Expr::Call("Midpoint".to_string(), vec![Expr::Ident("A".into()), Expr::Ident("B".into())])
        );
        assert!(parse("(1, 2, 3, 4)").is_err());
    }

    #[test]
    fn test_labels_with_subscripts() {
        assert_eq!(parse("A_{12}").unwrap(), Expr::Ident("A_{12}".to_string()));
        assert_eq!(parse("A'").unwrap(), Expr::Ident("A'".to_string()));
        assert_eq!(parse("$B$2").unwrap(), Expr::Ident("$B$2".to_string()));
    }

    #[test]
    fn test_text_escapes() {
        assert_eq!(parse(r#""a\"b\\c""#).unwrap(), Expr::Text("a\"b\\c".to_string()));
        assert!(parse("\"open").is_err());
    }

    #[test]
    fn test_command() {
        let (label, expr) = parse_command("b = a + 1").unwrap();
        assert_eq!(label.as_deref(), Some("b"));
        assert_eq!(expr, Expr::Binary(BinaryOp::Add, ident("a"), num(1.0)));

        let (label, _) = parse_command("a == 1").unwrap();
        assert_eq!(label, None);
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse("a + * b").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(parse("a b").is_err());
    }
}
