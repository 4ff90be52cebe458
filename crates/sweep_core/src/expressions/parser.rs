use thiserror::Error;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::value::Scalar;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 13] = [
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">",
];

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        match ch {
            b'(' => {
                tokens.push((Token::LParen, start));
                pos += 1;
            }
            b')' => {
                tokens.push((Token::RParen, start));
                pos += 1;
            }
            b',' => {
                tokens.push((Token::Comma, start));
                pos += 1;
            }
            b'\'' | b'"' => {
                let close = source[start + 1..]
                    .find(ch as char)
                    .ok_or_else(|| ParseError::new("unterminated string literal", start))?;
                let text = &source[start + 1..start + 1 + close];
                tokens.push((Token::Str(text.to_string()), start));
                pos = start + close + 2;
            }
            b'0'..=b'9' | b'.' => {
                let (token, end) = lex_number(source, start)?;
                tokens.push((token, start));
                pos = end;
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                while pos < bytes.len() && (bytes[pos] == b'_' || bytes[pos].is_ascii_alphanumeric()) {
                    pos += 1;
                }
                tokens.push((Token::Ident(source[start..pos].to_string()), start));
            }
            _ => {
                let op = OPERATORS
                    .iter()
                    .find(|op| source[start..].starts_with(**op))
                    .ok_or_else(|| {
                        let found = source[start..].chars().next().unwrap_or_default();
                        ParseError::new(format!("unexpected character '{found}'"), start)
                    })?;
                tokens.push((Token::Op(op), start));
                pos += op.len();
            }
        }
    }

    Ok(tokens)
}

fn lex_number(source: &str, start: usize) -> Result<(Token, usize), ParseError> {
    let bytes = source.as_bytes();
    let mut pos = start;
    let mut is_float = false;

    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        is_float = true;
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut lookahead = pos + 1;
        if lookahead < bytes.len() && (bytes[lookahead] == b'+' || bytes[lookahead] == b'-') {
            lookahead += 1;
        }
        if lookahead < bytes.len() && bytes[lookahead].is_ascii_digit() {
            is_float = true;
            pos = lookahead;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }

    let text = &source[start..pos];
    if text == "." {
        return Err(ParseError::new("unexpected character '.'", start));
    }
    let token = if is_float {
        Token::Float(
            text.parse::<f64>()
                .map_err(|_| ParseError::new(format!("invalid number '{text}'"), start))?,
        )
    } else {
        Token::Int(
            text.parse::<i64>()
                .map_err(|_| ParseError::new(format!("integer literal '{text}' is too large"), start))?,
        )
    };
    Ok((token, pos))
}

/// Recursive-descent parser. Precedence from loosest to tightest:
/// comparison, `+ -`, `* / // %`, unary `+ -`, `**` (right associative).
struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(token, _)| token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat_op(&mut self, candidates: &[(&str, BinaryOp)]) -> Option<BinaryOp> {
        if let Some(Token::Op(op)) = self.peek() {
            if let Some((_, binary)) = candidates.iter().find(|(symbol, _)| symbol == op) {
                self.cursor += 1;
                return Some(*binary);
            }
        }
        None
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        const COMPARISONS: [(&str, BinaryOp); 6] = [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            ("<", BinaryOp::Lt),
            ("<=", BinaryOp::Le),
            (">", BinaryOp::Gt),
            (">=", BinaryOp::Ge),
        ];

        let lhs = self.additive()?;
        let Some(op) = self.eat_op(&COMPARISONS) else {
            return Ok(lhs);
        };
        let rhs = self.additive()?;
        if self.eat_op(&COMPARISONS).is_some() {
            return Err(ParseError::new(
                "chained comparisons are not supported",
                self.offset(),
            ));
        }
        Ok(binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        while let Some(op) = self.eat_op(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)]) {
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&[
            ("*", BinaryOp::Mul),
            ("/", BinaryOp::Div),
            ("//", BinaryOp::FloorDiv),
            ("%", BinaryOp::Mod),
        ]) {
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Op("-")) => UnaryOp::Neg,
            Some(Token::Op("+")) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.cursor += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.eat_op(&[("**", BinaryOp::Pow)]).is_some() {
            // The exponent may itself carry a sign: 2 ** -1.
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Int(value)) => Ok(Expr::Literal(Scalar::Int(value))),
            Some(Token::Float(value)) => Ok(Expr::Literal(Scalar::Float(value))),
            Some(Token::Str(value)) => Ok(Expr::Literal(Scalar::Str(value))),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.cursor += 1;
                    let args = self.arguments()?;
                    Ok(Expr::Call {
                        function: name,
                        args,
                    })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(token) => Err(ParseError::new(
                format!("unexpected {}", describe(&token)),
                offset,
            )),
            None => Err(ParseError::new("unexpected end of expression", offset)),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.cursor += 1;
            return Ok(args);
        }
        loop {
            args.push(self.comparison()?);
            match self.peek() {
                Some(Token::Comma) => self.cursor += 1,
                _ => break,
            }
        }
        self.expect_rparen()?;
        Ok(args)
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::RParen) => Ok(()),
            Some(token) => Err(ParseError::new(
                format!("expected ')' but found {}", describe(&token)),
                offset,
            )),
            None => Err(ParseError::new("expected ')'", offset)),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(value) => format!("number {value}"),
        Token::Float(value) => format!("number {value}"),
        Token::Str(value) => format!("string '{value}'"),
        Token::Ident(name) => format!("name '{name}'"),
        Token::Op(op) => format!("operator '{op}'"),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

/// Parse an expression in the restricted formula language.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::new("empty expression", 0));
    }

    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: source.len(),
    };
    let expr = parser.comparison()?;
    if let Some(token) = parser.peek() {
        return Err(ParseError::new(
            format!("unexpected {}", describe(token)),
            parser.offset(),
        ));
    }
    Ok(expr)
}
