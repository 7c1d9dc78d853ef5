// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Constrained template expression language.
//!
//! The documented, side-effect-free subset: variable substitution with
//! dotted attribute access, the filters `default`, `length`, `join`,
//! `upper`, `lower`, comparisons, and `and`/`or`/`not`. Anything beyond
//! that is rejected at parse time, not silently ignored.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    Undefined(String),
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unknown filter: {0}")]
    UnknownFilter(String),
    #[error("filter {filter} expects {expected}")]
    FilterArgs { filter: &'static str, expected: &'static str },
    #[error("cannot compare {0} with {1}")]
    TypeMismatch(&'static str, &'static str),
    #[error("empty expression")]
    Empty,
}

/// Evaluation context: run parameters plus the system namespace.
#[derive(Debug, Clone, Default)]
pub struct Context {
    root: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Merge a JSON object's entries at the top level.
    pub fn extend_object(&mut self, object: &serde_json::Map<String, Value>) {
        for (k, v) in object {
            self.root.insert(k.clone(), v.clone());
        }
    }

    fn lookup(&self, path: &[String]) -> Option<Value> {
        let mut current = self.root.get(path.first()?)?;
        for segment in &path[1..] {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Dot,
    Pipe,
    Comma,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut out = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(EvalError::UnterminatedString),
                        Some('\\') => {
                            if let Some(&next) = chars.get(i + 1) {
                                out.push(next);
                                i += 2;
                            } else {
                                return Err(EvalError::UnterminatedString);
                            }
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            out.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(out));
            }
            '-' if chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                let (num, next) = lex_number(&chars, i + 1)?;
                tokens.push(Token::Number(-num));
                i = next;
            }
            c if c.is_ascii_digit() => {
                let (num, next) = lex_number(&chars, i)?;
                tokens.push(Token::Number(num));
                i = next;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(EvalError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

fn lex_number(chars: &[char], start: usize) -> Result<(f64, usize), EvalError> {
    let mut i = start;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    let text: String = chars[start..i].iter().collect();
    text.parse::<f64>().map(|n| (n, i)).map_err(|_| EvalError::UnexpectedToken(text))
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Filter { input: Box<Expr>, name: String, args: Vec<Expr> },
    Cmp { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Comparison operators of the documented subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.peek_keyword("not") {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_pipeline()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_pipeline()?;
        Ok(Expr::Cmp { op, left: Box::new(left), right: Box::new(right) })
    }

    fn parse_pipeline(&mut self) -> Result<Expr, EvalError> {
        let mut input = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.pos += 1;
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(EvalError::UnexpectedToken(format!("{:?}", other))),
            };
            let mut args = Vec::new();
            if matches!(self.peek(), Some(Token::LParen)) {
                self.pos += 1;
                if !matches!(self.peek(), Some(Token::RParen)) {
                    loop {
                        args.push(self.parse_expr()?);
                        match self.next() {
                            Some(Token::Comma) => continue,
                            Some(Token::RParen) => break,
                            other => {
                                return Err(EvalError::UnexpectedToken(format!("{:?}", other)))
                            }
                        }
                    }
                } else {
                    self.pos += 1;
                }
            }
            input = Expr::Filter { input: Box::new(input), name, args };
        }
        Ok(input)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(EvalError::UnexpectedToken(format!("{:?}", other))),
                }
            }
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "none" => Ok(Expr::Literal(Value::Null)),
                _ => {
                    let mut path = vec![word];
                    while matches!(self.peek(), Some(Token::Dot)) {
                        self.pos += 1;
                        match self.next() {
                            Some(Token::Ident(segment)) => path.push(segment),
                            other => {
                                return Err(EvalError::UnexpectedToken(format!("{:?}", other)))
                            }
                        }
                    }
                    Ok(Expr::Path(path))
                }
            },
            other => Err(EvalError::UnexpectedToken(format!("{:?}", other))),
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Parse an expression in the documented subset.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = lex(input)?;
    if tokens.is_empty() {
        return Err(EvalError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EvalError::UnexpectedToken(format!("{:?}", parser.tokens[parser.pos])));
    }
    Ok(expr)
}

/// Evaluation result that keeps "undefined" distinct so the `default`
/// filter can absorb it. Undefined escaping any other way is an error
/// (strict undefined).
enum Evaluated {
    Defined(Value),
    Undefined(String),
}

impl Evaluated {
    fn require(self) -> Result<Value, EvalError> {
        match self {
            Evaluated::Defined(v) => Ok(v),
            Evaluated::Undefined(path) => Err(EvalError::Undefined(path)),
        }
    }
}

impl Expr {
    /// Evaluate to a value; undefined variables raise unless absorbed by
    /// a `default` filter.
    pub fn eval(&self, ctx: &Context) -> Result<Value, EvalError> {
        self.eval_inner(ctx)?.require()
    }

    fn eval_inner(&self, ctx: &Context) -> Result<Evaluated, EvalError> {
        match self {
            Expr::Literal(v) => Ok(Evaluated::Defined(v.clone())),
            Expr::Path(path) => match ctx.lookup(path) {
                Some(v) => Ok(Evaluated::Defined(v)),
                None => Ok(Evaluated::Undefined(path.join("."))),
            },
            Expr::Filter { input, name, args } => {
                let input = input.eval_inner(ctx)?;
                apply_filter(name, input, args, ctx)
            }
            Expr::Cmp { op, left, right } => {
                let left = left.eval_inner(ctx)?.require()?;
                let right = right.eval_inner(ctx)?.require()?;
                Ok(Evaluated::Defined(Value::Bool(compare(*op, &left, &right)?)))
            }
            Expr::And(a, b) => {
                let left = a.eval_inner(ctx)?.require()?;
                if !truthy(&left) {
                    return Ok(Evaluated::Defined(Value::Bool(false)));
                }
                let right = b.eval_inner(ctx)?.require()?;
                Ok(Evaluated::Defined(Value::Bool(truthy(&right))))
            }
            Expr::Or(a, b) => {
                let left = a.eval_inner(ctx)?.require()?;
                if truthy(&left) {
                    return Ok(Evaluated::Defined(Value::Bool(true)));
                }
                let right = b.eval_inner(ctx)?.require()?;
                Ok(Evaluated::Defined(Value::Bool(truthy(&right))))
            }
            Expr::Not(inner) => {
                let value = inner.eval_inner(ctx)?.require()?;
                Ok(Evaluated::Defined(Value::Bool(!truthy(&value))))
            }
        }
    }
}

fn apply_filter(
    name: &str,
    input: Evaluated,
    args: &[Expr],
    ctx: &Context,
) -> Result<Evaluated, EvalError> {
    match name {
        "default" => {
            let [fallback] = args else {
                return Err(EvalError::FilterArgs { filter: "default", expected: "one argument" });
            };
            match input {
                Evaluated::Undefined(_) | Evaluated::Defined(Value::Null) => {
                    Ok(Evaluated::Defined(fallback.eval_inner(ctx)?.require()?))
                }
                defined => Ok(defined),
            }
        }
        "length" => {
            let value = input.require()?;
            let len = match &value {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => {
                    return Err(EvalError::FilterArgs {
                        filter: "length",
                        expected: "a string, array, or object",
                    })
                }
            };
            Ok(Evaluated::Defined(Value::from(len as u64)))
        }
        "join" => {
            let [sep] = args else {
                return Err(EvalError::FilterArgs { filter: "join", expected: "one argument" });
            };
            let sep = match sep.eval_inner(ctx)?.require()? {
                Value::String(s) => s,
                _ => {
                    return Err(EvalError::FilterArgs {
                        filter: "join",
                        expected: "a string separator",
                    })
                }
            };
            let items = match input.require()? {
                Value::Array(items) => items,
                _ => return Err(EvalError::FilterArgs { filter: "join", expected: "an array" }),
            };
            let parts: Vec<String> = items.iter().map(stringify).collect();
            Ok(Evaluated::Defined(Value::String(parts.join(&sep))))
        }
        "upper" => match input.require()? {
            Value::String(s) => Ok(Evaluated::Defined(Value::String(s.to_uppercase()))),
            _ => Err(EvalError::FilterArgs { filter: "upper", expected: "a string" }),
        },
        "lower" => match input.require()? {
            Value::String(s) => Ok(Evaluated::Defined(Value::String(s.to_lowercase()))),
            _ => Err(EvalError::FilterArgs { filter: "lower", expected: "a string" }),
        },
        other => Err(EvalError::UnknownFilter(other.to_string())),
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        let eq = match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        };
        return Ok(if matches!(op, CmpOp::Eq) { eq } else { !eq });
    }
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => {
                a.partial_cmp(&b).ok_or(EvalError::TypeMismatch("number", "number"))?
            }
            _ => return Err(EvalError::TypeMismatch(type_name(left), type_name(right))),
        },
    };
    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Jinja-style truthiness for the documented subset.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Render a value into template output.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse and evaluate a boolean condition expression.
pub fn evaluate_bool(input: &str, ctx: &Context) -> Result<bool, EvalError> {
    let expr = parse(input)?;
    Ok(truthy(&expr.eval(ctx)?))
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
