//! # Field Expressions
//!
//! Sandboxed arithmetic over `TYPE.field` references.
//!
//! A field expression names one scalar value, either a bare reference such as
//! `VFR_HUD.airspeed` or arithmetic combining several references and numeric
//! literals, e.g. `SYS_STATUS.current_battery / 100 * SYS_STATUS.voltage_battery / 1000`.
//!
//! ## Grammar
//!
//! ```text
//! expr      := term (('+' | '-') term)*
//! term      := unary (('*' | '/') unary)*
//! unary     := '-' unary | primary
//! primary   := NUMBER | REFERENCE | '(' expr ')'
//! REFERENCE := TYPE '.' FIELD
//! TYPE      := [A-Z_][A-Z0-9_]*
//! FIELD     := [A-Za-z_][A-Za-z0-9_]*
//! ```
//!
//! Evaluation reads the latest message of each referenced type from a
//! [`MessageSnapshot`]; the referenced types do not need to have arrived
//! together.
//!
//! ## Usage
//!
//! ```
//! use flight_testpilot::telemetry::{Message, MessageSnapshot};
//! use flight_testpilot::telemetry::expression::FieldExpression;
//!
//! let expr = FieldExpression::parse("SYS_STATUS.voltage_battery / 1000").unwrap();
//! assert!(expr.depends_on("SYS_STATUS"));
//!
//! let mut snapshot = MessageSnapshot::new();
//! snapshot.update(Message::new("SYS_STATUS").with_field("voltage_battery", 12600.0));
//! assert!((expr.evaluate(&snapshot).unwrap() - 12.6).abs() < 1e-9);
//! ```

use std::collections::BTreeSet;
use std::fmt;

use super::MessageSnapshot;
use crate::error::{Result, TestPilotError};

/// Deepest allowed nesting of parentheses and unary minus.
pub const MAX_NESTING: usize = 256;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// `TYPE.field` reference into the snapshot
    Reference { msg_type: String, field: String },
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn collect_dependencies(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference { msg_type, .. } => {
                out.insert(msg_type.clone());
            }
            Expr::Neg(inner) => inner.collect_dependencies(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_dependencies(out);
                rhs.collect_dependencies(out);
            }
        }
    }

    fn eval(&self, snapshot: &MessageSnapshot) -> Result<f64> {
        match self {
            Expr::Number(value) => Ok(*value),
            Expr::Reference { msg_type, field } => {
                let msg = snapshot
                    .latest(msg_type)
                    .ok_or_else(|| TestPilotError::MissingDependency(msg_type.clone()))?;
                msg.field(field).ok_or_else(|| TestPilotError::UnknownField {
                    msg_type: msg_type.clone(),
                    field: field.clone(),
                })
            }
            Expr::Neg(inner) => Ok(-inner.eval(snapshot)?),
            Expr::Binary { op, lhs, rhs } => {
                let a = lhs.eval(snapshot)?;
                let b = rhs.eval(snapshot)?;
                match op {
                    BinaryOp::Add => Ok(a + b),
                    BinaryOp::Sub => Ok(a - b),
                    BinaryOp::Mul => Ok(a * b),
                    BinaryOp::Div => {
                        if b == 0.0 {
                            return Err(TestPilotError::DivisionByZero(format!("{} / 0", a)));
                        }
                        Ok(a / b)
                    }
                }
            }
        }
    }
}

/// A parsed field expression with its dependency set.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExpression {
    source: String,
    expr: Expr,
    dependencies: BTreeSet<String>,
}

impl FieldExpression {
    /// Parses an expression.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionParse` if the text does not match the grammar.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(|reason| parse_error(source, reason))?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr().map_err(|reason| parse_error(source, reason))?;
        if parser.pos != tokens.len() {
            return Err(parse_error(
                source,
                format!("unexpected {} after end of expression", tokens[parser.pos]),
            ));
        }

        let mut dependencies = BTreeSet::new();
        expr.collect_dependencies(&mut dependencies);

        Ok(Self {
            source: source.to_string(),
            expr,
            dependencies,
        })
    }

    /// Source expression text, used as the column header.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed expression tree.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Message types referenced anywhere in the expression.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Returns true if the expression references `msg_type`.
    #[must_use]
    pub fn depends_on(&self, msg_type: &str) -> bool {
        self.dependencies.contains(msg_type)
    }

    /// Evaluates the expression against the latest messages.
    ///
    /// # Errors
    ///
    /// - `MissingDependency` if a referenced type has never been observed
    /// - `UnknownField` if the latest message lacks a referenced field
    /// - `DivisionByZero` if a divisor evaluates to zero
    pub fn evaluate(&self, snapshot: &MessageSnapshot) -> Result<f64> {
        self.expr.eval(snapshot)
    }
}

impl fmt::Display for FieldExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_error(source: &str, reason: String) -> TestPilotError {
    TestPilotError::ExpressionParse {
        expression: source.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Reference { msg_type: String, field: String },
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Reference { msg_type, field } => write!(f, "'{}.{}'", msg_type, field),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Message type names: uppercase-led, then uppercase, digits or underscores.
fn is_message_type(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {
            chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    }
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(is_ident_char),
        _ => false,
    }
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
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
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(value));
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let msg_type: String = chars[start..i].iter().collect();
                if i >= chars.len() || chars[i] != '.' {
                    return Err(format!("'{}' is not a TYPE.field reference", msg_type));
                }
                i += 1;
                let field_start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let field: String = chars[field_start..i].iter().collect();
                if !is_message_type(&msg_type) {
                    return Err(format!("'{}' is not a message type name", msg_type));
                }
                if !is_field_name(&field) {
                    return Err(format!("missing or invalid field name after '{}.'", msg_type));
                }
                tokens.push(Token::Reference { msg_type, field });
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    fn expr(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> std::result::Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> std::result::Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.pos += 1;
            self.descend()?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> std::result::Result<Expr, String> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(*value)),
            Some(Token::Reference { msg_type, field }) => Ok(Expr::Reference {
                msg_type: msg_type.clone(),
                field: field.clone(),
            }),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(format!("expected ')', found {}", other)),
                    None => Err("unclosed '('".to_string()),
                }
            }
            Some(other) => Err(format!("unexpected {}", other)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
