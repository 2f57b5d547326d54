//! Defining expressions of construction elements.
//!
//! Every dependent element is computed from an [`Expr`]. Expressions are
//! parsed from text, printed back to canonical text (which is what snapshots
//! store) and evaluated against the values of other elements.
//!
//! ## Precedence
//!
//! From loosest to tightest: `||`, `&&`, comparisons, `+ -`, `* /`,
//! unary `- !`, then `^` (right associative).

pub mod parser;
pub mod eval;

use std::fmt;

use crate::types::geo::{number_literal, quote_text};

pub use eval::{evaluate, EvalEnv, EvalError, Scope};
pub use parser::{parse, parse_command, ParseError};

/// Prefix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Infix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl BinaryOp {
    /// Operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge => 3,
            Self::Add | Self::Sub => 4,
            Self::Mul | Self::Div => 5,
            Self::Pow => POW_PREC,
        }
    }
}

const UNARY_PREC: u8 = 6;
const POW_PREC: u8 = 7;
const ATOM_PREC: u8 = 8;

/// Parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number literal; NaN prints as `?`.
    Number(f64),
    /// Boolean literal.
    Bool(bool),
    /// Text literal.
    Text(String),
    /// Reference to an element label or a named constant.
    Ident(String),
    /// `(x, y)` or `(x, y, z)`.
    Tuple(Vec<Expr>),
    /// Prefix operation.
    Unary(UnaryOp, Box<Expr>),
    /// Infix operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Built-in function or macro invocation.
    Call(String, Vec<Expr>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Self::Number(n) if *n < 0.0 || (*n == 0.0 && n.is_sign_negative()) => UNARY_PREC,
            Self::Unary(..) => UNARY_PREC,
            Self::Binary(op, ..) => op.precedence(),
            _ => ATOM_PREC,
        }
    }

    /// Labels referenced by this expression, in order of first appearance.
    ///
    /// Call names are not references; see [`Expr::calls`].
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Self::Ident(name) = e {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }

    /// Names of the functions and macros invoked, in order of first appearance.
    pub fn calls(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Self::Call(name, _) = e {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
        });
        out
    }

    /// Whether the expression references no label.
    pub fn is_constant(&self) -> bool {
        self.references().is_empty() && self.calls().iter().all(|c| eval::is_builtin(c))
    }

    fn walk<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Self::Tuple(items) | Self::Call(_, items) => {
                for item in items {
                    item.walk(f);
                }
            }
            Self::Unary(_, operand) => operand.walk(f),
            Self::Binary(_, lhs, rhs) => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Self::Number(_) | Self::Bool(_) | Self::Text(_) | Self::Ident(_) => {}
        }
    }
}

fn write_child(f: &mut fmt::Formatter<'_>, child: &Expr, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&number_literal(*n)),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(t) => f.write_str(&quote_text(t)),
            Self::Ident(name) => f.write_str(name),
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Self::Call(name, args) => {
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Unary(op, operand) => {
                f.write_str(match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                })?;
                write_child(f, operand, operand.precedence() < UNARY_PREC)
            }
            Self::Binary(BinaryOp::Pow, lhs, rhs) => {
                write_child(f, lhs, lhs.precedence() < ATOM_PREC)?;
                f.write_str("^")?;
                write_child(f, rhs, rhs.precedence() < UNARY_PREC)
            }
            Self::Binary(op, lhs, rhs) => {
                let p = op.precedence();
                write_child(f, lhs, lhs.precedence() < p)?;
                write!(f, " {} ", op.symbol())?;
                write_child(f, rhs, rhs.precedence() <= p)
            }
        }
    }
}
