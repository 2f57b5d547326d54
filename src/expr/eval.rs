//! Expression evaluation against element values.

use std::f64::consts::{E, PI};
use std::sync::Arc;

use super::{BinaryOp, Expr, UnaryOp};
use crate::defaults::ConstructionDefaults;
use crate::types::{GeoKind, GeoValue, MacroLibrary};

/// Tolerance for numeric equality.
pub const EPSILON: f64 = 1e-8;

/// Source of element values during evaluation.
pub trait Scope {
    /// Current value of the element with this label.
    fn value_of(&self, label: &str) -> Option<&GeoValue>;
}

/// Evaluation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Reference to a label with no element.
    #[error("Unknown label: {0}")]
    UnknownLabel(String),
    /// Call to a name that is neither built in nor a macro.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    /// Wrong number of arguments.
    #[error("{function} expects {expected} argument(s), got {found}")]
    Arity {
        /// Function name.
        function: String,
        /// Expected count.
        expected: usize,
        /// Actual count.
        found: usize,
    },
    /// Operator applied to values it does not support.
    #[error("Cannot apply {op} to {operands}")]
    TypeMismatch {
        /// Operator or function.
        op: String,
        /// Description of the operand kinds.
        operands: String,
    },
    /// Value does not fit the element kind.
    #[error("Expected a {expected}, got a {found}")]
    KindMismatch {
        /// Kind of the element.
        expected: GeoKind,
        /// Kind of the computed value.
        found: GeoKind,
    },
    /// Macro nesting exceeded the configured depth.
    #[error("Macro recursion limit reached in {0}")]
    MacroRecursion(String),
    /// Macro body failed to build.
    #[error("Macro {name} failed: {reason}")]
    Macro {
        /// Macro name.
        name: String,
        /// Failure inside the body.
        reason: String,
    },
    /// Feature outside the supported language.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Everything evaluation needs besides element values.
#[derive(Debug, Clone, Copy)]
pub struct EvalEnv<'a> {
    /// Macros callable from expressions.
    pub macros: &'a MacroLibrary,
    /// Defaults shared with macro sub-constructions.
    pub defaults: &'a Arc<ConstructionDefaults>,
    /// Current macro nesting depth.
    pub depth: usize,
    /// Maximum macro nesting depth.
    pub max_depth: usize,
}

impl<'a> EvalEnv<'a> {
    /// Environment for a top-level construction.
    pub fn new(macros: &'a MacroLibrary, defaults: &'a Arc<ConstructionDefaults>, max_depth: usize) -> Self {
        Self { macros, defaults, depth: 0, max_depth }
    }

    /// Environment for a macro body one level deeper.
    pub fn nested(&self, macros: &'a MacroLibrary) -> Self {
        Self { macros, depth: self.depth + 1, ..*self }
    }
}

#[derive(Debug, Clone, Copy)]
enum Builtin {
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    X,
    Y,
    Z,
    Length,
    If,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "exp" => Self::Exp,
            "ln" => Self::Ln,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "x" => Self::X,
            "y" => Self::Y,
            "z" => Self::Z,
            "length" => Self::Length,
            "If" => Self::If,
            _ => return None,
        })
    }
}

/// Whether `name` is a built-in function.
pub fn is_builtin(name: &str) -> bool {
    Builtin::lookup(name).is_some()
}

fn describe(value: &GeoValue) -> &'static str {
    value.natural_kind().type_name()
}

fn mismatch(op: &str, values: &[&GeoValue]) -> EvalError {
    EvalError::TypeMismatch {
        op: op.to_string(),
        operands: values.iter().map(|v| describe(v)).collect::<Vec<_>>().join(" and "),
    }
}

/// Coordinates of a point-like value: (is_point, xyz, is_3d).
fn coords(value: &GeoValue) -> Option<(bool, [f64; 3], bool)> {
    match value {
        GeoValue::Point([x, y]) => Some((true, [*x, *y, 0.0], false)),
        GeoValue::Vector([x, y]) => Some((false, [*x, *y, 0.0], false)),
        GeoValue::Point3D(c) => Some((true, *c, true)),
        _ => None,
    }
}

fn from_coords(is_point: bool, c: [f64; 3], is_3d: bool) -> GeoValue {
    if is_3d {
        GeoValue::Point3D(c)
    } else if is_point {
        GeoValue::Point([c[0], c[1]])
    } else {
        GeoValue::Vector([c[0], c[1]])
    }
}

fn number(op: &str, value: &GeoValue) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| mismatch(op, &[value]))
}

fn boolean(op: &str, value: &GeoValue) -> Result<bool, EvalError> {
    value.as_bool().ok_or_else(|| mismatch(op, &[value]))
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON || a == b
}

fn values_equal(a: &GeoValue, b: &GeoValue) -> Result<bool, EvalError> {
    match (a, b) {
        (GeoValue::Number(x), GeoValue::Number(y)) => Ok(approx_eq(*x, *y)),
        (GeoValue::Boolean(x), GeoValue::Boolean(y)) => Ok(x == y),
        (GeoValue::Text(x), GeoValue::Text(y)) => Ok(x == y),
        _ => match (coords(a), coords(b)) {
            (Some((_, p, _)), Some((_, q, _))) => Ok(p.iter().zip(q.iter()).all(|(x, y)| approx_eq(*x, *y))),
            _ => Err(mismatch("==", &[a, b])),
        },
    }
}

fn binary(op: BinaryOp, lhs: GeoValue, rhs: GeoValue) -> Result<GeoValue, EvalError> {
    use GeoValue::*;

    if op == BinaryOp::Add {
        match (&lhs, &rhs) {
            (Text(a), other) => return Ok(Text(format!("{}{}", a, other))),
            (other, Text(b)) => return Ok(Text(format!("{}{}", other, b))),
            _ => {}
        }
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub => {
            let sign = if op == BinaryOp::Add { 1.0 } else { -1.0 };
            if let (Number(a), Number(b)) = (&lhs, &rhs) {
                return Ok(Number(a + sign * b));
            }
            match (coords(&lhs), coords(&rhs)) {
                (Some((pa, a, da)), Some((pb, b, db))) => Ok(from_coords(
                    pa || pb,
                    [a[0] + sign * b[0], a[1] + sign * b[1], a[2] + sign * b[2]],
                    da || db,
                )),
                _ => Err(mismatch(op.symbol(), &[&lhs, &rhs])),
            }
        }
        BinaryOp::Mul => match (&lhs, &rhs) {
            (Number(a), Number(b)) => Ok(Number(a * b)),
            (Number(k), v) | (v, Number(k)) => match coords(v) {
                Some((p, c, d)) => Ok(from_coords(p, [c[0] * k, c[1] * k, c[2] * k], d)),
                None => Err(mismatch("*", &[&lhs, &rhs])),
            },
            _ => match (coords(&lhs), coords(&rhs)) {
                (Some((_, a, _)), Some((_, b, _))) => Ok(Number(a[0] * b[0] + a[1] * b[1] + a[2] * b[2])),
                _ => Err(mismatch("*", &[&lhs, &rhs])),
            },
        },
        BinaryOp::Div => match (&lhs, &rhs) {
            (Number(a), Number(b)) => Ok(Number(a / b)),
            (v, Number(k)) => match coords(v) {
                Some((p, c, d)) => Ok(from_coords(p, [c[0] / k, c[1] / k, c[2] / k], d)),
                None => Err(mismatch("/", &[&lhs, &rhs])),
            },
            _ => Err(mismatch("/", &[&lhs, &rhs])),
        },
        BinaryOp::Pow => Ok(Number(number("^", &lhs)?.powf(number("^", &rhs)?))),
        BinaryOp::Eq => Ok(Boolean(values_equal(&lhs, &rhs)?)),
        BinaryOp::Ne => Ok(Boolean(!values_equal(&lhs, &rhs)?)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (a, b) = match (&lhs, &rhs) {
                (Number(a), Number(b)) => (*a, *b),
                _ => return Err(mismatch(op.symbol(), &[&lhs, &rhs])),
            };
            Ok(Boolean(match op {
                BinaryOp::Lt => a < b - EPSILON,
                BinaryOp::Le => a <= b + EPSILON,
                BinaryOp::Gt => a > b + EPSILON,
                _ => a >= b - EPSILON,
            }))
        }
        BinaryOp::And | BinaryOp::Or => {
            let a = boolean(op.symbol(), &lhs)?;
            let b = boolean(op.symbol(), &rhs)?;
            Ok(Boolean(if op == BinaryOp::And { a && b } else { a || b }))
        }
    }
}

fn unary_math(name: &str, args: &[GeoValue], f: fn(f64) -> f64) -> Result<GeoValue, EvalError> {
    Ok(GeoValue::Number(f(number(name, &args[0])?)))
}

fn call_builtin(name: &str, builtin: Builtin, args: &[GeoValue]) -> Result<GeoValue, EvalError> {
    let expected = match builtin {
        Builtin::Min | Builtin::Max => 2,
        Builtin::If => 3,
        _ => 1,
    };
    if args.len() != expected {
        return Err(EvalError::Arity { function: name.to_string(), expected, found: args.len() });
    }
    match builtin {
        Builtin::Sqrt => unary_math(name, args, f64::sqrt),
        Builtin::Abs => match coords(&args[0]) {
            Some((_, c, _)) => Ok(GeoValue::Number((c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt())),
            None => unary_math(name, args, f64::abs),
        },
        Builtin::Sin => unary_math(name, args, f64::sin),
        Builtin::Cos => unary_math(name, args, f64::cos),
        Builtin::Tan => unary_math(name, args, f64::tan),
        Builtin::Exp => unary_math(name, args, f64::exp),
        Builtin::Ln => unary_math(name, args, f64::ln),
        Builtin::Floor => unary_math(name, args, f64::floor),
        Builtin::Ceil => unary_math(name, args, f64::ceil),
        Builtin::Round => unary_math(name, args, f64::round),
        Builtin::Min => Ok(GeoValue::Number(number(name, &args[0])?.min(number(name, &args[1])?))),
        Builtin::Max => Ok(GeoValue::Number(number(name, &args[0])?.max(number(name, &args[1])?))),
        Builtin::X | Builtin::Y | Builtin::Z => {
            let axis = match builtin {
                Builtin::X => 0,
                Builtin::Y => 1,
                _ => 2,
            };
            coords(&args[0])
                .map(|(_, c, _)| GeoValue::Number(c[axis]))
                .ok_or_else(|| mismatch(name, &[&args[0]]))
        }
        Builtin::Length => match &args[0] {
            GeoValue::Text(t) => Ok(GeoValue::Number(t.chars().count() as f64)),
            other => coords(other)
                .map(|(_, c, _)| GeoValue::Number((c[0] * c[0] + c[1] * c[1] + c[2] * c[2]).sqrt()))
                .ok_or_else(|| mismatch(name, &[other])),
        },
        // Evaluated lazily in `evaluate`.
        Builtin::If => Err(EvalError::Unsupported("If with eager arguments".to_string())),
    }
}

fn tuple(items: Vec<GeoValue>) -> Result<GeoValue, EvalError> {
    let mut c = [0.0; 3];
    for (slot, item) in c.iter_mut().zip(items.iter()) {
        *slot = number("tuple", item)?;
    }
    match items.len() {
        2 => Ok(GeoValue::Point([c[0], c[1]])),
        3 => Ok(GeoValue::Point3D(c)),
        n => Err(EvalError::Unsupported(format!("tuple with {} coordinates", n))),
    }
}

/// Evaluate `expr` with element values from `scope`.
pub fn evaluate(expr: &Expr, scope: &dyn Scope, env: &EvalEnv<'_>) -> Result<GeoValue, EvalError> {
    match expr {
        Expr::Number(n) => Ok(GeoValue::Number(*n)),
        Expr::Bool(b) => Ok(GeoValue::Boolean(*b)),
        Expr::Text(t) => Ok(GeoValue::Text(t.clone())),
        Expr::Ident(name) => {
            if let Some(value) = scope.value_of(name) {
                return Ok(value.clone());
            }
            match name.as_str() {
                "pi" => Ok(GeoValue::Number(PI)),
                "e" => Ok(GeoValue::Number(E)),
                "i" => Err(EvalError::Unsupported("complex numbers".to_string())),
                _ => Err(EvalError::UnknownLabel(name.clone())),
            }
        }
        Expr::Tuple(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, scope, env))
                .collect::<Result<Vec<_>, _>>()?;
            tuple(values)
        }
        Expr::Unary(UnaryOp::Neg, operand) => {
            let value = evaluate(operand, scope, env)?;
            match value {
                GeoValue::Number(n) => Ok(GeoValue::Number(-n)),
                other => match coords(&other) {
                    Some((p, c, d)) => Ok(from_coords(p, [-c[0], -c[1], -c[2]], d)),
                    None => Err(mismatch("-", &[&other])),
                },
            }
        }
        Expr::Unary(UnaryOp::Not, operand) => {
            let value = evaluate(operand, scope, env)?;
            Ok(GeoValue::Boolean(!boolean("!", &value)?))
        }
        Expr::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
            let a = boolean(op.symbol(), &evaluate(lhs, scope, env)?)?;
            if (*op == BinaryOp::And && !a) || (*op == BinaryOp::Or && a) {
                return Ok(GeoValue::Boolean(a));
            }
            let b = boolean(op.symbol(), &evaluate(rhs, scope, env)?)?;
            Ok(GeoValue::Boolean(b))
        }
        Expr::Binary(op, lhs, rhs) => {
            let a = evaluate(lhs, scope, env)?;
            let b = evaluate(rhs, scope, env)?;
            binary(*op, a, b)
        }
        Expr::Call(name, args) => {
            if let Some(builtin) = Builtin::lookup(name) {
                if let Builtin::If = builtin {
                    if args.len() != 3 {
                        return Err(EvalError::Arity { function: name.clone(), expected: 3, found: args.len() });
                    }
                    let condition = evaluate(&args[0], scope, env)?;
                    let branch = if boolean(name, &condition)? { &args[1] } else { &args[2] };
                    return evaluate(branch, scope, env);
                }
                let values = args
                    .iter()
                    .map(|arg| evaluate(arg, scope, env))
                    .collect::<Result<Vec<_>, _>>()?;
                return call_builtin(name, builtin, &values);
            }
            let mac = env
                .macros
                .get(name)
                .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
            if args.len() != mac.inputs.len() {
                return Err(EvalError::Arity {
                    function: name.clone(),
                    expected: mac.inputs.len(),
                    found: args.len(),
                });
            }
            if env.depth >= env.max_depth {
                return Err(EvalError::MacroRecursion(name.clone()));
            }
            let values = args
                .iter()
                .map(|arg| evaluate(arg, scope, env))
                .collect::<Result<Vec<_>, _>>()?;
            crate::rebuild::run_macro(mac, values, env)
        }
    }
}
