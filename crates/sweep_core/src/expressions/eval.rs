use std::cmp::Ordering;

use thiserror::Error;

use super::ast::{BinaryOp, Expr, UnaryOp};
use crate::value::{Scalar, Scope};

/// Builtin constants available to every expression unless shadowed by a
/// parameter or expression of the same name.
pub const BUILTIN_CONSTANTS: [(&str, f64); 2] = [("pi", std::f64::consts::PI), ("e", std::f64::consts::E)];

pub const BUILTIN_FUNCTIONS: [&str; 16] = [
    "abs", "min", "max", "sqrt", "exp", "log", "log10", "sin", "cos", "tan", "floor", "ceil", "round",
    "int", "float", "str",
];

pub fn builtin_constant(name: &str) -> Option<f64> {
    BUILTIN_CONSTANTS
        .iter()
        .find(|(constant, _)| *constant == name)
        .map(|(_, value)| *value)
}

/// Why an expression could not be evaluated for a particular scope.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalFault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("unsupported operand types for {op}: {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("bad operand type for unary {op}: {operand}")]
    UnaryType { op: &'static str, operand: &'static str },

    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() expects {expected} argument(s), got {got}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("math domain error in {0}")]
    Domain(String),

    #[error("{0}")]
    Invalid(String),
}

/// Evaluate a parsed expression against a scope.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Result<Scalar, EvalFault> {
    let value = match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Name(name) => match scope.get(name) {
            Some(value) => value.clone(),
            None => builtin_constant(name)
                .map(Scalar::Float)
                .ok_or_else(|| EvalFault::UndefinedName(name.clone()))?,
        },
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, scope)?)?,
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, scope)?;
            let rhs = evaluate(rhs, scope)?;
            binary(*op, &lhs, &rhs)?
        }
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(function, &args)?
        }
    };
    finite(value)
}

fn finite(value: Scalar) -> Result<Scalar, EvalFault> {
    match value {
        Scalar::Float(v) if v.is_nan() => Err(EvalFault::Domain("arithmetic".to_string())),
        Scalar::Float(v) if v.is_infinite() => Err(EvalFault::Overflow),
        other => Ok(other),
    }
}

fn unary(op: UnaryOp, value: Scalar) -> Result<Scalar, EvalFault> {
    match (op, value) {
        (UnaryOp::Pos, value @ (Scalar::Int(_) | Scalar::Float(_))) => Ok(value),
        (UnaryOp::Neg, Scalar::Int(v)) => v.checked_neg().map(Scalar::Int).ok_or(EvalFault::Overflow),
        (UnaryOp::Neg, Scalar::Float(v)) => Ok(Scalar::Float(-v)),
        (op, other) => Err(EvalFault::UnaryType {
            op: if op == UnaryOp::Neg { "-" } else { "+" },
            operand: other.type_name(),
        }),
    }
}

fn mismatch(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> EvalFault {
    EvalFault::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.type_name(),
        rhs: rhs.type_name(),
    }
}

fn binary(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> Result<Scalar, EvalFault> {
    if op.is_comparison() {
        return compare(op, lhs, rhs).map(|truth| Scalar::Int(i64::from(truth)));
    }

    match (lhs, rhs) {
        (Scalar::Str(a), Scalar::Str(b)) if op == BinaryOp::Add => Ok(Scalar::Str(format!("{a}{b}"))),
        (Scalar::Int(a), Scalar::Int(b)) => int_arithmetic(op, *a, *b),
        (Scalar::Str(_), _) | (_, Scalar::Str(_)) => Err(mismatch(op, lhs, rhs)),
        _ => {
            let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(mismatch(op, lhs, rhs)),
            };
            float_arithmetic(op, a, b)
        }
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Scalar, EvalFault> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => return float_arithmetic(op, a as f64, b as f64),
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(EvalFault::DivisionByZero);
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(EvalFault::DivisionByZero);
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinaryOp::Pow => {
            if b < 0 {
                return float_arithmetic(op, a as f64, b as f64);
            }
            let exponent = u32::try_from(b).map_err(|_| EvalFault::Overflow)?;
            a.checked_pow(exponent)
        }
        _ => unreachable!("comparisons are handled before arithmetic"),
    };
    result.map(Scalar::Int).ok_or(EvalFault::Overflow)
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Scalar, EvalFault> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalFault::DivisionByZero);
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(EvalFault::DivisionByZero);
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(EvalFault::DivisionByZero);
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(EvalFault::DivisionByZero);
            }
            let value = a.powf(b);
            if value.is_nan() {
                return Err(EvalFault::Domain("**".to_string()));
            }
            value
        }
        _ => unreachable!("comparisons are handled before arithmetic"),
    };
    Ok(Scalar::Float(value))
}

fn compare(op: BinaryOp, lhs: &Scalar, rhs: &Scalar) -> Result<bool, EvalFault> {
    let ordering = match (lhs, rhs) {
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
        (Scalar::Str(_), _) | (_, Scalar::Str(_)) => match op {
            BinaryOp::Eq => return Ok(false),
            BinaryOp::Ne => return Ok(true),
            _ => return Err(mismatch(op, lhs, rhs)),
        },
        _ => lhs
            .as_f64()
            .zip(rhs.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
    };

    let Some(ordering) = ordering else {
        return Ok(op == BinaryOp::Ne);
    };
    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => unreachable!("only comparisons reach compare"),
    })
}

fn numeric(function: &str, value: &Scalar) -> Result<f64, EvalFault> {
    value.as_f64().ok_or_else(|| {
        EvalFault::Invalid(format!(
            "{function}() requires a number, got {}",
            value.type_name()
        ))
    })
}

fn float_to_int(function: &str, value: f64) -> Result<Scalar, EvalFault> {
    if !value.is_finite() {
        return Err(EvalFault::Domain(format!("{function}()")));
    }
    if value < i64::MIN as f64 || value >= i64::MAX as f64 {
        return Err(EvalFault::Overflow);
    }
    Ok(Scalar::Int(value as i64))
}

fn arity(function: &'static str, expected: &'static str, args: &[Scalar], accepted: impl Fn(usize) -> bool) -> Result<(), EvalFault> {
    if accepted(args.len()) {
        Ok(())
    } else {
        Err(EvalFault::Arity {
            function,
            expected,
            got: args.len(),
        })
    }
}

fn unary_math(function: &'static str, args: &[Scalar], op: impl Fn(f64) -> Option<f64>) -> Result<Scalar, EvalFault> {
    arity(function, "1", args, |n| n == 1)?;
    let value = numeric(function, &args[0])?;
    op(value)
        .map(Scalar::Float)
        .ok_or_else(|| EvalFault::Domain(format!("{function}()")))
}

fn extremum(function: &'static str, args: &[Scalar], wanted: Ordering) -> Result<Scalar, EvalFault> {
    arity(function, "at least 1", args, |n| n >= 1)?;
    let mut best = args[0].clone();
    for candidate in &args[1..] {
        let ordering = match (candidate, &best) {
            (Scalar::Str(a), Scalar::Str(b)) => a.cmp(b),
            (Scalar::Str(_), _) | (_, Scalar::Str(_)) => {
                return Err(EvalFault::TypeMismatch {
                    op: function,
                    lhs: candidate.type_name(),
                    rhs: best.type_name(),
                })
            }
            _ => numeric(function, candidate)?
                .partial_cmp(&numeric(function, &best)?)
                .unwrap_or(Ordering::Equal),
        };
        if ordering == wanted {
            best = candidate.clone();
        }
    }
    Ok(best)
}

fn call(function: &str, args: &[Scalar]) -> Result<Scalar, EvalFault> {
    match function {
        "abs" => {
            arity("abs", "1", args, |n| n == 1)?;
            match &args[0] {
                Scalar::Int(v) => v.checked_abs().map(Scalar::Int).ok_or(EvalFault::Overflow),
                other => Ok(Scalar::Float(numeric("abs", other)?.abs())),
            }
        }
        "min" => extremum("min", args, Ordering::Less),
        "max" => extremum("max", args, Ordering::Greater),
        "sqrt" => unary_math("sqrt", args, |v| (v >= 0.0).then(|| v.sqrt())),
        "exp" => unary_math("exp", args, |v| Some(v.exp())),
        "log" => {
            arity("log", "1 or 2", args, |n| n == 1 || n == 2)?;
            let value = numeric("log", &args[0])?;
            if value <= 0.0 {
                return Err(EvalFault::Domain("log()".to_string()));
            }
            match args.get(1) {
                None => Ok(Scalar::Float(value.ln())),
                Some(base) => {
                    let base = numeric("log", base)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(EvalFault::Domain("log()".to_string()));
                    }
                    Ok(Scalar::Float(value.ln() / base.ln()))
                }
            }
        }
        "log10" => unary_math("log10", args, |v| (v > 0.0).then(|| v.log10())),
        "sin" => unary_math("sin", args, |v| Some(v.sin())),
        "cos" => unary_math("cos", args, |v| Some(v.cos())),
        "tan" => unary_math("tan", args, |v| Some(v.tan())),
        "floor" => {
            arity("floor", "1", args, |n| n == 1)?;
            match &args[0] {
                Scalar::Int(v) => Ok(Scalar::Int(*v)),
                other => float_to_int("floor", numeric("floor", other)?.floor()),
            }
        }
        "ceil" => {
            arity("ceil", "1", args, |n| n == 1)?;
            match &args[0] {
                Scalar::Int(v) => Ok(Scalar::Int(*v)),
                other => float_to_int("ceil", numeric("ceil", other)?.ceil()),
            }
        }
        "round" => {
            arity("round", "1 or 2", args, |n| n == 1 || n == 2)?;
            match args.get(1) {
                None => match &args[0] {
                    Scalar::Int(v) => Ok(Scalar::Int(*v)),
                    other => float_to_int("round", numeric("round", other)?.round_ties_even()),
                },
                Some(Scalar::Int(digits)) => {
                    let value = numeric("round", &args[0])?;
                    let digits = i32::try_from(*digits).map_err(|_| EvalFault::Overflow)?;
                    let scale = 10f64.powi(digits);
                    let rounded = (value * scale).round_ties_even() / scale;
                    match &args[0] {
                        Scalar::Int(_) if digits >= 0 => Ok(args[0].clone()),
                        Scalar::Int(_) => float_to_int("round", rounded),
                        _ => Ok(Scalar::Float(rounded)),
                    }
                }
                Some(other) => Err(EvalFault::Invalid(format!(
                    "round() digits must be an integer, got {}",
                    other.type_name()
                ))),
            }
        }
        "int" => {
            arity("int", "1", args, |n| n == 1)?;
            match &args[0] {
                Scalar::Int(v) => Ok(Scalar::Int(*v)),
                Scalar::Float(v) => float_to_int("int", v.trunc()),
                Scalar::Str(text) => text
                    .trim()
                    .parse::<i64>()
                    .map(Scalar::Int)
                    .map_err(|_| EvalFault::Invalid(format!("invalid literal for int(): '{text}'"))),
            }
        }
        "float" => {
            arity("float", "1", args, |n| n == 1)?;
            match &args[0] {
                Scalar::Str(text) => text
                    .trim()
                    .parse::<f64>()
                    .map(Scalar::Float)
                    .map_err(|_| EvalFault::Invalid(format!("could not convert string to float: '{text}'"))),
                other => Ok(Scalar::Float(numeric("float", other)?)),
            }
        }
        "str" => {
            arity("str", "1", args, |n| n == 1)?;
            Ok(Scalar::Str(args[0].to_string()))
        }
        other => Err(EvalFault::UnknownFunction(other.to_string())),
    }
}
