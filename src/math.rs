//! The numeric library bound into the global environment: transcendental
//! functions, float rounding and classification, and the usual constants.
//!
//! Functions take integers or floats and, apart from the rounding and
//! classification functions, return floats. A NaN produced from non-NaN
//! input is reported as a domain error instead of being returned.

use std::f64::consts;

use crate::primitives::{check_arity, expect_number, float_to_int};
use crate::types::{Number, PrimitiveFunc};
use crate::{EvalError, EvalResult, Node, Span};

pub const CONSTANTS: &[(&str, f64)] = &[
    ("pi", consts::PI),
    ("e", consts::E),
    ("tau", consts::TAU),
];

pub const FUNCTIONS: &[(&str, PrimitiveFunc)] = &[
    ("sqrt", math_sqrt),
    ("exp", math_exp),
    ("log", math_log),
    ("log10", math_log10),
    ("log2", math_log2),
    ("sin", math_sin),
    ("cos", math_cos),
    ("tan", math_tan),
    ("asin", math_asin),
    ("acos", math_acos),
    ("atan", math_atan),
    ("atan2", math_atan2),
    ("sinh", math_sinh),
    ("cosh", math_cosh),
    ("tanh", math_tanh),
    ("asinh", math_asinh),
    ("acosh", math_acosh),
    ("atanh", math_atanh),
    ("pow", math_pow),
    ("hypot", math_hypot),
    ("fmod", math_fmod),
    ("copysign", math_copysign),
    ("fabs", math_fabs),
    ("degrees", math_degrees),
    ("radians", math_radians),
    ("floor", math_floor),
    ("ceil", math_ceil),
    ("trunc", math_trunc),
    ("isnan", math_isnan),
    ("isinf", math_isinf),
    ("isfinite", math_isfinite),
];

fn float_result(inputs: &[f64], result: f64, name: &str, span: Span) -> EvalResult {
    if result.is_nan() && !inputs.iter().any(|x| x.is_nan()) {
        return Err(EvalError::InvalidArguments(
            format!("Math domain error in '{}'", name),
            span,
        ));
    }
    Ok(Node::new_float(result, span))
}

fn unary(args: Vec<Node>, span: Span, name: &str, op: fn(f64) -> f64) -> EvalResult {
    check_arity!(args, 1, span, name);
    let x = expect_number(&args[0], span)?.as_f64();
    float_result(&[x], op(x), name, span)
}

fn binary(args: Vec<Node>, span: Span, name: &str, op: fn(f64, f64) -> f64) -> EvalResult {
    check_arity!(args, 2, span, name);
    let x = expect_number(&args[0], span)?.as_f64();
    let y = expect_number(&args[1], span)?.as_f64();
    float_result(&[x, y], op(x, y), name, span)
}

macro_rules! unary_functions {
    ($($fname:ident => $name:literal, $op:expr;)*) => {
        $(
            fn $fname(args: Vec<Node>, span: Span) -> EvalResult {
                unary(args, span, $name, $op)
            }
        )*
    };
}

macro_rules! binary_functions {
    ($($fname:ident => $name:literal, $op:expr;)*) => {
        $(
            fn $fname(args: Vec<Node>, span: Span) -> EvalResult {
                binary(args, span, $name, $op)
            }
        )*
    };
}

unary_functions! {
    math_sqrt => "sqrt", f64::sqrt;
    math_exp => "exp", f64::exp;
    math_log10 => "log10", f64::log10;
    math_log2 => "log2", f64::log2;
    math_sin => "sin", f64::sin;
    math_cos => "cos", f64::cos;
    math_tan => "tan", f64::tan;
    math_asin => "asin", f64::asin;
    math_acos => "acos", f64::acos;
    math_atan => "atan", f64::atan;
    math_sinh => "sinh", f64::sinh;
    math_cosh => "cosh", f64::cosh;
    math_tanh => "tanh", f64::tanh;
    math_asinh => "asinh", f64::asinh;
    math_acosh => "acosh", f64::acosh;
    math_atanh => "atanh", f64::atanh;
    math_fabs => "fabs", f64::abs;
    math_degrees => "degrees", f64::to_degrees;
    math_radians => "radians", f64::to_radians;
}

binary_functions! {
    math_atan2 => "atan2", f64::atan2;
    math_pow => "pow", f64::powf;
    math_hypot => "hypot", f64::hypot;
    math_fmod => "fmod", |x, y| x % y;
    math_copysign => "copysign", f64::copysign;
}

fn math_log(args: Vec<Node>, span: Span) -> EvalResult {
    // (log x) -> natural log, (log x base)
    check_arity!(args, 1, 2, span, "log");
    let x = expect_number(&args[0], span)?.as_f64();
    match args.get(1) {
        None => float_result(&[x], x.ln(), "log", span),
        Some(base_node) => {
            let base = expect_number(base_node, span)?.as_f64();
            float_result(&[x, base], x.ln() / base.ln(), "log", span)
        }
    }
}

// Integers pass through; floats are rounded and converted.
fn to_integer(args: Vec<Node>, span: Span, name: &str, op: fn(f64) -> f64) -> EvalResult {
    check_arity!(args, 1, span, name);
    let number = match expect_number(&args[0], span)? {
        Number::Int(n) => Number::Int(n),
        Number::Float(n) => float_to_int(op(n), span, name)?,
    };
    Ok(Node::new_number(number, span))
}

fn math_floor(args: Vec<Node>, span: Span) -> EvalResult {
    to_integer(args, span, "floor", f64::floor)
}

fn math_ceil(args: Vec<Node>, span: Span) -> EvalResult {
    to_integer(args, span, "ceil", f64::ceil)
}

fn math_trunc(args: Vec<Node>, span: Span) -> EvalResult {
    to_integer(args, span, "trunc", f64::trunc)
}

fn classify(args: Vec<Node>, span: Span, name: &str, test: fn(f64) -> bool) -> EvalResult {
    check_arity!(args, 1, span, name);
    let x = expect_number(&args[0], span)?.as_f64();
    Ok(Node::new_bool(test(x), span))
}

fn math_isnan(args: Vec<Node>, span: Span) -> EvalResult {
    classify(args, span, "isnan", f64::is_nan)
}

fn math_isinf(args: Vec<Node>, span: Span) -> EvalResult {
    classify(args, span, "isinf", f64::is_infinite)
}

fn math_isfinite(args: Vec<Node>, span: Span) -> EvalResult {
    classify(args, span, "isfinite", f64::is_finite)
}
