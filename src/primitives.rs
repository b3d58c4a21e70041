use std::cmp::Ordering;

use crate::evaluator::apply_procedure;
use crate::types::{Number, Procedure};
use crate::{EvalError, EvalResult, Node, Sexpr, Span};

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects exactly {} arguments, got {}",
                    $name,
                    $expected,
                    $args.len()
                ),
                $span,
            ));
        }
    };
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects at least {} arguments, got {}",
                    $name,
                    $expected,
                    $args.len()
                ),
                $span,
            ));
        }
    };
    // Variant for range of args (inclusive)
    ($args:expr, $min:expr, $max:expr, $span:expr, $name:expr) => {
        if !($min..=$max).contains(&$args.len()) {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects between {} and {} arguments, got {}",
                    $name,
                    $min,
                    $max,
                    $args.len()
                ),
                $span,
            ));
        }
    };
}

pub(crate) use check_arity;

// --- Argument helpers ---

// Destructures a fixed number of arguments.
fn take_args<const N: usize>(args: Vec<Node>, span: Span, name: &str) -> EvalResult<[Node; N]> {
    let found = args.len();
    <[Node; N]>::try_from(args).map_err(|_| {
        EvalError::InvalidArguments(
            format!(
                "Primitive '{}' expects exactly {} arguments, got {}",
                name, N, found
            ),
            span,
        )
    })
}

pub(crate) fn expect_number(node: &Node, span: Span) -> EvalResult<Number> {
    match node.kind {
        Sexpr::Number(n) => Ok(n),
        _ => Err(type_mismatch("number", node, span)),
    }
}

fn expect_list(node: Node, span: Span) -> EvalResult<Vec<Node>> {
    match node.kind {
        Sexpr::List(elements) => Ok(elements),
        _ => Err(type_mismatch("list", &node, span)),
    }
}

fn expect_procedure(node: Node, span: Span) -> EvalResult<Procedure> {
    match node.kind {
        Sexpr::Procedure(procedure) => Ok(procedure),
        _ => Err(type_mismatch("procedure", &node, span)),
    }
}

fn type_mismatch(expected: &'static str, node: &Node, span: Span) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: node.kind.clone(),
        span,
    }
}

fn number_node(n: Number, span: Span) -> EvalResult {
    Ok(Node::new_number(n, span))
}

fn bool_node(b: bool, span: Span) -> EvalResult {
    Ok(Node::new_bool(b, span))
}

/// Converts a float to an integer, failing for NaN, infinities and values
/// outside the `i64` range.
pub(crate) fn float_to_int(n: f64, span: Span, operator: &str) -> EvalResult<Number> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if n.is_finite() && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Ok(Number::Int(n as i64))
    } else {
        Err(EvalError::InvalidArguments(
            format!("Primitive '{}' cannot convert {} to an integer", operator, n),
            span,
        ))
    }
}

// --- Arithmetic ---

fn checked_arith(
    left: Number,
    right: Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    operator: &str,
    span: Span,
) -> EvalResult<Number> {
    match (left, right) {
        (Number::Int(a), Number::Int(b)) => int_op(a, b).map(Number::Int).ok_or_else(|| {
            EvalError::InvalidArguments(format!("Integer overflow in '{}'", operator), span)
        }),
        (a, b) => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn fold_numbers(
    args: &[Node],
    span: Span,
    start: Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
    operator: &str,
) -> EvalResult<Number> {
    args.iter().try_fold(start, |acc, node| {
        let num = expect_number(node, span)?;
        checked_arith(acc, num, int_op, float_op, operator, span)
    })
}

pub fn prim_add(args: Vec<Node>, span: Span) -> EvalResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    let sum = fold_numbers(&args, span, Number::Int(0), i64::checked_add, |a, b| a + b, "+")?;
    number_node(sum, span)
}

pub fn prim_mul(args: Vec<Node>, span: Span) -> EvalResult {
    // (*) -> 1
    // (* 1 2 3) -> 6
    let product = fold_numbers(&args, span, Number::Int(1), i64::checked_mul, |a, b| a * b, "*")?;
    number_node(product, span)
}

pub fn prim_sub(args: Vec<Node>, span: Span) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    check_arity!(args, min 1, span, "-");
    let first_num = expect_number(&args[0], span)?;

    if args.len() == 1 {
        checked_arith(Number::Int(0), first_num, i64::checked_sub, |a, b| a - b, "-", span)
            .and_then(|n| number_node(n, span))
    } else {
        let result = fold_numbers(&args[1..], span, first_num, i64::checked_sub, |a, b| a - b, "-")?;
        number_node(result, span)
    }
}

// Integer division stays exact when it can.
fn divide(left: Number, right: Number, span: Span) -> EvalResult<Number> {
    match (left, right) {
        (_, Number::Int(0)) => Err(EvalError::InvalidArguments(
            "Division by zero".to_string(),
            span,
        )),
        (_, Number::Float(b)) if b == 0.0 => Err(EvalError::InvalidArguments(
            "Division by zero".to_string(),
            span,
        )),
        (Number::Int(a), Number::Int(b)) => match a.checked_rem(b) {
            Some(0) => checked_arith(left, right, i64::checked_div, |a, b| a / b, "/", span),
            Some(_) => Ok(Number::Float(a as f64 / b as f64)),
            None => Err(EvalError::InvalidArguments(
                "Integer overflow in '/'".to_string(),
                span,
            )),
        },
        (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
    }
}

pub fn prim_div(args: Vec<Node>, span: Span) -> EvalResult {
    // (/ x) -> 1/x
    // (/ x y z) -> x / y / z
    check_arity!(args, min 1, span, "/");
    let first_num = expect_number(&args[0], span)?;

    if args.len() == 1 {
        number_node(divide(Number::Int(1), first_num, span)?, span)
    } else {
        let mut result = first_num;
        for node in &args[1..] {
            result = divide(result, expect_number(node, span)?, span)?;
        }
        number_node(result, span)
    }
}

pub fn prim_abs(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "abs");
    match expect_number(&args[0], span)? {
        Number::Int(n) => n.checked_abs().map(Number::Int).ok_or_else(|| {
            EvalError::InvalidArguments("Integer overflow in 'abs'".to_string(), span)
        }),
        Number::Float(n) => Ok(Number::Float(n.abs())),
    }
    .and_then(|n| number_node(n, span))
}

// Picks the argument that wins every comparison, keeping its numeric kind.
fn select_number(args: &[Node], span: Span, keep: Ordering, operator: &str) -> EvalResult {
    check_arity!(args, min 1, span, operator);
    let mut best = expect_number(&args[0], span)?;
    for node in &args[1..] {
        let num = expect_number(node, span)?;
        if num.compare(best) == Some(keep) {
            best = num;
        }
    }
    number_node(best, span)
}

pub fn prim_min(args: Vec<Node>, span: Span) -> EvalResult {
    select_number(&args, span, Ordering::Less, "min")
}

pub fn prim_max(args: Vec<Node>, span: Span) -> EvalResult {
    select_number(&args, span, Ordering::Greater, "max")
}

pub fn prim_round(args: Vec<Node>, span: Span) -> EvalResult {
    // (round x) -> nearest integer, ties to even
    // (round x digits) -> float rounded to that many decimal digits
    check_arity!(args, 1, 2, span, "round");
    let num = expect_number(&args[0], span)?;
    match args.get(1) {
        None => match num {
            Number::Int(_) => number_node(num, span),
            Number::Float(n) => number_node(float_to_int(n.round_ties_even(), span, "round")?, span),
        },
        Some(digits_node) => {
            let Number::Int(digits) = expect_number(digits_node, span)? else {
                return Err(type_mismatch("integer", digits_node, span));
            };
            let digits = i32::try_from(digits).map_err(|_| {
                EvalError::InvalidArguments(format!("Digit count {} out of range", digits), span)
            })?;
            let x = num.as_f64();
            let scale = 10f64.powi(digits);
            let rounded = if scale.is_infinite() || !x.is_finite() {
                // More digits than an f64 holds
                x
            } else if scale == 0.0 {
                0.0f64.copysign(x)
            } else {
                let scaled = (x * scale).round_ties_even() / scale;
                if scaled.is_finite() { scaled } else { x }
            };
            number_node(Number::Float(rounded), span)
        }
    }
}

// --- Comparison ---

fn compare_numbers(
    args: Vec<Node>,
    span: Span,
    accept: fn(Ordering) -> bool,
    operator: &str,
) -> EvalResult {
    // (< n1 n2 ...) -> #t when every adjacent pair satisfies the comparison
    check_arity!(args, min 2, span, operator);
    let numbers = args
        .iter()
        .map(|node| expect_number(node, span))
        .collect::<EvalResult<Vec<Number>>>()?;
    let result = numbers
        .windows(2)
        .all(|pair| pair[0].compare(pair[1]).is_some_and(accept));
    bool_node(result, span)
}

pub fn prim_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, Ordering::is_eq, "=")
}

pub fn prim_less_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, Ordering::is_lt, "<")
}

pub fn prim_less_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, Ordering::is_le, "<=")
}

pub fn prim_greater_than(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, Ordering::is_gt, ">")
}

pub fn prim_greater_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    compare_numbers(args, span, Ordering::is_ge, ">=")
}

// --- Lists ---

pub fn prim_cons(args: Vec<Node>, span: Span) -> EvalResult {
    // (cons x (a b)) -> (x a b)
    let [head, tail] = take_args(args, span, "cons")?;
    let mut elements = vec![head];
    elements.extend(expect_list(tail, span)?);
    Ok(Node::new_list(elements, span))
}

fn split_list(args: Vec<Node>, span: Span, name: &str) -> EvalResult<(Node, Vec<Node>)> {
    let [list] = take_args(args, span, name)?;
    let mut elements = expect_list(list, span)?;
    if elements.is_empty() {
        return Err(EvalError::InvalidArguments(
            format!("Primitive '{}' expects a non-empty list", name),
            span,
        ));
    }
    let first = elements.remove(0);
    Ok((first, elements))
}

pub fn prim_car(args: Vec<Node>, span: Span) -> EvalResult {
    split_list(args, span, "car").map(|(first, _)| first)
}

pub fn prim_cdr(args: Vec<Node>, span: Span) -> EvalResult {
    split_list(args, span, "cdr").map(|(_, rest)| Node::new_list(rest, span))
}

pub fn prim_list(args: Vec<Node>, span: Span) -> EvalResult {
    Ok(Node::new_list(args, span))
}

pub fn prim_length(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "length");
    let Sexpr::List(elements) = &args[0].kind else {
        return Err(type_mismatch("list", &args[0], span));
    };
    number_node(Number::Int(elements.len() as i64), span)
}

pub fn prim_append(args: Vec<Node>, span: Span) -> EvalResult {
    // (append (1 2) (3) ()) -> (1 2 3)
    let mut elements = Vec::new();
    for list in args {
        elements.extend(expect_list(list, span)?);
    }
    Ok(Node::new_list(elements, span))
}

// --- Predicates ---

fn predicate(args: &[Node], span: Span, name: &str, test: fn(&Sexpr) -> bool) -> EvalResult {
    check_arity!(args, 1, span, name);
    bool_node(test(&args[0].kind), span)
}

pub fn prim_is_null(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "null?", |kind| {
        matches!(kind, Sexpr::List(elements) if elements.is_empty())
    })
}

pub fn prim_is_list(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "list?", |kind| matches!(kind, Sexpr::List(_)))
}

pub fn prim_is_number(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "number?", |kind| matches!(kind, Sexpr::Number(_)))
}

pub fn prim_is_symbol(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "symbol?", |kind| matches!(kind, Sexpr::Symbol(_)))
}

pub fn prim_is_procedure(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "procedure?", |kind| {
        matches!(kind, Sexpr::Procedure(_))
    })
}

pub fn prim_not(args: Vec<Node>, span: Span) -> EvalResult {
    predicate(&args, span, "not", |kind| !kind.is_truthy())
}

// Lists are copied rather than shared, so only empty lists are the same
// object; numbers must also agree in kind.
fn is_eq(left: &Sexpr, right: &Sexpr) -> bool {
    match (left, right) {
        (Sexpr::List(a), Sexpr::List(b)) => a.is_empty() && b.is_empty(),
        (Sexpr::Number(Number::Int(a)), Sexpr::Number(Number::Int(b))) => a == b,
        (Sexpr::Number(Number::Float(a)), Sexpr::Number(Number::Float(b))) => a == b,
        (Sexpr::Number(_), Sexpr::Number(_)) => false,
        (a, b) => a == b,
    }
}

pub fn prim_is_eq(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "eq?");
    bool_node(is_eq(&args[0].kind, &args[1].kind), span)
}

pub fn prim_is_equal(args: Vec<Node>, span: Span) -> EvalResult {
    // Structural equality; numbers compare by value across kinds
    check_arity!(args, 2, span, "equal?");
    bool_node(args[0] == args[1], span)
}

// --- Control ---

pub fn prim_begin(args: Vec<Node>, span: Span) -> EvalResult {
    // Arguments were already evaluated left to right; keep the last
    check_arity!(args, min 1, span, "begin");
    Ok(args.into_iter().last().unwrap_or_else(|| Node::new_void(span)))
}

pub fn prim_apply(args: Vec<Node>, span: Span) -> EvalResult {
    // (apply f (a b c)) -> (f a b c)
    let [procedure, arg_list] = take_args(args, span, "apply")?;
    let procedure = expect_procedure(procedure, span)?;
    apply_procedure(&procedure, expect_list(arg_list, span)?, span)
}

pub fn prim_map(args: Vec<Node>, span: Span) -> EvalResult {
    // (map f (a b) (c d)) -> ((f a c) (f b d)); stops at the shortest list
    check_arity!(args, min 2, span, "map");
    let mut args = args;
    let procedure = expect_procedure(args.remove(0), span)?;
    let lists = args
        .into_iter()
        .map(|list| expect_list(list, span))
        .collect::<EvalResult<Vec<Vec<Node>>>>()?;
    let len = lists.iter().map(Vec::len).min().unwrap_or(0);

    let results = (0..len)
        .map(|i| {
            let call_args = lists.iter().map(|list| list[i].clone()).collect();
            apply_procedure(&procedure, call_args, span)
        })
        .collect::<EvalResult<Vec<Node>>>()?;
    Ok(Node::new_list(results, span))
}
