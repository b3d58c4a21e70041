use crate::environment::{EnvError, Environment};
use crate::source::Span;
use crate::types::{Lambda, Node, Procedure, Sexpr};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    EnvError(#[from] EnvError), // Unbound variables and lambda arity
    #[error("Evaluation Error: Expected a procedure, but got: {0}")]
    NotAProcedure(Sexpr, Span), // Tried to call something that isn't a procedure
    #[error("Evaluation Error: Invalid arguments - {0}")]
    InvalidArguments(String, Span), // Primitive arity, division by zero, overflow
    #[error("Evaluation Error: Expected a symbol, but got: {0}")]
    NotASymbol(Sexpr, Span), // Expected a symbol (e.g., for define/set!)
    #[error("Evaluation Error: Invalid special form - {0}")]
    InvalidSpecialForm(String, Span), // Malformed special form (e.g., (if cond))
    #[error("Evaluation Error: Expected {expected}, found {}: {found}", .found.type_name())]
    TypeMismatch {
        expected: &'static str,
        found: Sexpr,
        span: Span,
    },
    #[error("Evaluation Error: Maximum recursion depth ({0}) exceeded")]
    RecursionLimit(usize, Span), // Nesting of evaluate calls passed MAX_EVAL_DEPTH
}

impl EvalError {
    /// Source location the error points at.
    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(env_err) => env_err.span(),
            EvalError::NotAProcedure(_, span)
            | EvalError::InvalidArguments(_, span)
            | EvalError::NotASymbol(_, span)
            | EvalError::InvalidSpecialForm(_, span)
            | EvalError::RecursionLimit(_, span)
            | EvalError::TypeMismatch { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Node> = Result<T, EvalError>;

const SPECIAL_FORMS: [&str; 5] = ["quote", "if", "define", "set!", "lambda"];

/// Keywords handled by the evaluator itself rather than looked up.
pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|s| s.to_string()).collect()
}

/// Deepest nesting of list evaluations before `evaluate` gives up with
/// [`EvalError::RecursionLimit`] instead of overflowing the native stack.
pub const MAX_EVAL_DEPTH: usize = 1000;

thread_local! {
    // Shared by every entry into `evaluate`, including calls made back from
    // primitives such as `apply` and `map`.
    static EVAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

// One level of evaluation depth, released when dropped (also on error).
struct DepthGuard;

impl DepthGuard {
    fn enter(span: Span) -> EvalResult<DepthGuard> {
        EVAL_DEPTH.with(|depth| {
            if depth.get() >= MAX_EVAL_DEPTH {
                return Err(EvalError::RecursionLimit(MAX_EVAL_DEPTH, span));
            }
            depth.set(depth.get() + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EVAL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

// --- Evaluate Function ---

/// Evaluates a given AST Node within the specified environment.
pub fn evaluate(node: &Node, env: &Rc<RefCell<Environment>>) -> EvalResult {
    match &node.kind {
        // 1. Self-evaluating atoms
        Sexpr::Number(_) | Sexpr::Boolean(_) | Sexpr::Procedure(_) | Sexpr::Void => {
            Ok(node.clone())
        }

        // 2. Symbols: Look up in the environment
        Sexpr::Symbol(name) => {
            // Use the symbol's span for error reporting if lookup fails
            Ok(Environment::lookup(env, name, node.span)?)
        }

        // 3. Lists: Could be special forms or procedure calls
        Sexpr::List(elements) => {
            let _depth = DepthGuard::enter(node.span)?;
            if let [first, rest @ ..] = &elements[..] {
                match &first.kind {
                    Sexpr::Symbol(sym_name) if sym_name == "quote" => {
                        evaluate_quote(rest, node.span) // Pass span of the whole (quote ...) form
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "if" => {
                        evaluate_if(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "define" => {
                        evaluate_define(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "set!" => {
                        evaluate_set(rest, env, node.span)
                    }
                    Sexpr::Symbol(sym_name) if sym_name == "lambda" => {
                        evaluate_lambda(rest, env, node.span)
                    }
                    _ => evaluate_procedure(first, rest, env, node.span),
                }
            } else {
                // The empty list evaluates to itself
                Ok(node.clone())
            }
        }
    }
}

/// Calls `procedure` with already-evaluated arguments. `span` is the call site.
pub fn apply_procedure(procedure: &Procedure, args: Vec<Node>, span: Span) -> EvalResult {
    match procedure {
        Procedure::Primitive(func, name) => {
            trace!(primitive = *name, argc = args.len(), "apply");
            func(args, span)
        }
        Procedure::Lambda(lambda) => {
            trace!(params = ?lambda.params, argc = args.len(), "apply lambda");
            // A fresh frame per call, enclosed by the frame the lambda was created in
            let frame = Environment::new_frame(&lambda.params, args, Rc::clone(&lambda.env), span)?;
            evaluate(&lambda.body, &frame)
        }
    }
}

fn evaluate_procedure(
    operator: &Node,
    operands: &[Node],
    env: &Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    // 1. Evaluate the operator
    let operator_result_node = evaluate(operator, env)?;

    // 2. Check if the result is a procedure
    let procedure = match operator_result_node.kind {
        Sexpr::Procedure(proc) => proc,
        other => {
            return Err(EvalError::NotAProcedure(
                other,         // What was actually found
                operator.span, // Span of the operator expression
            ));
        }
    };

    // 3. Evaluate the operands, left to right
    let evaluated_args = operands
        .iter()
        .map(|operand_node| evaluate(operand_node, env))
        .collect::<EvalResult<Vec<Node>>>()?;

    // 4. Apply the procedure
    apply_procedure(&procedure, evaluated_args, span)
}

fn evaluate_quote(operands: &[Node], span: Span) -> EvalResult {
    if let [node] = operands {
        // Quote returns the operand unevaluated.
        Ok(node.clone())
    } else {
        Err(EvalError::InvalidSpecialForm(
            "quote expects exactly one argument".to_string(),
            span, // Use the span of the whole (quote ...) form
        ))
    }
}

fn evaluate_if(operands: &[Node], env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [condition, consequent, alternate] = operands {
        // Only the chosen branch is evaluated
        if evaluate(condition, env)?.kind.is_truthy() {
            evaluate(consequent, env)
        } else {
            evaluate(alternate, env)
        }
    } else {
        Err(EvalError::InvalidSpecialForm(
            "if expects a condition, a consequent and an alternate".to_string(),
            span, // Span of the whole (if ...) form
        ))
    }
}

fn evaluate_define(operands: &[Node], env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value_expr] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value_expr, env)?;
        debug!(name, %value, "define");
        env.borrow_mut().set_local(name.to_string(), value);
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "define expects a symbol and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_set(operands: &[Node], env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value_expr] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value_expr, env)?;
        debug!(name, %value, "set!");
        Environment::set_existing(env, name, value, target.span)?;
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "set! expects a symbol and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_lambda(operands: &[Node], env: &Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [param_list, body] = operands else {
        return Err(EvalError::InvalidSpecialForm(
            "lambda expects a parameter list and a body".to_string(),
            span,
        ));
    };
    let Sexpr::List(param_nodes) = &param_list.kind else {
        return Err(EvalError::InvalidSpecialForm(
            format!("lambda parameters must be a list, got {}", param_list),
            param_list.span,
        ));
    };

    let mut params: Vec<String> = Vec::with_capacity(param_nodes.len());
    for param in param_nodes {
        let name = expect_symbol(param)?;
        if params.iter().any(|p| p == name) {
            return Err(EvalError::InvalidSpecialForm(
                format!("duplicate lambda parameter '{}'", name),
                param.span,
            ));
        }
        params.push(name.to_string());
    }

    debug!(?params, "lambda");
    let lambda = Lambda {
        params,
        body: body.clone(),
        env: Rc::clone(env),
    };
    Ok(Node::new(
        Sexpr::Procedure(Procedure::Lambda(Rc::new(lambda))),
        span,
    ))
}

fn expect_symbol(node: &Node) -> EvalResult<&str> {
    node.as_symbol()
        .ok_or_else(|| EvalError::NotASymbol(node.kind.clone(), node.span))
}
