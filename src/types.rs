use crate::environment::Environment;
use crate::{evaluator::EvalResult, source::Span};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt; // For custom display formatting
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Sexpr, // The actual S-expression data
    pub span: Span,  // The source span it covers
}

// Spans are positional metadata only; two nodes are equal when their data is.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_symbol(name: impl Into<String>, span: Span) -> Self {
        Node::new(Sexpr::Symbol(name.into()), span)
    }

    pub fn new_number(number: Number, span: Span) -> Self {
        Node::new(Sexpr::Number(number), span)
    }

    pub fn new_int(n: i64, span: Span) -> Self {
        Node::new_number(Number::Int(n), span)
    }

    pub fn new_float(n: f64, span: Span) -> Self {
        Node::new_number(Number::Float(n), span)
    }

    pub fn new_bool(b: bool, span: Span) -> Self {
        Node::new(Sexpr::Boolean(b), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::List(elements), span)
    }

    pub fn new_void(span: Span) -> Self {
        Node::new(Sexpr::Void, span)
    }

    pub fn new_primitive(func: PrimitiveFunc, name: &'static str, span: Span) -> Self {
        Node::new(Sexpr::Procedure(Procedure::Primitive(func, name)), span)
    }

    /// The symbol's name, if this node is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            Sexpr::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Sexpr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// The two numeric kinds: exact integers and IEEE doubles.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }

    /// Numeric ordering across kinds. `None` when a NaN is involved.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

// `1` and `1.0` are the same number.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{}", n),
            // Debug keeps a fractional part or exponent ("3.0", "1e100"), so a
            // printed float reads back as a float.
            Number::Float(n) => write!(f, "{:?}", n),
        }
    }
}

/// Represents an S-expression. The same type is used for code read by the
/// parser and for the values produced by evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Symbol(String),  // e.g., +, variable-name, quote
    Number(Number),  // 42, -4.5
    Boolean(bool),   // Produced by predicates and comparisons
    List(Vec<Node>), // e.g., (+ 1 2), (define x 10), ()
    Procedure(Procedure),
    Void, // Result of define and set!
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Number(Number::Int(_)) => "integer",
            Sexpr::Number(Number::Float(_)) => "float",
            Sexpr::Symbol(_) => "symbol",
            Sexpr::Boolean(_) => "boolean",
            Sexpr::List(_) => "list",
            Sexpr::Procedure(_) => "procedure",
            Sexpr::Void => "void",
        }
    }

    /// Only `#f` and the empty list are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Sexpr::Boolean(b) => *b,
            Sexpr::List(elements) => !elements.is_empty(),
            _ => true,
        }
    }
}

// Implement Display trait for printing values back as source text
impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(n) => write!(f, "{}", n),
            Sexpr::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexpr::List(list) => {
                write!(f, "(")?;
                let mut first = true;
                for expr in list {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", expr)?;
                    first = false;
                }
                write!(f, ")")
            }
            Sexpr::Procedure(procedure) => match procedure {
                Procedure::Primitive(_, name) => write!(f, "#<primitive:{}>", name),
                Procedure::Lambda(lambda) => {
                    write!(f, "#<lambda ({})>", lambda.params.join(" "))
                }
            },
            Sexpr::Void => write!(f, "#<void>"),
        }
    }
}

pub type PrimitiveFunc = fn(Vec<Node>, Span) -> EvalResult;

/// A user-defined procedure: parameter names, an unevaluated body and the
/// frame the `lambda` form was evaluated in.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Clone)] // Need Clone for Sexpr::Procedure
pub enum Procedure {
    Primitive(PrimitiveFunc, &'static str), // The function pointer and its name (for display/debug)
    Lambda(Rc<Lambda>),
}

// The captured environment usually contains the procedure itself, so it is
// left out of the debug output.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            Procedure::Lambda(lambda) => f
                .debug_struct("Lambda")
                .field("params", &lambda.params)
                .field("body", &lambda.body)
                .finish_non_exhaustive(),
        }
    }
}

// Primitives compare by name, lambdas by identity.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(_, n1), Procedure::Primitive(_, n2)) => n1 == n2,
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            _ => false,
        }
    }
}
