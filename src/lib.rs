// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod logging;
pub mod math;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod types;

use std::cell::RefCell;
use std::rc::Rc;

pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, MAX_EVAL_DEPTH, apply_procedure, evaluate};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use parser::{MAX_PARSE_DEPTH, ParseError, Parser, parse_all, parse_str};
pub use source::Span;
pub use types::{Node, Number, Procedure, Sexpr};

/// Any failure while reading or evaluating source text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl Error {
    /// Prints a diagnostic for this error against the source it came from.
    pub fn pretty_print(&self, input: &str) -> std::io::Result<()> {
        match self {
            Error::Parse(e) => e.pretty_print(input),
            Error::Eval(e) => e.pretty_print(input),
        }
    }
}

/// Stack size for threads that run the interpreter, enough for
/// [`MAX_EVAL_DEPTH`] nested evaluations in unoptimized builds.
pub const INTERPRETER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Parses every expression in `input` and evaluates them in order in `env`,
/// returning the value of the last one. Input without any expression is a
/// syntax error.
pub fn eval_str(input: &str, env: &Rc<RefCell<Environment>>) -> Result<Node, Error> {
    let nodes = parse_all(input)?;
    if nodes.is_empty() {
        return Err(ParseError::UnexpectedEof("an expression".to_string()).into());
    }
    let mut result = Node::new_void(Span::default());
    for node in &nodes {
        result = evaluate(node, env)?;
    }
    Ok(result)
}
