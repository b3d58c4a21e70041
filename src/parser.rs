use crate::Span;
use crate::lexer::{LexerError, Token, TokenKind};
use crate::types::Node;
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Parse Error [at {}]: Unexpected token '{found}', expected {expected}", .found.span)]
    UnexpectedToken { found: Token, expected: String },
    #[error("Parse Error: Unexpected end of input. Expected {0}")]
    UnexpectedEof(String),
    #[error("Parse Error [at {}]: Lists nested deeper than {}", .0, MAX_PARSE_DEPTH)]
    NestingTooDeep(Span),
    #[error("Lexer Error during parse: {0}")]
    LexerError(#[from] LexerError),
}

/// Deepest list nesting the reader accepts.
pub const MAX_PARSE_DEPTH: usize = 1000;

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

/// Recursive-descent reader over a token stream. Each call to
/// [`Parser::parse_expr`] consumes exactly the tokens of one expression.
pub struct Parser {
    // We iterate over owned Tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
    depth: usize, // Lists currently open
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            depth: 0,
        }
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    /// True once every token has been consumed.
    pub fn is_empty(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    /// Parses a single S-expression from the front of the token stream.
    pub fn parse_expr(&mut self) -> ParseResult<Node> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => {
                if self.depth >= MAX_PARSE_DEPTH {
                    return Err(ParseError::NestingTooDeep(span));
                }
                self.depth += 1;
                let list = self.parse_list(span);
                self.depth -= 1;
                list
            }
            Some(
                found @ Token {
                    kind: TokenKind::RParen,
                    ..
                },
            ) => Err(ParseError::UnexpectedToken {
                found,
                expected: "an atom or '('".to_string(),
            }),
            Some(Token {
                kind: TokenKind::Atom(text),
                span,
            }) => Ok(atom(&text, span)),
            None => Err(ParseError::UnexpectedEof("an expression".to_string())),
        }
    }

    /// Parses the elements of a list whose `(` has already been consumed.
    fn parse_list(&mut self, open: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            if let Some(close) = self.tokens.next_if(|t| t.kind == TokenKind::RParen) {
                return Ok(Node::new_list(elements, open.merge(close.span)));
            }
            if self.is_empty() {
                return Err(ParseError::UnexpectedEof("')'".to_string()));
            }
            elements.push(self.parse_expr()?);
        }
    }

    /// Parses exactly one top-level expression; leftover tokens are an error.
    pub fn parse(mut self) -> ParseResult<Node> {
        let expr = self.parse_expr()?;

        // Check if there are any tokens left - shouldn't be for a single expression parse
        if let Some(found) = self.next_token() {
            Err(ParseError::UnexpectedToken {
                found,
                expected: "end of input".to_string(),
            })
        } else {
            Ok(expr)
        }
    }

    /// Parses every top-level expression in order.
    pub fn parse_all(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while !self.is_empty() {
            expressions.push(self.parse_expr()?);
        }
        Ok(expressions)
    }
}

/// Classifies a single token: integer first, then float, otherwise a symbol.
pub fn atom(text: &str, span: Span) -> Node {
    if let Ok(n) = text.parse::<i64>() {
        Node::new_int(n, span)
    } else if let Ok(n) = text.parse::<f64>() {
        Node::new_float(n, span)
    } else {
        Node::new_symbol(text, span)
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Node> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse()
}

/// Lexes and parses every top-level expression in `input`.
pub fn parse_all(input: &str) -> ParseResult<Vec<Node>> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse_all()
}
