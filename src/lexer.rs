use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::Span;

/// Lexical tokens. Parentheses always stand alone; every other run of
/// non-whitespace characters is a single atom, classified later by the parser.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"\s+")] // Skip whitespace
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[regex(r"[^\s()]+", |lex| lex.slice().to_string())]
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

// Implement Display for easy printing
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Atom(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    // The token patterns cover every character, so logos only reports this
    // if the grammar above is changed.
    #[default]
    #[error("Invalid Token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

// Result type alias for convenience
type LexerResult<T> = Result<T, LexerError>;

/// Splits source text into tokens. Empty input yields no tokens.
pub fn tokenize(input: &str) -> LexerResult<Vec<Token>> {
    TokenKind::lexer(input)
        .spanned() // Yields (Result<TokenKind, LexerErrorKind>, Range<usize>)
        .map(|(result, range)| {
            let span = Span::new(range.start, range.end);
            match result {
                Ok(kind) => Ok(Token { kind, span }),
                Err(error) => Err(LexerError { error, span }),
            }
        })
        .collect()
}
