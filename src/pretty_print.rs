use std::io::{self, Write};
use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};

use crate::parser::MAX_PARSE_DEPTH;
use crate::{EnvError, EvalError, ParseError};

const SOURCE_ID: &str = "input";

type ReportSpan = (&'static str, Range<usize>);

fn label_span(range: Range<usize>) -> ReportSpan {
    (SOURCE_ID, range)
}

impl EvalError {
    fn report(&self, config: Config) -> Report<'static, ReportSpan> {
        let span = label_span(self.span().to_range());
        let builder = Report::build(ReportKind::Error, span.clone()).with_config(config);
        let builder = match self {
            EvalError::EnvError(env_error) => match env_error {
                EnvError::UnboundVariable(symbol, _) => builder
                    .with_message(format!("Unbound symbol `{}`", symbol))
                    .with_label(
                        Label::new(span)
                            .with_message("This symbol is not defined in the current scope"),
                    ),
                EnvError::ArityMismatch {
                    expected, found, ..
                } => builder
                    .with_message("Wrong number of arguments")
                    .with_label(Label::new(span).with_message(format!(
                        "This procedure takes {} arguments but was given {}",
                        expected, found
                    ))),
            },
            EvalError::NotAProcedure(sexpr, _) => builder
                .with_message(format!("Not a procedure: {}", sexpr))
                .with_label(
                    Label::new(span)
                        .with_message("This expression cannot be called as a procedure"),
                ),
            EvalError::InvalidArguments(message, _) => builder
                .with_message("Invalid arguments")
                .with_label(Label::new(span).with_message(message)),
            EvalError::NotASymbol(sexpr, _) => builder
                .with_message(format!("Not a symbol: {}", sexpr))
                .with_label(Label::new(span).with_message(format!(
                    "Expected a symbol but found a {}",
                    sexpr.type_name()
                ))),
            EvalError::InvalidSpecialForm(message, _) => builder
                .with_message(format!("Invalid special form: {}", message))
                .with_label(
                    Label::new(span).with_message("This special form is malformed or incomplete"),
                ),
            EvalError::TypeMismatch {
                expected, found, ..
            } => builder
                .with_message("Type mismatch")
                .with_label(Label::new(span).with_message(format!(
                    "Expected {}, found {} {}",
                    expected,
                    found.type_name(),
                    found
                ))),
            EvalError::RecursionLimit(limit, _) => builder
                .with_message(format!("Maximum recursion depth ({}) exceeded", limit))
                .with_label(
                    Label::new(span).with_message("Evaluation nested too deeply here"),
                ),
        };
        builder.finish()
    }

    /// Prints the error to stderr, pointing into `input`.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        self.report(Config::default())
            .eprint((SOURCE_ID, Source::from(input)))
    }

    /// Writes an uncoloured diagnostic to `out`.
    pub fn write_report<W: Write>(&self, input: &str, out: W) -> io::Result<()> {
        self.report(Config::default().with_color(false))
            .write((SOURCE_ID, Source::from(input)), out)
    }
}

impl ParseError {
    fn report(&self, input: &str, config: Config) -> Report<'static, ReportSpan> {
        let report = match self {
            ParseError::UnexpectedToken { found, expected } => {
                let span = label_span(found.span.to_range());
                Report::build(ReportKind::Error, span.clone())
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(Label::new(span).with_message(format!("Expected {expected}")))
            }
            ParseError::UnexpectedEof(expected) => {
                let idx = input.len();
                let span = label_span(idx..idx);
                Report::build(ReportKind::Error, span.clone())
                    .with_message("Unexpected end of input")
                    .with_label(Label::new(span).with_message(format!("Expected {expected}")))
            }
            ParseError::NestingTooDeep(open) => {
                let span = label_span(open.to_range());
                Report::build(ReportKind::Error, span.clone())
                    .with_message(format!("Lists nested deeper than {}", MAX_PARSE_DEPTH))
                    .with_label(Label::new(span).with_message("This list opens too deep"))
            }
            ParseError::LexerError(lex_err) => {
                let span = label_span(lex_err.span.to_range());
                Report::build(ReportKind::Error, span.clone())
                    .with_message("Lexer Error")
                    .with_label(Label::new(span).with_message(lex_err.error.to_string()))
            }
        };
        report.with_config(config).finish()
    }

    /// Prints the error to stderr, pointing into `input`.
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        self.report(input, Config::default())
            .eprint((SOURCE_ID, Source::from(input)))
    }

    /// Writes an uncoloured diagnostic to `out`.
    pub fn write_report<W: Write>(&self, input: &str, out: W) -> io::Result<()> {
        self.report(input, Config::default().with_color(false))
            .write((SOURCE_ID, Source::from(input)), out)
    }
}
