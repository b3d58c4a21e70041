use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{ArgAction, Parser};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};
use tracing::{info, warn};

use lispy::evaluator::special_form_identifiers;
use lispy::{
    Environment, Error, INTERPRETER_STACK_SIZE, Sexpr, Token, TokenKind, evaluate, logging,
    parse_all, tokenize,
};

/// Interactive read-eval-print loop.
#[derive(Parser, Debug)]
#[command(name = "repl", version)]
struct Cli {
    /// Use emacs key bindings instead of vi
    #[arg(long)]
    emacs: bool,

    /// Where to load and save input history
    #[arg(long, default_value = "lispy_history.txt")]
    history: PathBuf,

    /// Neither load nor save history
    #[arg(long)]
    no_history: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

struct LispyCompleter {
    env: Rc<RefCell<Environment>>,
}

impl LispyCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        LispyCompleter { env }
    }
}

impl rustyline::completion::Completer for LispyCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        // Only complete an atom that ends right at the cursor
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last() {
                Some(Token {
                    kind: TokenKind::Atom(prefix),
                    span,
                }) if span.end == pos => prefix.clone(),
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };

        let mut candidates: Vec<String> = self
            .env
            .borrow()
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter_map(|id| id.strip_prefix(prefix.as_str()))
            .filter(|suffix| !suffix.is_empty())
            .map(str::to_string)
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct LispyHelper {
    #[rustyline(Validator)]
    validator: ParenValidator,
    #[rustyline(Highlighter)]
    highlighter: ParenHighlighter,
    #[rustyline(Completer)]
    completer: LispyCompleter,
}

/// Open-paren depth at the end of `input`, or the byte position of the
/// first `)` that has nothing to close.
fn paren_depth(input: &str) -> Result<usize, usize> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Err(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    Ok(depth)
}

/// Keeps reading lines while a `(` is still open.
struct ParenValidator;

impl Validator for ParenValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        match paren_depth(ctx.input()) {
            Err(i) => Ok(ValidationResult::Invalid(Some(format!(
                "  - Unmatched ')' at position {}",
                i
            )))),
            Ok(0) => Ok(ValidationResult::Valid(None)),
            Ok(_) => Ok(ValidationResult::Incomplete),
        }
    }
}

/// Highlights the pair of parentheses at the cursor and any unmatched `)`.
struct ParenHighlighter;

impl Highlighter for ParenHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> std::borrow::Cow<'l, str> {
        let cursor = pos.checked_sub(1);
        // (byte index in line, byte offset in highlighted)
        let mut stack: Vec<(usize, usize)> = Vec::new();
        let mut highlighted = String::with_capacity(line.len());

        for (i, c) in line.char_indices() {
            match c {
                '(' => {
                    stack.push((i, highlighted.len()));
                    highlighted.push(c);
                }
                ')' => match stack.pop() {
                    Some((open_index, open_offset)) => {
                        if cursor == Some(open_index) || cursor == Some(i) {
                            // Blue for the matching pair
                            highlighted
                                .replace_range(open_offset..open_offset + 1, "\x1b[1;34m(\x1b[0m");
                            highlighted.push_str("\x1b[1;34m)\x1b[0m");
                        } else {
                            highlighted.push(c);
                        }
                    }
                    None => highlighted.push_str("\x1b[31m)\x1b[0m"), // Red for unmatched closing parens
                },
                _ => highlighted.push(c),
            }
        }

        std::borrow::Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn eval_line(input: &str, env: &Rc<RefCell<Environment>>) -> Result<(), Error> {
    for node in parse_all(input)? {
        let result = evaluate(&node, env)?;
        if !matches!(result.kind, Sexpr::Void) {
            println!("{}", result);
        }
    }
    Ok(())
}

fn main() -> rustyline::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    std::thread::Builder::new()
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || run_repl(cli))?
        .join()
        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

fn run_repl(cli: Cli) -> rustyline::Result<()> {
    println!("lispy REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let global_env = Environment::new_global_populated();
    let helper = LispyHelper {
        highlighter: ParenHighlighter,
        validator: ParenValidator,
        completer: LispyCompleter::new(global_env.clone()),
    };
    let edit_mode = if cli.emacs {
        rustyline::EditMode::Emacs
    } else {
        rustyline::EditMode::Vi
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .build();
    let mut rl: Editor<LispyHelper, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if !cli.no_history && rl.load_history(&cli.history).is_err() {
        info!(path = %cli.history.display(), "no previous history");
    }

    loop {
        match rl.readline("lispy> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                if let Err(err) = eval_line(trimmed_input, &global_env) {
                    if err.pretty_print(trimmed_input).is_err() {
                        eprintln!("Error: {}", err);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                warn!(error = %err, "readline failed");
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }

    if cli.no_history {
        Ok(())
    } else {
        rl.save_history(&cli.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paren_depth_balanced() {
        assert_eq!(paren_depth(""), Ok(0));
        assert_eq!(paren_depth("(+ 1 (* 2 3))"), Ok(0));
        assert_eq!(paren_depth("(define r 10) (* r r)"), Ok(0));
    }

    #[test]
    fn test_paren_depth_incomplete() {
        assert_eq!(paren_depth("(define (f x)"), Ok(1));
        assert_eq!(paren_depth("((lambda (x)\n  (* x"), Ok(3));
    }

    #[test]
    fn test_paren_depth_unmatched_close() {
        assert_eq!(paren_depth(")"), Err(0));
        assert_eq!(paren_depth("(+ 1 2))"), Err(7));
        assert_eq!(paren_depth("(a) ) ("), Err(4));
    }
}
