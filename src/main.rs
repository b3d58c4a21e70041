use std::cell::RefCell;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::{ArgAction, Parser};
use lispy::{Environment, Error, INTERPRETER_STACK_SIZE, Sexpr, evaluate, logging, parse_all};
use tracing::{debug, info};

/// Evaluates a Lisp program and prints the value of every top-level
/// expression that produces one.
#[derive(Parser, Debug)]
#[command(name = "lispy", version)]
struct Cli {
    /// Program file to run; reads stdin when neither a file nor --eval is given
    file: Option<PathBuf>,

    /// Evaluate this expression instead of a file
    #[arg(short, long, conflicts_with = "file")]
    eval: Option<String>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn read_source(cli: &Cli) -> std::io::Result<String> {
    if let Some(expr) = &cli.eval {
        return Ok(expr.clone());
    }
    match &cli.file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

fn report(err: &Error, source: &str) {
    if err.pretty_print(source).is_err() {
        eprintln!("Error: {}", err);
    }
}

fn run(source: &str, env: &Rc<RefCell<Environment>>) -> Result<(), Error> {
    let nodes = parse_all(source)?;
    info!(expressions = nodes.len(), "parsed program");
    for node in &nodes {
        let result = evaluate(node, env)?;
        if !matches!(result.kind, Sexpr::Void) {
            println!("{}", result);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    debug!(?cli, "starting");

    let source = match read_source(&cli) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading input: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let interpreter = std::thread::Builder::new()
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || {
            let global_env = Environment::new_global_populated();
            match run(&source, &global_env) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    report(&err, &source);
                    ExitCode::FAILURE
                }
            }
        });
    match interpreter {
        Ok(handle) => handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
        Err(e) => {
            eprintln!("Error starting interpreter: {}", e);
            ExitCode::FAILURE
        }
    }
}
