//! `reval`: an incremental read-eval-print loop for Rust.
//!
//! ```text
//! reval                          # Interactive REPL
//! reval "<expression>"           # Evaluate one input and exit
//! reval -f file.rs               # Evaluate a file in REPL context
//! reval --context util.rs        # Make a file's items available
//! reval --pkg path/to/crate      # Make a crate's source files available
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use reval::config::load_config;
use reval::eval::{eval_file, eval_one, run_interactive, Session};
use reval::logging::init_tracing;

#[derive(Parser)]
#[command(name = "reval", about = "Incremental REPL for Rust", version)]
struct Cli {
    /// Input to evaluate instead of starting the REPL.
    #[arg(value_name = "EXPR")]
    expr: Vec<String>,

    /// Evaluate a file line by line in REPL context.
    #[arg(short, long, value_name = "FILE", conflicts_with = "expr")]
    file: Option<PathBuf>,

    /// Fix imports automatically after every input.
    #[arg(long)]
    autoimport: bool,

    /// Include a package directory (its `src/` if present).
    #[arg(long, value_name = "DIR")]
    pkg: Vec<PathBuf>,

    /// Include a source file.
    #[arg(long, value_name = "FILE")]
    context: Vec<PathBuf>,

    /// Pretty-print values with `{:#?}`.
    #[arg(long)]
    pretty: bool,

    /// Configuration file (default `~/.reval/config.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref());
    config.auto_import |= cli.autoimport;
    config.pretty |= cli.pretty;

    let mut session = match Session::new(config) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    for dir in &cli.pkg {
        if let Err(err) = session.include_package(dir) {
            session.report(format_args!("{}: {err}", dir.display()));
        }
    }
    for file in &cli.context {
        if let Err(err) = session.include_file(file) {
            session.report(format_args!("{}: {err}", file.display()));
        }
    }

    let result = if let Some(file) = &cli.file {
        eval_file(&mut session, file)
    } else if !cli.expr.is_empty() {
        eval_one(&mut session, &cli.expr.join(" "))
    } else {
        return match run_interactive(&mut session) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                session.report(&err);
                ExitCode::FAILURE
            }
        };
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            session.report(&err);
            ExitCode::FAILURE
        }
    }
}
