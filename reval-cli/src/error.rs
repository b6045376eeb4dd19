//! Error type shared by the evaluation engine and the command handlers.

use std::io;

use crate::eval::driver::Outcome;

/// Everything that can go wrong while evaluating an input or a command.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input contains a token the lexer rejects.
    #[error("invalid token: {0}")]
    Syntax(String),
    /// The input redefines a declaration the session owns.
    #[error("`{0}` is reserved by the session and cannot be redefined")]
    ReservedName(String),
    /// A source text does not form a valid session program.
    #[error("invalid program: {0}")]
    InvalidProgram(String),
    /// None of the print helper backends could be resolved.
    #[error("could not load pretty printing support (even `std::fmt::Debug`; something is wrong)")]
    NoPrinter,
    /// An import path failed validation.
    #[error("cannot import `{path}`: {reason}")]
    UnresolvablePackage { path: String, reason: String },
    /// A command was invoked without its mandatory argument.
    #[error("argument is required")]
    MissingArgument,
    /// No command matches the typed name.
    #[error("command not found: {0}")]
    UnknownCommand(String),
    /// A command handler failed.
    #[error("{name}: {source}")]
    Command {
        name: String,
        #[source]
        source: Box<Error>,
    },
    /// The toolchain rejected or aborted the program.
    #[error("{0}")]
    Run(Outcome),
    /// The type oracle could not type an expression.
    #[error("cannot get type: {0}")]
    Type(String),
    /// `:doc` could not map its argument to a documentation topic.
    #[error("cannot determine the document location for `{0}`")]
    DocLocation(String),
    /// The external editor could not be started.
    #[error("couldn't start editor `{editor}`: {source}")]
    Editor {
        editor: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] syn::Error),
}

impl Error {
    /// Whether the error came from the toolchain rather than from the engine.
    #[must_use]
    pub fn is_run_failure(&self) -> bool {
        match self {
            Self::Run(_) => true,
            Self::Command { source, .. } => source.is_run_failure(),
            _ => false,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
