//! The evaluation engine: one program, grown input by input.

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use super::checkpoint::Checkpoint;
use super::classify::{self, Unclassified};
use super::commands::{self, CommandSpec, COMMANDS};
use super::complete::{self, CompletionIndex};
use super::driver::{Driver, Toolchain, TypeOracle};
use super::imports::{self, AuxiliaryFile, ImportFixer, ImportResolver, StdImportFixer};
use super::program::{Indent, PrinterBackend, Program, PRINTER_BACKENDS};
use super::rustc::Rustc;
use super::splice;
use crate::config::{Config, ToolchainConfig};
use crate::error::{Error, Result};

/// What the caller should do after an input was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The input was fully handled.
    Evaluated,
    /// The input is incomplete; append the next line and evaluate again.
    NeedMore,
    /// The user asked to leave.
    Quit,
}

/// The external programs a session talks to.
pub struct Facilities {
    pub toolchain: Box<dyn Toolchain>,
    pub resolver: Box<dyn ImportResolver>,
    pub oracle: Box<dyn TypeOracle>,
    pub fixer: Box<dyn ImportFixer>,
}

impl Facilities {
    /// `rustc` for everything, with the built-in import fixer.
    #[must_use]
    pub fn rustc(config: &ToolchainConfig, scratch: &Path) -> Self {
        let rustc = Rustc::new(config, scratch);
        Self {
            toolchain: Box::new(rustc.clone()),
            resolver: Box::new(rustc.clone()),
            oracle: Box::new(rustc),
            fixer: Box::new(StdImportFixer),
        }
    }
}

/// A REPL session.
pub struct Session {
    pub(super) config: Config,
    scratch: TempDir,
    driver: Driver,
    backend: PrinterBackend,
    pub(super) program: Program,
    pub(super) checkpoint: Checkpoint,
    aux_files: Vec<AuxiliaryFile>,
    facilities: Facilities,
    pub(super) commands: &'static [CommandSpec],
    pub(super) out: Box<dyn Write + Send>,
    pub(super) err: Box<dyn Write + Send>,
}

impl Session {
    /// Start a session backed by `rustc`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPrinter`] when no print helper backend resolves,
    /// or an I/O error if the scratch directory cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_facilities(config, |scratch, config| Facilities::rustc(&config.toolchain, scratch))
    }

    /// Start a session whose facilities are built by `build` from the
    /// scratch directory.
    ///
    /// # Errors
    ///
    /// Same as [`Session::new`].
    pub fn with_facilities(
        config: Config,
        build: impl FnOnce(&Path, &Config) -> Facilities,
    ) -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("reval-").tempdir()?;
        let facilities = build(scratch.path(), &config);
        let backend = resolve_printer(&*facilities.resolver)?;
        let program = Program::new(backend, config.pretty)?;
        tracing::debug!(scratch = %scratch.path().display(), printer = backend.import, "session started");

        Ok(Self {
            driver: Driver::new(scratch.path(), config.toolchain.fault_status),
            config,
            scratch,
            backend,
            program,
            checkpoint: Checkpoint::new(),
            aux_files: Vec::new(),
            facilities,
            commands: COMMANDS,
            out: Box::new(std::io::stdout()),
            err: Box::new(std::io::stderr()),
        })
    }

    /// Send program and command output to `out` and diagnostics to `err`.
    pub fn set_output(&mut self, out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) {
        self.out = out;
        self.err = err;
    }

    /// Turn automatic import fixing on or off.
    pub fn set_auto_import(&mut self, enabled: bool) {
        self.config.auto_import = enabled;
    }

    /// Evaluate one input: a command, or code to splice and run.
    ///
    /// A failing input is rolled back so the program is as it was before.
    ///
    /// # Errors
    ///
    /// Returns the command, syntax or toolchain failure.
    pub fn eval(&mut self, input: &str) -> Result<Flow> {
        if input.trim().is_empty() {
            return Ok(Flow::Evaluated);
        }
        self.checkpoint.snapshot(&self.program);
        if classify::is_command(input) {
            return commands::dispatch(self, input);
        }

        let classified = match classify::classify(input) {
            Ok(classified) => classified,
            Err(Unclassified::Incomplete) => return Ok(Flow::NeedMore),
            Err(Unclassified::Syntax(message)) => return Err(Error::Syntax(message)),
            Err(Unclassified::Reserved(name)) => return Err(Error::ReservedName(name)),
        };
        tracing::debug!(kind = classified.kind(), "classified input");

        splice::apply(&mut self.program, classified);
        if self.config.auto_import {
            self.fix_imports();
        }
        self.run()
    }

    /// Run the current program, rolling back to the checkpoint on failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Run`] for an unsuccessful outcome.
    pub fn run(&mut self) -> Result<Flow> {
        let outcome = self.driver.run(
            &*self.facilities.toolchain,
            &self.program,
            &self.aux_files,
            &mut *self.out,
            &mut *self.err,
        );
        match outcome {
            Ok(outcome) if outcome.is_success() => Ok(Flow::Evaluated),
            Ok(outcome) => {
                self.checkpoint.restore(&mut self.program);
                Err(Error::Run(outcome))
            }
            Err(err) => {
                self.checkpoint.restore(&mut self.program);
                Err(err)
            }
        }
    }

    /// Write `err` to the diagnostics stream as an `error:` line.
    pub fn report(&mut self, err: impl std::fmt::Display) {
        if let Err(write_err) = writeln!(self.err, "error: {err}") {
            tracing::warn!(%write_err, "could not report error");
        }
    }

    fn fix_imports(&mut self) {
        if let Err(err) = imports::auto_fix_imports(&mut self.program, &*self.facilities.fixer) {
            tracing::warn!(%err, "automatic import fixing failed");
        }
    }

    /// Validate and add an import.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvablePackage`] when the path does not resolve.
    pub fn add_import(&mut self, path: &str) -> Result<()> {
        imports::add_import(&mut self.program, &*self.facilities.resolver, path)
    }

    /// The type of `expr` in the context of the current program.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Type`] when the oracle cannot type the expression.
    pub fn type_of(&self, expr: &syn::Expr) -> Result<String> {
        self.facilities.oracle.type_of(&self.program, &self.aux_files, expr)
    }

    /// Include a source file: merge its imports and make its items
    /// available to the program.
    ///
    /// Imports that do not resolve are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or copied.
    pub fn include_file(&mut self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path)?;
        let included = imports::rewrite_included(&source)?;

        for tree in &included.imports {
            let import = imports::tree_path(tree);
            if let Err(err) = self.add_import(&import) {
                self.report(&err);
            }
        }

        let scratch = self
            .scratch
            .path()
            .join(format!("reval_aux_{}.rs", self.aux_files.len()));
        std::fs::write(&scratch, prettyplease::unparse(&included.module))?;
        tracing::debug!(origin = %path.display(), "included file");
        self.aux_files.push(AuxiliaryFile {
            origin: path.to_path_buf(),
            scratch,
        });
        Ok(())
    }

    /// Include every `.rs` file of a package directory, in name order.
    ///
    /// The directory's `src/` is used when it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file fails to
    /// include.
    pub fn include_package(&mut self, dir: &Path) -> Result<()> {
        let src = dir.join("src");
        let dir = if src.is_dir() { src } else { dir.to_path_buf() };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "rs") {
                files.push(path);
            }
        }
        files.sort();
        tracing::debug!(dir = %dir.display(), files = files.len(), "including package");

        for file in files {
            self.include_file(&file)?;
        }
        Ok(())
    }

    /// Forget everything: program, checkpoint and included files.
    ///
    /// # Errors
    ///
    /// Only fails if the initial program cannot be rebuilt.
    pub fn clear(&mut self) -> Result<()> {
        self.program = Program::new(self.backend, self.config.pretty)?;
        self.checkpoint.discard();
        for file in self.aux_files.drain(..) {
            let _ = std::fs::remove_file(&file.scratch);
        }
        Ok(())
    }

    /// The current program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The current program as source text.
    #[must_use]
    pub fn source(&self, indent: Indent) -> String {
        self.program.source(indent)
    }

    /// Files included so far.
    #[must_use]
    pub fn aux_files(&self) -> &[AuxiliaryFile] {
        &self.aux_files
    }

    /// The session's private scratch directory.
    #[must_use]
    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// A completion snapshot of the current program.
    #[must_use]
    pub fn completion_index(&self) -> CompletionIndex {
        CompletionIndex::new(&self.program, self.commands)
    }

    /// Complete the word at `pos` of `line`; see [`complete::complete_word`].
    #[must_use]
    pub fn complete_word(&self, line: &str, pos: usize) -> (String, Vec<String>, String) {
        complete::complete_word(&self.completion_index(), line, pos)
    }
}

/// The first printer backend whose import resolves.
fn resolve_printer(resolver: &dyn ImportResolver) -> Result<PrinterBackend> {
    PRINTER_BACKENDS
        .iter()
        .copied()
        .find(|backend| match resolver.resolve(backend.import) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(import = backend.import, %reason, "printer backend unavailable");
                false
            }
        })
        .ok_or(Error::NoPrinter)
}
