//! Running the session program through an external toolchain.

use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

use super::errfilter::ErrFilter;
use super::imports::AuxiliaryFile;
use super::program::{Indent, Program};
use crate::error::Result;

/// File name of the serialized program inside the scratch directory.
pub const MAIN_FILE: &str = "reval_main.rs";

/// Exit status of a Rust program that panicked.
pub const PANIC_STATUS: i32 = 101;

/// Which step of the toolchain produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => f.write_str("compile"),
            Self::Run => f.write_str("run"),
        }
    }
}

/// How a run of the program ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The program itself aborted at runtime.
    Fault { status: i32 },
    /// A step exited unsuccessfully; `status` is `None` when it was killed
    /// by a signal.
    Failure { stage: Stage, status: Option<i32> },
}

impl Outcome {
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Fault { status } => write!(f, "program panicked (exit status {status})"),
            Self::Failure {
                stage: Stage::Compile,
                ..
            } => f.write_str("compile error"),
            Self::Failure {
                stage,
                status: Some(status),
            } => write!(f, "{stage} step failed with exit status {status}"),
            Self::Failure {
                stage,
                status: None,
            } => write!(f, "{stage} step was terminated by a signal"),
        }
    }
}

/// One process the toolchain wants run.
#[derive(Debug)]
pub struct Step {
    pub stage: Stage,
    pub command: Command,
}

impl Step {
    #[must_use]
    pub fn new(stage: Stage, command: Command) -> Self {
        Self { stage, command }
    }
}

/// Turns a serialized program into the processes that build and run it.
pub trait Toolchain {
    /// Steps to execute, in order, for the program written to `main`.
    ///
    /// # Errors
    ///
    /// Returns an error if preparing the steps fails, e.g. when a generated
    /// file cannot be written.
    fn steps(&self, main: &Path, aux: &[AuxiliaryFile]) -> Result<Vec<Step>>;
}

/// Answers "what is the type of this expression" in the context of a program.
pub trait TypeOracle {
    /// The type of `expr` evaluated at the end of the entry point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Type`] when the expression cannot be typed.
    fn type_of(&self, program: &Program, aux: &[AuxiliaryFile], expr: &syn::Expr) -> Result<String>;
}

/// Executes toolchain steps and decodes their exit statuses.
#[derive(Debug, Clone)]
pub struct Driver {
    scratch: PathBuf,
    fault_status: i32,
}

impl Driver {
    #[must_use]
    pub fn new(scratch: &Path, fault_status: i32) -> Self {
        Self {
            scratch: scratch.to_path_buf(),
            fault_status,
        }
    }

    /// Serialize `program`, then build and run it.
    ///
    /// Child stdout goes to `out`; child stderr goes through [`ErrFilter`]
    /// to `err`. The first unsuccessful step ends the run.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the scratch file cannot be written or a step
    /// cannot be started. Unsuccessful steps are reported in the outcome.
    pub fn run(
        &self,
        toolchain: &dyn Toolchain,
        program: &Program,
        aux: &[AuxiliaryFile],
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> Result<Outcome> {
        let main = self.scratch.join(MAIN_FILE);
        std::fs::write(&main, program.source(Indent::Tabs))?;

        for step in toolchain.steps(&main, aux)? {
            let stage = step.stage;
            let status = self.execute(step, out, err)?;
            if let Some(outcome) = self.decode(stage, status) {
                tracing::debug!(%outcome, "toolchain step failed");
                return Ok(outcome);
            }
        }
        Ok(Outcome::Success)
    }

    fn execute(
        &self,
        step: Step,
        out: &mut (dyn Write + Send),
        err: &mut (dyn Write + Send),
    ) -> io::Result<ExitStatus> {
        let Step { stage, mut command } = step;
        let stdin = match stage {
            Stage::Compile => Stdio::null(),
            Stage::Run => Stdio::inherit(),
        };
        tracing::debug!(?command, %stage, "running toolchain step");
        let mut child = command
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let scratch = self.scratch.as_path();

        std::thread::scope(|scope| -> io::Result<ExitStatus> {
            let out_pump = scope.spawn(move || pump(stdout, out));
            let err_pump = scope.spawn(move || -> io::Result<()> {
                let mut filter = ErrFilter::new(scratch, err)?;
                pump(stderr, &mut filter)?;
                filter.finish().map(drop)
            });
            let status = child.wait()?;
            for handle in [out_pump, err_pump] {
                handle
                    .join()
                    .map_err(|_| io::Error::other("output pump panicked"))??;
            }
            Ok(status)
        })
    }

    fn decode(&self, stage: Stage, status: ExitStatus) -> Option<Outcome> {
        match status.code() {
            Some(0) => None,
            Some(code) if stage == Stage::Run && code == self.fault_status => {
                Some(Outcome::Fault { status: code })
            }
            status => Some(Outcome::Failure { stage, status }),
        }
    }
}

fn pump(source: Option<impl Read>, sink: &mut dyn Write) -> io::Result<()> {
    if let Some(mut source) = source {
        io::copy(&mut source, sink)?;
    }
    sink.flush()
}

/// A cloneable in-memory writer, for capturing session output.
#[derive(Debug, Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        self.0
            .lock()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    /// Forget everything written so far.
    pub fn clear(&self) {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.clear();
        }
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("capture buffer poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::eval::program::PRINTER_BACKENDS;

    /// Compile and run steps given as shell snippets; `$1` is the main file.
    struct Script {
        compile: &'static str,
        run: &'static str,
    }

    impl Toolchain for Script {
        fn steps(&self, main: &Path, _aux: &[AuxiliaryFile]) -> Result<Vec<Step>> {
            Ok([(Stage::Compile, self.compile), (Stage::Run, self.run)]
                .into_iter()
                .map(|(stage, script)| {
                    let mut command = Command::new("sh");
                    command.arg("-c").arg(script).arg("sh").arg(main);
                    Step::new(stage, command)
                })
                .collect())
        }
    }

    fn run(script: &Script) -> (Outcome, String, String) {
        let dir = tempfile::Builder::new().prefix("reval-").tempdir().unwrap();
        let driver = Driver::new(dir.path(), PANIC_STATUS);
        let program = Program::new(PRINTER_BACKENDS[0], false).unwrap();
        let (mut out, mut err) = (Capture::new(), Capture::new());
        let outcome = driver.run(script, &program, &[], &mut out, &mut err).unwrap();
        (outcome, out.contents(), err.contents())
    }

    #[test]
    fn success_streams_stdout() {
        let (outcome, out, err) = run(&Script {
            compile: "test -f \"$1\"",
            run: "echo 2",
        });
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(out, "2\n");
        assert_eq!(err, "");
    }

    #[test]
    fn scratch_file_is_tab_indented() {
        let (outcome, out, _) = run(&Script {
            compile: "true",
            run: "grep -c \"$(printf '\\t')for x in xx\" \"$1\"",
        });
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(out, "1\n");
    }

    #[test]
    fn compile_failure_skips_run() {
        let (outcome, out, err) = run(&Script {
            compile: "echo 'error[E0425]: cannot find value' >&2; exit 1",
            run: "echo ran",
        });
        assert_eq!(
            outcome,
            Outcome::Failure {
                stage: Stage::Compile,
                status: Some(1)
            }
        );
        assert_eq!(out, "");
        assert!(err.contains("cannot find value"));
    }

    #[test]
    fn panic_status_is_a_fault_only_when_running() {
        let (outcome, _, _) = run(&Script {
            compile: "true",
            run: "exit 101",
        });
        assert_eq!(outcome, Outcome::Fault { status: 101 });

        let (outcome, _, _) = run(&Script {
            compile: "exit 101",
            run: "true",
        });
        assert_eq!(
            outcome,
            Outcome::Failure {
                stage: Stage::Compile,
                status: Some(101)
            }
        );
    }

    #[test]
    fn other_run_status_is_a_failure() {
        let (outcome, _, _) = run(&Script {
            compile: "true",
            run: "exit 3",
        });
        assert_eq!(
            outcome,
            Outcome::Failure {
                stage: Stage::Run,
                status: Some(3)
            }
        );
        assert_eq!(outcome.to_string(), "run step failed with exit status 3");
    }

    #[test]
    fn stderr_locations_are_stripped() {
        let (outcome, _, err) = run(&Script {
            compile: "true",
            run: "echo \"thread 'main' panicked at $1:3:5:\" >&2; echo boom >&2; exit 101",
        });
        assert_eq!(outcome, Outcome::Fault { status: 101 });
        assert_eq!(err, "thread 'main' panicked:\nboom\n");
    }
}
