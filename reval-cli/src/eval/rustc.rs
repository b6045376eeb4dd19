//! `rustc` as the session's toolchain, import resolver and type oracle.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use syn::parse_quote;

use super::driver::{Stage, Step, Toolchain, TypeOracle};
use super::imports::{AuxiliaryFile, ImportResolver};
use super::program::{Indent, Program};
use crate::config::ToolchainConfig;
use crate::error::{Error, Result};

const CRATE_NAME: &str = "reval_session";
const ROOT_FILE: &str = "reval_root.rs";
const TYPE_FILE: &str = "reval_type.rs";
const TYPE_ROOT_FILE: &str = "reval_type_root.rs";
const IMPORT_FILE: &str = "reval_import.rs";
const TYPE_QUERY: &str = "__reval_type_query";

/// Drives a local `rustc` inside the session's scratch directory.
#[derive(Debug, Clone)]
pub struct Rustc {
    config: ToolchainConfig,
    scratch: PathBuf,
}

impl Rustc {
    #[must_use]
    pub fn new(config: &ToolchainConfig, scratch: &Path) -> Self {
        Self {
            config: config.clone(),
            scratch: scratch.to_path_buf(),
        }
    }

    /// Whether the configured compiler can be started at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.config.rustc)
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.rustc);
        command
            .arg("--edition")
            .arg(&self.config.edition)
            .args(["--color", "never", "-A", "warnings"])
            .args(&self.config.args);
        command
    }

    /// The file to hand to `rustc`: `main` itself, or a generated root that
    /// includes it and mounts the auxiliary modules.
    fn crate_root(&self, main: &Path, aux: &[AuxiliaryFile], name: &str) -> Result<PathBuf> {
        if aux.is_empty() {
            return Ok(main.to_path_buf());
        }
        let root = self.scratch.join(name);
        std::fs::write(&root, root_source(main, aux))?;
        Ok(root)
    }

    /// Run a metadata-only check and return stderr when it fails.
    fn check(&self, root: &Path, crate_type: &str) -> Result<Option<String>> {
        let output = self
            .command()
            .args(["--crate-type", crate_type, "--crate-name", CRATE_NAME])
            .arg("--emit=metadata")
            .arg("--out-dir")
            .arg(&self.scratch)
            .arg(root)
            .output()?;
        if output.status.success() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&output.stderr).into_owned()))
        }
    }
}

impl Toolchain for Rustc {
    fn steps(&self, main: &Path, aux: &[AuxiliaryFile]) -> Result<Vec<Step>> {
        let root = self.crate_root(main, aux, ROOT_FILE)?;
        let binary = self.scratch.join(CRATE_NAME);

        let mut compile = self.command();
        compile
            .args(["--crate-type", "bin", "--crate-name", CRATE_NAME, "-o"])
            .arg(&binary)
            .arg(&root);

        Ok(vec![
            Step::new(Stage::Compile, compile),
            Step::new(Stage::Run, Command::new(binary)),
        ])
    }
}

impl ImportResolver for Rustc {
    fn resolve(&self, path: &str) -> Result<(), String> {
        let file = self.scratch.join(IMPORT_FILE);
        let source = format!("#![allow(unused_imports)]\nuse {path};\n");
        std::fs::write(&file, source).map_err(|err| err.to_string())?;
        match self.check(&file, "lib") {
            Ok(None) => Ok(()),
            Ok(Some(stderr)) => Err(first_error(&stderr)),
            Err(err) => Err(err.to_string()),
        }
    }
}

impl TypeOracle for Rustc {
    fn type_of(&self, program: &Program, aux: &[AuxiliaryFile], expr: &syn::Expr) -> Result<String> {
        let mut probe = program.clone();
        let query = quote::format_ident!("{}", TYPE_QUERY);
        probe.body_mut().push(parse_quote!(let #query: () = (#expr);));

        let main = self.scratch.join(TYPE_FILE);
        std::fs::write(&main, probe.source(Indent::Tabs))?;
        let root = self.crate_root(&main, aux, TYPE_ROOT_FILE)?;

        match self.check(&root, "bin")? {
            None => Ok("()".to_string()),
            Some(stderr) => parse_type_mismatch(&stderr).ok_or_else(|| Error::Type(first_error(&stderr))),
        }
    }
}

/// A crate root including `main` and mounting every auxiliary file as a
/// glob-imported module.
fn root_source(main: &Path, aux: &[AuxiliaryFile]) -> String {
    let mut source = format!("include!({:?});\n", main.display().to_string());
    for (index, file) in aux.iter().enumerate() {
        let _ = write!(
            source,
            "\n#[path = {:?}]\nmod reval_aux_{index};\n#[allow(unused_imports)]\nuse reval_aux_{index}::*;\n",
            file.scratch.display().to_string(),
        );
    }
    source
}

/// The first `error` line of a compiler diagnostic.
fn first_error(stderr: &str) -> String {
    stderr
        .lines()
        .find(|line| line.starts_with("error"))
        .unwrap_or_else(|| stderr.trim())
        .to_string()
}

/// Extract `T` from rustc's "expected `()`, found T" label.
fn parse_type_mismatch(stderr: &str) -> Option<String> {
    const LABEL: &str = "expected `()`, found ";
    let found = stderr.lines().find_map(|line| {
        let start = line.find(LABEL)?;
        Some(line[start + LABEL.len()..].trim())
    })?;
    if let (Some(open), Some(close)) = (found.find('`'), found.rfind('`')) {
        if open < close {
            return Some(found[open + 1..close].to_string());
        }
    }
    match found {
        "integer" => Some("{integer}".to_string()),
        "floating-point number" => Some("{float}".to_string()),
        other => Some(other.to_string()),
    }
}
