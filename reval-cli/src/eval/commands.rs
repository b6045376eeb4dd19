//! `:`-prefixed REPL commands.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use syn::{Expr, Item, UseTree};

use super::complete::{self, CompletionIndex};
use super::program::{Indent, Program};
use super::session::{Flow, Session};
use crate::error::{Error, Result};

/// A command name with an optional abbreviable tail, e.g. `i[mport]`
/// accepts `i`, `im`, ... `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandName(pub &'static str);

impl CommandName {
    /// The shortest accepted spelling.
    #[must_use]
    pub fn required(self) -> &'static str {
        self.0.split('[').next().unwrap_or(self.0)
    }

    /// The full spelling.
    #[must_use]
    pub fn full(self) -> String {
        self.0.replace(['[', ']'], "")
    }

    /// Whether `word` is an accepted spelling.
    #[must_use]
    pub fn matches(self, word: &str) -> bool {
        word.starts_with(self.required()) && self.full().starts_with(word)
    }
}

/// Runs a command with its (trimmed) argument.
pub type Handler = fn(&mut Session, &str) -> Result<Flow>;

/// Completes a partial command argument; returns replacements for it.
pub type Completer = fn(&CompletionIndex, &str) -> Vec<String>;

/// One entry of the command table.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: CommandName,
    /// Argument synopsis shown by `:help`; empty when there is none.
    pub arg: &'static str,
    pub help: &'static str,
    pub handler: Handler,
    pub complete: Option<Completer>,
}

impl CommandSpec {
    #[must_use]
    pub fn takes_argument(&self) -> bool {
        !self.arg.is_empty()
    }
}

/// Every command, in the order `:help` lists them.
pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: CommandName("i[mport]"),
        arg: "<package>",
        help: "import packages",
        handler: action_import,
        complete: Some(complete::import_argument),
    },
    CommandSpec {
        name: CommandName("t[ype]"),
        arg: "<expr>",
        help: "print the type of expression",
        handler: action_type,
        complete: Some(complete::code_argument),
    },
    CommandSpec {
        name: CommandName("print"),
        arg: "",
        help: "print current source",
        handler: action_print,
        complete: None,
    },
    CommandSpec {
        name: CommandName("w[rite]"),
        arg: "[<file>]",
        help: "write out current source",
        handler: action_write,
        complete: None,
    },
    CommandSpec {
        name: CommandName("clear"),
        arg: "",
        help: "clear the codes",
        handler: action_clear,
        complete: None,
    },
    CommandSpec {
        name: CommandName("d[oc]"),
        arg: "<expr or pkg>",
        help: "show documentation",
        handler: action_doc,
        complete: Some(complete::code_argument),
    },
    CommandSpec {
        name: CommandName("h[elp]"),
        arg: "",
        help: "show this help",
        handler: action_help,
        complete: None,
    },
    CommandSpec {
        name: CommandName("q[uit]"),
        arg: "",
        help: "quit the session",
        handler: action_quit,
        complete: None,
    },
    CommandSpec {
        name: CommandName("e[dit]"),
        arg: "[<cmd>]",
        help: "edit the source in an external editor",
        handler: action_edit,
        complete: None,
    },
    CommandSpec {
        name: CommandName("r[un]"),
        arg: "",
        help: "run the current program",
        handler: action_run,
        complete: None,
    },
];

/// Find the command `word` names.
#[must_use]
pub fn lookup(commands: &'static [CommandSpec], word: &str) -> Option<&'static CommandSpec> {
    commands.iter().find(|spec| spec.name.matches(word))
}

/// Split `:name arg` into the name and the trimmed argument.
#[must_use]
pub fn split_command(input: &str) -> (&str, &str) {
    let rest = input.trim_start().trim_start_matches([':', ' ', '\t']);
    match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest.trim_end(), ""),
    }
}

/// Run the command in `input`.
///
/// # Errors
///
/// Returns [`Error::UnknownCommand`] when no command matches, or the
/// handler's failure wrapped in [`Error::Command`].
pub fn dispatch(session: &mut Session, input: &str) -> Result<Flow> {
    let (word, arg) = split_command(input);
    let spec = lookup(session.commands, word).ok_or_else(|| Error::UnknownCommand(word.to_string()))?;
    tracing::debug!(command = %spec.name.full(), %arg, "dispatching command");
    (spec.handler)(session, arg).map_err(|source| Error::Command {
        name: spec.name.full(),
        source: Box::new(source),
    })
}

fn require(arg: &str) -> Result<&str> {
    if arg.is_empty() {
        Err(Error::MissingArgument)
    } else {
        Ok(arg)
    }
}

fn action_import(session: &mut Session, arg: &str) -> Result<Flow> {
    for path in split_imports(require(arg)?) {
        session.add_import(path)?;
    }
    Ok(Flow::Evaluated)
}

/// Split an argument into use trees at top-level whitespace, so
/// `std::io::{self, Write} std::fmt` gives two imports.
fn split_imports(arg: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (index, c) in arg.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(from) = start.take() {
                    parts.push(&arg[from..index]);
                }
                continue;
            }
            _ => {}
        }
        start.get_or_insert(index);
    }
    if let Some(from) = start {
        parts.push(&arg[from..]);
    }
    parts
}

fn action_type(session: &mut Session, arg: &str) -> Result<Flow> {
    let expr: Expr = syn::parse_str(require(arg)?)?;
    let ty = session.type_of(&expr)?;
    writeln!(session.out, "{ty}")?;
    Ok(Flow::Evaluated)
}

fn action_print(session: &mut Session, _: &str) -> Result<Flow> {
    let source = session.program.source(Indent::Spaces);
    write!(session.out, "{source}")?;
    Ok(Flow::Evaluated)
}

fn action_write(session: &mut Session, arg: &str) -> Result<Flow> {
    let file = if arg.is_empty() {
        PathBuf::from(
            chrono::Local::now()
                .format("reval_session_%Y%m%d_%H%M%S.rs")
                .to_string(),
        )
    } else {
        PathBuf::from(arg)
    };
    std::fs::write(&file, session.program.source(Indent::Spaces))?;
    writeln!(session.out, "Source wrote to {}", file.display())?;
    Ok(Flow::Evaluated)
}

fn action_clear(session: &mut Session, _: &str) -> Result<Flow> {
    session.clear()?;
    Ok(Flow::Evaluated)
}

fn action_help(session: &mut Session, _: &str) -> Result<Flow> {
    let mut text = String::new();
    for spec in session.commands {
        let usage = format!(":{} {}", spec.name.0, spec.arg);
        text.push_str(&format!("    {usage:<24}{}\n", spec.help));
    }
    write!(session.out, "{text}")?;
    Ok(Flow::Evaluated)
}

fn action_quit(_: &mut Session, _: &str) -> Result<Flow> {
    Ok(Flow::Quit)
}

fn action_run(session: &mut Session, _: &str) -> Result<Flow> {
    session.run()
}

fn action_doc(session: &mut Session, arg: &str) -> Result<Flow> {
    let topic = doc_topic(session, require(arg)?)?;
    let Some((program, args)) = session.config.doc.command.split_first() else {
        return Err(Error::DocLocation(topic));
    };
    tracing::debug!(%topic, %program, "opening documentation");

    let mut doc = Command::new(program);
    doc.args(args).arg(&topic).stdin(Stdio::null());

    match std::env::var("REVAL_PAGER").ok().filter(|pager| !pager.is_empty()) {
        Some(pager) => {
            let mut child = doc.stdout(Stdio::piped()).spawn()?;
            let input = child
                .stdout
                .take()
                .map_or_else(Stdio::null, Stdio::from);
            let pager_status = Command::new("sh").arg("-c").arg(&pager).stdin(input).status()?;
            let status = child.wait()?;
            if !status.success() || !pager_status.success() {
                return Err(Error::Io(std::io::Error::other(format!(
                    "`{program}` exited with {status}"
                ))));
            }
        }
        None => {
            let output = doc.output()?;
            session.out.write_all(&output.stdout)?;
            session.err.write_all(&output.stderr)?;
            if !output.status.success() {
                return Err(Error::Io(std::io::Error::other(format!(
                    "`{program}` exited with {}",
                    output.status
                ))));
            }
        }
    }
    Ok(Flow::Evaluated)
}

/// Types every program can name without an import.
const PRELUDE: &[(&str, &str)] = &[
    ("Box", "std::boxed::Box"),
    ("Option", "std::option::Option"),
    ("Some", "std::option::Option"),
    ("None", "std::option::Option"),
    ("Result", "std::result::Result"),
    ("Ok", "std::result::Result"),
    ("Err", "std::result::Result"),
    ("String", "std::string::String"),
    ("ToString", "std::string::ToString"),
    ("Vec", "std::vec::Vec"),
    ("Iterator", "std::iter::Iterator"),
    ("IntoIterator", "std::iter::IntoIterator"),
    ("Clone", "std::clone::Clone"),
    ("Default", "std::default::Default"),
    ("Drop", "std::ops::Drop"),
    ("From", "std::convert::From"),
    ("Into", "std::convert::Into"),
];

const PRIMITIVES: &[&str] = &[
    "bool", "char", "str", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64",
    "u128", "usize", "f32", "f64",
];

/// The documentation path for `arg`: a path is resolved through the
/// program's imports and the prelude, anything else through its type.
fn doc_topic(session: &Session, arg: &str) -> Result<String> {
    let expr: Expr = syn::parse_str(arg)?;
    if let Expr::Path(path) = &expr {
        if path.qself.is_none() {
            let segments: Vec<String> = path
                .path
                .segments
                .iter()
                .map(|segment| segment.ident.to_string())
                .collect();
            if let Some(topic) = resolve_path(session.program.items(), &segments) {
                return Ok(topic);
            }
        }
    }

    let ty = session.type_of(&expr)?;
    let name = type_path(&ty);
    let segments: Vec<String> = name.split("::").map(str::to_string).collect();
    resolve_path(session.program.items(), &segments).ok_or(Error::DocLocation(ty))
}

/// Expand the first segment of a path to a documentation path.
fn resolve_path(items: &[Item], segments: &[String]) -> Option<String> {
    let (first, rest) = segments.split_first()?;
    let base = if ["std", "core", "alloc"].contains(&first.as_str()) {
        first.clone()
    } else if let Some(full) = imported_paths(items).into_iter().find(|(name, _)| name == first) {
        full.1
    } else if let Some((_, full)) = PRELUDE.iter().find(|(name, _)| *name == first.as_str()) {
        (*full).to_string()
    } else if PRIMITIVES.contains(&first.as_str()) && rest.is_empty() {
        first.clone()
    } else {
        return None;
    };
    Some(
        std::iter::once(base)
            .chain(rest.iter().cloned())
            .collect::<Vec<_>>()
            .join("::"),
    )
}

/// Names brought into scope by the program's imports, with their full paths.
fn imported_paths(items: &[Item]) -> Vec<(String, String)> {
    fn walk(tree: &UseTree, prefix: &str, out: &mut Vec<(String, String)>) {
        let join = |segment: &str| {
            if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{prefix}::{segment}")
            }
        };
        match tree {
            UseTree::Path(path) => walk(&path.tree, &join(&path.ident.to_string()), out),
            UseTree::Name(name) if name.ident == "self" => {
                if let Some(last) = prefix.rsplit("::").next() {
                    out.push((last.to_string(), prefix.to_string()));
                }
            }
            UseTree::Name(name) => out.push((name.ident.to_string(), join(&name.ident.to_string()))),
            UseTree::Rename(rename) => {
                out.push((rename.rename.to_string(), join(&rename.ident.to_string())));
            }
            UseTree::Glob(_) => {}
            UseTree::Group(group) => {
                for tree in &group.items {
                    walk(tree, prefix, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    for item in items {
        if let Item::Use(use_item) = item {
            walk(&use_item.tree, "", &mut out);
        }
    }
    out
}

/// `&mut Vec<i32>` → `Vec`, `std::rc::Rc<T>` → `std::rc::Rc`.
fn type_path(ty: &str) -> String {
    let ty = ty.trim_start_matches(['&', ' ']);
    let ty = ty.strip_prefix("mut ").unwrap_or(ty);
    let ty = ty.strip_prefix("dyn ").unwrap_or(ty);
    ty.split('<').next().unwrap_or(ty).trim().to_string()
}

fn action_edit(session: &mut Session, arg: &str) -> Result<Flow> {
    let file = session.scratch_path().join("edit.rs");
    std::fs::write(&file, session.program.source(Indent::Spaces))?;

    let editor = if arg.is_empty() {
        editor_from_env()
    } else {
        arg.to_string()
    };
    open_editor(&editor, &file)?;

    let source = std::fs::read_to_string(&file)?;
    session.program = Program::from_source(&source)?;
    session.checkpoint.discard();
    session.run()
}

fn editor_from_env() -> String {
    ["VISUAL", "EDITOR"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|value| !value.is_empty()))
        .unwrap_or_else(|| "vi".to_string())
}

fn open_editor(editor: &str, file: &Path) -> Result<()> {
    tracing::debug!(%editor, file = %file.display(), "opening editor");
    let status = Command::new("sh")
        .arg("-c")
        .arg(format!("{editor} \"$1\""))
        .arg("sh")
        .arg(file)
        .status()
        .map_err(|source| Error::Editor {
            editor: editor.to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::Editor {
            editor: editor.to_string(),
            source: std::io::Error::other(format!("exited with {status}")),
        })
    }
}
