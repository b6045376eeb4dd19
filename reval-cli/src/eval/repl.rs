//! Front ends: the interactive line editor, one-shot expressions and files.

use std::path::Path;

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use super::complete::{complete_word, CompletionIndex};
use super::session::{Flow, Session};
use crate::config;
use crate::error::{Error, Result};

const PROMPT: &str = "reval> ";
const CONTINUATION_PROMPT: &str = "..... ";

/// Completion for the line editor, backed by a snapshot of the session.
struct ReplHelper {
    index: CompletionIndex,
}

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(pairs(&self.index, line, pos))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}

impl Highlighter for ReplHelper {}

impl Validator for ReplHelper {}

impl Helper for ReplHelper {}

/// Candidates replace the text between the returned start and the cursor.
fn pairs(index: &CompletionIndex, line: &str, pos: usize) -> (usize, Vec<Pair>) {
    let (pre, candidates, _) = complete_word(index, line, pos);
    let pairs = candidates
        .into_iter()
        .map(|candidate| Pair {
            display: candidate.trim().to_string(),
            replacement: candidate,
        })
        .collect();
    (pre.len(), pairs)
}

/// Run the interactive loop until `:quit` or end of input.
///
/// Continuation lines are requested while the input is incomplete; an
/// empty continuation line discards the pending input.
///
/// # Errors
///
/// Returns an error if the line editor fails fatally.
pub fn run_interactive(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let editor_config = rustyline::Config::builder().auto_add_history(false).build();
    let mut rl: Editor<ReplHelper, DefaultHistory> = Editor::with_config(editor_config)?;
    rl.set_helper(Some(ReplHelper {
        index: session.completion_index(),
    }));

    let history_path = config::history_path();
    if let Some(path) = history_path.as_ref().filter(|path| path.exists()) {
        if let Err(err) = rl.load_history(path) {
            tracing::warn!(path = %path.display(), %err, "failed to load history");
        }
    }

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        };

        if !buffer.is_empty() && line.trim().is_empty() {
            buffer.clear();
            continue;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);

        let flow = match session.eval(&buffer) {
            Ok(flow) => flow,
            Err(err) => {
                session.report(&err);
                Flow::Evaluated
            }
        };
        match flow {
            Flow::NeedMore => continue,
            Flow::Quit => break,
            Flow::Evaluated => {}
        }

        if !buffer.trim().is_empty() {
            let _ = rl.add_history_entry(buffer.as_str());
        }
        buffer.clear();
        if let Some(helper) = rl.helper_mut() {
            helper.index = session.completion_index();
        }
    }

    if let Some(path) = history_path {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                tracing::warn!(dir = %parent.display(), %err, "failed to create history directory");
            }
        }
        if let Err(err) = rl.save_history(&path) {
            tracing::warn!(path = %path.display(), %err, "failed to save history");
        }
    }
    Ok(())
}

/// Evaluate a single input non-interactively.
///
/// # Errors
///
/// Returns the evaluation error, or [`Error::Syntax`] if the input is
/// incomplete.
pub fn eval_one(session: &mut Session, input: &str) -> Result<()> {
    match session.eval(input)? {
        Flow::NeedMore => Err(Error::Syntax("unexpected end of input".to_string())),
        Flow::Evaluated | Flow::Quit => Ok(()),
    }
}

/// Evaluate a file line by line, as if typed at the prompt.
///
/// Blank lines and `//` comment lines between inputs are skipped. The first
/// failing input ends the evaluation.
///
/// # Errors
///
/// Returns the first evaluation error, or [`Error::Syntax`] if the file ends
/// inside an incomplete input.
pub fn eval_file(session: &mut Session, path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(path)?;
    let mut buffer = String::new();

    for line in source.lines() {
        let trimmed = line.trim();
        if buffer.is_empty() && (trimmed.is_empty() || trimmed.starts_with("//")) {
            continue;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(line);

        match session.eval(&buffer)? {
            Flow::NeedMore => continue,
            Flow::Quit => return Ok(()),
            Flow::Evaluated => buffer.clear(),
        }
    }

    if buffer.trim().is_empty() {
        Ok(())
    } else {
        Err(Error::Syntax(format!(
            "unexpected end of input in {}",
            path.display()
        )))
    }
}
