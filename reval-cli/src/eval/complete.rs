//! Completion candidates for the line editor.

use std::collections::BTreeSet;

use syn::visit::{self, Visit};

use super::classify::is_command;
use super::commands::{lookup, CommandSpec};
use super::imports::{import_candidates, imported_leaves};
use super::program::{Program, ENTRY_POINT, PRINTER_NAME};
use super::splice::decl_key;

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while",
];

const PRELUDE_NAMES: &[&str] = &[
    "Box", "Clone", "Default", "Err", "Iterator", "None", "Ok", "Option", "Result", "Some",
    "String", "ToString", "Vec", "assert!", "assert_eq!", "dbg!", "format!", "panic!",
    "println!", "vec!",
];

/// Words known to the session, refreshed after every evaluation.
#[derive(Clone)]
pub struct CompletionIndex {
    words: Vec<String>,
    commands: &'static [CommandSpec],
}

impl CompletionIndex {
    /// Index the program's declarations, bindings and imports.
    #[must_use]
    pub fn new(program: &Program, commands: &'static [CommandSpec]) -> Self {
        let mut words: BTreeSet<String> = KEYWORDS
            .iter()
            .chain(PRELUDE_NAMES)
            .map(|word| (*word).to_string())
            .collect();
        words.extend(imported_leaves(program.items()));
        words.extend(
            program
                .items()
                .iter()
                .filter_map(decl_key)
                .map(|key| key.name)
                .filter(|name| name != ENTRY_POINT && name != PRINTER_NAME),
        );
        let mut bindings = Bindings::default();
        for stmt in program.body() {
            bindings.visit_stmt(stmt);
        }
        words.extend(bindings.0);

        Self {
            words: words.into_iter().collect(),
            commands,
        }
    }

    fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> {
        self.words.iter().filter(move |word| word.starts_with(prefix))
    }
}

#[derive(Default)]
struct Bindings(Vec<String>);

impl<'ast> Visit<'ast> for Bindings {
    fn visit_pat_ident(&mut self, pat: &'ast syn::PatIdent) {
        self.0.push(pat.ident.to_string());
        visit::visit_pat_ident(self, pat);
    }

    // Closures and nested blocks introduce their own scopes.
    fn visit_expr_closure(&mut self, _: &'ast syn::ExprClosure) {}
    fn visit_block(&mut self, _: &'ast syn::Block) {}
}

/// Complete the word at byte `pos` of `line`.
///
/// Returns the untouched text before the candidates, the candidates, and the
/// untouched text after the cursor.
#[must_use]
pub fn complete_word(index: &CompletionIndex, line: &str, pos: usize) -> (String, Vec<String>, String) {
    let pos = (0..=pos.min(line.len()))
        .rev()
        .find(|p| line.is_char_boundary(*p))
        .unwrap_or(0);
    let (head, tail) = line.split_at(pos);

    if head.trim().is_empty() {
        return (String::new(), vec![format!("{head}    ")], tail.to_string());
    }

    if is_command(head) {
        let body = head.trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        let lead = &head[..head.len() - body.len()];
        let Some(space) = body.find(char::is_whitespace) else {
            let candidates = index
                .commands
                .iter()
                .filter(|spec| spec.name.full().starts_with(body))
                .map(|spec| {
                    let space = if spec.takes_argument() { " " } else { "" };
                    format!("{lead}{}{space}", spec.name.full())
                })
                .collect();
            return (String::new(), candidates, tail.to_string());
        };

        let pre = &head[..lead.len() + space + 1];
        let arg = &head[pre.len()..];
        let candidates = lookup(index.commands, &body[..space])
            .and_then(|spec| spec.complete)
            .map(|complete| complete(index, arg))
            .unwrap_or_default();
        return (pre.to_string(), candidates, tail.to_string());
    }

    let (start, candidates) = code_candidates(index, head);
    (head[..start].to_string(), candidates, tail.to_string())
}

/// Completer for `:import`: known `std` paths for the last word.
#[must_use]
pub fn import_argument(_: &CompletionIndex, arg: &str) -> Vec<String> {
    let start = arg.rfind(char::is_whitespace).map_or(0, |i| i + 1);
    let (kept, word) = arg.split_at(start);
    import_candidates()
        .filter(|path| path.starts_with(word))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|path| format!("{kept}{path}"))
        .collect()
}

/// Completer for arguments that are code.
#[must_use]
pub fn code_argument(index: &CompletionIndex, arg: &str) -> Vec<String> {
    let (start, candidates) = code_candidates(index, arg);
    candidates
        .into_iter()
        .map(|candidate| format!("{}{candidate}", &arg[..start]))
        .collect()
}

/// The byte offset where the word before the end of `text` starts, and the
/// words it may complete to.
fn code_candidates(index: &CompletionIndex, text: &str) -> (usize, Vec<String>) {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == ':')
        .last()
        .map_or(text.len(), |(i, _)| i);
    let word = &text[start..];
    if word.is_empty() {
        return (start, Vec::new());
    }

    let candidates = if word.contains("::") {
        import_candidates()
            .filter(|path| path.starts_with(word))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        index.matching(word).cloned().collect()
    };
    (start, candidates)
}
