//! Imports and included source files.
//!
//! Validating an import is delegated to an [`ImportResolver`]; normalizing
//! the import list after each input is delegated to an [`ImportFixer`].
//! Included files are rewritten into auxiliary modules that share the
//! session's namespace.

use std::collections::HashSet;
use std::path::PathBuf;

use proc_macro2::{TokenStream, TokenTree};
use quote::ToTokens;
use syn::visit::{self, Visit};
use syn::{parse_quote, File, Item, ItemUse, UseTree, Visibility};

use super::program::{is_fn_named, Program, ENTRY_POINT};
use crate::error::{Error, Result};

/// Decides whether an import path can be used by session programs.
pub trait ImportResolver {
    /// Check that `use <path>;` resolves.
    ///
    /// # Errors
    ///
    /// Returns a human readable reason when the path does not resolve.
    fn resolve(&self, path: &str) -> Result<(), String>;
}

/// Adds missing imports and removes unused ones from a source text.
pub trait ImportFixer {
    /// Return the normalized source.
    ///
    /// # Errors
    ///
    /// Returns a reason when the source could not be processed.
    fn fix(&self, source: &str) -> Result<String, String>;
}

/// Frequently used `std` items and modules, by the name they are used under.
pub const WELL_KNOWN: &[(&str, &str)] = &[
    ("HashMap", "std::collections::HashMap"),
    ("HashSet", "std::collections::HashSet"),
    ("BTreeMap", "std::collections::BTreeMap"),
    ("BTreeSet", "std::collections::BTreeSet"),
    ("VecDeque", "std::collections::VecDeque"),
    ("BinaryHeap", "std::collections::BinaryHeap"),
    ("Rc", "std::rc::Rc"),
    ("Arc", "std::sync::Arc"),
    ("Mutex", "std::sync::Mutex"),
    ("RwLock", "std::sync::RwLock"),
    ("RefCell", "std::cell::RefCell"),
    ("Cell", "std::cell::Cell"),
    ("Duration", "std::time::Duration"),
    ("Instant", "std::time::Instant"),
    ("Path", "std::path::Path"),
    ("PathBuf", "std::path::PathBuf"),
    ("Ordering", "std::cmp::Ordering"),
    ("fmt", "std::fmt"),
    ("mem", "std::mem"),
    ("thread", "std::thread"),
    ("env", "std::env"),
    ("fs", "std::fs"),
    ("io", "std::io"),
];

/// Standard library modules offered by import completion.
pub const STD_MODULES: &[&str] = &[
    "std::any",
    "std::borrow",
    "std::cell",
    "std::cmp",
    "std::collections",
    "std::convert",
    "std::env",
    "std::error",
    "std::fmt",
    "std::fs",
    "std::hash",
    "std::io",
    "std::iter",
    "std::mem",
    "std::net",
    "std::num",
    "std::ops",
    "std::path",
    "std::process",
    "std::rc",
    "std::str",
    "std::string",
    "std::sync",
    "std::thread",
    "std::time",
    "std::vec",
];

/// Paths offered by import completion.
pub fn import_candidates() -> impl Iterator<Item = &'static str> {
    STD_MODULES
        .iter()
        .copied()
        .chain(WELL_KNOWN.iter().map(|(_, path)| *path))
}

/// Parse an import argument such as `std::fmt`, `"std::io::{self, Write}"`.
///
/// # Errors
///
/// Returns [`Error::UnresolvablePackage`] when the argument is not a use tree.
pub fn parse_import(arg: &str) -> Result<UseTree> {
    let path = arg.trim().trim_matches('"').trim_end_matches(';');
    syn::parse_str::<UseTree>(path).map_err(|err| Error::UnresolvablePackage {
        path: path.to_string(),
        reason: err.to_string(),
    })
}

/// Validate `arg` and add it to the program's imports.
///
/// # Errors
///
/// Returns [`Error::UnresolvablePackage`] and leaves the program unchanged
/// when the import does not parse or does not resolve.
pub fn add_import(program: &mut Program, resolver: &dyn ImportResolver, arg: &str) -> Result<()> {
    let tree = parse_import(arg)?;
    let path = tree_path(&tree);
    resolver
        .resolve(&path)
        .map_err(|reason| Error::UnresolvablePackage {
            path: path.clone(),
            reason,
        })?;
    tracing::debug!(%path, "import resolved");
    insert_use(program, parse_quote!(use #tree;));
    Ok(())
}

/// Insert a `use` item unless an identical one exists.
pub fn insert_use(program: &mut Program, item: ItemUse) {
    if let Some(index) = use_position(program.items(), &item) {
        program.insert_item(index, Item::Use(item));
    }
}

/// Where `item` belongs among `items`, or `None` if it is already there.
///
/// Imports are grouped by root crate: a new import goes after the last
/// import of its group, else after the last import, else first.
fn use_position(items: &[Item], item: &ItemUse) -> Option<usize> {
    let mut last_use = None;
    let mut last_in_group = None;
    let root = tree_root(&item.tree);
    for (index, existing) in items.iter().enumerate() {
        if let Item::Use(existing) = existing {
            if existing.tree == item.tree {
                return None;
            }
            last_use = Some(index);
            if tree_root(&existing.tree) == root {
                last_in_group = Some(index);
            }
        }
    }
    Some(last_in_group.or(last_use).map_or(0, |index| index + 1))
}

/// Printable form of a use tree, e.g. `std::io::{self, Write}`.
#[must_use]
pub fn tree_path(tree: &UseTree) -> String {
    tree.to_token_stream()
        .to_string()
        .replace(" :: ", "::")
        .replace(":: ", "::")
        .replace(" ,", ",")
        .replace("{ ", "{")
        .replace(" }", "}")
}

fn tree_root(tree: &UseTree) -> String {
    match tree {
        UseTree::Path(path) => path.ident.to_string(),
        UseTree::Name(name) => name.ident.to_string(),
        UseTree::Rename(rename) => rename.ident.to_string(),
        UseTree::Glob(_) | UseTree::Group(_) => String::new(),
    }
}

/// Names a use tree brings into scope, plus the module paths it glob-imports.
fn imported_names(tree: &UseTree, prefix: &str, names: &mut HashSet<String>, globs: &mut HashSet<String>) {
    match tree {
        UseTree::Path(path) => {
            let prefix = join(prefix, &path.ident.to_string());
            imported_names(&path.tree, &prefix, names, globs);
        }
        UseTree::Name(name) => {
            if name.ident == "self" {
                if let Some(last) = prefix.rsplit("::").next() {
                    names.insert(last.to_string());
                }
            } else {
                names.insert(name.ident.to_string());
            }
        }
        UseTree::Rename(rename) => {
            names.insert(rename.rename.to_string());
        }
        UseTree::Glob(_) => {
            globs.insert(prefix.to_string());
        }
        UseTree::Group(group) => {
            for tree in &group.items {
                imported_names(tree, prefix, names, globs);
            }
        }
    }
}

/// Every name the program's imports bring into scope.
#[must_use]
pub fn imported_leaves(items: &[Item]) -> Vec<String> {
    let mut names = HashSet::new();
    let mut globs = HashSet::new();
    for item in items {
        if let Item::Use(use_item) = item {
            imported_names(&use_item.tree, "", &mut names, &mut globs);
        }
    }
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort();
    names
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}::{segment}")
    }
}

/// Identifiers used outside `use` items, including those inside macro
/// invocations, and the roots of paths.
#[derive(Debug, Default)]
struct Usage {
    idents: HashSet<String>,
    /// Roots of single-segment paths.
    roots: HashSet<String>,
    /// Roots of multi-segment paths such as `fs::read`.
    qualified_roots: HashSet<String>,
}

impl Usage {
    fn of_items<'a>(items: impl IntoIterator<Item = &'a Item>) -> Self {
        let mut usage = Self::default();
        for item in items {
            usage.visit_item(item);
        }
        usage
    }

    fn record_tokens(&mut self, tokens: TokenStream) {
        let mut previous_colon = false;
        let mut pending: Option<String> = None;
        for tree in tokens {
            match tree {
                TokenTree::Ident(ident) => {
                    if let Some(name) = pending.take() {
                        self.roots.insert(name);
                    }
                    let name = ident.to_string();
                    self.idents.insert(name.clone());
                    if !previous_colon {
                        pending = Some(name);
                    }
                    previous_colon = false;
                }
                TokenTree::Punct(punct) if punct.as_char() == ':' => {
                    if let Some(name) = pending.take() {
                        self.qualified_roots.insert(name);
                    }
                    previous_colon = true;
                }
                TokenTree::Group(group) => {
                    if let Some(name) = pending.take() {
                        self.roots.insert(name);
                    }
                    self.record_tokens(group.stream());
                    previous_colon = false;
                }
                _ => {
                    if let Some(name) = pending.take() {
                        self.roots.insert(name);
                    }
                    previous_colon = false;
                }
            }
        }
        if let Some(name) = pending {
            self.roots.insert(name);
        }
    }
}

impl<'ast> Visit<'ast> for Usage {
    fn visit_item_use(&mut self, _: &'ast ItemUse) {}

    fn visit_ident(&mut self, ident: &'ast syn::Ident) {
        self.idents.insert(ident.to_string());
    }

    fn visit_path(&mut self, path: &'ast syn::Path) {
        if path.leading_colon.is_none() {
            if let Some(first) = path.segments.first() {
                let root = first.ident.to_string();
                if path.segments.len() > 1 {
                    self.qualified_roots.insert(root);
                } else {
                    self.roots.insert(root);
                }
            }
        }
        visit::visit_path(self, path);
    }

    fn visit_macro(&mut self, mac: &'ast syn::Macro) {
        self.record_tokens(mac.tokens.clone());
        visit::visit_macro(self, mac);
    }
}

/// The built-in fixer working from [`WELL_KNOWN`].
///
/// Only imports it knows about are added or removed, so imports that bring
/// traits into scope for method calls are never touched.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdImportFixer;

impl ImportFixer for StdImportFixer {
    fn fix(&self, source: &str) -> Result<String, String> {
        let mut file = syn::parse_file(source).map_err(|err| err.to_string())?;
        fix_file(&mut file);
        Ok(prettyplease::unparse(&file))
    }
}

fn fix_file(file: &mut File) {
    let usage = Usage::of_items(&file.items);

    // Drop known single-item imports nothing refers to any more.
    file.items.retain(|item| {
        let Item::Use(use_item) = item else {
            return true;
        };
        let path = tree_path(&use_item.tree);
        let unused = WELL_KNOWN
            .iter()
            .any(|(name, known)| *known == path && !usage.idents.contains(*name));
        if unused {
            tracing::debug!(%path, "removing unused import");
        }
        !unused
    });

    let mut names = HashSet::new();
    let mut globs = HashSet::new();
    for item in &file.items {
        if let Item::Use(use_item) = item {
            imported_names(&use_item.tree, "", &mut names, &mut globs);
        }
    }
    let declared: HashSet<String> = file
        .items
        .iter()
        .filter_map(super::splice::decl_key)
        .map(|key| key.name)
        .collect();

    for (name, path) in WELL_KNOWN {
        let is_module = name.starts_with(|c: char| c.is_ascii_lowercase());
        let used = usage.qualified_roots.contains(*name)
            || (!is_module && usage.roots.contains(*name));
        let parent = path.rsplit_once("::").map_or("", |(parent, _)| parent);
        if !used || names.contains(*name) || globs.contains(parent) || declared.contains(*name) {
            continue;
        }
        let Ok(tree) = syn::parse_str::<UseTree>(path) else {
            continue;
        };
        let item: ItemUse = parse_quote!(use #tree;);
        if let Some(index) = use_position(&file.items, &item) {
            tracing::debug!(%path, "adding missing import");
            file.items.insert(index, Item::Use(item));
        }
    }
}

/// Run the fixer over the program and adopt its output.
///
/// # Errors
///
/// Returns an error when the fixer fails or its output is not a valid
/// session program; the program is left unchanged in that case.
pub fn auto_fix_imports(program: &mut Program, fixer: &dyn ImportFixer) -> Result<()> {
    let source = program.source(super::program::Indent::Spaces);
    let fixed = fixer.fix(&source).map_err(Error::InvalidProgram)?;
    *program = Program::from_source(&fixed)?;
    Ok(())
}

/// A source file included into the session.
#[derive(Debug, Clone)]
pub struct AuxiliaryFile {
    /// Where the file was read from.
    pub origin: PathBuf,
    /// The rewritten copy handed to the toolchain.
    pub scratch: PathBuf,
}

/// An included source file split into the imports to merge into the
/// program and the rewritten module body.
#[derive(Debug, Clone)]
pub struct Included {
    pub imports: Vec<UseTree>,
    pub module: File,
}

/// Rewrite an included source file for use as an auxiliary module.
///
/// The entry point is removed together with the imports only it used, the
/// module glob-imports the session crate root, and private top-level items
/// become visible to it.
///
/// # Errors
///
/// Returns a parse error when `source` is not a Rust file.
pub fn rewrite_included(source: &str) -> Result<Included> {
    let mut module = syn::parse_file(source)?;

    let imports = module
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Use(use_item) => Some(use_item.tree.clone()),
            _ => None,
        })
        .collect();

    if let Some(index) = module.items.iter().position(|item| is_fn_named(item, ENTRY_POINT)) {
        let entry = module.items.remove(index);
        prune_imports_of(&mut module, &entry);
    }

    for item in &mut module.items {
        if let Some(vis) = visibility_mut(item) {
            if matches!(vis, Visibility::Inherited) {
                *vis = parse_quote!(pub(crate));
            }
        }
    }
    module.items.insert(0, parse_quote!(use super::*;));

    Ok(Included { imports, module })
}

/// Remove imports whose names were only used by `removed`.
fn prune_imports_of(module: &mut File, removed: &Item) {
    let removed_usage = Usage::of_items([removed]);
    let remaining_usage = Usage::of_items(&module.items);
    module.items.retain_mut(|item| {
        let Item::Use(use_item) = item else {
            return true;
        };
        let mut names = HashSet::new();
        let mut globs = HashSet::new();
        imported_names(&use_item.tree, "", &mut names, &mut globs);
        let orphaned = !names.is_empty()
            && globs.is_empty()
            && names.iter().all(|name| {
                removed_usage.idents.contains(name) && !remaining_usage.idents.contains(name)
            });
        !orphaned
    });
}

fn visibility_mut(item: &mut Item) -> Option<&mut Visibility> {
    match item {
        Item::Const(i) => Some(&mut i.vis),
        Item::Enum(i) => Some(&mut i.vis),
        Item::Fn(i) => Some(&mut i.vis),
        Item::Mod(i) => Some(&mut i.vis),
        Item::Static(i) => Some(&mut i.vis),
        Item::Struct(i) => Some(&mut i.vis),
        Item::Trait(i) => Some(&mut i.vis),
        Item::TraitAlias(i) => Some(&mut i.vis),
        Item::Type(i) => Some(&mut i.vis),
        Item::Union(i) => Some(&mut i.vis),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::program::{Indent, PRINTER_BACKENDS};
    use std::cell::RefCell;

    /// Resolves everything under `std`, recording what it was asked.
    #[derive(Default)]
    struct StdOnly {
        asked: RefCell<Vec<String>>,
    }

    impl ImportResolver for StdOnly {
        fn resolve(&self, path: &str) -> Result<(), String> {
            self.asked.borrow_mut().push(path.to_string());
            if path.starts_with("std::") || path.starts_with("core::") {
                Ok(())
            } else {
                Err(format!("unresolved import `{path}`"))
            }
        }
    }

    fn program() -> Program {
        Program::new(PRINTER_BACKENDS[0], false).unwrap()
    }

    #[test]
    fn add_import_twice_keeps_one() {
        let mut program = program();
        let resolver = StdOnly::default();
        add_import(&mut program, &resolver, "std::fmt").unwrap();
        add_import(&mut program, &resolver, "\"std::fmt\"").unwrap();
        let source = program.source(Indent::Spaces);
        assert_eq!(source.matches("use std::fmt;").count(), 1);
        assert_eq!(*resolver.asked.borrow(), vec!["std::fmt", "std::fmt"]);
    }

    #[test]
    fn unresolvable_import_changes_nothing() {
        let mut program = program();
        let before = program.source(Indent::Spaces);
        let err = add_import(&mut program, &StdOnly::default(), "nosuchcrate::Thing").unwrap_err();
        assert!(matches!(err, Error::UnresolvablePackage { .. }));
        assert_eq!(program.source(Indent::Spaces), before);

        let err = add_import(&mut program, &StdOnly::default(), "not a path").unwrap_err();
        assert!(matches!(err, Error::UnresolvablePackage { .. }));
    }

    #[test]
    fn imports_are_grouped_by_root() {
        let mut program = program();
        let resolver = StdOnly::default();
        add_import(&mut program, &resolver, "core::mem").unwrap();
        add_import(&mut program, &resolver, "std::rc::Rc").unwrap();
        let uses: Vec<String> = program
            .items()
            .iter()
            .filter_map(|item| match item {
                Item::Use(u) => Some(tree_path(&u.tree)),
                _ => None,
            })
            .collect();
        assert_eq!(uses, vec!["std::fmt::Debug", "std::rc::Rc", "core::mem"]);
    }

    #[test]
    fn group_imports_print_compactly() {
        let tree = parse_import("std::io::{self, Write}").unwrap();
        assert_eq!(tree_path(&tree), "std::io::{self, Write}");
    }

    #[test]
    fn fixer_adds_missing_and_removes_unused() {
        let source = "use std::fmt::Debug;\nuse std::rc::Rc;\nfn __reval_p(xx: &[&dyn Debug]) {}\nfn main() {\n    let m: HashMap<i32, i32> = HashMap::new();\n    let d = Duration::from_secs(1);\n    println!(\"{:?}\", Instant::now());\n}\n";
        let fixed = StdImportFixer.fix(source).unwrap();
        assert!(fixed.contains("use std::collections::HashMap;"));
        assert!(fixed.contains("use std::time::Duration;"));
        assert!(fixed.contains("use std::time::Instant;"));
        assert!(!fixed.contains("use std::rc::Rc;"));
        assert!(fixed.contains("use std::fmt::Debug;"));
    }

    #[test]
    fn fixer_respects_globs_declarations_and_locals() {
        let source = "use std::collections::*;\nstruct Duration;\nfn main() {\n    let fs = 1;\n    let m: HashMap<i32, i32> = HashMap::new();\n    let d = Duration;\n    fs + 1;\n}\n";
        let fixed = StdImportFixer.fix(source).unwrap();
        assert!(!fixed.contains("use std::collections::HashMap;"));
        assert!(!fixed.contains("use std::time::Duration;"));
        assert!(!fixed.contains("use std::fs;"));
    }

    #[test]
    fn fixer_sees_module_paths() {
        let fixed = StdImportFixer
            .fix("fn main() { let s = fs::read_to_string(\"x\"); }")
            .unwrap();
        assert!(fixed.contains("use std::fs;"));
    }

    #[test]
    fn auto_fix_keeps_program_valid() {
        let mut program = program();
        program.body_mut().push(parse_quote!(let r = Rc::new(1);));
        auto_fix_imports(&mut program, &StdImportFixer).unwrap();
        assert!(program.source(Indent::Spaces).contains("use std::rc::Rc;"));
        assert_eq!(program.body().len(), 1);
    }

    #[test]
    fn rewrite_included_strips_entry_point() {
        let source = r#"
use std::collections::HashMap;
use std::time::Instant;

fn helper() -> HashMap<i32, i32> {
    HashMap::new()
}

pub fn shown() {}

fn main() {
    let start = Instant::now();
    helper();
}
"#;
        let included = rewrite_included(source).unwrap();
        let paths: Vec<String> = included.imports.iter().map(tree_path).collect();
        assert_eq!(paths, vec!["std::collections::HashMap", "std::time::Instant"]);

        let text = prettyplease::unparse(&included.module);
        assert!(text.starts_with("use super::*;\n"));
        assert!(text.contains("use std::collections::HashMap;"));
        assert!(!text.contains("use std::time::Instant;"));
        assert!(!text.contains("fn main"));
        assert!(text.contains("pub(crate) fn helper()"));
        assert!(text.contains("pub fn shown()"));
    }
}
