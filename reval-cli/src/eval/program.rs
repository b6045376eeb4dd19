//! The session program: one `syn` file that every input is spliced into.
//!
//! The program always holds a print helper and an entry point. User
//! statements accumulate in the entry point's body; user items sit next to
//! them at the top level.

use quote::format_ident;
use syn::{parse_quote, Expr, File, Item, ItemFn, Stmt};

use super::scan;
use crate::error::{Error, Result};

/// Name of the synthesized print helper.
pub const PRINTER_NAME: &str = "__reval_p";

/// Name of the entry point whose body collects user statements.
pub const ENTRY_POINT: &str = "main";

/// A way of rendering values in the print helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrinterBackend {
    /// Path imported by the program so the helper can name the trait.
    pub import: &'static str,
}

/// Candidate printer backends, preferred first.
pub const PRINTER_BACKENDS: &[PrinterBackend] = &[
    PrinterBackend {
        import: "std::fmt::Debug",
    },
    PrinterBackend {
        import: "core::fmt::Debug",
    },
];

impl PrinterBackend {
    /// The statement that prints one value `x` inside the helper's loop.
    #[must_use]
    pub fn print_statement(self, pretty: bool) -> &'static str {
        if pretty {
            r#"println!("{:#?}", x);"#
        } else {
            r#"println!("{:?}", x);"#
        }
    }
}

/// Indentation style used when serializing the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indent {
    /// Four spaces; used for anything shown to the user.
    Spaces,
    /// Tabs; used for the scratch file fed to the toolchain.
    Tabs,
}

/// The program under evaluation.
///
/// Top-level items may only be replaced through methods of this type so that
/// the cached entry point index is recomputed whenever they change.
#[derive(Debug, Clone)]
pub struct Program {
    file: File,
    entry: usize,
}

impl Program {
    /// Build the initial program around a printer backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the generated template does not parse, which only
    /// happens for a malformed backend.
    pub fn new(backend: PrinterBackend, pretty: bool) -> Result<Self> {
        let source = format!(
            "use {import};\n\nfn {PRINTER_NAME}(xx: &[&dyn Debug]) {{\n    for x in xx {{\n        {code}\n    }}\n}}\n\nfn {ENTRY_POINT}() {{}}\n",
            import = backend.import,
            code = backend.print_statement(pretty),
        );
        Self::from_source(&source)
    }

    /// Parse `source` as a session program.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not parse or does not contain
    /// exactly one entry point and one print helper.
    pub fn from_source(source: &str) -> Result<Self> {
        let file = syn::parse_file(source)?;
        Self::from_file(file)
    }

    /// Wrap an already parsed file, checking the program invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProgram`] when the entry point or the print
    /// helper is missing or duplicated.
    pub fn from_file(file: File) -> Result<Self> {
        for name in [PRINTER_NAME, ENTRY_POINT] {
            let count = file.items.iter().filter(|item| is_fn_named(item, name)).count();
            if count != 1 {
                return Err(Error::InvalidProgram(format!(
                    "expected exactly one `fn {name}`, found {count}"
                )));
            }
        }
        let entry = locate_entry(&file.items)
            .ok_or_else(|| Error::InvalidProgram(format!("missing `fn {ENTRY_POINT}`")))?;
        Ok(Self { file, entry })
    }

    /// The whole syntax tree.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Top-level items in source order.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.file.items
    }

    /// Replace all top-level items.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProgram`] and leaves the program untouched if
    /// the new items break the program invariants.
    pub fn replace_items(&mut self, items: Vec<Item>) -> Result<()> {
        let file = File {
            shebang: self.file.shebang.clone(),
            attrs: self.file.attrs.clone(),
            items,
        };
        *self = Self::from_file(file)?;
        Ok(())
    }

    /// Append an item at the end of the file.
    pub fn push_item(&mut self, item: Item) {
        self.file.items.push(item);
    }

    /// Insert an item at `index`.
    pub fn insert_item(&mut self, index: usize, item: Item) {
        self.file.items.insert(index, item);
        self.reindex();
    }

    /// Remove the item at `index`. The entry point and the print helper
    /// cannot be removed.
    pub fn remove_item(&mut self, index: usize) -> Option<Item> {
        let removable = self
            .file
            .items
            .get(index)
            .is_some_and(|item| index != self.entry && !is_fn_named(item, PRINTER_NAME));
        if !removable {
            return None;
        }
        let item = self.file.items.remove(index);
        self.reindex();
        Some(item)
    }

    /// The entry point declaration.
    #[must_use]
    pub fn entry_point(&self) -> &ItemFn {
        match &self.file.items[self.entry] {
            Item::Fn(f) => f,
            _ => unreachable!("entry index always points at the entry point"),
        }
    }

    fn entry_point_mut(&mut self) -> &mut ItemFn {
        match &mut self.file.items[self.entry] {
            Item::Fn(f) => f,
            _ => unreachable!("entry index always points at the entry point"),
        }
    }

    /// Statements of the entry point body.
    #[must_use]
    pub fn body(&self) -> &[Stmt] {
        &self.entry_point().block.stmts
    }

    /// Mutable access to the entry point body.
    pub fn body_mut(&mut self) -> &mut Vec<Stmt> {
        &mut self.entry_point_mut().block.stmts
    }

    /// Whether `index` is the entry point.
    #[must_use]
    pub fn is_entry(&self, index: usize) -> bool {
        index == self.entry
    }

    /// Serialize the program.
    #[must_use]
    pub fn source(&self, indent: Indent) -> String {
        let spaced = prettyplease::unparse(&self.file);
        match indent {
            Indent::Spaces => spaced,
            Indent::Tabs => spaces_to_tabs(&spaced),
        }
    }

    fn reindex(&mut self) {
        if let Some(entry) = locate_entry(&self.file.items) {
            self.entry = entry;
        }
    }
}

/// The call `__reval_p(&[&(a), &(b)]);` printing every argument.
#[must_use]
pub fn print_call(args: Vec<Expr>) -> Stmt {
    let printer = format_ident!("{}", PRINTER_NAME);
    parse_quote! {
        #printer(&[#(&(#args)),*]);
    }
}

/// Whether `item` is a function called `name`.
#[must_use]
pub fn is_fn_named(item: &Item, name: &str) -> bool {
    matches!(item, Item::Fn(f) if f.sig.ident == name)
}

fn locate_entry(items: &[Item]) -> Option<usize> {
    items.iter().position(|item| is_fn_named(item, ENTRY_POINT))
}

/// Turn each leading group of four spaces into a tab, except on lines that
/// continue a multi-line string literal.
fn spaces_to_tabs(src: &str) -> String {
    let literal_lines = scan::scan(src).literal_lines;
    let mut out = String::with_capacity(src.len());
    for (index, line) in src.split_inclusive('\n').enumerate() {
        if literal_lines.binary_search(&index).is_ok() {
            out.push_str(line);
            continue;
        }
        let spaces = line.len() - line.trim_start_matches(' ').len();
        for _ in 0..spaces / 4 {
            out.push('\t');
        }
        out.push_str(&line[spaces - spaces % 4..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn program() -> Program {
        Program::new(PRINTER_BACKENDS[0], false).unwrap()
    }

    #[test]
    fn initial_program_layout() {
        let program = program();
        let source = program.source(Indent::Spaces);
        assert!(source.starts_with("use std::fmt::Debug;\n"));
        assert!(source.contains(
            "fn __reval_p(xx: &[&dyn Debug]) {\n    for x in xx {\n        println!(\"{:?}\", x);\n    }\n}\n"
        ));
        assert!(source.ends_with("fn main() {}\n"));
        assert!(program.body().is_empty());
        assert_eq!(program.entry_point().sig.ident, "main");
    }

    #[test]
    fn pretty_printer_uses_alternate_debug() {
        let program = Program::new(PRINTER_BACKENDS[0], true).unwrap();
        assert!(program.source(Indent::Spaces).contains("{:#?}"));
    }

    #[test]
    fn tabs_mode_indents_with_tabs() {
        let mut program = program();
        program.body_mut().push(print_call(vec![parse_quote!(1 + 1)]));
        let source = program.source(Indent::Tabs);
        assert!(source.contains("\n\t__reval_p(&[&(1 + 1)]);\n"));
        assert!(source.contains("\n\t\tprintln!"));
        assert!(!source.contains("    "));
    }

    #[test]
    fn tabs_mode_keeps_string_literal_lines() {
        let program = Program::from_source(
            "use std::fmt::Debug;\nfn __reval_p(xx: &[&dyn Debug]) {}\nfn main() {\n    let s = \"a\n        b\";\n}\n",
        )
        .unwrap();
        let source = program.source(Indent::Tabs);
        assert!(source.contains("\"a\n        b\""), "{source}");
    }

    #[test]
    fn rejects_program_without_entry_point() {
        let err = Program::from_source("fn __reval_p() {}").unwrap_err();
        assert!(matches!(err, Error::InvalidProgram(_)));
    }

    #[test]
    fn rejects_duplicate_entry_point() {
        let err = Program::from_source("fn __reval_p() {}\nfn main() {}\nfn main() {}").unwrap_err();
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn entry_index_follows_item_changes() {
        let mut program = program();
        program.insert_item(0, parse_quote!(fn helper() {}));
        program.body_mut().push(parse_quote!(helper();));
        assert_eq!(program.body().len(), 1);
        assert!(program.remove_item(0).is_some());
        assert_eq!(program.body().len(), 1);
        let entry = program.items().iter().position(|i| is_fn_named(i, ENTRY_POINT)).unwrap();
        assert!(program.is_entry(entry));
        assert!(program.remove_item(entry).is_none());
    }

    #[test]
    fn print_helper_cannot_be_removed() {
        let mut program = program();
        let printer = program
            .items()
            .iter()
            .position(|i| is_fn_named(i, PRINTER_NAME))
            .unwrap();
        assert!(program.remove_item(printer).is_none());
        assert!(program.remove_item(program.items().len()).is_none());
        assert_eq!(program.items().len(), 3);
    }

    #[test]
    fn replace_items_validates() {
        let mut program = program();
        let err = program.replace_items(Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidProgram(_)));
        assert_eq!(program.items().len(), 3);
    }

    #[test]
    fn print_call_wraps_each_argument() {
        let stmt = print_call(vec![parse_quote!(x), parse_quote!(y.z)]);
        let expected: Stmt = parse_quote!(__reval_p(&[&(x), &(y.z)]););
        assert_eq!(stmt, expected);
    }
}
