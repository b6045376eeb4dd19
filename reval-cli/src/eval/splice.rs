//! Splicing classified input into the session program.

use syn::Item;

use super::classify::Classified;
use super::imports;
use super::program::{is_fn_named, Program, PRINTER_NAME};

/// Rust namespaces a named item can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Type,
    Value,
    Macro,
}

/// Identity of a named top-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclKey {
    pub namespace: Namespace,
    pub name: String,
}

/// The key under which `item` is declared, or `None` for unnamed items
/// (`impl` blocks, imports, foreign blocks, `const _`).
#[must_use]
pub fn decl_key(item: &Item) -> Option<DeclKey> {
    let (namespace, ident) = match item {
        Item::Fn(f) => (Namespace::Value, &f.sig.ident),
        Item::Const(c) => (Namespace::Value, &c.ident),
        Item::Static(s) => (Namespace::Value, &s.ident),
        Item::Struct(s) => (Namespace::Type, &s.ident),
        Item::Enum(e) => (Namespace::Type, &e.ident),
        Item::Union(u) => (Namespace::Type, &u.ident),
        Item::Trait(t) => (Namespace::Type, &t.ident),
        Item::TraitAlias(t) => (Namespace::Type, &t.ident),
        Item::Type(t) => (Namespace::Type, &t.ident),
        Item::Mod(m) => (Namespace::Type, &m.ident),
        Item::ExternCrate(e) => (
            Namespace::Type,
            e.rename.as_ref().map_or(&e.ident, |(_, rename)| rename),
        ),
        Item::Macro(m) => (Namespace::Macro, m.ident.as_ref()?),
        _ => return None,
    };
    if *ident == "_" {
        return None;
    }
    Some(DeclKey {
        namespace,
        name: ident.to_string(),
    })
}

/// Apply a classified input to the program.
pub fn apply(program: &mut Program, input: Classified) {
    match input {
        Classified::Expression(stmts) | Classified::Statements(stmts) => {
            program.body_mut().extend(stmts);
        }
        Classified::Declarations(items) => {
            for item in items {
                declare(program, item);
            }
        }
    }
}

/// Add one top-level item, replacing an earlier declaration of the same name.
pub fn declare(program: &mut Program, item: Item) {
    if let Item::Use(use_item) = item {
        imports::insert_use(program, use_item);
        return;
    }

    match decl_key(&item) {
        Some(key) => {
            let existing = program
                .items()
                .iter()
                .enumerate()
                .position(|(index, other)| {
                    !program.is_entry(index)
                        && !is_fn_named(other, PRINTER_NAME)
                        && decl_key(other).as_ref() == Some(&key)
                });
            if let Some(index) = existing {
                tracing::debug!(name = %key.name, "replacing declaration");
                program.remove_item(index);
            }
            program.push_item(item);
        }
        None => {
            if !program.items().contains(&item) {
                program.push_item(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::classify::classify;
    use crate::eval::program::{Indent, PRINTER_BACKENDS};
    use syn::parse_quote;

    fn program() -> Program {
        Program::new(PRINTER_BACKENDS[0], false).unwrap()
    }

    fn count_named(program: &Program, name: &str) -> usize {
        program
            .items()
            .iter()
            .filter(|item| decl_key(item).is_some_and(|k| k.name == name))
            .count()
    }

    #[test]
    fn expressions_accumulate_in_order() {
        let mut program = program();
        apply(&mut program, classify("1 + 1").unwrap());
        apply(&mut program, classify("1 + 1").unwrap());
        let source = program.source(Indent::Spaces);
        assert_eq!(source.matches("__reval_p(&[&(1 + 1)]);").count(), 2);
        assert_eq!(program.body().len(), 2);
    }

    #[test]
    fn redefinition_replaces_in_place_of_appending() {
        let mut program = program();
        apply(&mut program, classify("fn f() -> i32 { 1 }").unwrap());
        apply(&mut program, classify("fn f() -> i32 { 2 }").unwrap());
        assert_eq!(count_named(&program, "f"), 1);
        let source = program.source(Indent::Spaces);
        assert!(source.contains("fn f() -> i32 {\n    2\n}"), "{source}");
        assert!(!source.contains("    1\n"));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let mut program = program();
        apply(&mut program, classify("struct Meters(f64);").unwrap());
        apply(&mut program, classify("fn Meters() {}").unwrap());
        assert_eq!(count_named(&program, "Meters"), 2);
    }

    #[test]
    fn identical_impl_blocks_are_not_duplicated() {
        let mut program = program();
        apply(&mut program, classify("struct P; impl P { fn one() -> i32 { 1 } }").unwrap());
        let before = program.items().len();
        apply(&mut program, classify("impl P { fn one() -> i32 { 1 } }").unwrap());
        assert_eq!(program.items().len(), before);
    }

    #[test]
    fn session_functions_are_never_replaced() {
        let mut program = program();
        declare(&mut program, parse_quote!(const __reval_p: i32 = 0;));
        declare(&mut program, parse_quote!(static main: u8 = 0;));
        let printer = program
            .items()
            .iter()
            .filter(|i| is_fn_named(i, PRINTER_NAME))
            .count();
        assert_eq!(printer, 1);
        assert_eq!(program.entry_point().sig.ident, "main");
    }

    #[test]
    fn body_survives_declarations() {
        let mut program = program();
        apply(&mut program, classify("let x = 1;").unwrap());
        apply(&mut program, classify("fn g() {}").unwrap());
        apply(&mut program, classify("fn g() { }").unwrap());
        // `let x = 1;` and the print of `x`.
        assert_eq!(program.body().len(), 2);
    }

    #[test]
    fn keys() {
        let item: Item = parse_quote!(extern crate alloc as a;);
        assert_eq!(decl_key(&item).unwrap().name, "a");
        let item: Item = parse_quote!(const _: () = (););
        assert!(decl_key(&item).is_none());
        let item: Item = parse_quote!(macro_rules! m { () => {} });
        assert_eq!(decl_key(&item).unwrap().namespace, Namespace::Macro);
    }
}
