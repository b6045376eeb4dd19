//! One-deep undo of the session program.

use syn::{Item, Stmt};

use super::program::Program;

/// A copy of the mutable parts of the program.
#[derive(Debug, Clone)]
struct Snapshot {
    stmts: Vec<Stmt>,
    items: Vec<Item>,
}

/// Holds at most one live snapshot, the most recent one taken.
#[derive(Debug, Default)]
pub struct Checkpoint {
    live: Option<Snapshot>,
}

impl Checkpoint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the entry point body and the top-level items, replacing any
    /// previous snapshot.
    pub fn snapshot(&mut self, program: &Program) {
        self.live = Some(Snapshot {
            stmts: program.body().to_vec(),
            items: program.items().to_vec(),
        });
    }

    /// Forget the live snapshot.
    pub fn discard(&mut self) {
        self.live = None;
    }

    /// Whether a snapshot is live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Put the program back to the snapshot.
    ///
    /// Top-level items, imports included, come back in the snapshot's order
    /// and the entry point body is restored verbatim, so the program
    /// serializes exactly as it did when the snapshot was taken. Without a
    /// live snapshot this does nothing.
    pub fn restore(&self, program: &mut Program) {
        let Some(snapshot) = &self.live else {
            return;
        };
        if let Err(err) = program.replace_items(snapshot.items.clone()) {
            tracing::warn!(%err, "could not restore declarations");
            return;
        }
        *program.body_mut() = snapshot.stmts.clone();
        tracing::debug!("restored checkpoint");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::classify::classify;
    use crate::eval::program::{Indent, PRINTER_BACKENDS};
    use crate::eval::splice::apply;
    use pretty_assertions::assert_eq;
    use syn::parse_quote;

    fn program() -> Program {
        Program::new(PRINTER_BACKENDS[0], false).unwrap()
    }

    fn eval(program: &mut Program, input: &str) {
        apply(program, classify(input).unwrap());
    }

    #[test]
    fn restore_undoes_statements_and_new_functions() {
        let mut program = program();
        eval(&mut program, "let x = 1;");
        eval(&mut program, "fn keep() {}");
        let before = program.source(Indent::Tabs);

        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        eval(&mut program, "fn added() {}");
        eval(&mut program, "x + undefined");
        checkpoint.restore(&mut program);

        assert_eq!(program.source(Indent::Tabs), before);
    }

    #[test]
    fn restore_brings_back_previous_definition() {
        let mut program = program();
        eval(&mut program, "fn f() -> i32 { 1 }");
        let before = program.source(Indent::Spaces);

        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        eval(&mut program, "fn f() -> i32 { \"broken\" }");
        checkpoint.restore(&mut program);

        assert_eq!(program.source(Indent::Spaces), before);
    }

    #[test]
    fn restore_drops_new_impl_blocks_and_imports() {
        let mut program = program();
        eval(&mut program, "struct P;");
        let before = program.source(Indent::Spaces);
        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        eval(&mut program, "impl P { fn broken() -> i32 { \"no\" } }");
        eval(&mut program, "use std::FAIL;");
        checkpoint.restore(&mut program);

        let source = program.source(Indent::Spaces);
        assert!(!source.contains("impl P"));
        assert!(!source.contains("use std::FAIL;"));
        assert_eq!(source, before);
    }

    #[test]
    fn restore_brings_back_removed_imports() {
        let mut program = program();
        program.insert_item(1, parse_quote!(use std::rc::Rc;));
        let before = program.source(Indent::Spaces);

        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        assert!(program.remove_item(1).is_some());
        checkpoint.restore(&mut program);

        assert_eq!(program.source(Indent::Spaces), before);
    }

    #[test]
    fn failed_redefinition_keeps_item_order() {
        let mut program = program();
        eval(&mut program, "fn f() -> i32 { 1 }");
        eval(&mut program, "fn g() -> i32 { 2 }");
        let before = program.source(Indent::Tabs);

        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        eval(&mut program, "fn f() -> i32 { FAIL }");
        checkpoint.restore(&mut program);

        assert_eq!(program.source(Indent::Tabs), before);
        let f = before.find("fn f()").unwrap();
        let g = before.find("fn g()").unwrap();
        assert!(f < g);
    }

    #[test]
    fn restore_is_idempotent() {
        let mut program = program();
        let mut checkpoint = Checkpoint::new();
        checkpoint.snapshot(&program);
        eval(&mut program, "1 + 1");
        checkpoint.restore(&mut program);
        let once = program.source(Indent::Tabs);
        checkpoint.restore(&mut program);
        assert_eq!(program.source(Indent::Tabs), once);
        assert!(program.body().is_empty());
    }

    #[test]
    fn restore_without_snapshot_is_a_no_op() {
        let mut program = program();
        eval(&mut program, "1 + 1");
        let mut checkpoint = Checkpoint::new();
        checkpoint.restore(&mut program);
        assert_eq!(program.body().len(), 1);
        checkpoint.snapshot(&program);
        checkpoint.discard();
        assert!(!checkpoint.is_live());
    }
}
