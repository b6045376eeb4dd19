//! Input classification for the REPL.
//!
//! An input is tried as an expression, then as a statement list, then as
//! top-level items. When none of these parse, a lexical scan decides
//! between "needs more lines" and a hard syntax error.

use std::str::FromStr;

use syn::parse::Parser;
use syn::{Expr, Item, Pat, Stmt, Token};

use super::program::{print_call, ENTRY_POINT, PRINTER_NAME};
use super::scan;
use super::splice::decl_key;

/// The shape of an input that parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A bare expression, already wrapped in a print call.
    Expression(Vec<Stmt>),
    /// One or more statements, possibly followed by a synthesized print.
    Statements(Vec<Stmt>),
    /// Top-level items.
    Declarations(Vec<Item>),
}

impl Classified {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expression(_) => "expression",
            Self::Statements(_) => "statement",
            Self::Declarations(_) => "declaration",
        }
    }
}

/// Why an input could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unclassified {
    /// The input may become valid once more lines are added.
    Incomplete,
    /// The input contains an illegal token.
    Syntax(String),
    /// The input tries to redefine the entry point or the print helper.
    Reserved(String),
}

/// Whether `input` is a REPL command rather than code.
#[must_use]
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with(':')
}

/// Classify a (possibly multi-line) chunk of REPL input.
///
/// # Errors
///
/// Returns [`Unclassified`] when no interpretation parses.
pub fn classify(input: &str) -> Result<Classified, Unclassified> {
    if let Some(expr) = parse_expression(input) {
        return Ok(Classified::Expression(vec![print_call(vec![expr])]));
    }

    // Items are valid statements too; a list made only of items is meant
    // for the top level.
    if let Some(stmts) = parse_statements(input) {
        if stmts.is_empty() || !stmts.iter().all(|s| matches!(s, Stmt::Item(_))) {
            return Ok(Classified::Statements(finish_statements(stmts)));
        }
    }

    if let Ok(file) = syn::parse_file(input) {
        if !file.items.is_empty() {
            if let Some(name) = file.items.iter().find_map(reserved_name) {
                return Err(Unclassified::Reserved(name));
            }
            return Ok(Classified::Declarations(file.items));
        }
    }

    Err(scan_tokens(input))
}

/// The name of `item` if it is one the session owns, in any namespace.
fn reserved_name(item: &Item) -> Option<String> {
    let key = decl_key(item)?;
    [ENTRY_POINT, PRINTER_NAME]
        .contains(&key.name.as_str())
        .then_some(key.name)
}

/// Parse `input` as an expression worth printing.
fn parse_expression(input: &str) -> Option<Expr> {
    let expr = syn::parse_str::<Expr>(input).ok()?;
    if is_statement_like(&expr) {
        return None;
    }
    Some(expr)
}

/// Parse `input` as a statement list, forgiving a missing final `;`.
fn parse_statements(input: &str) -> Option<Vec<Stmt>> {
    if let Ok(stmts) = syn::Block::parse_within.parse_str(input) {
        return Some(stmts);
    }
    let trimmed = input.trim_end();
    if trimmed.ends_with(';') || trimmed.ends_with('}') {
        return None;
    }
    syn::Block::parse_within.parse_str(&format!("{trimmed};")).ok()
}

/// Expressions that only make sense for their side effects.
fn is_statement_like(expr: &Expr) -> bool {
    match expr {
        Expr::Assign(_) | Expr::ForLoop(_) | Expr::While(_) => true,
        Expr::Binary(binary) => is_compound_assign(&binary.op),
        Expr::Macro(mac) => mac.mac.path.get_ident().is_some_and(|name| {
            let name = name.to_string();
            matches!(name.as_str(), "print" | "println" | "eprint" | "eprintln")
                || name.starts_with("assert")
        }),
        _ => false,
    }
}

fn is_compound_assign(op: &syn::BinOp) -> bool {
    use syn::BinOp;
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

/// Terminate every statement and print whatever the last one assigned.
fn finish_statements(mut stmts: Vec<Stmt>) -> Vec<Stmt> {
    let assigned = stmts.last().map(assigned_places).unwrap_or_default();
    for stmt in &mut stmts {
        terminate(stmt);
    }
    if !assigned.is_empty() {
        stmts.push(print_call(assigned));
    }
    stmts
}

/// Give a statement its semicolon so more statements can follow it.
fn terminate(stmt: &mut Stmt) {
    match stmt {
        Stmt::Expr(_, semi @ None) => *semi = Some(<Token![;]>::default()),
        Stmt::Macro(mac) if mac.semi_token.is_none() => {
            mac.semi_token = Some(<Token![;]>::default());
        }
        _ => {}
    }
}

/// Places bound by a `let` or written by an assignment, minus `_`.
fn assigned_places(stmt: &Stmt) -> Vec<Expr> {
    match stmt {
        Stmt::Local(local) if local.init.is_some() => {
            let mut names = Vec::new();
            bound_names(&local.pat, &mut names);
            names
                .into_iter()
                .map(|name| Expr::Path(syn::ExprPath {
                    attrs: Vec::new(),
                    qself: None,
                    path: name.into(),
                }))
                .collect()
        }
        Stmt::Expr(Expr::Assign(assign), _) => assignment_targets(&assign.left),
        Stmt::Expr(Expr::Binary(binary), _) if is_compound_assign(&binary.op) => {
            assignment_targets(&binary.left)
        }
        _ => Vec::new(),
    }
}

fn assignment_targets(left: &Expr) -> Vec<Expr> {
    match left {
        Expr::Infer(_) => Vec::new(),
        Expr::Tuple(tuple) => tuple.elems.iter().flat_map(assignment_targets).collect(),
        Expr::Paren(paren) => assignment_targets(&paren.expr),
        other => vec![other.clone()],
    }
}

/// Collect identifiers bound by a pattern in declaration order.
fn bound_names(pat: &Pat, names: &mut Vec<syn::Ident>) {
    match pat {
        Pat::Ident(ident) => {
            names.push(ident.ident.clone());
            if let Some((_, sub)) = &ident.subpat {
                bound_names(sub, names);
            }
        }
        Pat::Tuple(tuple) => tuple.elems.iter().for_each(|p| bound_names(p, names)),
        Pat::TupleStruct(tuple) => tuple.elems.iter().for_each(|p| bound_names(p, names)),
        Pat::Slice(slice) => slice.elems.iter().for_each(|p| bound_names(p, names)),
        Pat::Struct(strukt) => strukt.fields.iter().for_each(|f| bound_names(&f.pat, names)),
        Pat::Type(typed) => bound_names(&typed.pat, names),
        Pat::Reference(reference) => bound_names(&reference.pat, names),
        Pat::Paren(paren) => bound_names(&paren.pat, names),
        // Every case binds the same names; the first is enough.
        Pat::Or(or) => {
            if let Some(first) = or.cases.first() {
                bound_names(first, names);
            }
        }
        _ => {}
    }
}

/// Decide between an incomplete input and an illegal token.
fn scan_tokens(input: &str) -> Unclassified {
    if scan::has_unclosed_delimiters(input) {
        return Unclassified::Incomplete;
    }
    match proc_macro2::TokenStream::from_str(input) {
        Ok(_) => Unclassified::Incomplete,
        Err(err) => Unclassified::Syntax(format!("{err} in {:?}", input.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::program::is_fn_named;
    use quote::ToTokens;

    fn tokens(stmts: &[Stmt]) -> Vec<String> {
        stmts
            .iter()
            .map(|s| s.to_token_stream().to_string())
            .collect()
    }

    #[test]
    fn classify_expressions() {
        let Ok(Classified::Expression(stmts)) = classify("1 + 1") else {
            panic!("expected expression");
        };
        assert_eq!(tokens(&stmts), vec!["__reval_p (& [& (1 + 1)]) ;"]);
        assert_eq!(classify("foo(42)").unwrap().kind(), "expression");
        assert_eq!(classify("x * y + z").unwrap().kind(), "expression");
        assert_eq!(classify("vec![1, 2, 3]").unwrap().kind(), "expression");
    }

    #[test]
    fn statement_like_expressions_are_statements() {
        assert_eq!(classify("x = 5").unwrap().kind(), "statement");
        assert_eq!(classify("x += 1").unwrap().kind(), "statement");
        assert_eq!(classify("for i in 0..3 {}").unwrap().kind(), "statement");
        assert_eq!(classify("println!(\"hi\")").unwrap().kind(), "statement");
        assert_eq!(classify("assert_eq!(1, 1)").unwrap().kind(), "statement");
    }

    #[test]
    fn trailing_semicolon_suppresses_print() {
        let Ok(Classified::Statements(stmts)) = classify("1 + 1;") else {
            panic!("expected statements");
        };
        assert_eq!(tokens(&stmts), vec!["1 + 1 ;"]);
    }

    #[test]
    fn let_prints_bound_names() {
        let Ok(Classified::Statements(stmts)) = classify("let (x, _) = foo();") else {
            panic!("expected statements");
        };
        assert_eq!(stmts.len(), 2);
        assert_eq!(tokens(&stmts)[1], "__reval_p (& [& (x)]) ;");
    }

    #[test]
    fn let_without_semicolon() {
        let Ok(Classified::Statements(stmts)) = classify("let x = 5") else {
            panic!("expected statements");
        };
        assert_eq!(tokens(&stmts), vec!["let x = 5 ;", "__reval_p (& [& (x)]) ;"]);
    }

    #[test]
    fn discarded_bindings_print_nothing() {
        let Ok(Classified::Statements(stmts)) = classify("let (_, _) = foo();") else {
            panic!("expected statements");
        };
        assert_eq!(stmts.len(), 1);
        let Ok(Classified::Statements(stmts)) = classify("let x: i32;") else {
            panic!("expected statements");
        };
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn nested_patterns_keep_declaration_order() {
        let Ok(Classified::Statements(stmts)) =
            classify("let Point { x: a, y: (b, _) } = p;")
        else {
            panic!("expected statements");
        };
        assert_eq!(tokens(&stmts)[1], "__reval_p (& [& (a) , & (b)]) ;");
    }

    #[test]
    fn assignment_prints_targets() {
        let Ok(Classified::Statements(stmts)) = classify("(a, _, s.f) = (1, 2, 3)") else {
            panic!("expected statements");
        };
        assert_eq!(
            tokens(&stmts),
            vec!["(a , _ , s . f) = (1 , 2 , 3) ;", "__reval_p (& [& (a) , & (s . f)]) ;"]
        );
    }

    #[test]
    fn statements_are_terminated() {
        let Ok(Classified::Statements(stmts)) = classify("let x = 1; x = 2") else {
            panic!("expected statements");
        };
        assert_eq!(
            tokens(&stmts),
            vec!["let x = 1 ;", "x = 2 ;", "__reval_p (& [& (x)]) ;"]
        );
    }

    #[test]
    fn classify_declarations() {
        let Ok(Classified::Declarations(items)) =
            classify("fn add(a: i32, b: i32) -> i32 { a + b }")
        else {
            panic!("expected declaration");
        };
        assert_eq!(items.len(), 1);
        assert!(is_fn_named(&items[0], "add"));
        assert_eq!(classify("struct Point { x: i32 }").unwrap().kind(), "declaration");
        assert_eq!(classify("impl Point {}").unwrap().kind(), "declaration");
    }

    #[test]
    fn several_items_form_one_declaration_input() {
        let Ok(Classified::Declarations(items)) = classify("struct P; impl P { fn new() -> P { P } }")
        else {
            panic!("expected declarations");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn items_mixed_with_statements_stay_local() {
        assert_eq!(classify("fn one() -> i32 { 1 } let x = one();").unwrap().kind(), "statement");
    }

    #[test]
    fn compound_assignment_prints_target() {
        let Ok(Classified::Statements(stmts)) = classify("x += 1") else {
            panic!("expected statements");
        };
        assert_eq!(tokens(&stmts), vec!["x += 1 ;", "__reval_p (& [& (x)]) ;"]);
    }

    #[test]
    fn reserved_names_are_rejected() {
        assert_eq!(
            classify("fn main() {}"),
            Err(Unclassified::Reserved("main".to_string()))
        );
        assert_eq!(
            classify("fn __reval_p() {}"),
            Err(Unclassified::Reserved("__reval_p".to_string()))
        );
        assert_eq!(
            classify("const __reval_p: i32 = 0;"),
            Err(Unclassified::Reserved("__reval_p".to_string()))
        );
        assert_eq!(
            classify("struct P; static main: u8 = 0;"),
            Err(Unclassified::Reserved("main".to_string()))
        );
        assert_eq!(
            classify("macro_rules! __reval_p { () => {} }"),
            Err(Unclassified::Reserved("__reval_p".to_string()))
        );
    }

    #[test]
    fn incomplete_input() {
        assert_eq!(classify("if true {"), Err(Unclassified::Incomplete));
        assert_eq!(classify("fn foo() {"), Err(Unclassified::Incomplete));
        assert_eq!(classify("1 +"), Err(Unclassified::Incomplete));
        assert_eq!(classify("let s = \"abc"), Err(Unclassified::Incomplete));
    }

    #[test]
    fn illegal_tokens() {
        assert!(matches!(classify("1 ` 2"), Err(Unclassified::Syntax(_))));
        assert!(matches!(classify("x)"), Err(Unclassified::Syntax(_))));
    }

    #[test]
    fn commands() {
        assert!(is_command(":help"));
        assert!(is_command("  : q"));
        assert!(!is_command("x::y"));
    }
}
