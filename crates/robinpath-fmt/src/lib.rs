#![allow(clippy::module_name_repetitions)]

//! AST-to-source round-trip writer for RobinPath.
//!
//! Given the original source text and an (possibly edited) [`Ast`] parsed
//! from it, [`update_code_from_ast`] produces new source text that reflects
//! whatever changed in the AST while leaving everything else byte-for-byte
//! untouched — comments, blank lines, argument spacing, all of it.

mod args;
mod error;
mod literal;
mod printer;
mod ranges;

use robinpath_core::ast::{Ast, Statement};

pub use error::FmtError;

/// Rebuild source text for `ast`, starting from `original` (the text it was
/// parsed from) and replacing only the statements whose canonical printed
/// form diverges from what's already there.
///
/// `def`s and top-level `on` blocks are lifted out of `ast.statements` into
/// `ast.functions`/`ast.on_blocks` by the parser, so they're folded back in
/// here as their own top-level entries before planning edits.
pub fn update_code_from_ast(original: &str, ast: &Ast) -> Result<String, FmtError> {
    let mut top_level: Vec<Statement> = ast.statements.clone();
    top_level.extend(ast.functions.iter().cloned().map(Statement::DefineFunction));
    top_level.extend(ast.on_blocks.iter().cloned().map(Statement::OnBlock));

    let edits = ranges::plan_edits(original, &top_level)?;
    Ok(ranges::apply_edits(original, edits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use robinpath_core::parser::parse;

    #[test]
    fn unmodified_ast_round_trips_exactly() {
        let src = "log \"hi\"\nif $x\n  log \"yes\"\nendif\n";
        let ast = parse(src).unwrap();
        assert_eq!(update_code_from_ast(src, &ast).unwrap(), src);
    }

    #[test]
    fn lifted_function_body_edit_is_reflected() {
        let src = "def greet $name\n  log $name\nenddef\n";
        let mut ast = parse(src).unwrap();
        assert_eq!(ast.functions.len(), 1);
        if let Statement::Command(c) = &mut ast.functions[0].body[0] {
            c.name = "print".into();
        }
        let out = update_code_from_ast(src, &ast).unwrap();
        assert_eq!(out, "def greet $name\n  print $name\nenddef\n");
    }

    #[test]
    fn lifted_on_block_edit_is_reflected() {
        let src = "on \"ready\"\n  log 1\nendon\n";
        let mut ast = parse(src).unwrap();
        assert_eq!(ast.on_blocks.len(), 1);
        if let Statement::Command(c) = &mut ast.on_blocks[0].body[0] {
            if let robinpath_core::ast::Arg::Number(n) = &mut c.args[0] {
                *n = 2.0;
            }
        }
        let out = update_code_from_ast(src, &ast).unwrap();
        assert_eq!(out, "on \"ready\"\n  log 2\nendon\n");
    }
}
