//! Post-processing pass that flattens nested `def`s (at any depth) into the
//! program's flat function table, and top-level `on` blocks into the event
//! table, so the final [`Ast`] shape matches what a dedicated
//! definition-extraction pass would have produced.

use crate::ast::{Ast, DefineFunction, ScopeBlock, Statement};

pub fn lift(ast: &mut Ast) {
    let mut statements = std::mem::take(&mut ast.statements);
    lift_top_level(&mut statements, &mut ast.functions, &mut ast.on_blocks);
    ast.statements = statements;
}

/// Flatten `def`s out of `body` at any depth, pushing them (already
/// themselves recursively lifted) onto `functions`.
fn lift_nested(body: &mut Vec<Statement>, functions: &mut Vec<DefineFunction>) {
    let mut i = 0;
    while i < body.len() {
        if matches!(body[i], Statement::DefineFunction(_)) {
            let stmt = body.remove(i);
            if let Statement::DefineFunction(mut def) = stmt {
                lift_nested(&mut def.body, functions);
                functions.push(def);
            }
            continue;
        }
        visit_children(&mut body[i], functions);
        i += 1;
    }
}

fn visit_children(stmt: &mut Statement, functions: &mut Vec<DefineFunction>) {
    match stmt {
        Statement::IfBlock(b) => {
            lift_nested(&mut b.then_branch, functions);
            for branch in &mut b.elseif_branches {
                lift_nested(&mut branch.body, functions);
            }
            if let Some(else_branch) = &mut b.else_branch {
                lift_nested(else_branch, functions);
            }
        }
        Statement::ForLoop(f) => lift_nested(&mut f.body, functions),
        Statement::ScopeBlock(s) => lift_nested(&mut s.body, functions),
        Statement::TogetherBlock(t) => {
            for block in &mut t.blocks {
                lift_scope_block(block, functions);
            }
        }
        Statement::OnBlock(o) => lift_nested(&mut o.body, functions),
        Statement::DefineFunction(_) => unreachable!("handled by caller before recursing"),
        _ => {}
    }
}

fn lift_scope_block(block: &mut ScopeBlock, functions: &mut Vec<DefineFunction>) {
    lift_nested(&mut block.body, functions);
}

/// Top-level pass: lift nested `def`s everywhere (recursively), then pull
/// only the top-level `on` blocks out into their own table.
fn lift_top_level(
    statements: &mut Vec<Statement>,
    functions: &mut Vec<DefineFunction>,
    on_blocks: &mut Vec<crate::ast::OnBlock>,
) {
    lift_nested(statements, functions);
    let mut i = 0;
    while i < statements.len() {
        if matches!(statements[i], Statement::OnBlock(_)) {
            let stmt = statements.remove(i);
            if let Statement::OnBlock(on) = stmt {
                on_blocks.push(on);
            }
            continue;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn nested_def_is_lifted_to_top_level_table() {
        let ast = parse("if $x\n  def helper\n    return 1\n  enddef\nendif\n").unwrap();
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].name, "helper");
        match &ast.statements[0] {
            Statement::IfBlock(b) => assert!(b.then_branch.is_empty()),
            _ => panic!("expected if block"),
        }
    }

    #[test]
    fn top_level_on_block_is_lifted() {
        let ast = parse("on ready\n  log 1\nendon\n").unwrap();
        assert_eq!(ast.on_blocks.len(), 1);
        assert_eq!(ast.on_blocks[0].event_name, "ready");
        assert!(ast.statements.is_empty());
    }

    #[test]
    fn def_nested_in_def_is_flattened_too() {
        let ast = parse("def outer\n  def inner\n    return 2\n  enddef\nenddef\n").unwrap();
        assert_eq!(ast.functions.len(), 2);
        let outer = ast.functions.iter().find(|f| f.name == "outer").unwrap();
        assert!(outer.body.is_empty());
        assert!(ast.functions.iter().any(|f| f.name == "inner"));
    }
}
