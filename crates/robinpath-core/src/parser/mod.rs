//! Source text to [`Ast`]: lexing, logical-line grouping, comment
//! association, statement dispatch, and the definition-lifting pass.

pub mod args;
pub mod comments;
mod lift;
mod lines;
mod stmt;

use crate::ast::Ast;
use crate::error::RobinError;
use crate::lexer::Lexer;

/// Parse a complete program.
pub fn parse(source: &str) -> Result<Ast, RobinError> {
    let tokens = Lexer::tokenize(source)?;
    let logical_lines = lines::split_lines(&tokens);
    let statements = stmt::parse_body(&logical_lines, source)?;
    let mut ast = Ast { statements, functions: Vec::new(), on_blocks: Vec::new() };
    lift::lift(&mut ast);
    Ok(ast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AssignmentRhs, Statement};

    #[test]
    fn parses_simple_assignment() {
        let ast = parse("$a = 1\n").unwrap();
        assert_eq!(ast.statements.len(), 1);
        match &ast.statements[0] {
            Statement::Assignment(a) => {
                assert_eq!(a.target_name, "a");
                assert!(matches!(a.rhs, AssignmentRhs::Literal { .. }));
            }
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn parses_space_form_command_with_into() {
        let ast = parse("log 1 2 into $x\n").unwrap();
        match &ast.statements[0] {
            Statement::Command(c) => {
                assert_eq!(c.name, "log");
                assert_eq!(c.args.len(), 2);
                assert_eq!(c.into.as_ref().unwrap().name, "x");
            }
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn parses_parenthesized_call_with_named_args() {
        let ast = parse("math.add(a=1, b=2)\n").unwrap();
        match &ast.statements[0] {
            Statement::Command(c) => {
                assert_eq!(c.name, "add");
                assert_eq!(c.module.as_deref(), Some("math"));
                assert!(matches!(c.syntax_type, crate::ast::SyntaxType::NamedParentheses));
            }
            _ => panic!("expected command"),
        }
    }

    #[test]
    fn parses_if_elseif_else_endif() {
        let src = "if $x > 0\n  log 1\nelseif $x < 0\n  log 2\nelse\n  log 3\nendif\n";
        let ast = parse(src).unwrap();
        match &ast.statements[0] {
            Statement::IfBlock(b) => {
                assert_eq!(b.condition_expr, "$x > 0");
                assert_eq!(b.then_branch.len(), 1);
                assert_eq!(b.elseif_branches.len(), 1);
                assert_eq!(b.elseif_branches[0].condition, "$x < 0");
                assert!(b.else_branch.is_some());
            }
            _ => panic!("expected if block"),
        }
    }

    #[test]
    fn parses_inline_if_then() {
        let ast = parse("if $x > 0 then return 1\n").unwrap();
        match &ast.statements[0] {
            Statement::InlineIf(b) => {
                assert_eq!(b.condition_expr, "$x > 0");
                assert!(matches!(*b.command, Statement::ReturnStatement(_)));
            }
            _ => panic!("expected inline if"),
        }
    }

    #[test]
    fn parses_for_loop_header() {
        let ast = parse("for $item in $list\n  log $item\nendfor\n").unwrap();
        match &ast.statements[0] {
            Statement::ForLoop(f) => {
                assert_eq!(f.var_name, "item");
                assert_eq!(f.iterable_expr, "$list");
                assert_eq!(f.body.len(), 1);
            }
            _ => panic!("expected for loop"),
        }
    }

    #[test]
    fn parses_do_with_params_and_into() {
        let src = "together\n  do $a $b into $sum\n    return 1\n  enddo\nendtogether\n";
        let ast = parse(src).unwrap();
        match &ast.statements[0] {
            Statement::TogetherBlock(t) => {
                assert_eq!(t.blocks.len(), 1);
                assert_eq!(t.blocks[0].param_names.as_ref().unwrap(), &vec!["a".to_string(), "b".to_string()]);
                assert_eq!(t.blocks[0].into.as_ref().unwrap().name, "sum");
            }
            _ => panic!("expected together block"),
        }
    }

    #[test]
    fn parses_decorated_function() {
        let src = "@retry 3\ndef helper $x\n  return $x\nenddef\n";
        let ast = parse(src).unwrap();
        assert_eq!(ast.functions.len(), 1);
        let def = &ast.functions[0];
        assert_eq!(def.name, "helper");
        let decs = def.decorators.as_ref().unwrap();
        assert_eq!(decs.len(), 1);
        assert_eq!(decs[0].name, "retry");
    }

    #[test]
    fn decorator_without_def_or_var_is_an_error() {
        let src = "@retry 3\nlog 1\n";
        assert!(parse(src).is_err());
    }

    #[test]
    fn parses_shorthand_assignment() {
        let ast = parse("$flag\n").unwrap();
        assert!(matches!(ast.statements[0], Statement::ShorthandAssignment(_)));
    }

    #[test]
    fn parses_object_literal_rhs_as_pseudo_command() {
        let ast = parse("$obj = {a: 1}\n").unwrap();
        match &ast.statements[0] {
            Statement::Assignment(a) => match &a.rhs {
                AssignmentRhs::Command(c) => assert_eq!(c.name, "_object"),
                _ => panic!("expected pseudo command"),
            },
            _ => panic!("expected assignment"),
        }
    }

    #[test]
    fn parses_comment_statement_between_code() {
        let src = "$a = 1\n\n# a standalone note\n\n$b = 2\n";
        let ast = parse(src).unwrap();
        assert_eq!(ast.statements.len(), 3);
        assert!(matches!(ast.statements[1], Statement::CommentStatement(_)));
    }
}
