//! Scenario-level coverage for the round-trip writer: a comment-rich
//! program left untouched, a rename that must carry its attached comment
//! along unchanged, and a comment group explicitly cleared from a node.

use robinpath_core::ast::Statement;
use robinpath_core::parser::parse;
use robinpath_fmt::update_code_from_ast;

#[test]
fn comment_rich_program_round_trips_byte_for_byte() {
    let src = "\
# greets the user by name
@retry 3
def greet $name
  log $name  # say hello
enddef

# now run it
greet \"ada\"
";
    let ast = parse(src).unwrap();
    assert_eq!(update_code_from_ast(src, &ast).unwrap(), src);
}

#[test]
fn rename_preserves_attached_and_inline_comments() {
    let src = "# greet the user\nlog \"hi\"  # say hello\n";
    let mut ast = parse(src).unwrap();
    match &mut ast.statements[0] {
        Statement::Command(c) => c.name = "print".into(),
        other => panic!("expected a command statement, got {other:?}"),
    }
    let out = update_code_from_ast(src, &ast).unwrap();
    assert_eq!(out, "# greet the user\nprint \"hi\"  # say hello\n");
}

#[test]
fn clearing_comments_removes_the_attached_group() {
    let src = "# note\nlog \"hi\"\n";
    let mut ast = parse(src).unwrap();
    match &mut ast.statements[0] {
        Statement::Command(c) => {
            assert!(c.comments.is_some(), "fixture should start with an attached comment");
            c.comments = Some(vec![]);
        }
        other => panic!("expected a command statement, got {other:?}"),
    }
    let out = update_code_from_ast(src, &ast).unwrap();
    assert_eq!(out, "log \"hi\"\n");
}

#[test]
fn clearing_comments_leaves_plain_blank_spacing_alone() {
    let src = "log \"before\"\n\nlog \"hi\"\n";
    let mut ast = parse(src).unwrap();
    match &mut ast.statements[1] {
        Statement::Command(c) => {
            assert!(c.comments.is_none(), "fixture statement should start with no comments at all");
            c.comments = Some(vec![]);
        }
        other => panic!("expected a command statement, got {other:?}"),
    }
    let out = update_code_from_ast(src, &ast).unwrap();
    assert_eq!(out, src, "clearing a None comment group is a no-op, and the blank line is ordinary spacing");
}
