//! The canonical printer: turns one edited AST node into its canonical
//! source text. Only invoked for nodes whose byte range diverged from
//! what the original text already held — see [`crate::ranges`].

use robinpath_core::ast::{
    Arg, Assignment, AssignmentRhs, Command, CommentStatement, CommentWithPosition, Decorator,
    DefineFunction, ForLoop, IfBlock, IfTrueFalse, InlineIf, OnBlock, ReturnStatement, ScopeBlock,
    Statement, SyntaxType, TogetherBlock,
};

use crate::args::{arg_text, path_suffix, target_text};
use crate::error::FmtError;
use crate::literal::render_literal;

const INDENT_UNIT: &str = "  ";

fn indent(depth: usize) -> String {
    INDENT_UNIT.repeat(depth)
}

/// Print a full statement body, one line (or block) per statement,
/// indented at `depth`.
pub fn print_body(body: &[Statement], depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    for stmt in body {
        out.push_str(&print_statement(stmt, depth)?);
    }
    Ok(out)
}

fn print_decorators(decorators: &Option<Vec<Decorator>>, depth: usize, out: &mut String) {
    let Some(decorators) = decorators else { return };
    for d in decorators {
        out.push_str(&indent(depth));
        out.push('@');
        out.push_str(&d.name);
        for a in &d.args {
            out.push(' ');
            out.push_str(&arg_text(a));
        }
        out.push('\n');
    }
}

fn print_comments_block(comments: &Option<Vec<CommentWithPosition>>, depth: usize, out: &mut String) {
    let Some(comments) = comments else { return };
    for c in comments.iter().filter(|c| !c.inline) {
        for line in c.text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            out.push_str(&indent(depth));
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn inline_comment_suffix(comments: &Option<Vec<CommentWithPosition>>) -> String {
    comments
        .as_ref()
        .and_then(|cs| cs.iter().find(|c| c.inline))
        .filter(|c| !c.text.trim().is_empty())
        .map(|c| format!("  {}", c.text))
        .unwrap_or_default()
}

pub fn print_statement(stmt: &Statement, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    match stmt {
        Statement::Command(c) => {
            print_comments_block(&c.comments, depth, &mut out);
            print_decorators(&c.decorators, depth, &mut out);
            out.push_str(&indent(depth));
            out.push_str(&print_command(c)?);
            out.push_str(&inline_comment_suffix(&c.comments));
            out.push('\n');
        }
        Statement::Assignment(a) => {
            print_comments_block(&a.comments, depth, &mut out);
            out.push_str(&indent(depth));
            out.push_str(&print_assignment(a)?);
            out.push_str(&inline_comment_suffix(&a.comments));
            out.push('\n');
        }
        Statement::ShorthandAssignment(a) => {
            out.push_str(&indent(depth));
            out.push('$');
            out.push_str(&a.target_name);
            out.push('\n');
        }
        Statement::IfBlock(b) => out.push_str(&print_if_block(b, depth)?),
        Statement::InlineIf(b) => out.push_str(&print_inline_if(b, depth)?),
        Statement::IfTrue(b) => out.push_str(&print_if_true_false(b, depth, "iftrue")?),
        Statement::IfFalse(b) => out.push_str(&print_if_true_false(b, depth, "iffalse")?),
        Statement::ForLoop(f) => out.push_str(&print_for_loop(f, depth)?),
        Statement::DefineFunction(f) => out.push_str(&print_define_function(f, depth)?),
        Statement::ScopeBlock(s) => out.push_str(&print_scope_block(s, depth, "do")?),
        Statement::TogetherBlock(t) => out.push_str(&print_together_block(t, depth)?),
        Statement::ReturnStatement(r) => out.push_str(&print_return(r, depth)),
        Statement::BreakStatement(_) => {
            out.push_str(&indent(depth));
            out.push_str("break\n");
        }
        Statement::ContinueStatement(_) => {
            out.push_str(&indent(depth));
            out.push_str("continue\n");
        }
        Statement::CommentStatement(c) => out.push_str(&print_comment_statement(c, depth)),
        Statement::OnBlock(b) => out.push_str(&print_on_block(b, depth)?),
    }
    Ok(out)
}

fn print_command(c: &Command) -> Result<String, FmtError> {
    let name = match &c.module {
        Some(m) => format!("{m}.{}", c.name),
        None => c.name.clone(),
    };
    let mut head = name;
    let body = match c.syntax_type {
        SyntaxType::Space => c.args.iter().map(arg_text).collect::<Vec<_>>().join(" "),
        SyntaxType::Parentheses | SyntaxType::NamedParentheses => {
            format!("({})", c.args.iter().map(arg_text).collect::<Vec<_>>().join(" "))
        }
        SyntaxType::MultilineParentheses => {
            let inner = c.args.iter().map(|a| format!("  {}", arg_text(a))).collect::<Vec<_>>().join("\n");
            format!("(\n{inner}\n)")
        }
    };
    if !body.is_empty() {
        if matches!(c.syntax_type, SyntaxType::Space) {
            head.push(' ');
        }
        head.push_str(&body);
    }
    if let Some(target) = &c.into {
        head.push_str(" into ");
        head.push_str(&target_text(target));
    }
    Ok(head)
}

/// Pseudo-command names the parser uses to smuggle an `$(...)`/`{...}`/
/// `[...]`/bare-`$var` assignment RHS through the same `AssignmentRhs::
/// Command` slot as a real call; the writer prints their single argument
/// bare, with none of the call syntax a real command would get.
const PSEUDO_COMMANDS: &[&str] = &["_var", "_subexpr", "_object", "_array"];

fn print_assignment(a: &Assignment) -> Result<String, FmtError> {
    let target = match &a.target_path {
        Some(path) => format!("${}{}", a.target_name, path_suffix(path)),
        None => format!("${}", a.target_name),
    };
    let rhs = match &a.rhs {
        AssignmentRhs::IsLastValue => "$".to_string(),
        AssignmentRhs::Literal { value, value_type } => render_literal(value, *value_type)?,
        AssignmentRhs::Command(c) if PSEUDO_COMMANDS.contains(&c.name.as_str()) => {
            c.args.first().map(arg_text).unwrap_or_default()
        }
        AssignmentRhs::Command(c) => print_command(c)?,
    };
    Ok(format!("{target} = {rhs}"))
}

fn print_if_block(b: &IfBlock, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    print_comments_block(&b.comments, depth, &mut out);
    out.push_str(&indent(depth));
    out.push_str("if ");
    out.push_str(&b.condition_expr);
    out.push('\n');
    out.push_str(&print_body(&b.then_branch, depth + 1)?);
    for branch in &b.elseif_branches {
        out.push_str(&indent(depth));
        out.push_str("elseif ");
        out.push_str(&branch.condition);
        out.push('\n');
        out.push_str(&print_body(&branch.body, depth + 1)?);
    }
    if let Some(else_branch) = &b.else_branch {
        out.push_str(&indent(depth));
        out.push_str("else\n");
        out.push_str(&print_body(else_branch, depth + 1)?);
    }
    out.push_str(&indent(depth));
    out.push_str("endif\n");
    Ok(out)
}

fn print_inline_if(b: &InlineIf, depth: usize) -> Result<String, FmtError> {
    let inner = print_statement(&b.command, 0)?;
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str("if ");
    out.push_str(&b.condition_expr);
    out.push(' ');
    out.push_str(inner.trim_end_matches('\n'));
    out.push('\n');
    Ok(out)
}

fn print_if_true_false(b: &IfTrueFalse, depth: usize, kw: &str) -> Result<String, FmtError> {
    let inner = print_statement(&b.command, 0)?;
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str(kw);
    out.push(' ');
    out.push_str(inner.trim_end_matches('\n'));
    out.push('\n');
    Ok(out)
}

fn print_for_loop(f: &ForLoop, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str("for $");
    out.push_str(&f.var_name);
    out.push_str(" in ");
    out.push_str(&f.iterable_expr);
    out.push('\n');
    out.push_str(&print_body(&f.body, depth + 1)?);
    out.push_str(&indent(depth));
    out.push_str("endfor\n");
    Ok(out)
}

fn print_define_function(f: &DefineFunction, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    print_comments_block(&f.comments, depth, &mut out);
    print_decorators(&f.decorators, depth, &mut out);
    out.push_str(&indent(depth));
    out.push_str("def ");
    out.push_str(&f.name);
    for p in &f.param_names {
        out.push_str(" $");
        out.push_str(p);
    }
    out.push('\n');
    out.push_str(&print_body(&f.body, depth + 1)?);
    out.push_str(&indent(depth));
    out.push_str("enddef\n");
    Ok(out)
}

fn print_scope_block(s: &ScopeBlock, depth: usize, kw: &str) -> Result<String, FmtError> {
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str(kw);
    if let Some(params) = &s.param_names {
        for p in params {
            out.push_str(" $");
            out.push_str(p);
        }
    }
    if let Some(target) = &s.into {
        out.push_str(" into ");
        out.push_str(&target_text(target));
    }
    out.push('\n');
    out.push_str(&print_body(&s.body, depth + 1)?);
    out.push_str(&indent(depth));
    out.push_str("end");
    out.push_str(kw);
    out.push('\n');
    Ok(out)
}

fn print_together_block(t: &TogetherBlock, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str("together\n");
    for block in &t.blocks {
        out.push_str(&print_scope_block(block, depth + 1, "do")?);
    }
    out.push_str(&indent(depth));
    out.push_str("endtogether\n");
    Ok(out)
}

fn print_return(r: &ReturnStatement, depth: usize) -> String {
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str("return");
    if let Some(v) = &r.value {
        out.push(' ');
        out.push_str(&arg_text(v));
    }
    out.push('\n');
    out
}

fn print_comment_statement(c: &CommentStatement, depth: usize) -> String {
    let mut out = String::new();
    for comment in &c.comments {
        for line in comment.text.split('\n') {
            if line.trim().is_empty() {
                continue;
            }
            out.push_str(&indent(depth));
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn print_on_block(b: &OnBlock, depth: usize) -> Result<String, FmtError> {
    let mut out = String::new();
    out.push_str(&indent(depth));
    out.push_str("on \"");
    out.push_str(&b.event_name);
    out.push_str("\"\n");
    out.push_str(&print_body(&b.body, depth + 1)?);
    out.push_str(&indent(depth));
    out.push_str("endon\n");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use robinpath_core::ast::Target;

    #[test]
    fn command_space_form_round_trips() {
        let c = Command {
            name: "log".into(),
            module: None,
            args: vec![Arg::String("hi".into())],
            syntax_type: SyntaxType::Space,
            decorators: None,
            into: None,
            callback: None,
            comments: None,
            code_pos: Default::default(),
        };
        assert_eq!(print_command(&c).unwrap(), "log \"hi\"");
    }

    #[test]
    fn command_with_into_target() {
        let c = Command {
            name: "math.add".into(),
            module: None,
            args: vec![Arg::Number(1.0), Arg::Number(2.0)],
            syntax_type: SyntaxType::Space,
            decorators: None,
            into: Some(Target { name: "sum".into(), path: None }),
            callback: None,
            comments: None,
            code_pos: Default::default(),
        };
        assert_eq!(print_command(&c).unwrap(), "math.add 1 2 into $sum");
    }
}
