//! Tagged AST node definitions for statements, call arguments, and
//! comments. Every node carries a [`CodePos`].

use crate::pos::CodePos;
use crate::value::LiteralValueType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single segment of an attribute path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathSeg {
    Property { name: String },
    Index { index: u64 },
}

/// A comment, with its source position and whether it trails a statement
/// on the same line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentWithPosition {
    pub text: String,
    pub code_pos: CodePos,
    pub inline: bool,
}

/// How a command's argument list was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntaxType {
    Space,
    Parentheses,
    NamedParentheses,
    MultilineParentheses,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    LastValue,
    Var {
        name: String,
        path: Option<Vec<PathSeg>>,
    },
    Number(f64),
    String(String),
    /// Untyped/bare literal text (bareword, `module.fn` style names, the
    /// unary `-` that never got folded into a number, etc).
    Literal(String),
    Subexpr {
        code: String,
    },
    Object {
        code: String,
    },
    Array {
        code: String,
    },
    NamedArgs {
        args: IndexMap<String, Arg>,
    },
}

/// `$t[.path]*` assignment/`into` target (the `$lvalue` grammar used by
/// `into`, `set`, `empty`, `meta`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub path: Option<Vec<PathSeg>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decorator {
    pub name: String,
    pub args: Vec<Arg>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    pub module: Option<String>,
    pub args: Vec<Arg>,
    pub syntax_type: SyntaxType,
    pub decorators: Option<Vec<Decorator>>,
    pub into: Option<Target>,
    pub callback: Option<Box<ScopeBlock>>,
    pub comments: Option<Vec<CommentWithPosition>>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignmentRhs {
    Literal {
        value: LiteralArg,
        value_type: LiteralValueType,
    },
    Command(Command),
    IsLastValue,
}

/// A literal embedded directly in an [`AssignmentRhs::Literal`]. Kept
/// separate from [`Arg`] because assignment literals never need the
/// call-argument forms (named args, subexpr-as-arg wrapping, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralArg {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Raw source text for object/array/subexpr literals, rendered
    /// verbatim by the writer and parsed lazily by the executor.
    Raw(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target_name: String,
    pub target_path: Option<Vec<PathSeg>>,
    pub rhs: AssignmentRhs,
    pub comments: Option<Vec<CommentWithPosition>>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShorthandAssignment {
    pub target_name: String,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseifBranch {
    pub condition: String,
    pub body: Vec<Statement>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBlock {
    pub condition_expr: String,
    pub then_branch: Vec<Statement>,
    pub elseif_branches: Vec<ElseifBranch>,
    pub else_branch: Option<Vec<Statement>>,
    pub comments: Option<Vec<CommentWithPosition>>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineIf {
    pub condition_expr: String,
    pub command: Box<Statement>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfTrueFalse {
    pub command: Box<Statement>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForLoop {
    pub var_name: String,
    pub iterable_expr: String,
    pub body: Vec<Statement>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefineFunction {
    pub name: String,
    pub param_names: Vec<String>,
    pub body: Vec<Statement>,
    pub decorators: Option<Vec<Decorator>>,
    pub comments: Option<Vec<CommentWithPosition>>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeBlock {
    pub param_names: Option<Vec<String>>,
    pub body: Vec<Statement>,
    pub into: Option<Target>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TogetherBlock {
    pub blocks: Vec<ScopeBlock>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    pub value: Option<Arg>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakStatement {
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueStatement {
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentStatement {
    pub comments: Vec<CommentWithPosition>,
    pub line_number: u32,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnBlock {
    pub event_name: String,
    pub body: Vec<Statement>,
    pub code_pos: CodePos,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Command(Command),
    Assignment(Assignment),
    ShorthandAssignment(ShorthandAssignment),
    IfBlock(IfBlock),
    InlineIf(InlineIf),
    IfTrue(IfTrueFalse),
    IfFalse(IfTrueFalse),
    ForLoop(ForLoop),
    DefineFunction(DefineFunction),
    ScopeBlock(ScopeBlock),
    TogetherBlock(TogetherBlock),
    ReturnStatement(ReturnStatement),
    BreakStatement(BreakStatement),
    ContinueStatement(ContinueStatement),
    CommentStatement(CommentStatement),
    OnBlock(OnBlock),
}

impl Statement {
    pub fn code_pos(&self) -> CodePos {
        match self {
            Statement::Command(c) => c.code_pos,
            Statement::Assignment(a) => a.code_pos,
            Statement::ShorthandAssignment(a) => a.code_pos,
            Statement::IfBlock(b) => b.code_pos,
            Statement::InlineIf(b) => b.code_pos,
            Statement::IfTrue(b) => b.code_pos,
            Statement::IfFalse(b) => b.code_pos,
            Statement::ForLoop(b) => b.code_pos,
            Statement::DefineFunction(b) => b.code_pos,
            Statement::ScopeBlock(b) => b.code_pos,
            Statement::TogetherBlock(b) => b.code_pos,
            Statement::ReturnStatement(b) => b.code_pos,
            Statement::BreakStatement(b) => b.code_pos,
            Statement::ContinueStatement(b) => b.code_pos,
            Statement::CommentStatement(b) => b.code_pos,
            Statement::OnBlock(b) => b.code_pos,
        }
    }

    pub fn comments(&self) -> Option<&[CommentWithPosition]> {
        match self {
            Statement::Command(c) => c.comments.as_deref(),
            Statement::Assignment(a) => a.comments.as_deref(),
            Statement::IfBlock(b) => b.comments.as_deref(),
            Statement::DefineFunction(b) => b.comments.as_deref(),
            _ => None,
        }
    }
}

/// A fully parsed program: the top-level flat statement list plus the
/// function/event registries lifted out during the lifting pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Ast {
    pub statements: Vec<Statement>,
    pub functions: Vec<DefineFunction>,
    pub on_blocks: Vec<OnBlock>,
}
