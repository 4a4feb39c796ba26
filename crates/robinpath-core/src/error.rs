//! Error taxonomy and the internal non-error control-flow channel.

use crate::pos::Point;
use crate::value::Value;
use thiserror::Error;

/// Kind of error raised while scanning source text.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("unexpected character '{0}'")]
    UnknownChar(char),
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{kind} at line {line}, column {col}")]
pub struct LexError {
    pub line: u32,
    pub col: u32,
    pub kind: LexErrorKind,
}

/// Kind of error raised while building the AST.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ParseErrorKind {
    #[error("expected keyword '{0}'")]
    ExpectedKeyword(String),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unterminated block, expected '{0}'")]
    UnterminatedBlock(String),
    #[error("decorator run has no following def/var/const")]
    OrphanedDecorator,
    #[error("invalid parameter name '{0}'")]
    InvalidParam(String),
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("unterminated bracket '{0}'")]
    UnterminatedBracket(char),
    #[error("malformed nested definition: {0}")]
    NestedDefinitionError(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{kind} at line {line}, column {col}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub kind: ParseErrorKind,
    /// The offending source line's text, echoed alongside the message
    /// so a caller never has to re-slice the source to report it.
    pub line_text: String,
}

/// Runtime error kind, flattened into one enum across all phases.
#[derive(Debug, Clone, Error)]
pub enum RuntimeErrorKind {
    #[error("immutable variable '{0}' cannot be reassigned")]
    Immutable(String),
    #[error("'{0}' is not found")]
    NotFound(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("negative index {0} is not allowed")]
    NegativeIndex(i64),
    #[error("break used outside of a loop")]
    BreakOutsideLoop,
    #[error("continue used outside of a loop")]
    ContinueOutsideLoop,
    #[error("builtin '{0}' failed: {1}")]
    Builtin(String, String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Error)]
#[error("{kind} at line {line}, column {col}")]
pub struct RuntimeError {
    pub line: u32,
    pub col: u32,
    pub kind: RuntimeErrorKind,
    pub line_text: String,
}

impl RuntimeError {
    pub fn new(point: Point, kind: RuntimeErrorKind, line_text: impl Into<String>) -> Self {
        Self {
            line: point.row + 1,
            col: point.col,
            kind,
            line_text: line_text.into(),
        }
    }
}

/// Top-level error type returned by the public API (`parse`, `execute`,
/// `update_code_from_ast`). Layers `LexError` into `ParseError`, extended
/// with a runtime arm.
#[derive(Debug, Clone, Error)]
pub enum RobinError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Internal, non-error unwinding signals for control flow — never
/// user-visible errors. Kept strictly separate from
/// [`RobinError`] so callers can never accidentally catch a `return` as a
/// failure.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    Return(Value),
    Break,
    Continue,
    End(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for ControlFlow {
    fn from(e: RuntimeError) -> Self {
        ControlFlow::Error(e)
    }
}

/// The executor's result channel: either a produced value, or one of the
/// control-flow signals above (which may or may not be a genuine error).
pub type Flow<T> = Result<T, ControlFlow>;

impl ControlFlow {
    /// Turn a stray `break`/`continue`/`return` that escaped its proper
    /// context into a genuine [`RuntimeError`].
    pub fn into_runtime_error(self, point: Point, line_text: &str) -> RuntimeError {
        match self {
            ControlFlow::Error(e) => e,
            ControlFlow::Break => {
                RuntimeError::new(point, RuntimeErrorKind::BreakOutsideLoop, line_text)
            }
            ControlFlow::Continue => {
                RuntimeError::new(point, RuntimeErrorKind::ContinueOutsideLoop, line_text)
            }
            ControlFlow::Return(_) | ControlFlow::End(_) => {
                // `return`/`end` escaping to top level is non-fatal,
                // treated as program termination, not an error.
                RuntimeError::new(point, RuntimeErrorKind::Other("terminated".into()), line_text)
            }
        }
    }
}
