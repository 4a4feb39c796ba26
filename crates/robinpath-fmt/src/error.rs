//! Errors the writer can raise. Most writer work is infallible — it only
//! rearranges bytes it was handed — but a caller can still feed it an AST
//! whose positions don't fit the text it claims to describe.

use robinpath_core::json_lite::JsonLiteError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FmtError {
    #[error("node position {0} is out of range for the given source text")]
    PositionOutOfRange(String),
    #[error("malformed inline literal: {0}")]
    InvalidLiteral(#[from] JsonLiteError),
}
