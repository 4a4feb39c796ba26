//! Groups a flat token vector into logical lines: physical lines merged
//! across unmatched `(`, `{`, `[` nesting. The lexer emits `Newline` even
//! inside brackets; this pass uses bracket depth to decide statement
//! boundaries instead.

use crate::token::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct LogicalLine {
    /// Tokens of this line, `Newline` excluded, with at most one trailing
    /// `Comment` token (an inline comment) and/or leading `Comment` tokens
    /// (a comment-only line).
    pub tokens: Vec<Token>,
    /// 0-based source row of the line's first byte (even when `tokens` is
    /// empty, i.e. a blank line), used for orphan blank-line absorption.
    pub row: u32,
}

impl LogicalLine {
    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_comment_only(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| t.kind == TokenKind::Comment)
    }

    /// The inline trailing comment, if the last token is a comment that
    /// follows at least one non-comment token.
    pub fn inline_comment(&self) -> Option<&Token> {
        if self.tokens.len() > 1 {
            self.tokens.last().filter(|t| t.kind == TokenKind::Comment)
        } else {
            None
        }
    }

    /// Content tokens with the trailing inline comment (if any) removed.
    pub fn content_tokens(&self) -> &[Token] {
        if self.inline_comment().is_some() {
            &self.tokens[..self.tokens.len() - 1]
        } else {
            &self.tokens[..]
        }
    }

    pub fn first(&self) -> Option<&Token> {
        self.tokens.first()
    }

    pub fn line_no(&self) -> u32 {
        self.tokens.first().map(|t| t.line).unwrap_or(0)
    }
}

/// Split `tokens` (must end in `Eof`) into logical lines.
pub fn split_lines(tokens: &[Token]) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth: i32 = 0;
    let mut row: u32 = 0;
    let mut current_row: u32 = 0;

    for tok in tokens {
        match tok.kind {
            TokenKind::Eof => {
                if !current.is_empty() {
                    lines.push(LogicalLine { tokens: std::mem::take(&mut current), row: current_row });
                }
                break;
            }
            TokenKind::LParen | TokenKind::LBrace | TokenKind::LBracket => {
                depth += 1;
                current.push(tok.clone());
            }
            TokenKind::RParen | TokenKind::RBrace | TokenKind::RBracket => {
                depth -= 1;
                current.push(tok.clone());
            }
            TokenKind::Newline => {
                if depth > 0 {
                    // Inside brackets: a physical newline does not end the
                    // logical line; drop it (the writer recovers exact
                    // original bytes from offsets, not by re-emitting
                    // newlines here).
                    row += 1;
                    continue;
                }
                lines.push(LogicalLine { tokens: std::mem::take(&mut current), row: current_row });
                row += 1;
                current_row = row;
            }
            _ => current.push(tok.clone()),
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    #[test]
    fn merges_multiline_parenthesized_call() {
        let toks = Lexer::tokenize("foo(\n  1\n  2\n)\n").unwrap();
        let lines = split_lines(&toks);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn separates_plain_lines() {
        let toks = Lexer::tokenize("$a = 1\n$b = 2\n").unwrap();
        let lines = split_lines(&toks);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn blank_line_is_empty() {
        let toks = Lexer::tokenize("$a = 1\n\n$b = 2\n").unwrap();
        let lines = split_lines(&toks);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].is_blank());
    }
}
