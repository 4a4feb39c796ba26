//! Forward cursor over a token vector with lookahead.

use crate::error::{ParseError, ParseErrorKind};
use crate::token::{Token, TokenKind};

pub struct TokenStream<'t> {
    tokens: &'t [Token],
    pos: usize,
    source: &'t str,
}

impl<'t> TokenStream<'t> {
    pub fn new(tokens: &'t [Token], source: &'t str) -> Self {
        Self { tokens, pos: 0, source }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len().saturating_sub(1));
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// Advance past any run of `Newline` tokens.
    pub fn skip_newlines(&mut self) {
        while self.peek().kind == TokenKind::Newline {
            self.advance();
        }
    }

    /// Advance past `Comment` and `Newline` tokens (used when scanning for
    /// a structural keyword ahead, e.g. looking for `into` on the next
    /// non-blank line).
    pub fn skip_trivia(&mut self) {
        while matches!(self.peek().kind, TokenKind::Newline | TokenKind::Comment) {
            self.advance();
        }
    }

    pub fn check_keyword(&self, kw: &str) -> bool {
        self.peek().is_keyword_text(kw)
    }

    pub fn expect_keyword(&mut self, kw: &str) -> Result<Token, ParseError> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            Err(self.error(ParseErrorKind::ExpectedKeyword(kw.to_string())))
        }
    }

    pub fn expect_kind(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(ParseErrorKind::UnexpectedToken(self.peek().text.clone())))
        }
    }

    pub fn error(&self, kind: ParseErrorKind) -> ParseError {
        let tok = self.peek();
        ParseError {
            line: tok.line,
            col: tok.column,
            kind,
            line_text: self.line_text(tok.line),
        }
    }

    pub fn line_text(&self, line: u32) -> String {
        self.source
            .lines()
            .nth((line.saturating_sub(1)) as usize)
            .unwrap_or_default()
            .to_string()
    }
}
