//! Index-addressable token buffer with checkpoint/restore.

use super::tokens::{Keyword, Token, TokenKind};
use crate::ast::Span;

/// A scanned token buffer plus a cursor.
///
/// ## Notes
/// - The buffer always ends with an `Eof` token; the cursor never moves past it.
/// - Backtracking is `position()` + `seek()`; [`TokenStream::attempt`] wraps the pair.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().is_none_or(|t| t.kind != TokenKind::Eof) {
            let end = tokens.last().map_or(0, |t| t.span.end);
            tokens.push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
        }
        Self { tokens, pos: 0 }
    }

    /// Current cursor position (a token index).
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor to `position`, clamped to the trailing `Eof`.
    pub fn seek(&mut self, position: usize) {
        self.pos = position.min(self.tokens.len() - 1);
    }

    /// Move the cursor forward by `n` tokens, stopping at `Eof`.
    pub fn advance(&mut self, n: usize) {
        self.seek(self.pos.saturating_add(n));
    }

    /// Consume the current token and return it.
    pub fn next_token(&mut self) -> &Token {
        let current = self.pos;
        self.advance(1);
        &self.tokens[current]
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    /// Token `offset` places ahead of the cursor (or `Eof`).
    pub fn peek_at(&self, offset: usize) -> &Token {
        let index = self.pos.saturating_add(offset).min(self.tokens.len() - 1);
        &self.tokens[index]
    }

    /// The token just before the cursor, if any.
    pub fn previous(&self) -> Option<&Token> {
        self.pos.checked_sub(1).map(|index| &self.tokens[index])
    }

    pub fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub fn check_keyword(&self, id: Keyword) -> bool {
        self.peek().is_keyword(id)
    }

    /// If the current token is `kind`, consume it and return it.
    pub fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.next_token().clone())
        } else {
            None
        }
    }

    pub fn eat_keyword(&mut self, id: Keyword) -> Option<Token> {
        if self.check_keyword(id) {
            Some(self.next_token().clone())
        } else {
            None
        }
    }

    /// Run `rule` from the current position; on `None` the cursor is restored exactly.
    pub fn attempt<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let checkpoint = self.position();
        let result = rule(self);
        if result.is_none() {
            self.seek(checkpoint);
        }
        result
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Tokens in `[from, to)`, clamped to the buffer.
    pub fn slice(&self, from: usize, to: usize) -> &[Token] {
        let to = to.min(self.tokens.len());
        &self.tokens[from.min(to)..to]
    }
}
