//! String literal scanning: single/double/backtick quoted strings, heredocs and nowdocs.
//!
//! Interpolation is not interpreted; a string is one opaque [`TokenKind::String`] token, so braces
//! inside it never affect brace balancing.

use super::Scanner;
use super::tokens::TokenKind;

impl<'a> Scanner<'a> {
    /// Scan a quoted string whose opening `quote` has already been consumed.
    ///
    /// Unterminated strings run to the end of input.
    pub(super) fn scan_quoted(&mut self, start: usize, quote: char) {
        while let Some(c) = self.advance() {
            if c == '\\' {
                self.advance();
            } else if c == quote {
                break;
            }
        }
        self.add_token(TokenKind::String, start);
    }

    /// Scan `<<<ID`, `<<<"ID"` or `<<<'ID'` through the closing identifier.
    ///
    /// The closing identifier may be indented and must not be followed by an identifier character.
    /// A malformed opener is emitted as an opaque `<<<` token.
    pub(super) fn scan_heredoc(&mut self, start: usize) {
        self.pos += 3;
        let opener = self.rest();
        let trimmed = opener.trim_start_matches([' ', '\t']);
        let quote = trimmed.chars().next().filter(|c| *c == '\'' || *c == '"');
        let after_quote = match quote {
            Some(_) => &trimmed[1..],
            None => trimmed,
        };
        let ident_len = after_quote
            .char_indices()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
            .map_or(after_quote.len(), |(i, _)| i);
        let ident = &after_quote[..ident_len];
        let after_ident = &after_quote[ident_len..];
        let after_ident = match quote {
            Some(q) => after_ident.strip_prefix(q),
            None => Some(after_ident),
        };

        let valid_opener = !ident.is_empty()
            && !ident.starts_with(|c: char| c.is_ascii_digit())
            && after_ident.is_some_and(|rest| rest.starts_with('\n') || rest.starts_with("\r\n"));
        let Some(after_ident) = after_ident.filter(|_| valid_opener) else {
            self.add_token(TokenKind::Opaque, start);
            return;
        };

        self.pos = self.source.len() - after_ident.len();
        self.skip_to_heredoc_end(ident);
        self.add_token(TokenKind::String, start);
    }

    fn skip_to_heredoc_end(&mut self, ident: &str) {
        loop {
            match self.rest().find('\n') {
                Some(newline) => self.pos += newline + 1,
                None => {
                    self.pos = self.source.len();
                    return;
                }
            }
            let line = self.rest();
            let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
            let candidate = &line[indent..];
            let closes = candidate.starts_with(ident)
                && !candidate[ident.len()..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii());
            if closes {
                self.pos += indent + ident.len();
                return;
            }
        }
    }
}
