//! Scanner for PHP source text.
//!
//! Produces a flat, position-tracked token stream for the structural parser. The scanner never fails:
//! anything it does not recognise becomes an [`TokenKind::Opaque`] token.
//!
//! ## Module Structure
//!
//! - `tokens` - Token types (`TokenKind`, `Keyword`, `Token`)
//! - `strings` - Quoted string and heredoc/nowdoc scanning
//! - `stream` - Index-addressable [`TokenStream`] with checkpoint/restore

mod strings;
mod stream;
pub mod tokens;

pub use stream::TokenStream;
pub use tokens::{Keyword, Token, TokenKind, keyword};

use crate::ast::Span;

/// Multi-character operators, longest first. Anything not listed scans as a single character.
const OPERATORS: &[&str] = &[
    "<<=", ">>=", "**=", "??=", "===", "!==", "<=>", "?->", "...", "::", "->", "=>", "==", "!=", "<>",
    "<=", ">=", "&&", "||", "??", "++", "--", "+=", "-=", "*=", "/=", ".=", "%=", "&=", "|=", "^=",
    "**", "<<", ">>",
];

/// Scanner for PHP source code.
///
/// Skips whitespace, comments, open/close tags and inline HTML; emits structural tokens otherwise.
pub struct Scanner<'a> {
    source: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source. The result always ends with an `Eof` token.
    pub fn tokenize(mut self) -> Vec<Token> {
        // Files opening with markup start in inline-HTML mode; bare fragments (test subjects) start
        // in code mode.
        if self.source.trim_start().starts_with('<') && !self.source.trim_start().starts_with("<<<") {
            self.pos = self.source.find("<?").unwrap_or(self.source.len());
        }
        while self.pos < self.source.len() {
            self.scan_token();
        }
        let end = self.source.len();
        self.tokens.push(Token::new(TokenKind::Eof, "", Span::new(end, end)));
        self.tokens
    }

    // ========================================================================
    // Core character handling
    // ========================================================================

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn add_token(&mut self, kind: TokenKind, start: usize) {
        let text = &self.source[start..self.pos];
        self.tokens.push(Token::new(kind, text, Span::new(start, self.pos)));
    }

    // ========================================================================
    // Main scanning dispatch
    // ========================================================================

    fn scan_token(&mut self) {
        let start = self.pos;
        let Some(c) = self.peek() else {
            return;
        };

        match c {
            _ if c.is_ascii_whitespace() => {
                self.advance();
            }

            // Tags
            '<' if self.starts_with_ci("<?php") => self.pos += 5,
            '<' if self.rest().starts_with("<?=") => self.pos += 3,
            '<' if self.rest().starts_with("<?") => self.pos += 2,
            '?' if self.rest().starts_with("?>") => self.skip_inline_html(),

            // Comments
            '#' if self.peek_next() == Some('[') => {
                // Attribute opener; its contents scan as ordinary tokens.
                self.pos += 2;
                self.add_token(TokenKind::Opaque, start);
            }
            '#' => self.skip_line_comment(),
            '/' if self.peek_next() == Some('/') => self.skip_line_comment(),
            '/' if self.peek_next() == Some('*') => self.skip_block_comment(),

            // Strings
            '\'' | '"' | '`' => {
                self.advance();
                self.scan_quoted(start, c);
            }
            '<' if self.rest().starts_with("<<<") => self.scan_heredoc(start),

            // Variables
            '$' if self.peek_next().is_some_and(is_ident_start) => {
                self.advance();
                self.skip_ident_chars();
                self.add_token(TokenKind::Variable, start);
            }

            // Numbers
            '0'..='9' => self.scan_number(start),

            // Names and keywords
            '\\' if self.peek_next().is_some_and(is_ident_start) => self.scan_name(start),
            '\\' => {
                self.advance();
                self.add_token(TokenKind::Backslash, start);
            }
            _ if is_ident_start(c) => self.scan_name(start),

            // Punctuation
            '{' => self.single(TokenKind::LBrace, start),
            '}' => self.single(TokenKind::RBrace, start),
            '(' => self.single(TokenKind::LParen, start),
            ')' => self.single(TokenKind::RParen, start),
            ';' => self.single(TokenKind::Semicolon, start),
            ',' => self.single(TokenKind::Comma, start),

            _ => self.scan_operator(start),
        }
    }

    fn single(&mut self, kind: TokenKind, start: usize) {
        self.advance();
        self.add_token(kind, start);
    }

    fn starts_with_ci(&self, prefix: &str) -> bool {
        self.rest()
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }

    // ========================================================================
    // Skipped regions
    // ========================================================================

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || self.rest().starts_with("?>") {
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        match self.rest()[2..].find("*/") {
            Some(end) => self.pos += end + 4,
            None => self.pos = self.source.len(),
        }
    }

    /// `?>` switches back to inline HTML until the next open tag.
    fn skip_inline_html(&mut self) {
        self.pos += 2;
        match self.rest().find("<?") {
            Some(offset) => self.pos += offset,
            None => self.pos = self.source.len(),
        }
    }

    // ========================================================================
    // Words, numbers and operators
    // ========================================================================

    fn skip_ident_chars(&mut self) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
    }

    fn scan_name(&mut self, start: usize) {
        if self.peek() == Some('\\') {
            self.advance();
        }
        self.skip_ident_chars();
        while self.peek() == Some('\\') && self.peek_next().is_some_and(is_ident_start) {
            self.advance();
            self.skip_ident_chars();
        }

        let spelling = &self.source[start..self.pos];
        match keyword(spelling) {
            Some(id) => self.add_token(TokenKind::Keyword(id), start),
            None => self.add_token(TokenKind::Name, start),
        }
    }

    fn scan_number(&mut self, start: usize) {
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && self.source[start..self.pos].ends_with(['e', 'E'])
                && !self.source[start..self.pos].starts_with("0x");
            if c.is_ascii_alphanumeric() || c == '_' || exponent_sign {
                self.advance();
            } else if c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
        self.add_token(TokenKind::Number, start);
    }

    fn scan_operator(&mut self, start: usize) {
        let rest = self.rest();
        let spelling = OPERATORS
            .iter()
            .find(|op| rest.starts_with(**op))
            .copied()
            .unwrap_or_else(|| rest.chars().next().map_or("", |c| &rest[..c.len_utf8()]));
        self.pos += spelling.len().max(1);

        let kind = match spelling {
            "=" => TokenKind::Equals,
            "&" => TokenKind::Ampersand,
            "..." => TokenKind::Ellipsis,
            ":" => TokenKind::Colon,
            "::" => TokenKind::DoubleColon,
            "->" | "?->" => TokenKind::Arrow,
            "?" => TokenKind::Question,
            "|" => TokenKind::Pipe,
            _ => TokenKind::Opaque,
        };
        self.add_token(kind, start);
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// PHP identifiers: ASCII letters, `_`, and any byte from 0x80 upwards.
fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Convenience function to scan a source string into a token vector.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn lex(source: &str) -> Vec<Token> {
    Scanner::new(source).tokenize()
}

/// Scan a source string into a [`TokenStream`] positioned at its first token.
pub fn tokenize(source: &str) -> TokenStream {
    TokenStream::new(lex(source))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).into_iter().map(|t| t.kind).collect()
    }

    fn texts(source: &str) -> Vec<String> {
        lex(source)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let tokens = kinds("<?php CLASS Interface trait FUNCTION");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::Class),
                TokenKind::Keyword(Keyword::Interface),
                TokenKind::Keyword(Keyword::Trait),
                TokenKind::Keyword(Keyword::Function),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_qualified_names() {
        let tokens = lex("<?php \\App\\Clock App\\Io\\File Simple");
        assert_eq!(tokens[0].kind, TokenKind::Name);
        assert_eq!(tokens[0].text, "\\App\\Clock");
        assert_eq!(tokens[1].text, "App\\Io\\File");
        assert_eq!(tokens[2].text, "Simple");
    }

    #[test]
    fn test_non_ascii_bytes_are_identifier_characters() {
        // PHP treats every byte >= 0x80 as part of a name, including no-break spaces.
        assert_eq!(texts("<?php foo\u{a0}bar; $caf\u{e9}\u{3000}x"), ["foo\u{a0}bar", ";", "$caf\u{e9}\u{3000}x"]);
        assert_eq!(texts("<?php \u{a0}Clock"), ["\u{a0}Clock"]);
    }

    #[test]
    fn test_comments_and_tags_are_skipped() {
        let source = "<html><?php // line\n# hash\n/* block { */ $a; ?> <p>{</p> <?php $b;";
        assert_eq!(texts(source), vec!["$a", ";", "$b", ";"]);
    }

    #[test]
    fn test_strings_keep_braces_opaque() {
        let source = "<?php 'a { b' \"c } \\\" d\" `ls {`";
        let tokens = lex(source);
        assert_eq!(tokens.len(), 4);
        assert!(tokens[..3].iter().all(|t| t.kind == TokenKind::String));
        assert_eq!(tokens[1].text, "\"c } \\\" d\"");
    }

    #[test]
    fn test_heredoc_and_nowdoc() {
        let source = "<?php $a = <<<EOT\n{ not a brace\nEOT;\n$b = <<<'RAW'\n}\n  RAW;\n";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Variable,
                TokenKind::Equals,
                TokenKind::String,
                TokenKind::Semicolon,
                TokenKind::Variable,
                TokenKind::Equals,
                TokenKind::String,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_structural_punctuation() {
        let source = "<?php & ... = : :: -> ?-> ? | => == &&";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::Ampersand,
                TokenKind::Ellipsis,
                TokenKind::Equals,
                TokenKind::Colon,
                TokenKind::DoubleColon,
                TokenKind::Arrow,
                TokenKind::Arrow,
                TokenKind::Question,
                TokenKind::Pipe,
                TokenKind::Opaque,
                TokenKind::Opaque,
                TokenKind::Opaque,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(texts("<?php 42 3.14 0x1F 1_000 1e-3"), vec!["42", "3.14", "0x1F", "1_000", "1e-3"]);
    }

    #[test]
    fn test_unterminated_input_never_fails() {
        for source in ["<?php 'open", "<?php /* open", "<?php <<<EOT\nno end", "<?php $", "\\"] {
            let tokens = lex(source);
            assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof), "{source:?}");
        }
    }

    #[test]
    fn test_spans_index_source() {
        let source = "<?php class Foo {}";
        for token in lex(source) {
            assert_eq!(&source[token.span.start..token.span.end], token.text);
        }
    }
}
