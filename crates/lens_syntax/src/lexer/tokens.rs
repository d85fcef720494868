//! Token types for the PHP scanner.
//!
//! Only the vocabulary the structural grammar needs gets its own kind; everything else is an
//! [`TokenKind::Opaque`] token whose text is kept so bodies can be re-read by reference extraction.

use crate::ast::Span;

// ============================================================================
// TOKEN TYPES
// ============================================================================

/// Structural keywords. Matching is case-insensitive, like PHP itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Namespace,
    Use,
    Class,
    Interface,
    Trait,
    Function,
    Extends,
    Implements,
    New,
    Instanceof,
    Abstract,
    Final,
    Static,
    Public,
    Protected,
    Private,
    Readonly,
    Var,
    Const,
    As,
    Insteadof,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("namespace", Keyword::Namespace),
    ("use", Keyword::Use),
    ("class", Keyword::Class),
    ("interface", Keyword::Interface),
    ("trait", Keyword::Trait),
    ("function", Keyword::Function),
    ("extends", Keyword::Extends),
    ("implements", Keyword::Implements),
    ("new", Keyword::New),
    ("instanceof", Keyword::Instanceof),
    ("abstract", Keyword::Abstract),
    ("final", Keyword::Final),
    ("static", Keyword::Static),
    ("public", Keyword::Public),
    ("protected", Keyword::Protected),
    ("private", Keyword::Private),
    ("readonly", Keyword::Readonly),
    ("var", Keyword::Var),
    ("const", Keyword::Const),
    ("as", Keyword::As),
    ("insteadof", Keyword::Insteadof),
];

impl Keyword {
    /// Canonical (lowercase) spelling.
    pub fn as_str(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, id)| *id == self)
            .map(|(spelling, _)| *spelling)
            .unwrap_or_default()
    }
}

/// Resolve an identifier spelling to a keyword, if reserved.
pub fn keyword(spelling: &str) -> Option<Keyword> {
    KEYWORDS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(spelling))
        .map(|(_, id)| *id)
}

/// Kind of token produced by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // ========== Words ==========
    Keyword(Keyword),
    /// Identifier or qualified name (`Foo`, `App\Foo`, `\App\Foo`).
    Name,
    /// `$name`
    Variable,

    // ========== Literals ==========
    String,
    Number,

    // ========== Punctuation ==========
    LBrace,
    RBrace,
    LParen,
    RParen,
    Semicolon,
    Comma,
    Ampersand,
    Ellipsis,
    Equals,
    Colon,
    DoubleColon,
    /// `->` and `?->`
    Arrow,
    Question,
    Pipe,
    /// A lone `\`, as in group use statements (`use App\{A, B};`).
    Backslash,

    // ========== Special ==========
    Opaque,
    Eof,
}

/// A token with its kind, source spelling and byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Return `true` if this is the given keyword.
    pub fn is_keyword(&self, id: Keyword) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == id)
    }

    /// Identifier-like tokens: names and keywords (PHP allows reserved words as method names).
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Name | TokenKind::Keyword(_))
    }
}
