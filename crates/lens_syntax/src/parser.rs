//! Backtracking structural parser for PHP source.
//!
//! Recovers namespaces, classes, interfaces, traits, methods and functions, plus the external
//! symbols their bodies reference. Every rule runs inside a checkpoint: on failure the token cursor
//! is restored exactly and no partial node escapes.
//!
//! ## Examples
//!
//! ```rust
//! use lens_syntax::ast::NodeKind;
//! use lens_syntax::parser;
//!
//! let source = "<?php\nnamespace App;\nfunction greet(Clock $c) { return strtoupper($c->now()); }\n";
//! let units = parser::parse_unit(source);
//! let greet = &units[0].children[0];
//! assert!(matches!(greet.kind, NodeKind::Function(_)));
//! assert!(greet.types.contains("App\\Clock"));
//! assert!(greet.functions.contains("strtoupper"));
//! ```

use crate::ast::*;
use crate::lexer::{self, Keyword, Token, TokenKind, TokenStream};
use std::collections::BTreeSet;

// NOTE: This module is split across multiple files using `include!` to keep all parser
// methods in the same Rust module while avoiding a single large source file.

include!("parser/core.rs");
include!("parser/helpers.rs");
include!("parser/decl.rs");
include!("parser/refs.rs");
include!("parser/api.rs");
include!("parser/tests.rs");
