//! Syntax frontend for Lens: PHP scanner, structural parser, and the test-file parser.
//!
//! This crate is pure and thread-safe; nothing in it touches the filesystem or spawns processes.
//!
//! ## Notes
//! - The structural parser is deliberately shallow: declarations are recovered, bodies stay opaque
//!   apart from the external symbols they reference.
//! - Test files are parsed into [`spec::Suite`]s; errors are collected rather than returned on first
//!   failure.
//!
//! ## Examples
//! ```rust
//! use lens_syntax::parser;
//!
//! let units = parser::parse_unit("<?php\nnamespace App;\nclass Clock { public function now() {} }\n");
//! assert_eq!(units.len(), 1);
//! assert_eq!(units[0].children[0].name, "App\\Clock");
//! ```

pub mod ast;
pub mod diagnostics;
pub mod lexer;
pub mod parser;
pub mod spec;
