#![forbid(unsafe_code)]
//! Lens: example-based tests for PHP
//!
//! A Lens test is a short piece of PHP plus the output it should print. Lens finds the classes and
//! functions that code touches, replaces the scripted ones with generated mocks, runs every case in
//! a fresh PHP process and reports verdicts together with line coverage.
//!
//! The syntax side (scanner, structural parser, test-file parser) lives in `lens_syntax`; this crate
//! holds code generation (`backend`), execution (`evaluator`) and the command line (`cli`).
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli`, `backend` and
//!   `evaluator` modules enforce `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Generated code**: The harness and mock generators emit PHP as strings; PHP errors in that output surface
//!   as `EvaluationError::Internal` at run time, never as panics here.

pub mod backend;
pub mod cli;
pub mod evaluator;

pub use lens_syntax::{ast, diagnostics, lexer, parser, spec};

pub use backend::{MockMode, MockSource, TypeSurface};
pub use evaluator::{Evaluation, Evaluator, EvaluatorConfig, ProjectPaths};
