//! Syntax errors in test files.

use crate::diagnostics;
use miette::{Diagnostic, SourceSpan};
use std::fmt;
use thiserror::Error;

/// The grammar rule that was expected where parsing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    PhpTagLine,
    ContextUnit,
    SubjectLabel,
    CodeUnit,
    MockLabel,
    MockCall,
    OutputLabel,
    ExceptionExpectation,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rule::PhpTagLine => "a PHP tag line (\"<?php\")",
            Rule::ContextUnit => "only namespace and use statements before the first test",
            Rule::SubjectLabel => "a test label (\"// Test\")",
            Rule::CodeUnit => "subject code after the test label",
            Rule::MockLabel => "a mocked type name (\"// Mock Type\")",
            Rule::MockCall => "a mock call (method(arguments) [=> value | throws Type \"message\"])",
            Rule::OutputLabel => "an output label (\"// Output\")",
            Rule::ExceptionExpectation => "an exception expectation (expect exception Type \"message\")",
        })
    }
}

/// A malformed test file.
///
/// ## Notes
/// - `offset` is a byte offset into the test file; `span` is the same position as a miette label,
///   so the CLI can render it with `Report::with_source_code`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("expected {rule}, but found {found}")]
#[diagnostic(code(lens::spec::syntax))]
pub struct SpecSyntaxError {
    pub rule: Rule,
    pub offset: usize,
    pub found: String,
    #[label("here")]
    pub span: SourceSpan,
}

impl SpecSyntaxError {
    pub fn new(rule: Rule, source: &str, offset: usize) -> Self {
        let excerpt = diagnostics::tail(source, offset);
        let found = if offset >= source.len() {
            "the end of the file".to_string()
        } else if excerpt.trim().is_empty() {
            "an empty line".to_string()
        } else {
            format!("{excerpt:?}")
        };
        Self {
            rule,
            offset,
            found,
            span: SourceSpan::from(offset.min(source.len())..(offset + excerpt.len()).min(source.len())),
        }
    }

    /// 1-based `(line, column)` of the error in `source`.
    pub fn position(&self, source: &str) -> (usize, usize) {
        diagnostics::line_column(source, self.offset)
    }
}
