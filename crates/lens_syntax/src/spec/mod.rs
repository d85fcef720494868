//! Parser for Lens test files.
//!
//! A test file is a PHP file made of a context preamble followed by labelled blocks:
//!
//! ```text
//! <?php
//! namespace Example;
//! use Example\Filesystem;
//!
//! // Test: reads a file
//! $fs = new Filesystem();
//! echo $fs->read('a.txt');
//!
//! // Mock Filesystem
//! read("a.txt") => "hello"
//!
//! // Output
//! hello
//! ```
//!
//! ## Notes
//! - Labels are whole lines. Each `// Mock` block scripts the next instance of that type.
//! - Errors do not stop the parse: after one, the parser resumes at the next `// Test` label so a
//!   whole file's problems are reported together.
//! - Type names in labels, `throws` and `expect exception` that contain a `\` are taken as fully
//!   qualified; bare names are resolved against the file's context.

mod error;
mod model;

pub use error::{Rule, SpecSyntaxError};
pub use model::{CallRecord, Case, Expectation, ExpectedException, Fixture, Outcome, Suite, ThrownException};

use crate::ast::Context;
use crate::parser;
use serde_json::Value;

/// Parse a test file.
///
/// ## Errors
/// Returns every [`SpecSyntaxError`] found in the file.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn parse(source: &str) -> Result<Suite, Vec<SpecSyntaxError>> {
    SpecParser::new(source).parse()
}

// ============================================================================
// Lines and labels
// ============================================================================

struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl Line<'_> {
    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label<'a> {
    Test(Option<&'a str>),
    Mock(&'a str),
    Output,
}

/// `// Test`, `// Test: name`, `// Mock Type`, `// Output`.
fn label(text: &str) -> Option<Label<'_>> {
    let body = text.trim().strip_prefix("//")?.trim_start();
    let word_len = body
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(body.len());
    let (word, rest) = body.split_at(word_len);
    match word {
        "Test" => {
            if rest.trim().is_empty() {
                Some(Label::Test(None))
            } else {
                let name = rest.trim_start().strip_prefix(':')?.trim();
                Some(Label::Test(Some(name).filter(|n| !n.is_empty())))
            }
        }
        "Mock" if rest.is_empty() || rest.starts_with(char::is_whitespace) => Some(Label::Mock(rest.trim())),
        "Output" if rest.trim().is_empty() => Some(Label::Output),
        _ => None,
    }
}

/// `App\Io\File`, `\DateTime`, `Clock`.
fn is_qualified_name(name: &str) -> bool {
    let name = name.strip_prefix('\\').unwrap_or(name);
    !name.is_empty()
        && name.split('\\').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || !c.is_ascii())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || !c.is_ascii())
        })
}

/// Resolve a type name written in a label or expectation.
fn resolve_written_type(context: &Context, name: &str) -> String {
    if name.contains('\\') {
        name.trim_start_matches('\\').to_string()
    } else {
        context.resolve_class(name)
    }
}

/// `Type` or `Type "message"`; the message is a JSON string.
fn exception_descriptor(text: &str) -> Option<(&str, Option<String>)> {
    let text = text.trim();
    let type_len = text.find(char::is_whitespace).unwrap_or(text.len());
    let (type_name, rest) = text.split_at(type_len);
    if !is_qualified_name(type_name) {
        return None;
    }
    let rest = rest.trim();
    if rest.is_empty() {
        return Some((type_name, None));
    }
    let message = serde_json::from_str::<String>(rest).ok()?;
    Some((type_name, Some(message)))
}

/// Join lines, dropping leading and trailing blank lines.
fn join_trimmed(lines: &[Line<'_>], trim_leading: bool) -> String {
    let first = if trim_leading {
        lines.iter().position(|l| !l.is_blank()).unwrap_or(lines.len())
    } else {
        0
    };
    let last = lines.iter().rposition(|l| !l.is_blank()).map_or(first, |i| i + 1);
    if first >= last {
        return String::new();
    }
    lines[first..last]
        .iter()
        .map(|l| l.text)
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Parser
// ============================================================================

type BlockResult = Result<(Case, usize), (SpecSyntaxError, usize)>;

struct SpecParser<'a> {
    source: &'a str,
    lines: Vec<Line<'a>>,
    context: Context,
}

impl<'a> SpecParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut offset = 0;
        for raw in source.split_inclusive('\n') {
            lines.push(Line {
                start: offset,
                text: raw.trim_end_matches(['\n', '\r']),
            });
            offset += raw.len();
        }
        Self {
            source,
            lines,
            context: Context::default(),
        }
    }

    fn error(&self, rule: Rule, offset: usize) -> SpecSyntaxError {
        SpecSyntaxError::new(rule, self.source, offset)
    }

    /// Byte offset of line `index`, or end of file.
    fn offset_of(&self, index: usize) -> usize {
        self.lines.get(index).map_or(self.source.len(), |l| l.start)
    }

    fn label_at(&self, index: usize) -> Option<Label<'a>> {
        self.lines.get(index).and_then(|l| label(l.text))
    }

    /// First labelled line at or after `from`.
    fn next_label(&self, from: usize) -> usize {
        (from..self.lines.len())
            .find(|&i| self.label_at(i).is_some())
            .unwrap_or(self.lines.len())
    }

    /// First `// Test` line at or after `from`.
    fn next_test(&self, from: usize) -> usize {
        (from..self.lines.len())
            .find(|&i| matches!(self.label_at(i), Some(Label::Test(_))))
            .unwrap_or(self.lines.len())
    }

    fn parse(mut self) -> Result<Suite, Vec<SpecSyntaxError>> {
        let mut errors = Vec::new();

        let tag = self.lines.iter().position(|l| !l.is_blank());
        let Some(tag) = tag.filter(|&i| self.lines[i].text.trim().eq_ignore_ascii_case("<?php")) else {
            let offset = tag.map_or(self.source.len(), |i| self.lines[i].start);
            return Err(vec![self.error(Rule::PhpTagLine, offset)]);
        };

        let first_label = self.next_label(tag + 1);
        let preamble_start = self.offset_of(tag + 1);
        let source = self.source;
        let preamble = &source[preamble_start..self.offset_of(first_label)];
        match parser::parse_context(preamble) {
            Ok(context) => self.context = context,
            Err(offset) => errors.push(self.error(Rule::ContextUnit, preamble_start + offset)),
        }

        if first_label >= self.lines.len() {
            errors.push(self.error(Rule::SubjectLabel, self.source.len()));
            return Err(errors);
        }

        let mut cases = Vec::new();
        let mut index = first_label;
        while index < self.lines.len() {
            match self.block(index) {
                Ok((case, next)) => {
                    cases.push(case);
                    index = next;
                }
                Err((error, next)) => {
                    errors.push(error);
                    index = next;
                }
            }
        }

        if errors.is_empty() {
            Ok(Suite {
                context: self.context,
                cases,
            })
        } else {
            Err(errors)
        }
    }

    /// Parse the block whose label is on line `at`; returns the index of the line after it.
    fn block(&self, at: usize) -> BlockResult {
        let Some(Label::Test(name)) = self.label_at(at) else {
            return Err((self.error(Rule::SubjectLabel, self.offset_of(at)), self.next_test(at + 1)));
        };

        // Subject
        let subject_end = self.next_label(at + 1);
        let subject = join_trimmed(&self.lines[at + 1..subject_end], true);
        if subject.is_empty() {
            return Err((self.error(Rule::CodeUnit, self.offset_of(at + 1)), self.next_test(at + 1)));
        }

        // Fixtures
        let mut fixtures = Vec::new();
        let mut index = subject_end;
        while let Some(Label::Mock(target)) = self.label_at(index) {
            let region_end = self.next_label(index + 1);
            match self.fixture(index, target, region_end) {
                Ok(fixture) => fixtures.push(fixture),
                Err(error) => return Err((error, self.next_test(index + 1))),
            }
            index = region_end;
        }

        // Expectation
        match self.label_at(index) {
            Some(Label::Output) => {}
            _ => return Err((self.error(Rule::OutputLabel, self.offset_of(index)), self.next_test(index))),
        }
        let output_end = self.next_label(index + 1);
        if output_end < self.lines.len() && !matches!(self.label_at(output_end), Some(Label::Test(_))) {
            return Err((
                self.error(Rule::SubjectLabel, self.offset_of(output_end)),
                self.next_test(output_end + 1),
            ));
        }
        let expected = self
            .expectation(index + 1, output_end)
            .map_err(|error| (error, output_end))?;

        Ok((
            Case {
                name: name.map(str::to_string),
                offset: self.offset_of(at),
                line: at + 1,
                subject,
                context: self.context.clone(),
                fixtures,
                expected,
            },
            output_end,
        ))
    }

    /// `// Mock Type` on line `at`, calls up to `end`.
    fn fixture(&self, at: usize, target: &str, end: usize) -> Result<Fixture, SpecSyntaxError> {
        if !is_qualified_name(target) {
            let line = &self.lines[at];
            let column = line.text.find("Mock").map_or(0, |i| i + "Mock".len());
            return Err(self.error(Rule::MockLabel, line.start + column));
        }
        let mut calls = Vec::new();
        for line in &self.lines[at + 1..end] {
            let trimmed = line.text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let call = self
                .call(line.text)
                .map_err(|column| self.error(Rule::MockCall, line.start + column))?;
            calls.push(call);
        }
        Ok(Fixture {
            target: resolve_written_type(&self.context, target),
            calls,
        })
    }

    /// `method(args) [=> value | throws Type "message"]`; errors are byte columns into `text`.
    fn call(&self, text: &str) -> Result<CallRecord, usize> {
        let text = text.trim_end();
        let column = |rest: &str| text.len() - rest.len();

        let body = text.trim_start();
        let name_len = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        if name_len == 0 || body.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(column(body));
        }
        let (method, rest) = body.split_at(name_len);
        let open = rest.trim_start();
        if !open.starts_with('(') {
            return Err(column(body));
        }
        let close = matching_paren(open).ok_or_else(|| column(open))?;
        let args = serde_json::from_str::<Vec<Value>>(&format!("[{}]", &open[1..close]))
            .map_err(|_| column(open))?;

        let after = open[close + 1..].trim_start();
        let outcome = if after.is_empty() {
            Outcome::Return(Value::Null)
        } else if let Some(value) = after.strip_prefix("=>") {
            Outcome::Return(serde_json::from_str(value.trim()).map_err(|_| column(after))?)
        } else if let Some(thrown) = after
            .strip_prefix("throws")
            .filter(|rest| rest.starts_with(char::is_whitespace))
        {
            let (type_name, message) = exception_descriptor(thrown).ok_or_else(|| column(after))?;
            Outcome::Throw(ThrownException {
                type_name: resolve_written_type(&self.context, type_name),
                message: message.unwrap_or_default(),
            })
        } else {
            return Err(column(after));
        };

        Ok(CallRecord::new(method, args, outcome))
    }

    /// Literal output, or a single `expect exception` line.
    fn expectation(&self, from: usize, end: usize) -> Result<Expectation, SpecSyntaxError> {
        let lines = &self.lines[from..end];
        let content: Vec<&Line<'_>> = lines.iter().filter(|l| !l.is_blank()).collect();
        if let [only] = content.as_slice() {
            let trimmed = only.text.trim_start();
            if let Some(descriptor) = trimmed.strip_prefix("expect exception") {
                let (written, message) = exception_descriptor(descriptor).ok_or_else(|| {
                    let column = only.text.len() - trimmed.len();
                    self.error(Rule::ExceptionExpectation, only.start + column)
                })?;
                return Ok(Expectation::Exception(ExpectedException {
                    type_name: resolve_written_type(&self.context, written),
                    written: written.trim_start_matches('\\').to_string(),
                    message,
                }));
            }
        }
        Ok(Expectation::Output(join_trimmed(lines, false)))
    }
}

/// Index of the `)` closing the `(` at the start of `text`, skipping JSON strings.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (c == ')').then_some(index);
                }
            }
            _ => {}
        }
    }
    None
}

// ============================================================================
// TESTS
// ============================================================================
