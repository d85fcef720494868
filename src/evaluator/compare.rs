//! Expected vs. actual behaviour of a case.

use lens_syntax::spec::{Expectation, ExpectedException, ThrownException};
use serde::Serialize;
use thiserror::Error;

use super::report::FatalError;

/// What a case actually did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Actual {
    pub output: String,
    pub exception: Option<ThrownException>,
    pub fatal: Option<FatalError>,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Mismatch {
    #[error("output differs")]
    Output { expected: String, actual: String },

    #[error("expected exception \\{}, but none was thrown", .expected.written)]
    ExceptionMissing { expected: ExpectedException },

    #[error("expected exception \\{}, got {actual}", .expected.written)]
    ExceptionDiffers {
        expected: ExpectedException,
        actual: ThrownException,
    },

    #[error("uncaught exception {0}")]
    UnexpectedException(ThrownException),

    #[error("fatal error: {} in {} on line {}", .0.message, .0.file, .0.line)]
    Fatal(FatalError),
}

/// `\r\n` and `\r` become `\n`; trailing blank lines are dropped.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut lines: Vec<&str> = text.split('\n').collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Compare one case's outcome with its expectation.
///
/// A fatal error always mismatches. Exception expectations ignore the output.
pub fn compare(expected: &Expectation, actual: &Actual) -> Result<(), Mismatch> {
    if let Some(fatal) = &actual.fatal {
        return Err(Mismatch::Fatal(fatal.clone()));
    }
    match expected {
        Expectation::Output(text) => {
            if let Some(thrown) = &actual.exception {
                return Err(Mismatch::UnexpectedException(thrown.clone()));
            }
            let (expected, output) = (normalize(text), normalize(&actual.output));
            if expected == output {
                Ok(())
            } else {
                Err(Mismatch::Output {
                    expected,
                    actual: output,
                })
            }
        }
        Expectation::Exception(exception) => {
            let Some(thrown) = &actual.exception else {
                return Err(Mismatch::ExceptionMissing {
                    expected: exception.clone(),
                });
            };
            let message_matches = exception.message.as_ref().is_none_or(|message| *message == thrown.message);
            if exception.matches_type(&thrown.type_name) && message_matches {
                Ok(())
            } else {
                Err(Mismatch::ExceptionDiffers {
                    expected: exception.clone(),
                    actual: thrown.clone(),
                })
            }
        }
    }
}
