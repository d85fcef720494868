//! Test-file data model: suites, cases, fixtures and scripted calls.

use crate::ast::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One parsed test file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suite {
    pub context: Context,
    pub cases: Vec<Case>,
}

/// One `// Test ... // Output` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Case {
    pub name: Option<String>,
    /// Byte offset of the `// Test` label.
    pub offset: usize,
    /// 1-based line of the `// Test` label.
    pub line: usize,
    pub subject: String,
    pub context: Context,
    pub fixtures: Vec<Fixture>,
    pub expected: Expectation,
}

impl Case {
    /// Human-readable case title: its name, or its line.
    pub fn title(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("line {}", self.line),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Expectation {
    /// Literal output, trailing blank lines removed.
    Output(String),
    Exception(ExpectedException),
}

/// `expect exception Type "message"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedException {
    /// Resolved in the case context.
    pub type_name: String,
    /// As written, without a leading `\`.
    pub written: String,
    /// `None` matches any message.
    pub message: Option<String>,
}

impl ExpectedException {
    /// Whether `type_name` (as reported by the interpreter) names the expected type.
    pub fn matches_type(&self, type_name: &str) -> bool {
        let type_name = type_name.trim_start_matches('\\');
        type_name.eq_ignore_ascii_case(&self.type_name) || type_name.eq_ignore_ascii_case(&self.written)
    }
}

/// The script of one mocked instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fixture {
    /// Fully qualified target type.
    pub target: String,
    pub calls: Vec<CallRecord>,
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "// Mock \\{}", self.target)?;
        for call in &self.calls {
            writeln!(f, "{call}")?;
        }
        Ok(())
    }
}

/// One scripted invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub method: String,
    pub args: Vec<Value>,
    pub outcome: Outcome,
}

impl CallRecord {
    pub fn new(method: impl Into<String>, args: Vec<Value>, outcome: Outcome) -> Self {
        Self {
            method: method.into(),
            args,
            outcome,
        }
    }
}

/// Renders in test-file call syntax, so recorded fixtures can be pasted back into a test.
impl fmt::Display for CallRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.method)?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;
        match &self.outcome {
            Outcome::Return(Value::Null) => Ok(()),
            Outcome::Return(value) => write!(f, " => {value}"),
            Outcome::Throw(thrown) => write!(f, " throws {thrown}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Outcome {
    Return(Value),
    Throw(ThrownException),
}

/// An exception a mock throws, or one the subject raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrownException {
    pub type_name: String,
    pub message: String,
}

impl fmt::Display for ThrownException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\{} {}", self.type_name, Value::String(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_record_renders_call_syntax() {
        let call = CallRecord::new("read", vec![json!("a.txt"), json!(3)], Outcome::Return(json!({"ok": true})));
        assert_eq!(call.to_string(), r#"read("a.txt", 3) => {"ok":true}"#);

        let silent = CallRecord::new("close", Vec::new(), Outcome::Return(Value::Null));
        assert_eq!(silent.to_string(), "close()");

        let thrown = CallRecord::new(
            "open",
            vec![json!("x")],
            Outcome::Throw(ThrownException {
                type_name: "App\\NotFound".to_string(),
                message: "no \"x\"".to_string(),
            }),
        );
        assert_eq!(thrown.to_string(), r#"open("x") throws \App\NotFound "no \"x\"""#);
    }

    #[test]
    fn test_expected_exception_matches_resolved_or_written() {
        let expected = ExpectedException {
            type_name: "App\\NotFound".to_string(),
            written: "NotFound".to_string(),
            message: None,
        };
        assert!(expected.matches_type("\\App\\NotFound"));
        assert!(expected.matches_type("NotFound"));
        assert!(!expected.matches_type("Other\\NotFound"));
    }
}
