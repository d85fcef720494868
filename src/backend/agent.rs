//! Call-log coordinator for mocked instances.
//!
//! Every mock instance is known by an [`Identity`]: its target type plus its creation ordinal among
//! instances of that type (`App\Io\Disk#0`, `App\Io\Disk#1`, ...). The agent keeps one ordered call
//! log per identity.
//!
//! - **Record**: [`Agent::record`] appends a pending entry and hands back a [`Placeholder`];
//!   [`Agent::resolve`] fills its outcome in later. [`Agent::fixtures`] turns the logs into test-file
//!   fixtures.
//! - **Replay**: [`Agent::with_fixtures`] loads scripted logs; [`Agent::replay`] consumes them strictly
//!   in order and reports a [`ProtocolViolation`] on the first call that does not fit.
//!
//! The PHP harness runs its own agent while the subject executes and reports the call trace back;
//! the evaluator replays that trace through this type, whose verdict is authoritative.

use std::collections::BTreeMap;
use std::fmt;

use lens_syntax::spec::{CallRecord, Fixture, Outcome};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// How closely a replayed call must match its scripted counterpart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Only the method name has to match.
    #[default]
    MethodOnly,
    /// Method name and every argument value.
    Arguments,
}

/// `Type#ordinal`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct Identity {
    pub type_name: String,
    pub ordinal: usize,
}

impl Identity {
    pub fn new(type_name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            type_name: type_name.into().trim_start_matches('\\').to_string(),
            ordinal,
        }
    }

    /// Parse `App\Io\Disk#2`.
    pub fn parse(text: &str) -> Option<Self> {
        let (type_name, ordinal) = text.rsplit_once('#')?;
        if type_name.is_empty() {
            return None;
        }
        Some(Self::new(type_name, ordinal.parse().ok()?))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.ordinal)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.to_string()
    }
}

/// One call as it appears in a violation message: `App\Io\Disk#0->read("a.txt")`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallDescriptor {
    pub identity: Identity,
    pub method: String,
    pub args: Vec<Value>,
}

impl CallDescriptor {
    pub fn new(identity: Identity, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            identity,
            method: method.into(),
            args,
        }
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}(", self.identity, self.method)?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")
    }
}

/// A replayed call sequence that does not fit the script.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProtocolViolation {
    #[error("unexpected call {actual}: no scripted calls remain")]
    Exhausted { actual: CallDescriptor },

    #[error("expected {expected}, but {actual} was called")]
    MethodMismatch {
        expected: CallDescriptor,
        actual: CallDescriptor,
    },

    #[error("expected {expected}, but {actual} was called with different arguments")]
    ArgumentMismatch {
        expected: CallDescriptor,
        actual: CallDescriptor,
    },

    #[error("expected {expected}, but it was never called")]
    Unconsumed { expected: CallDescriptor },
}

impl ProtocolViolation {
    pub fn expected(&self) -> Option<&CallDescriptor> {
        match self {
            ProtocolViolation::Exhausted { .. } => None,
            ProtocolViolation::MethodMismatch { expected, .. }
            | ProtocolViolation::ArgumentMismatch { expected, .. }
            | ProtocolViolation::Unconsumed { expected } => Some(expected),
        }
    }

    pub fn actual(&self) -> Option<&CallDescriptor> {
        match self {
            ProtocolViolation::Exhausted { actual }
            | ProtocolViolation::MethodMismatch { actual, .. }
            | ProtocolViolation::ArgumentMismatch { actual, .. } => Some(actual),
            ProtocolViolation::Unconsumed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("no recorded call for placeholder {0:?}")]
    UnknownPlaceholder(Placeholder),

    #[error("the call for placeholder {0:?} already has an outcome")]
    AlreadyResolved(Placeholder),
}

/// Handle to a recorded call whose outcome is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder {
    log: usize,
    entry: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    method: String,
    args: Vec<Value>,
    outcome: Option<Outcome>,
}

#[derive(Debug, Clone)]
struct CallLog {
    identity: Identity,
    entries: Vec<Entry>,
    /// Index of the next entry `replay` consumes.
    cursor: usize,
}

impl CallLog {
    fn descriptor(&self, entry: &Entry) -> CallDescriptor {
        CallDescriptor::new(self.identity.clone(), entry.method.clone(), entry.args.clone())
    }
}

/// Outcome of a call recorded without one.
static PENDING: Outcome = Outcome::Return(Value::Null);

/// Per-process call-log coordinator.
#[derive(Debug, Clone, Default)]
pub struct Agent {
    strictness: Strictness,
    /// In order of first appearance.
    logs: Vec<CallLog>,
    by_identity: BTreeMap<Identity, usize>,
}

impl Agent {
    pub fn new(strictness: Strictness) -> Self {
        Self {
            strictness,
            ..Self::default()
        }
    }

    /// Load scripted logs. The n-th fixture of a type scripts that type's n-th instance.
    pub fn with_fixtures(fixtures: &[Fixture], strictness: Strictness) -> Self {
        let mut agent = Self::new(strictness);
        let mut ordinals: BTreeMap<&str, usize> = BTreeMap::new();
        for fixture in fixtures {
            let ordinal = ordinals.entry(fixture.target.as_str()).or_default();
            let identity = Identity::new(fixture.target.as_str(), *ordinal);
            *ordinal += 1;
            let log = agent.log_index(&identity);
            agent.logs[log].entries.extend(fixture.calls.iter().map(|call| Entry {
                method: call.method.clone(),
                args: call.args.clone(),
                outcome: Some(call.outcome.clone()),
            }));
        }
        agent
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    fn log_index(&mut self, identity: &Identity) -> usize {
        if let Some(index) = self.by_identity.get(identity) {
            return *index;
        }
        let index = self.logs.len();
        self.logs.push(CallLog {
            identity: identity.clone(),
            entries: Vec::new(),
            cursor: 0,
        });
        self.by_identity.insert(identity.clone(), index);
        index
    }

    /// Make sure `identity` has a log, even one with no calls.
    pub fn register(&mut self, identity: &Identity) {
        self.log_index(identity);
    }

    /// Append a call whose outcome is not known yet.
    pub fn record(&mut self, identity: &Identity, method: &str, args: Vec<Value>) -> Placeholder {
        let log = self.log_index(identity);
        let entries = &mut self.logs[log].entries;
        entries.push(Entry {
            method: method.to_string(),
            args,
            outcome: None,
        });
        Placeholder {
            log,
            entry: entries.len() - 1,
        }
    }

    /// Fill in the outcome of a recorded call.
    pub fn resolve(&mut self, placeholder: Placeholder, outcome: Outcome) -> Result<(), AgentError> {
        let entry = self
            .logs
            .get_mut(placeholder.log)
            .and_then(|log| log.entries.get_mut(placeholder.entry))
            .ok_or(AgentError::UnknownPlaceholder(placeholder))?;
        if entry.outcome.is_some() {
            return Err(AgentError::AlreadyResolved(placeholder));
        }
        entry.outcome = Some(outcome);
        Ok(())
    }

    /// Recorded logs as fixtures, in order of first appearance. Pending outcomes become `null`.
    pub fn fixtures(&self) -> Vec<Fixture> {
        self.logs
            .iter()
            .map(|log| Fixture {
                target: log.identity.type_name.clone(),
                calls: log
                    .entries
                    .iter()
                    .map(|entry| {
                        CallRecord::new(
                            entry.method.clone(),
                            entry.args.clone(),
                            entry.outcome.clone().unwrap_or(Outcome::Return(Value::Null)),
                        )
                    })
                    .collect(),
            })
            .collect()
    }

    /// Consume the next scripted call of `identity`.
    ///
    /// ## Errors
    /// - [`ProtocolViolation::Exhausted`] when nothing is left for this instance.
    /// - [`ProtocolViolation::MethodMismatch`] when the next call is a different method.
    /// - [`ProtocolViolation::ArgumentMismatch`] under [`Strictness::Arguments`] when the arguments differ.
    ///
    /// A mismatching entry is not consumed.
    pub fn replay(
        &mut self,
        identity: &Identity,
        method: &str,
        args: Vec<Value>,
    ) -> Result<&Outcome, ProtocolViolation> {
        let actual = CallDescriptor::new(identity.clone(), method, args);
        let Some(&index) = self.by_identity.get(identity) else {
            return Err(ProtocolViolation::Exhausted { actual });
        };
        let log = &mut self.logs[index];
        let Some(next) = log.entries.get(log.cursor) else {
            return Err(ProtocolViolation::Exhausted { actual });
        };
        if !next.method.eq_ignore_ascii_case(method) {
            return Err(ProtocolViolation::MethodMismatch {
                expected: log.descriptor(next),
                actual,
            });
        }
        if self.strictness == Strictness::Arguments && next.args != actual.args {
            return Err(ProtocolViolation::ArgumentMismatch {
                expected: log.descriptor(next),
                actual,
            });
        }
        log.cursor += 1;
        Ok(log.entries[log.cursor - 1].outcome.as_ref().unwrap_or(&PENDING))
    }

    /// Report the first scripted call that was never made.
    pub fn finish(&self) -> Result<(), ProtocolViolation> {
        for log in &self.logs {
            if let Some(entry) = log.entries.get(log.cursor) {
                return Err(ProtocolViolation::Unconsumed {
                    expected: log.descriptor(entry),
                });
            }
        }
        Ok(())
    }
}
