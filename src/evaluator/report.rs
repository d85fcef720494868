//! The JSON report a harness prints after its sentinel line.

use std::collections::BTreeMap;

use lens_syntax::spec::ThrownException;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::coverage::CoverageMap;
use crate::backend::SENTINEL;

/// A fatal error the interpreter reported on shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub message: String,
    pub file: String,
    pub line: u32,
}

/// One mock call as the harness saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedCall {
    /// `Type#ordinal`
    pub identity: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct RawReport {
    #[serde(default)]
    output: String,
    exception: Option<ThrownException>,
    fatal: Option<FatalError>,
    #[serde(default)]
    instances: Vec<String>,
    #[serde(default)]
    calls: Vec<TracedCall>,
    /// Xdebug uses negative counts for lines that were not executed.
    #[serde(default)]
    coverage: BTreeMap<String, BTreeMap<u32, i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessReport {
    pub output: String,
    pub exception: Option<ThrownException>,
    pub fatal: Option<FatalError>,
    /// Mock identities in creation order, including instances that were never called.
    pub instances: Vec<String>,
    pub calls: Vec<TracedCall>,
    pub coverage: CoverageMap,
}

impl From<RawReport> for HarnessReport {
    fn from(raw: RawReport) -> Self {
        let mut coverage = CoverageMap::new();
        for (file, lines) in raw.coverage {
            for (line, hits) in lines {
                if let Ok(hits @ 1..) = u64::try_from(hits) {
                    coverage.record(file.clone(), line, hits);
                }
            }
        }
        Self {
            output: raw.output,
            exception: raw.exception,
            fatal: raw.fatal,
            instances: raw.instances,
            calls: raw.calls,
            coverage,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("harness printed no report")]
    Missing,

    #[error("harness report is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Extract the report following the last sentinel line of `stdout`.
pub fn parse(stdout: &str) -> Result<HarnessReport, ReportError> {
    let marker = format!("\n{SENTINEL}\n");
    let start = stdout.rfind(&marker).ok_or(ReportError::Missing)?;
    let json = stdout[start + marker.len()..].trim();
    let raw: RawReport = serde_json::from_str(json)?;
    Ok(raw.into())
}
