//! Line coverage accumulated across cases.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File path → line → hit count, both ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap(BTreeMap<String, BTreeMap<u32, u64>>);

impl CoverageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `hits` to one line.
    pub fn record(&mut self, file: impl Into<String>, line: u32, hits: u64) {
        let count = self.0.entry(file.into()).or_default().entry(line).or_default();
        *count = count.saturating_add(hits);
    }

    /// Accumulate `other` into `self`. Counts never decrease.
    pub fn merge(&mut self, other: &CoverageMap) {
        for (file, lines) in &other.0 {
            for (line, hits) in lines {
                self.record(file.clone(), *line, *hits);
            }
        }
    }

    pub fn hits(&self, file: &str, line: u32) -> u64 {
        self.0.get(file).and_then(|lines| lines.get(&line)).copied().unwrap_or(0)
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Lines of `file` hit at least once, ascending.
    pub fn covered_lines(&self, file: &str) -> impl Iterator<Item = u32> + '_ {
        self.0
            .get(file)
            .into_iter()
            .flat_map(|lines| lines.iter().filter(|(_, hits)| **hits > 0).map(|(line, _)| *line))
    }

    /// Whether any line in `first..=last` of `file` was hit.
    pub fn covers_range(&self, file: &str, first: u32, last: u32) -> bool {
        self.0
            .get(file)
            .is_some_and(|lines| lines.range(first..=last).any(|(_, hits)| *hits > 0))
    }

    /// Only the files below `root`.
    pub fn filter_to(&self, root: &Path) -> CoverageMap {
        CoverageMap(
            self.0
                .iter()
                .filter(|(file, _)| Path::new(file.as_str()).starts_with(root))
                .map(|(file, lines)| (file.clone(), lines.clone()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
