//! Instrumented source snapshot: every project file with its declarations and their tags.

use std::path::PathBuf;

use lens_syntax::ast::{Node, NodeKind, tags};
use lens_syntax::diagnostics::line_column;
use serde::Serialize;

use super::coverage::CoverageMap;
use super::index::ProjectIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub kind: &'static str,
    /// `App\Disk`, `App\Disk::read`, `App\slugify`
    pub name: String,
    /// 1-based, inclusive.
    pub first_line: u32,
    pub last_line: u32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub contents: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    pub files: Vec<SnapshotFile>,
}

impl SourceSnapshot {
    /// Summarize `index`, tagging declarations with a covered line as `covered`.
    pub fn build(index: &ProjectIndex, coverage: &CoverageMap) -> Self {
        let files = index
            .files()
            .iter()
            .map(|file| {
                let path = file.path.to_string_lossy();
                let mut declarations = Vec::new();
                for unit in &file.units {
                    for node in &unit.children {
                        summarize(node, None, &file.source, &path, coverage, &mut declarations);
                    }
                }
                SnapshotFile {
                    path: file.path.clone(),
                    contents: file.source.clone(),
                    declarations,
                }
            })
            .collect();
        Self { files }
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.files
            .iter()
            .flat_map(|file| &file.declarations)
            .find(|declaration| declaration.name.eq_ignore_ascii_case(name))
    }
}

fn summarize(
    node: &Node,
    owner: Option<&str>,
    source: &str,
    path: &str,
    coverage: &CoverageMap,
    out: &mut Vec<Declaration>,
) {
    let name = match (&node.kind, owner) {
        (NodeKind::Method(_), Some(owner)) => format!("{owner}::{}", node.name),
        _ => node.name.clone(),
    };
    let first_line = line(source, node.span.start);
    let last_line = line(source, node.span.end.saturating_sub(1));
    let mut tags: Vec<String> = node.tags.iter().map(str::to_string).collect();
    if coverage.covers_range(path, first_line, last_line) && !node.tags.has(tags::COVERED) {
        tags.push(tags::COVERED.to_string());
        tags.sort();
    }
    out.push(Declaration {
        kind: node.kind.label(),
        name: name.clone(),
        first_line,
        last_line,
        tags,
    });
    for child in &node.children {
        summarize(child, Some(&name), source, path, coverage, out);
    }
}

fn line(source: &str, offset: usize) -> u32 {
    u32::try_from(line_column(source, offset).0).unwrap_or(u32::MAX)
}
