//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fmt::Write as _;
use std::path::Path;

use lens_syntax::ast::Node;
use lens_syntax::diagnostics::line_column;
use lens_syntax::{lexer, parser};

use super::test_interfaces::{DefaultTestDiscovery, TestDiscovery, TestError, read_source};
use super::test_runner::{evaluation_error, runtime};
use super::{CliError, CliResult, ExitCode, ProjectOptions};
use crate::backend::{MockMode, ReflectionProvider, SurfaceCache, build_for};
use crate::evaluator::{Evaluator, ProjectIndex};

// ============================================================================
// Debug flags
// ============================================================================

/// Print the tokens of a PHP file, one per line.
pub fn lex_file(path: &Path) -> CliResult<ExitCode> {
    let source = read_source(path).map_err(|e| CliError::failure(e.render()))?;
    print!("{}", render_tokens(&source));
    Ok(ExitCode::SUCCESS)
}

/// Print the declarations of a PHP file as an indented tree.
pub fn parse_file(path: &Path) -> CliResult<ExitCode> {
    let source = read_source(path).map_err(|e| CliError::failure(e.render()))?;
    print!("{}", render_nodes(&source, &parser::parse_unit(&source)));
    Ok(ExitCode::SUCCESS)
}

fn render_tokens(source: &str) -> String {
    let mut out = String::new();
    for token in lexer::lex(source) {
        let (line, column) = line_column(source, token.span.start);
        let _ = writeln!(out, "{line}:{column}\t{:?}\t{:?}", token.kind, token.text);
    }
    out
}

fn render_nodes(source: &str, nodes: &[Node]) -> String {
    fn render(out: &mut String, source: &str, node: &Node, depth: usize) {
        let (first, _) = line_column(source, node.span.start);
        let (last, _) = line_column(source, node.span.end.saturating_sub(1).max(node.span.start));
        let name = if node.name.is_empty() { "(global)" } else { node.name.as_str() };
        let _ = write!(out, "{}{} {name} [{first}-{last}]", "  ".repeat(depth), node.kind.label());
        let tags: Vec<&str> = node.tags.iter().collect();
        if !tags.is_empty() {
            let _ = write!(out, " #{}", tags.join(" #"));
        }
        out.push('\n');
        for child in &node.children {
            render(out, source, child, depth + 1);
        }
    }

    let mut out = String::new();
    for node in nodes {
        render(&mut out, source, node, 0);
    }
    out
}

// ============================================================================
// mock / record
// ============================================================================

/// Print the replay mock for `type_name`.
pub fn mock_type(type_name: &str, project: &ProjectOptions) -> CliResult<ExitCode> {
    let paths = project.paths();
    let index = ProjectIndex::load(&paths.source_root).map_err(|e| {
        CliError::failure(format!("cannot index sources in {}: {e}", paths.source_root.display()))
    })?;
    let type_name = type_name.trim_start_matches('\\');
    let reflection = ReflectionProvider::new(&project.php, paths.autoload.clone(), &paths.project_root)
        .with_timeout(project.config().timeout);
    let mut surfaces = SurfaceCache::new();
    runtime()?.block_on(reflection.resolve(&index.external_types(type_name), &mut surfaces));
    let mock = build_for(&index.with_external(&surfaces), type_name, MockMode::Replay)
        .map_err(|e| CliError::failure(e.to_string()))?;
    print!("{}", mock.source);
    Ok(ExitCode::SUCCESS)
}

/// Run every case of a test file once with recording mocks and print what they saw.
pub fn record_file(file: &Path, project: &ProjectOptions) -> CliResult<ExitCode> {
    let root = file.parent().unwrap_or(Path::new(""));
    let loaded = DefaultTestDiscovery.load(root, file).map_err(|e| match e {
        error @ TestError::Syntax { .. } => CliError::new(error.render(), ExitCode::SYNTAX),
        other => CliError::failure(other.render()),
    })?;

    let evaluator = Evaluator::new(project.paths(), project.config()).map_err(evaluation_error)?;
    let runtime = runtime()?;
    let suite = &loaded.suite;
    for (index, case) in suite.suite.cases.iter().enumerate() {
        let fixtures = runtime
            .block_on(evaluator.capture_fixtures(&suite.name, index, case))
            .map_err(evaluation_error)?;
        println!("// Test: {}", case.title());
        for fixture in &fixtures {
            println!();
            print!("{fixture}");
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}
