//! Test runner implementation
//!
//! ## TestReporter Trait
//!
//! Reporting is separated from execution by the `TestReporter` trait: the console reporter prints
//! one line per case plus failure details, the JSON reporter prints the whole evaluation.
//!
//! ## Exit codes
//!
//! `0` when every case passed, `1` when any failed or errored, `9` when a test file is malformed
//! (nothing runs then), `255` when Lens produced a harness it could not run.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use super::test_interfaces::{DefaultTestDiscovery, TestDiscovery, TestError};
use super::{CliError, CliResult, ExitCode, ProjectOptions};
use crate::evaluator::{
    AnnotatedCase, Evaluation, EvaluationError, Evaluator, Failure, Mismatch, NamedSuite, PoolError, Summary, Verdict,
};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

// ============================================================================
// Test Reporter Trait
// ============================================================================

/// Trait for reporting test execution results.
pub trait TestReporter {
    /// Called once every test file has been parsed
    fn on_collection_complete(&mut self, files: usize, cases: usize);

    /// Called for each case, in declared order, once the run is over
    fn on_case_complete(&mut self, _suite: &str, _case: &AnnotatedCase) {}

    /// Called when all cases have completed
    fn on_run_complete(&mut self, evaluation: &Evaluation, duration: Duration) -> CliResult<()>;
}

/// Default console reporter
#[derive(Default)]
pub struct ConsoleReporter;

impl TestReporter for ConsoleReporter {
    fn on_collection_complete(&mut self, files: usize, cases: usize) {
        println!("{BOLD}=================== lens session starts ==================={RESET}");
        println!("collected {cases} case(s) from {files} file(s)");
        println!();
    }

    fn on_case_complete(&mut self, suite: &str, case: &AnnotatedCase) {
        let status = match case.result.verdict {
            Verdict::Pass => format!("{GREEN}PASS {RESET}"),
            Verdict::Fail(_) => format!("{RED}FAIL {RESET}"),
            Verdict::Error(_) => format!("{YELLOW}ERROR{RESET}"),
        };
        println!("{status} {suite}:{} {}", case.case.line, case.case.title());
        for line in verdict_details(&case.result.verdict) {
            println!("      {line}");
        }
    }

    fn on_run_complete(&mut self, evaluation: &Evaluation, duration: Duration) -> CliResult<()> {
        println!();
        println!("====== {} in {:.2}s ======", summary_line(&evaluation.summary()), duration.as_secs_f64());
        Ok(())
    }
}

/// Prints the evaluation as one JSON document.
#[derive(Default)]
pub struct JsonReporter;

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Summary,
    duration_ms: u128,
    #[serde(flatten)]
    evaluation: &'a Evaluation,
}

impl TestReporter for JsonReporter {
    fn on_collection_complete(&mut self, _files: usize, _cases: usize) {}

    fn on_run_complete(&mut self, evaluation: &Evaluation, duration: Duration) -> CliResult<()> {
        let report = JsonReport {
            summary: evaluation.summary(),
            duration_ms: duration.as_millis(),
            evaluation,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::failure(format!("cannot serialize the evaluation: {e}")))?;
        println!("{json}");
        Ok(())
    }
}

/// `3 passed, 1 failed`; counts that are zero are left out.
pub fn summary_line(summary: &Summary) -> String {
    let mut parts = Vec::new();
    if summary.passed > 0 {
        parts.push(format!("{GREEN}{} passed{RESET}", summary.passed));
    }
    if summary.failed > 0 {
        parts.push(format!("{RED}{} failed{RESET}", summary.failed));
    }
    if summary.errors > 0 {
        parts.push(format!("{YELLOW}{} error(s){RESET}", summary.errors));
    }
    if parts.is_empty() {
        return "no cases ran".to_string();
    }
    parts.join(", ")
}

/// Lines explaining a non-passing verdict.
pub fn verdict_details(verdict: &Verdict) -> Vec<String> {
    match verdict {
        Verdict::Pass => Vec::new(),
        Verdict::Fail(Failure::Mismatch(Mismatch::Output { expected, actual })) => {
            let mut lines = vec!["output differs".to_string(), "--- expected".to_string()];
            lines.extend(expected.lines().map(str::to_string));
            lines.push("+++ actual".to_string());
            lines.extend(actual.lines().map(str::to_string));
            lines
        }
        Verdict::Fail(failure) => vec![failure.to_string()],
        Verdict::Error(error) => vec![error.to_string()],
    }
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TestOptions {
    pub paths: Vec<PathBuf>,
    pub project: ProjectOptions,
    pub json: bool,
    pub coverage_out: Option<PathBuf>,
}

/// Run all tests in the given paths.
pub fn run_tests(options: &TestOptions) -> CliResult<ExitCode> {
    run_tests_with(&DefaultTestDiscovery, options)
}

pub fn run_tests_with(discovery: &dyn TestDiscovery, options: &TestOptions) -> CliResult<ExitCode> {
    let start_time = Instant::now();

    let suites = load_suites(discovery, &options.paths)?;
    let cases = suites.iter().map(|s| s.suite.cases.len()).sum();

    let mut reporter: Box<dyn TestReporter> = if options.json {
        Box::new(JsonReporter)
    } else {
        Box::new(ConsoleReporter)
    };
    reporter.on_collection_complete(suites.len(), cases);

    let mut evaluator =
        Evaluator::new(options.project.paths(), options.project.config()).map_err(evaluation_error)?;
    let evaluation = runtime()?
        .block_on(evaluator.run_until(suites, shutdown_signal()))
        .map_err(evaluation_error)?;

    for suite in &evaluation.suites {
        for case in &suite.cases {
            reporter.on_case_complete(&suite.name, case);
        }
    }
    reporter.on_run_complete(&evaluation, start_time.elapsed())?;

    if let Some(path) = &options.coverage_out {
        let json = serde_json::to_string_pretty(&evaluation.coverage)
            .map_err(|e| CliError::failure(format!("cannot serialize coverage: {e}")))?;
        fs::write(path, json)
            .map_err(|e| CliError::failure(format!("cannot write coverage to {}: {e}", path.display())))?;
    }

    Ok(if evaluation.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Discover and parse every test file. Syntax errors from all files are reported together.
fn load_suites(discovery: &dyn TestDiscovery, paths: &[PathBuf]) -> CliResult<Vec<NamedSuite>> {
    let mut suites = Vec::new();
    let mut syntax_errors = Vec::new();
    for root in paths {
        let files = discovery.discover_test_files(root).map_err(|e| CliError::usage(e.render()))?;
        for file in files {
            match discovery.load(root, &file) {
                Ok(loaded) => suites.push(loaded.suite),
                Err(error @ TestError::Syntax { .. }) => syntax_errors.push(error.render()),
                Err(error) => return Err(CliError::failure(error.render())),
            }
        }
    }

    if !syntax_errors.is_empty() {
        return Err(CliError::new(syntax_errors.join("\n"), ExitCode::SYNTAX));
    }
    if suites.is_empty() {
        let searched: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        return Err(CliError::usage(format!(
            "No test files found in {}\nTest files are *.php files",
            searched.join(", ")
        )));
    }
    Ok(suites)
}

/// Map an evaluator error onto the CLI's exit codes.
pub(crate) fn evaluation_error(error: EvaluationError) -> CliError {
    match error {
        EvaluationError::Internal { .. } => CliError::internal(format!("internal error: {error}")),
        EvaluationError::Pool(PoolError::Cancelled) => CliError::failure("interrupted"),
        other => CliError::failure(other.to_string()),
    }
}

pub(crate) fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::internal(format!("cannot start the async runtime: {e}")))
}

/// Completes on Ctrl-C.
pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{CallDescriptor, Identity, ProtocolViolation};
    use crate::evaluator::ProcessError;
    use clap::Parser;
    use std::path::Path;

    fn options(project: &Path, paths: Vec<PathBuf>) -> TestOptions {
        let project = project.to_string_lossy().into_owned();
        let cli = crate::cli::Cli::try_parse_from(["lens", "mock", "X", "--project", project.as_str()]).unwrap();
        let Some(crate::cli::Command::Mock { project, .. }) = cli.command else {
            panic!("Expected Mock command");
        };
        TestOptions {
            paths,
            project,
            json: false,
            coverage_out: None,
        }
    }

    #[test]
    fn test_summary_line() {
        let summary = Summary {
            passed: 3,
            failed: 1,
            errors: 0,
        };
        assert_eq!(summary_line(&summary), format!("{GREEN}3 passed{RESET}, {RED}1 failed{RESET}"));
        assert_eq!(summary_line(&Summary::default()), "no cases ran");
    }

    #[test]
    fn test_verdict_details() {
        assert!(verdict_details(&Verdict::Pass).is_empty());

        let output = Verdict::Fail(Failure::Mismatch(Mismatch::Output {
            expected: "hello\nworld".to_string(),
            actual: "hullo".to_string(),
        }));
        assert_eq!(
            verdict_details(&output),
            ["output differs", "--- expected", "hello", "world", "+++ actual", "hullo"]
        );

        let violation = Verdict::Fail(Failure::Protocol(ProtocolViolation::Unconsumed {
            expected: CallDescriptor::new(Identity::new("App\\Disk", 0), "save", vec![]),
        }));
        assert_eq!(verdict_details(&violation).len(), 1);
        assert!(verdict_details(&violation)[0].contains("save"));

        let timeout = Verdict::Error(ProcessError::TimedOut {
            limit: Duration::from_secs(2),
        });
        assert_eq!(verdict_details(&timeout), ["timed out after 2s"]);
    }

    #[test]
    fn test_no_test_files_is_a_usage_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        let error = run_tests(&options(dir.path(), vec![dir.path().join("tests")])).unwrap_err();
        assert_eq!(error.exit_code, ExitCode::USAGE);
        assert!(error.message.contains("No test files found"));
    }

    #[test]
    fn test_syntax_errors_from_every_file_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("tests");
        fs::create_dir_all(&tests).unwrap();
        fs::write(tests.join("a.php"), "<?php\n// Test\necho 1;\n").unwrap();
        fs::write(tests.join("b.php"), "echo 1;\n").unwrap();
        fs::write(tests.join("c.php"), "<?php\n// Test\necho 1;\n// Output\n1\n").unwrap();

        let error = run_tests(&options(dir.path(), vec![tests])).unwrap_err();
        assert_eq!(error.exit_code, ExitCode::SYNTAX);
        assert!(error.message.contains("output label"), "{}", error.message);
        assert!(error.message.contains("PHP tag line"), "{}", error.message);
    }

    #[cfg(unix)]
    #[test]
    fn test_end_to_end_with_a_fake_interpreter() {
        use crate::backend::SENTINEL;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tests = dir.path().join("tests");
        fs::create_dir_all(&tests).unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(tests.join("hello.php"), "<?php\n// Test: greets\necho 'hi';\n// Output\nhi\n").unwrap();

        let php = dir.path().join("fake-php");
        let report = r#"{"output":"hi\n","exception":null,"fatal":null,"instances":[],"calls":[],"coverage":{}}"#;
        fs::write(&php, format!("#!/bin/sh\ncat <<'LENS'\n\n{SENTINEL}\n{report}\nLENS\n")).unwrap();
        fs::set_permissions(&php, fs::Permissions::from_mode(0o755)).unwrap();

        let mut options = options(dir.path(), vec![tests]);
        options.project.php = php;
        options.json = true;
        options.coverage_out = Some(dir.path().join("coverage.json"));

        assert_eq!(run_tests(&options).unwrap(), ExitCode::SUCCESS);
        let coverage = fs::read_to_string(dir.path().join("coverage.json")).unwrap();
        assert_eq!(coverage.trim(), "{}");
    }
}
