//! CLI module for the Lens test runner
//!
//! ## Commands
//!
//! - `test [PATH...]` - Run every case found under the given paths (default `tests`)
//! - `record <FILE>` - Run each case of a test file with recording mocks and print the captured fixtures
//! - `mock <TYPE>` - Print the replay mock generated for a project type
//!
//! ## Modules
//!
//! - `commands` - Debug flags, `record` and `mock`
//! - `test_interfaces` - Test file discovery and loading
//! - `test_runner` - Evaluation and reporting
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod test_interfaces;
pub mod test_runner;

use std::fmt;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::backend::Strictness;
use crate::evaluator::{EvaluatorConfig, ProjectPaths};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// At least one case failed or errored.
    pub const FAILURE: ExitCode = ExitCode(1);
    pub const USAGE: ExitCode = ExitCode(2);
    /// A test file is malformed.
    pub const SYNTAX: ExitCode = ExitCode(9);
    /// Lens generated something it could not run.
    pub const INTERNAL: ExitCode = ExitCode(255);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::USAGE)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::INTERNAL)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Example-based tests for PHP
#[derive(Parser, Debug)]
#[command(name = "lens")]
#[command(version = VERSION)]
#[command(about = "Example-based tests for PHP: write the code, write the output, Lens mocks the rest", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // Debug/development flags
    /// Tokenize a PHP file (debug)
    #[arg(long = "lex", value_name = "FILE")]
    pub lex_file: Option<PathBuf>,

    /// Print the declarations found in a PHP file (debug)
    #[arg(long = "parse", value_name = "FILE", conflicts_with = "lex_file")]
    pub parse_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test files
    Test {
        /// Test files or directories searched recursively for `*.php`
        #[arg(value_name = "PATH", default_value = "tests")]
        paths: Vec<PathBuf>,
        #[command(flatten)]
        project: ProjectOptions,
        /// Print the full evaluation as JSON on stdout
        #[arg(long)]
        json: bool,
        /// Write the merged line coverage as JSON
        #[arg(long = "coverage-out", value_name = "FILE")]
        coverage_out: Option<PathBuf>,
    },

    /// Print the fixtures a recording run of each case captures
    Record {
        /// Test file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[command(flatten)]
        project: ProjectOptions,
    },

    /// Print the replay mock for a type
    Mock {
        /// Fully qualified class or interface name
        #[arg(value_name = "TYPE")]
        type_name: String,
        #[command(flatten)]
        project: ProjectOptions,
    },
}

/// Where the project lives and how its cases run.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ProjectOptions {
    /// Project root; harness processes run here
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,
    /// Source directory to index (default: <project>/src)
    #[arg(long, value_name = "DIR")]
    pub src: Option<PathBuf>,
    /// Autoloader to require (default: <project>/vendor/autoload.php when present)
    #[arg(long, value_name = "FILE")]
    pub autoload: Option<PathBuf>,
    /// Cache directory for generated harnesses (default: <project>/.lens)
    #[arg(long, value_name = "DIR")]
    pub cache: Option<PathBuf>,
    /// Parallel interpreter processes
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
    /// Per-case timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
    /// PHP interpreter
    #[arg(long, value_name = "PATH", default_value = "php")]
    pub php: PathBuf,
    /// Compare mock call arguments, not just method names
    #[arg(long = "strict-arguments")]
    pub strict_arguments: bool,
    /// Run without Xdebug coverage
    #[arg(long = "no-coverage")]
    pub no_coverage: bool,
}

impl ProjectOptions {
    pub fn paths(&self) -> ProjectPaths {
        let mut paths = ProjectPaths::new(&self.project);
        if let Some(src) = &self.src {
            paths = paths.with_source_root(src);
        }
        if let Some(autoload) = &self.autoload {
            paths = paths.with_autoload(Some(autoload.clone()));
        }
        if let Some(cache) = &self.cache {
            paths = paths.with_cache_dir(cache);
        }
        paths
    }

    pub fn config(&self) -> EvaluatorConfig {
        let mut config = EvaluatorConfig::new()
            .with_php(&self.php)
            .with_coverage(!self.no_coverage);
        if let Some(jobs) = self.jobs {
            config = config.with_jobs(jobs);
        }
        if let Some(seconds) = self.timeout {
            config = config.with_timeout(Duration::from_secs(seconds));
        }
        if self.strict_arguments {
            config = config.with_strictness(Strictness::Arguments);
        }
        config
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    if let Some(file) = cli.lex_file {
        return commands::lex_file(&file);
    }
    if let Some(file) = cli.parse_file {
        return commands::parse_file(&file);
    }

    match cli.command {
        Some(Command::Test {
            paths,
            project,
            json,
            coverage_out,
        }) => test_runner::run_tests(&test_runner::TestOptions {
            paths,
            project,
            json,
            coverage_out,
        }),
        Some(Command::Record { file, project }) => commands::record_file(&file, &project),
        Some(Command::Mock { type_name, project }) => commands::mock_type(&type_name, &project),
        None => Err(CliError::usage("no command given; try `lens --help`")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_test_defaults() {
        let cli = Cli::try_parse_from(["lens", "test"]).unwrap();
        let Some(Command::Test {
            paths,
            project,
            json,
            coverage_out,
        }) = cli.command
        else {
            panic!("Expected Test command");
        };
        assert_eq!(paths, [PathBuf::from("tests")]);
        assert_eq!(project.project, PathBuf::from("."));
        assert_eq!(project.php, PathBuf::from("php"));
        assert!(!json);
        assert!(coverage_out.is_none());
    }

    #[test]
    fn test_cli_parse_test_flags() {
        let cli = Cli::try_parse_from([
            "lens",
            "test",
            "tests/unit",
            "tests/io",
            "--project",
            "app",
            "--jobs",
            "3",
            "--timeout",
            "5",
            "--strict-arguments",
            "--no-coverage",
            "--json",
            "--coverage-out",
            "cov.json",
        ])
        .unwrap();
        let Some(Command::Test {
            paths,
            project,
            json,
            coverage_out,
        }) = cli.command
        else {
            panic!("Expected Test command");
        };
        assert_eq!(paths.len(), 2);
        assert!(json);
        assert_eq!(coverage_out, Some(PathBuf::from("cov.json")));

        let config = project.config();
        assert_eq!(config.jobs, 3);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.strictness, Strictness::Arguments);
        assert!(!config.coverage);

        let paths = project.paths();
        assert_eq!(paths.source_root, PathBuf::from("app/src"));
        assert_eq!(paths.cache_dir, PathBuf::from("app/.lens"));
    }

    #[test]
    fn test_cli_project_overrides() {
        let cli = Cli::try_parse_from([
            "lens",
            "mock",
            "App\\Disk",
            "--src",
            "lib",
            "--autoload",
            "boot.php",
            "--cache",
            "/tmp/lens",
        ])
        .unwrap();
        let Some(Command::Mock { type_name, project }) = cli.command else {
            panic!("Expected Mock command");
        };
        assert_eq!(type_name, "App\\Disk");
        let paths = project.paths();
        assert_eq!(paths.source_root, PathBuf::from("lib"));
        assert_eq!(paths.autoload, Some(PathBuf::from("boot.php")));
        assert_eq!(paths.cache_dir, PathBuf::from("/tmp/lens"));
        assert_eq!(project.config().strictness, Strictness::MethodOnly);
    }

    #[test]
    fn test_cli_parse_record() {
        let cli = Cli::try_parse_from(["lens", "record", "tests/disk.php"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Record { .. })));
        assert!(Cli::try_parse_from(["lens", "record"]).is_err());
    }

    #[test]
    fn test_cli_parse_debug_flags() {
        let cli = Cli::try_parse_from(["lens", "--lex", "src/Disk.php"]).unwrap();
        assert!(cli.lex_file.is_some());

        let cli = Cli::try_parse_from(["lens", "--parse", "src/Disk.php"]).unwrap();
        assert!(cli.parse_file.is_some());

        assert!(Cli::try_parse_from(["lens", "--lex", "a.php", "--parse", "b.php"]).is_err());
    }

    #[test]
    fn test_no_command_is_a_usage_error() {
        let cli = Cli::try_parse_from(["lens"]).unwrap();
        let error = execute(cli).unwrap_err();
        assert_eq!(error.exit_code, ExitCode::USAGE);
    }
}
