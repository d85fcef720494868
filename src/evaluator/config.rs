//! Evaluator configuration

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::backend::Strictness;

/// Per-case wall-clock limit when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How cases are executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// PHP interpreter, looked up on `PATH` when relative
    pub php: PathBuf,
    /// Maximum number of harness processes alive at once
    pub jobs: usize,
    /// Per-case wall-clock limit; the process is killed when it expires
    pub timeout: Duration,
    /// How closely replayed calls must match their scripts
    pub strictness: Strictness,
    /// Collect line coverage (needs Xdebug in the interpreter)
    pub coverage: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            php: PathBuf::from("php"),
            jobs: thread::available_parallelism().map_or(1, NonZeroUsize::get),
            timeout: DEFAULT_TIMEOUT,
            strictness: Strictness::default(),
            coverage: true,
        }
    }
}

impl EvaluatorConfig {
    /// Create a new config with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_php(mut self, php: impl Into<PathBuf>) -> Self {
        self.php = php.into();
        self
    }

    /// Set the worker count; zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_coverage(mut self, coverage: bool) -> Self {
        self.coverage = coverage;
        self
    }
}
