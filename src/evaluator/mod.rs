//! Lens evaluator
//!
//! Runs parsed test cases against the project under test.
//!
//! For every case, in declared order:
//!
//! 1. Find the symbols the subject references and expand them through the [`ProjectIndex`]
//! 2. Build a replay mock for every fixture target
//! 3. Assemble `harness.php` / `subject.php` in the cache directory
//! 4. Run the harness in a fresh interpreter through the [`WorkerPool`]
//! 5. Re-validate the mock call trace, compare the outcome, keep the coverage
//!
//! Coverage is merged in declared order once every process has exited.
//!
//! ## Notes
//! - A harness that prints no report (or a broken one) without being killed is an internal error
//!   and aborts the run: the generated code itself is at fault.
//! - A timeout, a crash or a failed spawn only marks that case as an error.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod compare;
pub mod config;
pub mod coverage;
pub mod index;
pub mod pool;
pub mod report;
pub mod snapshot;

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::future::{self, Future};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::time::Duration;

use lens_syntax::ast::{Context, tags};
use lens_syntax::parser::{self, References};
use lens_syntax::spec::{Case, Fixture, Suite};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::harness::{self, HarnessPlan, HARNESS_FILE};
use crate::backend::{
    Agent, Identity, MockError, MockMode, MockSource, ProtocolViolation, ReflectionProvider, SurfaceCache,
};

pub use compare::{Actual, Mismatch};
pub use config::EvaluatorConfig;
pub use coverage::CoverageMap;
pub use index::ProjectIndex;
pub use pool::{Job, PoolError, ProcessOutcome, WorkerPool};
pub use report::{FatalError, HarnessReport};
pub use snapshot::SourceSnapshot;

// ============================================================================
// Inputs
// ============================================================================

/// Where the project under test lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    /// Working directory of every harness process.
    pub project_root: PathBuf,
    /// Indexed for declarations and kept in the coverage map.
    pub source_root: PathBuf,
    /// Required before anything else, usually Composer's `vendor/autoload.php`.
    pub autoload: Option<PathBuf>,
    /// Generated harnesses go below `<cache_dir>/harness`.
    pub cache_dir: PathBuf,
}

impl ProjectPaths {
    /// Conventional layout: `src/`, `vendor/autoload.php` when present, `.lens/` for the cache.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let autoload = project_root.join("vendor").join("autoload.php");
        Self {
            source_root: project_root.join("src"),
            autoload: autoload.is_file().then_some(autoload),
            cache_dir: project_root.join(".lens"),
            project_root,
        }
    }

    pub fn with_source_root(mut self, source_root: impl Into<PathBuf>) -> Self {
        self.source_root = source_root.into();
        self
    }

    pub fn with_autoload(mut self, autoload: Option<PathBuf>) -> Self {
        self.autoload = autoload;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }
}

/// A parsed test file and the name its harness directories use.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSuite {
    pub name: String,
    pub suite: Suite,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum Failure {
    #[error(transparent)]
    Mismatch(Mismatch),

    #[error(transparent)]
    Protocol(ProtocolViolation),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProcessError {
    #[error("timed out after {}s", .limit.as_secs_f64())]
    TimedOut { limit: Duration },

    #[error("interpreter killed by signal {signal}")]
    Crashed { signal: i32, stderr: String },

    #[error("cannot start interpreter: {message}")]
    Spawn { message: String },
}

/// Exactly one per case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail(Failure),
    Error(ProcessError),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// External symbols a case depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dependencies {
    pub types: BTreeSet<String>,
    pub functions: BTreeSet<String>,
}

impl From<References> for Dependencies {
    fn from(refs: References) -> Self {
        Self {
            types: refs.types,
            functions: refs.functions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    /// `None` when the process produced no report.
    pub actual: Option<Actual>,
    pub verdict: Verdict,
    pub dependencies: Dependencies,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedCase {
    pub case: Case,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedSuite {
    pub name: String,
    pub context: Context,
    pub cases: Vec<AnnotatedCase>,
}

/// Case counts per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub suites: Vec<AnnotatedSuite>,
    pub snapshot: SourceSnapshot,
    pub coverage: CoverageMap,
}

impl Evaluation {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for case in self.suites.iter().flat_map(|suite| &suite.cases) {
            match case.result.verdict {
                Verdict::Pass => summary.passed += 1,
                Verdict::Fail(_) => summary.failed += 1,
                Verdict::Error(_) => summary.errors += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        let summary = self.summary();
        summary.failed == 0 && summary.errors == 0
    }
}

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("cannot index sources in {}: {source}", .path.display())]
    Index {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{case}: {source}")]
    Mock {
        case: String,
        #[source]
        source: MockError,
    },

    #[error("cannot write harness for {case}: {source}")]
    Io {
        case: String,
        #[source]
        source: io::Error,
    },

    #[error("internal error in {case}: {message}")]
    Internal { case: String, message: String },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

// ============================================================================
// Evaluator
// ============================================================================

/// A case ready to run.
struct Prepared {
    label: String,
    harness_dir: PathBuf,
    fixtures: Vec<Fixture>,
    dependencies: Dependencies,
    job: Job,
}

pub struct Evaluator {
    paths: ProjectPaths,
    config: EvaluatorConfig,
    index: ProjectIndex,
    /// Reflected surfaces of types outside the project, kept for the evaluator's lifetime.
    surfaces: SurfaceCache,
}

impl Evaluator {
    /// Index the project's sources.
    pub fn new(paths: ProjectPaths, config: EvaluatorConfig) -> Result<Self, EvaluationError> {
        let index = ProjectIndex::load(&paths.source_root).map_err(|source| EvaluationError::Index {
            path: paths.source_root.clone(),
            source,
        })?;
        info!(files = index.files().len(), root = %paths.source_root.display(), "indexed sources");
        Ok(Self::with_index(paths, config, index))
    }

    pub fn with_index(paths: ProjectPaths, config: EvaluatorConfig, index: ProjectIndex) -> Self {
        Self {
            paths,
            config,
            index,
            surfaces: SurfaceCache::new(),
        }
    }

    pub fn index(&self) -> &ProjectIndex {
        &self.index
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate every case of `suites`.
    pub async fn run(&mut self, suites: Vec<NamedSuite>) -> Result<Evaluation, EvaluationError> {
        self.run_until(suites, future::pending()).await
    }

    /// Evaluate every case of `suites`, unless `shutdown` completes first.
    ///
    /// ## Errors
    /// - [`EvaluationError::Pool`] with [`PoolError::Cancelled`] on shutdown; nothing is kept.
    /// - [`EvaluationError::Mock`] when a fixture target cannot be mocked.
    /// - [`EvaluationError::Internal`] when a harness misbehaves.
    pub async fn run_until<F>(&mut self, suites: Vec<NamedSuite>, shutdown: F) -> Result<Evaluation, EvaluationError>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);
        let external = self.external_types(suites.iter().flat_map(|named| &named.suite.cases));
        let reflection = self.reflection();
        tokio::select! {
            () = reflection.resolve(&external, &mut self.surfaces) => {}
            () = &mut shutdown => return Err(PoolError::Cancelled.into()),
        }

        let mut prepared = Vec::new();
        let mut used_dirs = BTreeSet::new();
        for named in &suites {
            for (index, case) in named.suite.cases.iter().enumerate() {
                let dir_name = unique_dir_name(&mut used_dirs, &named.name, index);
                prepared.push(self.prepare(&named.name, &dir_name, case, MockMode::Replay)?);
            }
        }

        let pool = WorkerPool::new(self.config.jobs, self.config.timeout);
        let jobs = prepared.iter().map(|p| p.job.clone()).collect();
        let mut outcomes = pool.run_until(jobs, shutdown).await?.into_iter();

        let source_root = fs::canonicalize(&self.paths.source_root).unwrap_or_else(|_| self.paths.source_root.clone());
        let mut coverage = CoverageMap::new();
        let mut prepared = prepared.into_iter();
        let mut annotated = Vec::with_capacity(suites.len());
        for named in suites {
            let mut cases = Vec::with_capacity(named.suite.cases.len());
            for case in named.suite.cases {
                let (Some(prepared), Some(outcome)) = (prepared.next(), outcomes.next()) else {
                    return Err(EvaluationError::Internal {
                        case: case.title(),
                        message: "case was never scheduled".to_string(),
                    });
                };
                let (result, case_coverage) = self.judge(&case, prepared, outcome)?;
                coverage.merge(&case_coverage.filter_to(&source_root));
                cases.push(AnnotatedCase { case, result });
            }
            annotated.push(AnnotatedSuite {
                name: named.name,
                context: named.suite.context,
                cases,
            });
        }

        let evaluation = Evaluation {
            snapshot: SourceSnapshot::build(&self.index, &coverage),
            suites: annotated,
            coverage,
        };
        let summary = evaluation.summary();
        info!(
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            "evaluation finished"
        );
        Ok(evaluation)
    }

    /// Run `case` once with recording mocks and return the calls they saw as fixtures.
    ///
    /// The case's declared fixture targets are the types that get mocked; their scripted calls are
    /// ignored. Every call is recorded with a `null` result, ready to be filled in.
    pub async fn capture_fixtures(&self, suite_name: &str, index: usize, case: &Case) -> Result<Vec<Fixture>, EvaluationError> {
        let mut surfaces = self.surfaces.clone();
        self.reflection()
            .resolve(&self.external_types(std::iter::once(case)), &mut surfaces)
            .await;
        let dir_name = harness_dir_name(suite_name, index);
        let prepared = self.prepare_with(&surfaces, suite_name, &dir_name, case, MockMode::Record)?;
        let pool = WorkerPool::new(1, self.config.timeout);
        let outcome = pool
            .run(vec![prepared.job.clone()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| internal(case, "record pass produced no outcome"))?;

        let report = match outcome {
            ProcessOutcome::Exited { stdout, stderr, .. } => report::parse(&stdout)
                .map_err(|e| internal(case, &format!("{e}{}", stderr_suffix(&stderr))))?,
            ProcessOutcome::TimedOut(limit) => {
                return Err(internal(case, &format!("record pass timed out after {}s", limit.as_secs_f64())));
            }
            ProcessOutcome::SpawnFailed(message) => return Err(internal(case, &message)),
        };

        let mut agent = Agent::new(self.config.strictness);
        let mut instances = report
            .instances
            .iter()
            .map(|text| parse_identity(case, text))
            .collect::<Result<Vec<_>, _>>()?;
        instances.sort();
        for identity in &instances {
            agent.register(identity);
        }
        for call in report.calls {
            let identity = parse_identity(case, &call.identity)?;
            agent.record(&identity, &call.method, call.args);
        }
        Ok(agent.fixtures())
    }

    fn reflection(&self) -> ReflectionProvider {
        ReflectionProvider::new(&self.config.php, self.paths.autoload.clone(), &self.paths.project_root)
            .with_timeout(self.config.timeout)
    }

    /// Types the index cannot describe on its own: fixture targets outside the project and the
    /// outside ancestors of the ones inside it.
    fn external_types<'c>(&self, cases: impl IntoIterator<Item = &'c Case>) -> Vec<String> {
        let mut external: Vec<String> = Vec::new();
        for case in cases {
            for fixture in &case.fixtures {
                for name in self.index.external_types(&fixture.target) {
                    if !external.iter().any(|e| e.eq_ignore_ascii_case(&name)) {
                        external.push(name);
                    }
                }
            }
        }
        external
    }

    fn prepare(&mut self, suite_name: &str, dir_name: &str, case: &Case, mode: MockMode) -> Result<Prepared, EvaluationError> {
        for fixture in &case.fixtures {
            self.index.tag_type(&fixture.target, tags::REQUIRES_MOCK);
        }
        self.prepare_with(&self.surfaces, suite_name, dir_name, case, mode)
    }

    fn prepare_with(
        &self,
        surfaces: &SurfaceCache,
        suite_name: &str,
        dir_name: &str,
        case: &Case,
        mode: MockMode,
    ) -> Result<Prepared, EvaluationError> {
        let label = format!("{suite_name}: {}", case.title());
        let refs = parser::references_in(&case.subject, &case.context);
        let dependencies: Dependencies = self.index.dependencies(&refs, &case.context.namespace).into();

        let mut targets: Vec<&str> = Vec::new();
        for fixture in &case.fixtures {
            if !targets.iter().any(|t| t.eq_ignore_ascii_case(&fixture.target)) {
                targets.push(&fixture.target);
            }
        }
        for target in &targets {
            if !dependencies.types.iter().any(|t| t.eq_ignore_ascii_case(target)) {
                warn!(case = %label, target = %target, "fixture target is never referenced by the subject");
            }
        }

        let provider = self.index.with_external(surfaces);
        let mocks = targets
            .iter()
            .map(|target| crate::backend::build_for(&provider, target, mode))
            .collect::<Result<Vec<MockSource>, MockError>>()
            .map_err(|source| EvaluationError::Mock {
                case: label.clone(),
                source,
            })?;

        // Scripts are keyed by the mock's spelling of the type, which is what the harness reports.
        let fixtures: Vec<Fixture> = case
            .fixtures
            .iter()
            .map(|fixture| {
                let mut fixture = fixture.clone();
                if let Some(mock) = mocks.iter().find(|m| m.target.eq_ignore_ascii_case(&fixture.target)) {
                    fixture.target = mock.target.clone();
                }
                fixture
            })
            .collect();

        let plan = HarnessPlan {
            autoload: self.paths.autoload.clone(),
            mode,
            mocks,
            fixtures: fixtures.clone(),
            strictness: self.config.strictness,
            coverage: self.config.coverage && mode == MockMode::Replay,
        };
        let files = harness::assemble(case, &plan).map_err(|e| internal(case, &e.to_string()))?;
        let harness_dir = self.paths.cache_dir.join("harness").join(dir_name);
        let harness_path = files.write(&harness_dir).map_err(|source| EvaluationError::Io {
            case: label.clone(),
            source,
        })?;
        debug!(case = %label, dir = %harness_dir.display(), mocks = plan.mocks.len(), "harness written");

        let mut job = Job::new(label.clone(), &self.config.php, &self.paths.project_root)
            .arg("-d")
            .arg("display_errors=stderr")
            .arg("-d")
            .arg("error_reporting=-1");
        if plan.coverage {
            job = job.arg("-d").arg("xdebug.mode=coverage");
        }
        job = job.arg(OsString::from(harness_path));

        Ok(Prepared {
            label,
            harness_dir,
            fixtures,
            dependencies,
            job,
        })
    }

    /// Turn a finished process into a verdict plus the case's coverage.
    fn judge(
        &self,
        case: &Case,
        prepared: Prepared,
        outcome: ProcessOutcome,
    ) -> Result<(EvaluationResult, CoverageMap), EvaluationError> {
        let dependencies = prepared.dependencies;
        let errored = |error: ProcessError| {
            debug!(case = %prepared.label, %error, "process error");
            Ok((
                EvaluationResult {
                    actual: None,
                    verdict: Verdict::Error(error),
                    dependencies: dependencies.clone(),
                },
                CoverageMap::new(),
            ))
        };

        let (signal, stdout, stderr) = match outcome {
            ProcessOutcome::Exited {
                signal, stdout, stderr, ..
            } => (signal, stdout, stderr),
            ProcessOutcome::TimedOut(limit) => return errored(ProcessError::TimedOut { limit }),
            ProcessOutcome::SpawnFailed(message) => return errored(ProcessError::Spawn { message }),
        };

        let report = match (report::parse(&stdout), signal) {
            (Ok(report), _) => report,
            (Err(_), Some(signal)) => return errored(ProcessError::Crashed { signal, stderr }),
            (Err(e), None) => return Err(internal(case, &format!("{e}{}", stderr_suffix(&stderr)))),
        };
        if let Some(fatal) = &report.fatal {
            if is_generated(&fatal.file, &prepared.harness_dir) {
                return Err(internal(
                    case,
                    &format!("{} in {} on line {}", fatal.message, fatal.file, fatal.line),
                ));
            }
        }

        let violation = self.revalidate(case, &prepared.fixtures, &report)?;
        let actual = Actual {
            output: report.output,
            exception: report.exception,
            fatal: report.fatal,
        };
        let verdict = match violation {
            Some(violation) => Verdict::Fail(Failure::Protocol(violation)),
            None => match compare::compare(&case.expected, &actual) {
                Ok(()) => Verdict::Pass,
                Err(mismatch) => Verdict::Fail(Failure::Mismatch(mismatch)),
            },
        };
        debug!(case = %prepared.label, pass = verdict.is_pass(), "judged");
        Ok((
            EvaluationResult {
                actual: Some(actual),
                verdict,
                dependencies,
            },
            report.coverage,
        ))
    }

    /// Replay the harness's call trace against the scripts; the first violation wins.
    fn revalidate(
        &self,
        case: &Case,
        fixtures: &[Fixture],
        report: &HarnessReport,
    ) -> Result<Option<ProtocolViolation>, EvaluationError> {
        let mut agent = Agent::with_fixtures(fixtures, self.config.strictness);
        for call in &report.calls {
            let identity = parse_identity(case, &call.identity)?;
            if let Err(violation) = agent.replay(&identity, &call.method, call.args.clone()) {
                return Ok(Some(violation));
            }
        }
        Ok(agent.finish().err())
    }
}

fn parse_identity(case: &Case, text: &str) -> Result<Identity, EvaluationError> {
    Identity::parse(text).ok_or_else(|| internal(case, &format!("malformed mock identity `{text}`")))
}

fn internal(case: &Case, message: &str) -> EvaluationError {
    EvaluationError::Internal {
        case: case.title(),
        message: message.to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\n{stderr}")
    }
}

/// Whether `file` is one of the generated files in `dir` (the harness, not the subject).
fn is_generated(file: &str, dir: &Path) -> bool {
    let file = Path::new(file);
    file.file_name().is_some_and(|name| name == HARNESS_FILE)
        && file.parent().is_some_and(|parent| same_dir(parent, dir))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// `<suite>-<case number>`, the harness directory of one case.
fn harness_dir_name(suite_name: &str, index: usize) -> String {
    format!("{}-{}", sanitize(suite_name), index + 1)
}

/// [`harness_dir_name`], suffixed until no earlier case of the run uses it.
///
/// Compared case-insensitively, since the cache may live on a case-insensitive filesystem.
fn unique_dir_name(used: &mut BTreeSet<String>, suite_name: &str, index: usize) -> String {
    let base = harness_dir_name(suite_name, index);
    let mut name = base.clone();
    let mut attempt = 2;
    while !used.insert(name.to_ascii_lowercase()) {
        name = format!("{base}~{attempt}");
        attempt += 1;
    }
    name
}

/// Directory-safe form of a suite name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    if cleaned.is_empty() { "suite".to_string() } else { cleaned }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
