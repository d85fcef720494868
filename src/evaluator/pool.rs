//! Bounded pool of harness processes.
//!
//! Every job is one fresh OS process. At most `workers` run at once; each gets the same wall-clock
//! limit and is killed when it runs out. Results come back in submission order no matter which
//! process finishes first.

use std::ffi::OsString;
use std::future::{self, Future};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time;
use tracing::debug;

/// One process to run.
#[derive(Debug, Clone)]
pub struct Job {
    /// Shown in logs.
    pub label: String,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl Job {
    pub fn new(label: impl Into<String>, program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// How a job's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited {
        /// `None` when the process was killed by a signal.
        code: Option<i32>,
        signal: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// Still running when the limit expired; the process was killed.
    TimedOut(Duration),
    SpawnFailed(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("run cancelled")]
    Cancelled,

    #[error("worker task failed: {0}")]
    Join(#[from] JoinError),
}

/// Runs [`Job`]s with bounded concurrency and a per-job timeout.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    /// Run every job to completion.
    pub async fn run(&self, jobs: Vec<Job>) -> Result<Vec<ProcessOutcome>, PoolError> {
        self.run_until(jobs, future::pending()).await
    }

    /// Run every job, unless `shutdown` completes first.
    ///
    /// ## Errors
    /// - [`PoolError::Cancelled`] when `shutdown` fired. Every child still running has been killed
    ///   by the time this returns.
    /// - [`PoolError::Join`] when a worker task panicked.
    pub async fn run_until<F>(&self, jobs: Vec<Job>, shutdown: F) -> Result<Vec<ProcessOutcome>, PoolError>
    where
        F: Future<Output = ()>,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut running = JoinSet::new();
        let mut results: Vec<Option<ProcessOutcome>> = vec![None; jobs.len()];

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            running.spawn(async move {
                // The semaphore is never closed, so a permit always arrives.
                let _permit = semaphore.acquire_owned().await.ok();
                (index, execute(job, timeout).await)
            });
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                joined = running.join_next() => match joined {
                    Some(joined) => {
                        let (index, outcome) = joined?;
                        results[index] = Some(outcome);
                    }
                    None => break,
                },
                () = &mut shutdown => {
                    running.abort_all();
                    // Dropping each aborted task drops its child, which kills it.
                    while running.join_next().await.is_some() {}
                    return Err(PoolError::Cancelled);
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|outcome| outcome.unwrap_or_else(|| ProcessOutcome::SpawnFailed("job never ran".to_string())))
            .collect())
    }
}

async fn execute(job: Job, timeout: Duration) -> ProcessOutcome {
    let mut command = Command::new(&job.program);
    command
        .args(&job.args)
        .current_dir(&job.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(job = %job.label, "starting");
    let started = Instant::now();
    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            debug!(job = %job.label, error = %e, "spawn failed");
            return ProcessOutcome::SpawnFailed(format!("{}: {e}", job.program.display()));
        }
    };

    match time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            debug!(job = %job.label, status = %output.status, elapsed_ms = started.elapsed().as_millis(), "finished");
            ProcessOutcome::Exited {
                code: output.status.code(),
                signal: signal_of(output.status),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        }
        Ok(Err(e)) => ProcessOutcome::SpawnFailed(e.to_string()),
        Err(_) => {
            debug!(job = %job.label, "timed out");
            ProcessOutcome::TimedOut(timeout)
        }
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}
