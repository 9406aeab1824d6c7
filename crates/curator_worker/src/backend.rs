//! Traits connecting the coordinator to whatever runs the jobs.

use std::time::Duration;

use curator_common::ContentHash;
use curator_diagnostics::LogEntry;

use crate::error::WorkerError;
use crate::job::{JobOutcome, JobRequest};

/// Performs the actual transform work for a job.
///
/// Implemented by the curator's transform runner and called either directly
/// on a [`ThreadBackend`](crate::ThreadBackend) helper thread or inside a
/// worker process by [`serve`](crate::serve). Implementations may panic; the
/// backends turn a panic into a crashed job.
pub trait JobExecutor: Send + Sync {
    /// Runs the job, returning the hash written into the output header or
    /// the log entries describing why it failed.
    fn execute(&self, request: &JobRequest) -> Result<ContentHash, Vec<LogEntry>>;
}

/// One worker slot's connection to an executing worker.
pub trait WorkerBackend: Send {
    /// Runs one job, waiting at most `timeout` for it to finish.
    ///
    /// Never returns an error: crashes and timeouts are outcomes.
    fn run(&mut self, request: &JobRequest, timeout: Duration) -> JobOutcome;

    /// Replaces the worker after a crash or timeout.
    fn restart(&mut self) -> Result<(), WorkerError>;
}

/// Creates backends, one per slot.
pub trait BackendFactory: Send + Sync {
    /// Creates the backend for slot `slot`.
    fn create(&self, slot: usize) -> Result<Box<dyn WorkerBackend>, WorkerError>;
}
