//! In-process backend running jobs on helper threads.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backend::{BackendFactory, JobExecutor, WorkerBackend};
use crate::error::WorkerError;
use crate::job::{JobOutcome, JobRequest};

/// Runs each job on a fresh helper thread so that a panic or a hang in the
/// executor only affects that job.
///
/// A timed-out helper thread cannot be killed; it is detached and its result
/// discarded whenever it eventually finishes.
pub struct ThreadBackend {
    executor: Arc<dyn JobExecutor>,
    slot: usize,
}

impl ThreadBackend {
    /// Creates a backend for `slot` running jobs on `executor`.
    pub fn new(executor: Arc<dyn JobExecutor>, slot: usize) -> Self {
        Self { executor, slot }
    }
}

impl WorkerBackend for ThreadBackend {
    fn run(&mut self, request: &JobRequest, timeout: Duration) -> JobOutcome {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::clone(&self.executor);
        let job = request.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("curator-job-{}", self.slot))
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| executor.execute(&job)));
                // The receiver is gone if the job timed out.
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return JobOutcome::Crashed {
                reason: format!("failed to start job thread: {e}"),
            };
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(output_hash))) => JobOutcome::Success { output_hash },
            Ok(Ok(Err(log))) => JobOutcome::Failure { log },
            Ok(Err(panic)) => JobOutcome::Crashed {
                reason: panic_message(panic.as_ref()),
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(guid = %request.guid, slot = self.slot, "job thread timed out, detaching it");
                JobOutcome::TimedOut
            }
            Err(RecvTimeoutError::Disconnected) => JobOutcome::Crashed {
                reason: "job thread exited without a result".to_string(),
            },
        }
    }

    fn restart(&mut self) -> Result<(), WorkerError> {
        // Every job already runs on a fresh thread.
        Ok(())
    }
}

/// Creates [`ThreadBackend`]s sharing one executor.
pub struct ThreadBackendFactory {
    executor: Arc<dyn JobExecutor>,
}

impl ThreadBackendFactory {
    /// Creates a factory for `executor`.
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self { executor }
    }
}

impl BackendFactory for ThreadBackendFactory {
    fn create(&self, slot: usize) -> Result<Box<dyn WorkerBackend>, WorkerError> {
        Ok(Box::new(ThreadBackend::new(Arc::clone(&self.executor), slot)))
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}
