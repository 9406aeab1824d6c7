//! Job requests, outcomes and handles.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use curator_common::{ContentHash, Guid};
use curator_diagnostics::LogEntry;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// What a job produces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum JobKind {
    /// The output artifact, and the thumbnail if the asset type has one.
    Transform,
    /// Only the thumbnail.
    Thumbnail,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Transform => write!(f, "transform"),
            JobKind::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// Scheduling priority. Higher values are picked first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Priority {
    /// Part of a batch such as "transform all".
    Background,
    /// Requested explicitly for one asset.
    Manual,
}

/// Everything a worker needs to run a job without access to curator state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInput {
    /// Qualified path of the asset.
    pub asset_path: String,
    /// Absolute path of the asset document.
    pub abs_path: PathBuf,
    /// Asset type name.
    pub asset_type: String,
    /// Name of the platform profile.
    pub profile_name: String,
    /// Platform of the profile.
    pub platform: String,
    /// Where to write the output artifact.
    pub output_path: PathBuf,
    /// Where to write the thumbnail, if the asset type has one.
    pub thumbnail_path: Option<PathBuf>,
    /// Dependency hash to record in the artifact header.
    pub asset_hash: ContentHash,
    /// Thumbnail hash to record in the thumbnail header.
    pub thumbnail_hash: ContentHash,
    /// Package hash to record in the artifact header.
    pub package_hash: ContentHash,
    /// Absolute paths of the resolved transform dependencies.
    pub dependencies: Vec<PathBuf>,
}

/// A job for one sub-asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Main GUID of the asset.
    pub guid: Guid,
    /// What to produce.
    pub kind: JobKind,
    /// Index of the platform profile.
    pub profile: usize,
    /// Scheduling priority.
    pub priority: Priority,
    /// Inputs for the worker.
    pub input: JobInput,
}

/// How a job ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// The output was written. Carries the hash recorded in its header.
    Success {
        /// Hash stored in the written artifact's header.
        output_hash: ContentHash,
    },
    /// The transform reported a failure.
    Failure {
        /// Entries describing the failure.
        log: Vec<LogEntry>,
    },
    /// The worker died while running the job.
    Crashed {
        /// What is known about the crash.
        reason: String,
    },
    /// The worker did not finish within the job timeout.
    TimedOut,
    /// The job was dropped from the queue before it ran.
    Cancelled,
}

impl JobOutcome {
    /// Returns `true` for [`JobOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

struct HandleInner {
    id: u64,
    guid: Guid,
    outcome: Mutex<Option<JobOutcome>>,
    done: Condvar,
}

/// Shared handle to a submitted job.
///
/// Submitting a GUID that is already queued or running returns a clone of
/// the existing handle.
#[derive(Clone)]
pub struct JobHandle {
    inner: Arc<HandleInner>,
}

impl JobHandle {
    pub(crate) fn new(id: u64, guid: Guid) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                guid,
                outcome: Mutex::new(None),
                done: Condvar::new(),
            }),
        }
    }

    /// Unique id of the job.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// GUID the job runs for.
    pub fn guid(&self) -> Guid {
        self.inner.guid
    }

    /// Returns the outcome if the job has finished.
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.inner.outcome.lock().clone()
    }

    /// Returns `true` once the job has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.outcome.lock().is_some()
    }

    /// Blocks until the job finishes.
    pub fn wait(&self) -> JobOutcome {
        let mut outcome = self.inner.outcome.lock();
        loop {
            if let Some(done) = outcome.as_ref() {
                return done.clone();
            }
            self.inner.done.wait(&mut outcome);
        }
    }

    /// Blocks until the job finishes or `timeout` passes.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        let mut outcome = self.inner.outcome.lock();
        if outcome.is_none() {
            self.inner.done.wait_while_for(&mut outcome, |o| o.is_none(), timeout);
        }
        outcome.clone()
    }

    pub(crate) fn complete(&self, result: JobOutcome) {
        *self.inner.outcome.lock() = Some(result);
        self.inner.done.notify_all();
    }

    /// Returns `true` if both handles refer to the same job.
    pub fn same_job(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.inner.id)
            .field("guid", &self.inner.guid)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_outranks_background() {
        assert!(Priority::Manual > Priority::Background);
    }

    #[test]
    fn handle_completes_once_waited() {
        let handle = JobHandle::new(1, Guid::from_u128(5));
        assert!(handle.try_outcome().is_none());
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);

        let waiter = handle.clone();
        let t = std::thread::spawn(move || waiter.wait());
        handle.complete(JobOutcome::TimedOut);
        assert_eq!(t.join().unwrap(), JobOutcome::TimedOut);
        assert!(handle.is_finished());
    }

    #[test]
    fn clones_are_the_same_job() {
        let a = JobHandle::new(1, Guid::from_u128(5));
        let b = a.clone();
        let c = JobHandle::new(2, Guid::from_u128(5));
        assert!(a.same_job(&b));
        assert!(!a.same_job(&c));
    }
}
