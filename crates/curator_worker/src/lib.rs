//! Bounded, crash-isolated execution of transform jobs.
//!
//! The [`WorkerCoordinator`] owns a fixed number of slots, each driving one
//! [`WorkerBackend`]. Jobs wait in a priority queue (manual requests before
//! background batches) and at most one job per GUID is queued or running at a
//! time. Two backends are provided: [`ThreadBackend`] runs a [`JobExecutor`]
//! in-process with panic isolation, and [`ProcessBackend`] talks to child
//! processes running [`serve`] over length-prefixed frames on stdin/stdout.

#![warn(missing_docs)]

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod process;
pub mod protocol;
pub mod serve;
pub mod thread;

pub use backend::{BackendFactory, JobExecutor, WorkerBackend};
pub use coordinator::{CompletionCallback, WorkerCoordinator};
pub use error::WorkerError;
pub use job::{JobHandle, JobInput, JobKind, JobOutcome, JobRequest, Priority};
pub use process::{ProcessBackend, ProcessBackendFactory};
pub use protocol::{read_frame, write_frame, Request, Response, WorkResult};
pub use serve::serve;
pub use thread::{ThreadBackend, ThreadBackendFactory};
