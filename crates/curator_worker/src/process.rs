//! Backend running jobs in child worker processes.
//!
//! Each slot owns one child process started from the configured command
//! line. Requests go to the child's stdin and responses come back on its
//! stdout, read by a dedicated thread so that the slot can wait with a
//! timeout. A child that times out is killed; one that exits is reported as
//! crashed. Either way the slot starts a fresh child before the next job.

use std::io::{BufReader, BufWriter};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{BackendFactory, WorkerBackend};
use crate::error::WorkerError;
use crate::job::{JobOutcome, JobRequest};
use crate::protocol::{read_frame, write_frame, Request, Response, WorkResult};

/// How long a freshly started worker has to answer the health check.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

struct RunningWorker {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    responses: Receiver<Result<Response, String>>,
}

/// A slot backend talking to one child worker process.
pub struct ProcessBackend {
    command: Vec<String>,
    slot: usize,
    worker: Option<RunningWorker>,
}

impl ProcessBackend {
    /// Starts a worker process from `command` (program followed by its
    /// arguments) and checks that it answers a ping.
    pub fn spawn(command: Vec<String>, slot: usize) -> Result<Self, WorkerError> {
        let mut backend = Self {
            command,
            slot,
            worker: None,
        };
        backend.start()?;
        Ok(backend)
    }

    fn start(&mut self) -> Result<(), WorkerError> {
        let spawn_error = |source| WorkerError::Spawn {
            command: self.command.join(" "),
            source,
        };
        let (program, args) = self.command.split_first().ok_or_else(|| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty worker command",
            ))
        })?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(WorkerError::Protocol {
                reason: "worker pipes unavailable".to_string(),
            });
        };

        let (tx, rx) = mpsc::channel();
        let reader_name = format!("curator-worker-io-{}", self.slot);
        std::thread::Builder::new()
            .name(reader_name)
            .spawn(move || {
                let mut reader = BufReader::new(stdout);
                loop {
                    let message = match read_frame::<_, Response>(&mut reader) {
                        Ok(Some(response)) => Ok(response),
                        Ok(None) => Err("worker closed its output".to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                    let stop = message.is_err();
                    if tx.send(message).is_err() || stop {
                        break;
                    }
                }
            })?;

        let mut worker = RunningWorker {
            child,
            stdin: BufWriter::new(stdin),
            responses: rx,
        };

        write_frame(&mut worker.stdin, &Request::Ping)?;
        match worker.responses.recv_timeout(PING_TIMEOUT) {
            Ok(Ok(Response::Pong)) => {}
            _ => {
                let _ = worker.child.kill();
                let _ = worker.child.wait();
                return Err(WorkerError::Unresponsive);
            }
        }

        info!(slot = self.slot, pid = worker.child.id(), "started worker process");
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.child.kill();
            let _ = worker.child.wait();
        }
    }

    fn crash_reason(worker: &mut RunningWorker, detail: &str) -> String {
        // Give the child a moment to finish exiting so the status is known.
        for _ in 0..10 {
            if let Ok(Some(status)) = worker.child.try_wait() {
                return format!("worker process exited ({status}): {detail}");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        format!("worker process failed: {detail}")
    }
}

impl WorkerBackend for ProcessBackend {
    fn run(&mut self, request: &JobRequest, timeout: Duration) -> JobOutcome {
        if self.worker.is_none() {
            if let Err(e) = self.start() {
                return JobOutcome::Crashed {
                    reason: e.to_string(),
                };
            }
        }
        let Some(worker) = self.worker.as_mut() else {
            return JobOutcome::Crashed {
                reason: "no worker process".to_string(),
            };
        };

        if let Err(e) = write_frame(&mut worker.stdin, &Request::Run(request.clone())) {
            let reason = Self::crash_reason(worker, &e.to_string());
            self.stop();
            return JobOutcome::Crashed { reason };
        }

        match worker.responses.recv_timeout(timeout) {
            Ok(Ok(Response::Done(WorkResult::Success(output_hash)))) => {
                JobOutcome::Success { output_hash }
            }
            Ok(Ok(Response::Done(WorkResult::Failure(log)))) => JobOutcome::Failure { log },
            Ok(Ok(Response::Pong)) => {
                self.stop();
                JobOutcome::Crashed {
                    reason: "worker answered a job with a pong".to_string(),
                }
            }
            Ok(Err(detail)) => {
                let reason = Self::crash_reason(worker, &detail);
                self.stop();
                JobOutcome::Crashed { reason }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let reason = Self::crash_reason(worker, "response channel closed");
                self.stop();
                JobOutcome::Crashed { reason }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(guid = %request.guid, slot = self.slot, "worker timed out, killing it");
                self.stop();
                JobOutcome::TimedOut
            }
        }
    }

    fn restart(&mut self) -> Result<(), WorkerError> {
        debug!(slot = self.slot, "restarting worker process");
        self.stop();
        self.start()
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        let exited = match self.worker.as_mut() {
            Some(worker) => {
                write_frame(&mut worker.stdin, &Request::Shutdown).is_ok()
                    && (0..50).any(|_| {
                        let done = matches!(worker.child.try_wait(), Ok(Some(_)));
                        if !done {
                            std::thread::sleep(Duration::from_millis(10));
                        }
                        done
                    })
            }
            None => false,
        };
        if exited {
            self.worker = None;
        } else {
            self.stop();
        }
    }
}

/// Creates [`ProcessBackend`]s from one command line.
pub struct ProcessBackendFactory {
    command: Vec<String>,
}

impl ProcessBackendFactory {
    /// Creates a factory that starts workers with `command`.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl BackendFactory for ProcessBackendFactory {
    fn create(&self, slot: usize) -> Result<Box<dyn WorkerBackend>, WorkerError> {
        Ok(Box::new(ProcessBackend::spawn(self.command.clone(), slot)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = ProcessBackend::spawn(vec!["/nonexistent/curator-worker".to_string()], 0)
            .err()
            .unwrap();
        assert!(matches!(err, WorkerError::Spawn { .. }));
    }

    #[test]
    fn empty_command_is_a_spawn_error() {
        let err = ProcessBackend::spawn(Vec::new(), 0).err().unwrap();
        assert!(matches!(err, WorkerError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn exiting_process_fails_health_check() {
        let result = ProcessBackend::spawn(vec!["true".to_string()], 0);
        assert!(result.is_err());
    }
}
