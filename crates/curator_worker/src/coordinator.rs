//! Priority queue and slot threads dispatching jobs to backends.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use curator_common::Guid;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::backend::{BackendFactory, WorkerBackend};
use crate::job::{JobHandle, JobKind, JobOutcome, JobRequest, Priority};

/// Called on the slot thread after every job, before its handle completes.
pub type CompletionCallback = Arc<dyn Fn(&JobRequest, &JobOutcome) + Send + Sync>;

/// Heap entry. Stale entries (superseded by a re-prioritized submission or
/// cancelled) are skipped when popped.
#[derive(PartialEq, Eq)]
struct Queued {
    priority: Priority,
    seq: u64,
    guid: Guid,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then FIFO.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Entry {
    request: JobRequest,
    handle: JobHandle,
    seq: u64,
    running: bool,
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Queued>,
    jobs: HashMap<Guid, Entry>,
    next_seq: u64,
    next_id: u64,
    running: usize,
    executed: u64,
    shutdown: bool,
}

impl QueueState {
    fn pop_runnable(&mut self) -> Option<(JobRequest, JobHandle)> {
        while let Some(queued) = self.heap.pop() {
            let Some(entry) = self.jobs.get_mut(&queued.guid) else {
                continue;
            };
            if entry.running || entry.seq != queued.seq {
                continue;
            }
            entry.running = true;
            self.running += 1;
            return Some((entry.request.clone(), entry.handle.clone()));
        }
        None
    }
}

struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
    timeout: Duration,
    on_complete: CompletionCallback,
}

/// Runs jobs on a fixed number of worker slots.
///
/// Guarantees at most one queued or running job per GUID: submitting a GUID
/// that is already known returns the existing [`JobHandle`]. Crashed and
/// timed-out jobs are not retried; the slot restarts its backend and moves
/// on to the next job.
pub struct WorkerCoordinator {
    shared: Arc<Shared>,
    slots: Vec<JoinHandle<()>>,
}

impl WorkerCoordinator {
    /// Starts `slot_count` slots, each with a backend from `factory`.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        slot_count: usize,
        timeout: Duration,
        on_complete: CompletionCallback,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            timeout,
            on_complete,
        });
        let slot_count = slot_count.max(1);
        let slots = (0..slot_count)
            .filter_map(|slot| {
                let shared = Arc::clone(&shared);
                let factory = Arc::clone(&factory);
                std::thread::Builder::new()
                    .name(format!("curator-slot-{slot}"))
                    .spawn(move || slot_loop(&shared, factory.as_ref(), slot))
                    .map_err(|e| error!(slot, error = %e, "failed to start worker slot"))
                    .ok()
            })
            .collect();
        info!(slots = slot_count, ?timeout, "worker coordinator started");
        Self { shared, slots }
    }

    /// Queues a job, or returns the handle of the job already queued or
    /// running for the same GUID.
    ///
    /// A duplicate submission for a job that has not started yet updates its
    /// inputs, raises its priority if the new one is higher, and upgrades a
    /// thumbnail job to a full transform.
    pub fn submit(&self, request: JobRequest) -> JobHandle {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if state.shutdown {
            let handle = JobHandle::new(state.next_id, request.guid);
            state.next_id += 1;
            handle.complete(JobOutcome::Cancelled);
            return handle;
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        if let Some(entry) = state.jobs.get_mut(&request.guid) {
            let handle = entry.handle.clone();
            if !entry.running {
                let raise = request.priority > entry.request.priority;
                let kind = if entry.request.kind == JobKind::Transform {
                    JobKind::Transform
                } else {
                    request.kind
                };
                let priority = entry.request.priority.max(request.priority);
                entry.request = JobRequest {
                    kind,
                    priority,
                    ..request
                };
                if raise {
                    entry.seq = seq;
                    let guid = entry.request.guid;
                    state.heap.push(Queued {
                        priority,
                        seq,
                        guid,
                    });
                    self.shared.available.notify_one();
                }
            }
            debug!(guid = %handle.guid(), "coalesced duplicate job submission");
            return handle;
        }

        let handle = JobHandle::new(state.next_id, request.guid);
        state.next_id += 1;
        state.heap.push(Queued {
            priority: request.priority,
            seq,
            guid: request.guid,
        });
        debug!(guid = %request.guid, kind = %request.kind, priority = ?request.priority, "queued job");
        state.jobs.insert(
            request.guid,
            Entry {
                request,
                handle: handle.clone(),
                seq,
                running: false,
            },
        );
        self.shared.available.notify_one();
        handle
    }

    /// Drops a job that has not started yet. Returns `false` if the GUID has
    /// no queued job or the job is already running.
    pub fn cancel_queued(&self, guid: Guid) -> bool {
        let mut state = self.shared.state.lock();
        match state.jobs.get(&guid) {
            Some(entry) if !entry.running => {}
            _ => return false,
        }
        let Some(entry) = state.jobs.remove(&guid) else {
            return false;
        };
        drop(state);
        entry.handle.complete(JobOutcome::Cancelled);
        self.shared.idle.notify_all();
        true
    }

    /// Number of jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        let state = self.shared.state.lock();
        state.jobs.len() - state.running
    }

    /// Number of jobs currently running.
    pub fn running(&self) -> usize {
        self.shared.state.lock().running
    }

    /// Total number of jobs handed to a backend so far.
    pub fn executed(&self) -> u64 {
        self.shared.state.lock().executed
    }

    /// Number of worker slots.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Blocks until no job is queued or running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !state.jobs.is_empty() {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Blocks until no job is queued or running, or `timeout` passes.
    /// Returns `true` if the coordinator became idle.
    pub fn wait_idle_for(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if !state.jobs.is_empty() {
            self.shared
                .idle
                .wait_while_for(&mut state, |s| !s.jobs.is_empty(), timeout);
        }
        state.jobs.is_empty()
    }

    /// Cancels every queued job, lets running jobs finish and stops the slots.
    pub fn shutdown(&mut self) {
        let cancelled: Vec<JobHandle> = {
            let mut state = self.shared.state.lock();
            if state.shutdown && self.slots.is_empty() {
                return;
            }
            state.shutdown = true;
            let queued: Vec<Guid> = state
                .jobs
                .iter()
                .filter(|(_, e)| !e.running)
                .map(|(g, _)| *g)
                .collect();
            queued
                .into_iter()
                .filter_map(|g| state.jobs.remove(&g))
                .map(|e| e.handle)
                .collect()
        };
        for handle in cancelled {
            handle.complete(JobOutcome::Cancelled);
        }
        self.shared.available.notify_all();
        let current = std::thread::current().id();
        for slot in self.slots.drain(..) {
            // Dropping the last owner from a completion callback runs this on
            // a slot thread, which must not join itself.
            if slot.thread().id() == current {
                continue;
            }
            if slot.join().is_err() {
                error!("worker slot thread panicked");
            }
        }
        self.shared.idle.notify_all();
        debug!("worker coordinator stopped");
    }
}

impl Drop for WorkerCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn slot_loop(shared: &Shared, factory: &dyn BackendFactory, slot: usize) {
    let mut backend: Option<Box<dyn WorkerBackend>> = None;
    loop {
        let (request, handle) = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if let Some(job) = state.pop_runnable() {
                    state.executed += 1;
                    break job;
                }
                shared.available.wait(&mut state);
            }
        };

        if backend.is_none() {
            match factory.create(slot) {
                Ok(created) => backend = Some(created),
                Err(e) => error!(slot, error = %e, "failed to start worker backend"),
            }
        }
        let outcome = match backend.as_mut() {
            Some(backend) => backend.run(&request, shared.timeout),
            None => JobOutcome::Crashed {
                reason: "worker backend could not be started".to_string(),
            },
        };

        if matches!(outcome, JobOutcome::Crashed { .. } | JobOutcome::TimedOut) {
            warn!(slot, guid = %request.guid, ?outcome, "job did not complete, restarting worker");
            if let Some(b) = backend.as_mut() {
                if let Err(e) = b.restart() {
                    error!(slot, error = %e, "failed to restart worker backend");
                    backend = None;
                }
            }
        }

        (shared.on_complete)(&request, &outcome);
        {
            let mut state = shared.state.lock();
            state.jobs.remove(&request.guid);
            state.running -= 1;
        }
        handle.complete(outcome);
        shared.idle.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::tests::{request, ScriptedExecutor};
    use crate::thread::ThreadBackendFactory;
    use crate::JobExecutor;
    use curator_common::ContentHash;
    use curator_diagnostics::LogEntry;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::mpsc;

    fn coordinator(
        executor: Arc<dyn JobExecutor>,
        slots: usize,
        timeout: Duration,
    ) -> (WorkerCoordinator, Arc<Mutex<Vec<(Guid, JobOutcome)>>>) {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        let callback: CompletionCallback = Arc::new(move |req, outcome| {
            sink.lock().push((req.guid, outcome.clone()));
        });
        let factory = Arc::new(ThreadBackendFactory::new(executor));
        (
            WorkerCoordinator::new(factory, slots, timeout, callback),
            completed,
        )
    }

    /// Counts executions and blocks each one until released.
    struct GatedExecutor {
        runs: AtomicUsize,
        gate: Mutex<mpsc::Receiver<()>>,
    }

    impl JobExecutor for GatedExecutor {
        fn execute(&self, request: &JobRequest) -> Result<ContentHash, Vec<LogEntry>> {
            self.runs.fetch_add(1, AtomicOrdering::SeqCst);
            let _ = self.gate.lock().recv_timeout(Duration::from_secs(5));
            Ok(request.input.asset_hash)
        }
    }

    #[test]
    fn runs_jobs_and_invokes_callback() {
        let (coord, completed) = coordinator(Arc::new(ScriptedExecutor), 2, Duration::from_secs(5));
        let a = coord.submit(request("a.mesh"));
        let b = coord.submit(request("fail.mesh"));
        assert!(a.wait().is_success());
        assert!(matches!(b.wait(), JobOutcome::Failure { .. }));
        coord.wait_idle();
        assert_eq!(completed.lock().len(), 2);
        assert_eq!(coord.executed(), 2);
        assert_eq!(coord.queued(), 0);
    }

    #[test]
    fn duplicate_submission_is_coalesced() {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(GatedExecutor {
            runs: AtomicUsize::new(0),
            gate: Mutex::new(rx),
        });
        let (coord, _) = coordinator(executor.clone(), 1, Duration::from_secs(10));

        let first = coord.submit(request("a.mesh"));
        let second = coord.submit(request("a.mesh"));
        assert!(first.same_job(&second));

        tx.send(()).unwrap();
        assert!(first.wait().is_success());
        coord.wait_idle();
        assert_eq!(executor.runs.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(coord.executed(), 1);
    }

    #[test]
    fn resubmission_after_completion_runs_again() {
        let (coord, _) = coordinator(Arc::new(ScriptedExecutor), 1, Duration::from_secs(5));
        let first = coord.submit(request("a.mesh"));
        first.wait();
        coord.wait_idle();
        let second = coord.submit(request("a.mesh"));
        assert!(!first.same_job(&second));
        second.wait();
        assert_eq!(coord.executed(), 2);
    }

    #[test]
    fn manual_jobs_jump_the_queue() {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(GatedExecutor {
            runs: AtomicUsize::new(0),
            gate: Mutex::new(rx),
        });
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&order);
        let callback: CompletionCallback = Arc::new(move |req, _| {
            sink.lock().push(req.input.asset_path.clone());
        });
        let coord = WorkerCoordinator::new(
            Arc::new(ThreadBackendFactory::new(executor.clone())),
            1,
            Duration::from_secs(10),
            callback,
        );

        // Occupy the single slot, then queue background before manual.
        let blocker = coord.submit(request("blocker.mesh"));
        while executor.runs.load(AtomicOrdering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        coord.submit(request("background.mesh"));
        let mut manual = request("manual.mesh");
        manual.priority = Priority::Manual;
        coord.submit(manual);

        for _ in 0..3 {
            tx.send(()).unwrap();
        }
        blocker.wait();
        coord.wait_idle();
        assert_eq!(
            *order.lock(),
            vec!["blocker.mesh", "manual.mesh", "background.mesh"]
        );
    }

    #[test]
    fn crash_does_not_affect_other_jobs() {
        let (coord, completed) = coordinator(Arc::new(ScriptedExecutor), 2, Duration::from_secs(5));
        let bad = coord.submit(request("panic.mesh"));
        let good: Vec<JobHandle> = (0..4)
            .map(|i| coord.submit(request(&format!("ok{i}.mesh"))))
            .collect();
        assert!(matches!(bad.wait(), JobOutcome::Crashed { .. }));
        for handle in good {
            assert!(handle.wait().is_success());
        }
        coord.wait_idle();
        assert_eq!(completed.lock().len(), 5);
    }

    #[test]
    fn timeout_is_reported_and_not_retried() {
        let (coord, completed) =
            coordinator(Arc::new(ScriptedExecutor), 1, Duration::from_millis(20));
        let handle = coord.submit(request("hang.mesh"));
        assert_eq!(handle.wait(), JobOutcome::TimedOut);
        coord.wait_idle();
        assert_eq!(coord.executed(), 1);
        assert_eq!(completed.lock().len(), 1);
    }

    #[test]
    fn cancel_queued_job() {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(GatedExecutor {
            runs: AtomicUsize::new(0),
            gate: Mutex::new(rx),
        });
        let (coord, _) = coordinator(executor.clone(), 1, Duration::from_secs(10));
        let running = coord.submit(request("a.mesh"));
        while executor.runs.load(AtomicOrdering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let queued = coord.submit(request("b.mesh"));
        assert!(coord.cancel_queued(queued.guid()));
        assert!(!coord.cancel_queued(running.guid()));
        assert_eq!(queued.wait(), JobOutcome::Cancelled);
        tx.send(()).unwrap();
        running.wait();
        coord.wait_idle();
        assert_eq!(executor.runs.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn shutdown_cancels_queued_jobs() {
        let (tx, rx) = mpsc::channel();
        let executor = Arc::new(GatedExecutor {
            runs: AtomicUsize::new(0),
            gate: Mutex::new(rx),
        });
        let (mut coord, _) = coordinator(executor.clone(), 1, Duration::from_secs(10));
        let running = coord.submit(request("a.mesh"));
        while executor.runs.load(AtomicOrdering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let queued = coord.submit(request("b.mesh"));
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            tx.send(()).unwrap();
        });
        coord.shutdown();
        releaser.join().unwrap();
        assert!(running.wait().is_success());
        assert_eq!(queued.wait(), JobOutcome::Cancelled);
        assert_eq!(coord.submit(request("c.mesh")).wait(), JobOutcome::Cancelled);
    }
}
