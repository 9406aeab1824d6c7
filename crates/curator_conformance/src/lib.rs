//! Conformance test helpers for the asset curator.
//!
//! Provides [`TestProject`], a curator over a temporary data directory with
//! in-process workers, and [`ScriptedManager`], a document manager whose
//! behavior is selected by file name: `Bad*` panics mid-transform, `Broken*`
//! reports a transform failure, everything else succeeds. A [`Gate`] lets a
//! test hold transforms in flight.

#![warn(missing_docs)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use curator_assets::TransformState;
use curator_common::Guid;
use curator_config::{ResolvedConfig, ResolvedDataDir};
use curator_core::{
    AssetCurator, AssetDocumentManager, CuratorEvent, ManagerRegistry, TransformContext,
    TransformFlags, TransformTicket,
};
use curator_diagnostics::{codes, LogEntry};
use curator_worker::JobOutcome;
use parking_lot::{Condvar, Mutex};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Alias of the single data directory.
pub const ALIAS: &str = "project";

/// Blocks transforms while closed.
#[derive(Default)]
pub struct Gate {
    closed: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    /// Makes transforms wait until [`open`](Self::open).
    pub fn close(&self) {
        *self.closed.lock() = true;
    }

    /// Lets waiting and future transforms run.
    pub fn open(&self) {
        *self.closed.lock() = false;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let mut closed = self.closed.lock();
        while *closed {
            self.changed.wait(&mut closed);
        }
    }
}

/// A document manager for `.ext` files with scripted failures.
pub struct ScriptedManager {
    extensions: Vec<String>,
    executions: AtomicUsize,
    /// Held closed to keep transforms in flight.
    pub gate: Gate,
}

impl ScriptedManager {
    /// Asset type name.
    pub const TYPE: &'static str = "asset";

    /// Creates the manager.
    pub fn new() -> Self {
        Self {
            extensions: vec!["ext".to_string()],
            executions: AtomicUsize::new(0),
            gate: Gate::default(),
        }
    }

    /// Number of transforms started so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetDocumentManager for ScriptedManager {
    fn asset_type(&self) -> &str {
        Self::TYPE
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn output_extension(&self) -> &str {
        "out"
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Vec<LogEntry>> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let name = ctx
            .request
            .input
            .abs_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if name.starts_with("Bad") {
            panic!("scripted crash in {name}");
        }
        self.gate.pass();
        if name.starts_with("Broken") {
            return Err(vec![LogEntry::error(codes::TRANSFORM_FAILED, "scripted failure")]);
        }
        Ok(ctx.source.to_vec())
    }
}

/// A curator over a temporary project with one data directory.
pub struct TestProject {
    /// The project directory. Data lives in `data/`, outputs in `.curator/`.
    pub dir: tempfile::TempDir,
    /// The curator.
    pub curator: Arc<AssetCurator>,
    /// The document manager for `.ext` files.
    pub manager: Arc<ScriptedManager>,
}

impl TestProject {
    /// Creates an empty project with three in-process workers.
    pub fn new() -> Self {
        Self::with_workers(3)
    }

    /// Creates an empty project with `workers` in-process worker slots.
    pub fn with_workers(workers: usize) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).expect("create data dir");

        let manager = Arc::new(ScriptedManager::new());
        let mut registry = ManagerRegistry::new();
        registry.register(manager.clone());

        let config = ResolvedConfig {
            name: "conformance".to_string(),
            project_root: dir.path().to_path_buf(),
            data_dirs: vec![ResolvedDataDir {
                root: data,
                alias: ALIAS.to_string(),
            }],
            output_dir: dir.path().join(".curator"),
            worker_count: workers,
            job_timeout: Duration::from_secs(60),
            worker_command: None,
            in_process_workers: true,
            asset_types: BTreeMap::new(),
        };
        let curator = AssetCurator::with_registry(config, registry).expect("open curator");
        Self {
            dir,
            curator,
            manager,
        }
    }

    /// Absolute path of a data-dir-relative file.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join("data").join(rel)
    }

    /// Writes a document, creating parent directories.
    pub fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, text).expect("write document");
        path
    }

    /// Writes a document declaring transform dependencies.
    pub fn write_with_deps(&self, rel: &str, deps: &[&str]) -> PathBuf {
        let list: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        self.write(
            rel,
            &format!("{{ \"transform_dependencies\": [{}] }}", list.join(", ")),
        )
    }

    /// Deletes a file.
    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path(rel)).expect("remove document");
    }

    /// Rescans, panicking on a fatal error.
    pub fn scan(&self) {
        self.curator.check_file_system().expect("scan");
    }

    /// Main GUID of an asset.
    pub fn guid(&self, rel: &str) -> Guid {
        self.try_guid(rel)
            .unwrap_or_else(|| panic!("no asset at {rel}"))
    }

    /// Main GUID of an asset, if it is known.
    pub fn try_guid(&self, rel: &str) -> Option<Guid> {
        self.curator
            .find_sub_asset(&format!("{ALIAS}/{rel}"))
            .map(|found| found.asset().guid())
    }

    /// Current transform state of an asset.
    pub fn state(&self, rel: &str) -> TransformState {
        self.curator
            .transform_state(self.guid(rel))
            .unwrap_or_else(|| panic!("no state for {rel}"))
    }

    /// Log entries of an asset.
    pub fn log(&self, rel: &str) -> Vec<LogEntry> {
        self.curator.asset_log(self.guid(rel))
    }

    /// Requests a background transform of an asset.
    pub fn submit(&self, rel: &str) -> TransformTicket {
        self.curator
            .transform_asset(self.guid(rel), TransformFlags::default())
            .expect("transform")
    }

    /// Transforms an asset and waits for the outcome.
    pub fn transform(&self, rel: &str) -> JobOutcome {
        match self.submit(rel) {
            TransformTicket::Queued(handle) => handle.wait(),
            other => panic!("{rel} was not queued: {other:?}"),
        }
    }

    /// Qualified path of an asset.
    pub fn qualified(rel: &str) -> String {
        format!("{ALIAS}/{rel}")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives every event published so far without blocking.
pub fn drain(rx: &mut broadcast::Receiver<CuratorEvent>) -> Vec<CuratorEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) => return events,
            Err(e) => panic!("event stream broken: {e}"),
        }
    }
}

/// State changes in `events` that concern `guid`.
pub fn state_changes(events: &[CuratorEvent], guid: Guid) -> Vec<(TransformState, TransformState)> {
    events
        .iter()
        .filter_map(|event| match event {
            CuratorEvent::StateChanged { guid: g, old, new } if *g == guid => Some((*old, *new)),
            _ => None,
        })
        .collect()
}
