//! The curator facade composing database, graph, state engine and workers.
//!
//! All mutable bookkeeping lives in one [`CuratorState`] behind a single
//! mutex. Critical sections are short: hashing, document parsing and
//! artifact I/O happen outside the lock, and events collected while it was
//! held are published only after it is released.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use curator_assets::{
    AssetDatabase, AssetInfo, DependencyGraph, DependencyKind, NewAsset, SubAsset, TransformState,
};
use curator_cache::{ArtifactStore, ChangeSet, HashCache, HashManifest, THUMBNAIL_DIR};
use curator_common::{AssetKey, ContentHash, Guid, Status};
use curator_config::{
    load_config, resolve_config, ConfigError, PlatformProfile, ProfileSet, ResolvedConfig,
    ResolvedDataDir,
};
use curator_diagnostics::{codes, Category, LogEntry};
use curator_worker::{
    BackendFactory, CompletionCallback, JobHandle, JobInput, JobKind, JobOutcome, JobRequest,
    Priority, ProcessBackendFactory, ThreadBackendFactory, WorkerCoordinator,
};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::dgml::dependency_subgraph;
use crate::error::CuratorError;
use crate::events::{CuratorEvent, EventBus};
use crate::hashing::{compute_hashes, dependency_files, output_relative_path, sub_asset_output_path};
use crate::registry::ManagerRegistry;
use crate::resolver::DataDirResolver;
use crate::runner::TransformRunner;
use crate::state::{
    dependency_levels, EvalContext, Refreshed, TransformStateEngine, FALLBACK_OUTPUT_EXTENSION,
};
use crate::tables::{read_table, table_path, write_table};

const CURATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
const EVENT_CAPACITY: usize = 1024;

/// Options for [`AssetCurator::transform_asset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformFlags {
    /// Transform even if the artifact is current.
    pub force: bool,
    /// Requested explicitly by a user. Jumps the queue and clears a sticky
    /// transform error.
    pub manual: bool,
}

/// What [`AssetCurator::transform_asset`] did.
#[derive(Debug, Clone)]
pub enum TransformTicket {
    /// Nothing to do.
    UpToDate,
    /// The asset cannot be transformed in its current state.
    Blocked(TransformState),
    /// A job was queued, or an identical one was already in flight.
    Queued(JobHandle),
}

/// A change reported by a file-system watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// A file appeared.
    Added(PathBuf),
    /// A file's content changed.
    Changed(PathBuf),
    /// A file disappeared.
    Removed(PathBuf),
}

impl FileEvent {
    /// The affected path.
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Added(p) | FileEvent::Changed(p) | FileEvent::Removed(p) => p,
        }
    }
}

struct CuratorState {
    db: AssetDatabase,
    graph: DependencyGraph,
    states: TransformStateEngine,
    profiles: ProfileSet,
    /// Hashes of asset files as last integrated.
    known_assets: HashMap<PathBuf, ContentHash>,
    /// Hashes of referenced plain files as last integrated.
    known_files: HashMap<PathBuf, ContentHash>,
}

#[derive(Default)]
struct Observation {
    assets: HashMap<PathBuf, ContentHash>,
    known_assets: HashMap<PathBuf, ContentHash>,
    files: HashMap<PathBuf, ContentHash>,
    known_files: HashMap<PathBuf, ContentHash>,
}

struct LoadedAsset {
    abs_path: PathBuf,
    path: String,
    data_dir: String,
    asset_type: String,
    content_hash: ContentHash,
    document: curator_assets::AssetDocument,
    warnings: Vec<LogEntry>,
}

enum Next {
    Done(TransformTicket),
    Submit(JobRequest),
    Import,
}

/// The asset curator.
///
/// Owned through an `Arc`; the worker completion callback holds only a weak
/// reference, so dropping the last `Arc` shuts the worker slots down.
pub struct AssetCurator {
    config: ResolvedConfig,
    registry: Arc<ManagerRegistry>,
    hashes: HashCache,
    artifacts: ArtifactStore,
    state: Mutex<CuratorState>,
    scan: Mutex<()>,
    coordinator: WorkerCoordinator,
    events: EventBus,
}

impl AssetCurator {
    /// Opens the project at `project_root` using its `curator.toml`.
    pub fn open(project_root: &Path) -> Result<Arc<Self>, CuratorError> {
        let config = load_config(project_root)?;
        let resolved = resolve_config(&config, project_root);
        let registry = ManagerRegistry::from_config(&resolved.asset_types);
        Self::with_registry(resolved, registry)
    }

    /// Creates a curator with an explicit set of document managers.
    pub fn with_registry(
        config: ResolvedConfig,
        registry: ManagerRegistry,
    ) -> Result<Arc<Self>, CuratorError> {
        std::fs::create_dir_all(&config.output_dir)
            .map_err(|e| CuratorError::io(&config.output_dir, e))?;

        let profiles = ProfileSet::load(&config.output_dir).unwrap_or_else(|e| {
            warn!(error = %e, "cannot load platform profiles, recreating the default profile");
            ProfileSet::new()
        });
        if let Err(e) = profiles.save(&config.output_dir) {
            warn!(error = %e, "cannot save platform profiles");
        }

        let hashes = HashCache::new();
        match HashManifest::load(&config.output_dir) {
            Some(manifest) if manifest.is_compatible(CURATOR_VERSION) => {
                debug!(files = manifest.files.len(), "restored file hash cache");
                manifest.restore_into(&hashes);
            }
            Some(_) => info!("hash cache was written by another curator version, rehashing"),
            None => {}
        }

        let registry = Arc::new(registry);
        let artifacts = ArtifactStore::new(&config.output_dir);
        let factory = backend_factory(&config, &registry, &artifacts)?;

        let curator = Arc::new_cyclic(|weak: &Weak<AssetCurator>| {
            let weak = weak.clone();
            let on_complete: CompletionCallback =
                Arc::new(move |request: &JobRequest, outcome: &JobOutcome| {
                    if let Some(curator) = weak.upgrade() {
                        curator.job_completed(request, outcome);
                    }
                });
            let coordinator = WorkerCoordinator::new(
                factory,
                config.worker_count,
                config.job_timeout,
                on_complete,
            );
            AssetCurator {
                config,
                registry,
                hashes,
                artifacts,
                state: Mutex::new(CuratorState {
                    db: AssetDatabase::new(),
                    graph: DependencyGraph::new(),
                    states: TransformStateEngine::new(),
                    profiles,
                    known_assets: HashMap::new(),
                    known_files: HashMap::new(),
                }),
                scan: Mutex::new(()),
                coordinator,
                events: EventBus::new(EVENT_CAPACITY),
            }
        });
        info!(
            project = %curator.config.name,
            data_dirs = curator.config.data_dirs.len(),
            workers = curator.config.worker_count,
            "asset curator opened"
        );
        Ok(curator)
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// The document managers.
    pub fn registry(&self) -> &ManagerRegistry {
        &self.registry
    }

    // ----------------------------------------------------------------------
    // Scanning
    // ----------------------------------------------------------------------

    /// Rescans every data directory and integrates what changed.
    ///
    /// A directory that cannot be read keeps its previously known assets and
    /// degrades the result to [`Status::Warning`]. If no directory can be
    /// read at all, nothing changes and [`CuratorError::NoDataDirectory`] is
    /// returned.
    pub fn check_file_system(&self) -> Result<Status, CuratorError> {
        let _scan = self.scan.lock();
        let mut status = Status::Success;

        let mut found = Vec::new();
        let mut failed_roots = Vec::new();
        for dir in &self.config.data_dirs {
            match self.walk_data_dir(dir) {
                Ok(files) => found.extend(files),
                Err(e) => {
                    warn!(dir = %dir.root.display(), error = %e, "cannot scan data directory");
                    failed_roots.push(dir.root.clone());
                }
            }
        }
        if !self.config.data_dirs.is_empty() && failed_roots.len() == self.config.data_dirs.len() {
            error!("no data directory could be scanned");
            return Err(CuratorError::NoDataDirectory { dirs: failed_roots });
        }
        if !failed_roots.is_empty() {
            status = Status::Warning;
        }

        let (mut known_assets, known_files, referenced) = {
            let state = self.state.lock();
            let referenced: Vec<PathBuf> =
                state.graph.referenced_files().map(Path::to_path_buf).collect();
            (state.known_assets.clone(), state.known_files.clone(), referenced)
        };
        known_assets.retain(|path, _| !failed_roots.iter().any(|root| path.starts_with(root)));
        let referenced: Vec<PathBuf> = referenced.into_iter().filter(|p| p.is_file()).collect();

        let observation = Observation {
            assets: self.hash_paths(&found),
            known_assets,
            files: self.hash_paths(&referenced),
            known_files,
        };
        status = status.worst(self.integrate(observation));
        info!(assets = found.len(), %status, "file system check finished");
        Ok(status)
    }

    /// Runs [`check_file_system`](Self::check_file_system) on the shared
    /// thread pool.
    pub fn spawn_check_file_system(
        self: &Arc<Self>,
    ) -> oneshot::Receiver<Result<Status, CuratorError>> {
        let (tx, rx) = oneshot::channel();
        let curator = Arc::clone(self);
        rayon::spawn(move || {
            let _ = tx.send(curator.check_file_system());
        });
        rx
    }

    /// Integrates a single watcher event. The file is re-read from disk, so
    /// the kind of event only matters for logging.
    pub fn handle_file_event(&self, event: &FileEvent) -> Result<Status, CuratorError> {
        let _scan = self.scan.lock();
        let path = event.path();
        debug!(?event, "file event");
        self.hashes.invalidate(path);

        let (known_asset, known_file, referenced) = {
            let state = self.state.lock();
            let referenced = state.graph.file_users(path).next().is_some();
            (
                state.known_assets.get(path).copied(),
                state.known_files.get(path).copied(),
                referenced,
            )
        };

        let mut observation = Observation::default();
        if self.is_asset_path(path) {
            if path.is_file() {
                observation
                    .assets
                    .insert(path.to_path_buf(), self.hashes.file_hash(path).hash);
            }
            if let Some(hash) = known_asset {
                observation.known_assets.insert(path.to_path_buf(), hash);
            }
        } else if referenced || known_file.is_some() {
            if path.is_file() {
                observation
                    .files
                    .insert(path.to_path_buf(), self.hashes.file_hash(path).hash);
            }
            if let Some(hash) = known_file {
                observation.known_files.insert(path.to_path_buf(), hash);
            }
        }
        Ok(self.integrate(observation))
    }

    /// Forgets every asset and rescans from scratch. Observers receive
    /// [`CuratorEvent::AssetListReset`] first.
    pub fn reset_asset_list(&self) -> Result<Status, CuratorError> {
        {
            let _scan = self.scan.lock();
            let mut state = self.state.lock();
            state.db.clear();
            state.graph = DependencyGraph::new();
            state.states = TransformStateEngine::new();
            state.known_assets.clear();
            state.known_files.clear();
        }
        self.events.publish(CuratorEvent::AssetListReset);
        self.check_file_system()
    }

    fn walk_data_dir(&self, dir: &ResolvedDataDir) -> Result<Vec<PathBuf>, CuratorError> {
        std::fs::read_dir(&dir.root).map_err(|e| CuratorError::io(&dir.root, e))?;
        let output_dir = &self.config.output_dir;
        let mut files = Vec::new();
        let walker = WalkDir::new(&dir.root).into_iter().filter_entry(|entry| {
            entry.depth() == 0
                || (!entry.file_name().to_string_lossy().starts_with('.')
                    && entry.path() != output_dir.as_path())
        });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.root.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && self.registry.is_asset_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn hash_paths(&self, paths: &[PathBuf]) -> HashMap<PathBuf, ContentHash> {
        self.hashes
            .hash_files(paths)
            .into_iter()
            .map(|(path, hash)| (path, hash.hash))
            .collect()
    }

    fn data_dir_of(&self, path: &Path) -> Option<&ResolvedDataDir> {
        self.config
            .data_dirs
            .iter()
            .filter(|dir| path.starts_with(&dir.root))
            .max_by_key(|dir| dir.root.components().count())
    }

    fn is_asset_path(&self, path: &Path) -> bool {
        self.registry.is_asset_file(path)
            && self.data_dir_of(path).is_some()
            && !path.starts_with(&self.config.output_dir)
    }

    fn load_asset(&self, abs_path: &Path, content_hash: ContentHash) -> Result<LoadedAsset, String> {
        let dir = self
            .data_dir_of(abs_path)
            .ok_or_else(|| "file is outside every data directory".to_string())?;
        let manager = self
            .registry
            .for_path(abs_path)
            .ok_or_else(|| "no document manager for this extension".to_string())?;
        let (document, warnings) = manager.load_document(abs_path).map_err(|e| e.to_string())?;

        let relative: Vec<String> = abs_path
            .strip_prefix(&dir.root)
            .map_err(|e| e.to_string())?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let path = format!("{}/{}", dir.alias, relative.join("/"));

        let mut warnings: Vec<LogEntry> = warnings
            .into_iter()
            .map(|entry| with_default_path(entry, &path))
            .collect();
        let asset_type = match &document.asset_type {
            Some(declared) if self.registry.for_type(declared).is_some() => declared.clone(),
            Some(declared) => {
                warnings.push(
                    LogEntry::warning(
                        codes::UNKNOWN_ASSET_TYPE,
                        format!("unknown asset type '{declared}'"),
                    )
                    .with_path(path.clone())
                    .with_note(format!("using '{}' from the file extension", manager.asset_type())),
                );
                manager.asset_type().to_string()
            }
            None => manager.asset_type().to_string(),
        };

        Ok(LoadedAsset {
            abs_path: abs_path.to_path_buf(),
            path,
            data_dir: dir.alias.clone(),
            asset_type,
            content_hash,
            document,
            warnings,
        })
    }

    /// Applies observed file hashes: parses changed documents outside the
    /// lock, then updates database, graph and states under it.
    fn integrate(&self, observation: Observation) -> Status {
        let assets = ChangeSet::detect(&observation.assets, &observation.known_assets);
        let files = ChangeSet::detect(&observation.files, &observation.known_files);

        let mut loaded = Vec::new();
        let mut unreadable: Vec<(PathBuf, String)> = assets
            .unreadable_files
            .iter()
            .map(|p| (p.clone(), "cannot read file".to_string()))
            .collect();
        for path in assets.new_files.iter().chain(&assets.modified_files) {
            let hash = observation
                .assets
                .get(path)
                .copied()
                .unwrap_or(ContentHash::INVALID);
            match self.load_asset(path, hash) {
                Ok(asset) => loaded.push(asset),
                Err(reason) => unreadable.push((path.clone(), reason)),
            }
        }
        let status = if unreadable.is_empty() {
            Status::Success
        } else {
            Status::Warning
        };

        let mut events = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;

            for path in &assets.deleted_files {
                self.remove_asset(state, path, &mut events);
            }
            for path in &files.deleted_files {
                state.known_files.remove(path);
                let affected = state.graph.detach_file(path);
                invalidate_with_users(state, affected);
            }
            for path in &files.modified_files {
                if let Some(hash) = observation.files.get(path) {
                    state.known_files.insert(path.clone(), *hash);
                }
                let users: Vec<AssetKey> = state.graph.file_users(path).map(|(k, _)| *k).collect();
                invalidate_with_users(state, users);
            }
            for path in &files.new_files {
                if let Some(hash) = observation.files.get(path) {
                    state.known_files.insert(path.clone(), *hash);
                }
            }
            for asset in loaded {
                self.upsert_asset(state, asset, &mut events);
            }
            for (path, reason) in &unreadable {
                warn!(path = %path.display(), %reason, "cannot read asset, keeping its previous state");
                let Some(key) = state.db.asset_by_abs_path(path).map(|info| info.key) else {
                    continue;
                };
                let qualified = state.db.path_of(key).to_string();
                state.db.retain_log(key, |e| e.code != codes::UNREADABLE_FILE);
                state.db.push_log(
                    key,
                    LogEntry::warning(codes::UNREADABLE_FILE, "file could not be read")
                        .with_path(qualified)
                        .with_note(reason.clone()),
                );
            }

            let healed = {
                let resolver = DataDirResolver::new(&state.db, &self.config.data_dirs);
                state.graph.heal(&resolver)
            };
            invalidate_with_users(state, healed);

            // Plain files linked during this pass are tracked from now on.
            let untracked: Vec<PathBuf> = state
                .graph
                .referenced_files()
                .filter(|path| !state.known_files.contains_key(*path))
                .map(Path::to_path_buf)
                .collect();
            for path in untracked {
                let hash = self.hashes.file_hash(&path).hash;
                if hash.is_valid() {
                    state.known_files.insert(path, hash);
                }
            }
            self.settle(state, &mut events);
        }
        self.events.publish_all(events);
        status
    }

    fn upsert_asset(&self, state: &mut CuratorState, asset: LoadedAsset, events: &mut Vec<CuratorEvent>) {
        let CuratorState {
            db,
            graph,
            states,
            known_assets,
            ..
        } = state;

        if db.asset_by_abs_path(&asset.abs_path).is_none() {
            // Edges that resolved to this file as plain data now resolve to the asset.
            let affected = graph.detach_file(&asset.abs_path);
            states.invalidate_many(affected);
        }
        known_assets.insert(asset.abs_path.clone(), asset.content_hash);
        let outcome = db.upsert(NewAsset {
            path: asset.path,
            data_dir: asset.data_dir,
            abs_path: asset.abs_path,
            asset_type: asset.asset_type,
            content_hash: asset.content_hash,
            document: asset.document,
            warnings: asset.warnings,
        });
        let key = outcome.key;
        if outcome.guid_changed {
            let affected = graph.detach_target(key);
            states.invalidate_many(affected);
        }
        {
            let resolver = DataDirResolver::new(db, &self.config.data_dirs);
            graph.apply_manifest_delta(key, &outcome.delta.added, &outcome.delta.removed, &resolver);
        }
        states.insert(key);
        if outcome.content_changed || outcome.guid_changed || !outcome.delta.is_empty() {
            states.invalidate(key);
            states.invalidate_many(graph.find_all_uses(key, true));
        }

        if outcome.created {
            events.extend(outcome.added_sub_assets.iter().copied().map(CuratorEvent::AssetAdded));
        } else {
            events.extend(outcome.removed_sub_assets.iter().copied().map(CuratorEvent::AssetRemoved));
            events.extend(outcome.added_sub_assets.iter().copied().map(CuratorEvent::AssetAdded));
            if let Some(info) = db.asset(key) {
                events.push(CuratorEvent::AssetUpdated(info.guid()));
            }
        }
    }

    fn remove_asset(&self, state: &mut CuratorState, abs_path: &Path, events: &mut Vec<CuratorEvent>) {
        state.known_assets.remove(abs_path);
        let Some((key, path)) = state
            .db
            .asset_by_abs_path(abs_path)
            .map(|info| (info.key, info.path.clone()))
        else {
            return;
        };
        let users = state.graph.find_all_uses(key, true);
        let guids = state.db.remove(&path);
        state.graph.remove_node(key);
        state.graph.detach_target(key);
        state.states.remove(key);
        state.states.invalidate_many(users);
        info!(%path, "asset removed");
        events.extend(guids.into_iter().map(CuratorEvent::AssetRemoved));
    }

    fn context<'a>(
        &'a self,
        db: &'a AssetDatabase,
        graph: &'a DependencyGraph,
        profile: &'a PlatformProfile,
    ) -> EvalContext<'a> {
        EvalContext {
            db,
            graph,
            hashes: &self.hashes,
            registry: &self.registry,
            artifacts: &self.artifacts,
            profile,
            data_dirs: &self.config.data_dirs,
        }
    }

    /// Re-evaluates every dirty asset.
    fn settle(&self, state: &mut CuratorState, events: &mut Vec<CuratorEvent>) {
        let CuratorState {
            db,
            graph,
            states,
            profiles,
            ..
        } = state;
        let refreshed = {
            let ctx = self.context(db, graph, profiles.active_profile());
            states.refresh(&ctx)
        };
        for r in &refreshed {
            record_refresh(db, r, events);
        }
    }

    /// Re-evaluates one asset regardless of the rest of the dirty set.
    fn settle_one(&self, state: &mut CuratorState, key: AssetKey, events: &mut Vec<CuratorEvent>) {
        let CuratorState {
            db,
            graph,
            states,
            profiles,
            ..
        } = state;
        let refreshed = {
            let ctx = self.context(db, graph, profiles.active_profile());
            states.refresh_one(&ctx, key)
        };
        if let Some(r) = refreshed {
            record_refresh(db, &r, events);
        }
    }

    // ----------------------------------------------------------------------
    // Transforms
    // ----------------------------------------------------------------------

    /// Brings one asset up to date.
    ///
    /// Returns as soon as the job is queued; wait on the returned handle to
    /// observe the outcome. Assets that need an import are re-imported in
    /// place first.
    pub fn transform_asset(&self, guid: Guid, flags: TransformFlags) -> Result<TransformTicket, CuratorError> {
        let key = self
            .state
            .lock()
            .db
            .key_of(guid)
            .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
        let priority = if flags.manual {
            Priority::Manual
        } else {
            Priority::Background
        };
        self.transform_key(key, flags, priority, flags.force || flags.manual)
    }

    fn transform_key(
        &self,
        key: AssetKey,
        flags: TransformFlags,
        priority: Priority,
        clear_failure: bool,
    ) -> Result<TransformTicket, CuratorError> {
        let mut clear_failure = clear_failure;
        let mut imported = false;
        loop {
            let mut events = Vec::new();
            let next = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                if std::mem::take(&mut clear_failure) && state.states.clear_failure(key) {
                    state.db.retain_log(key, |e| !is_job_entry(e));
                }
                self.settle(state, &mut events);
                match state.states.state(key) {
                    None => Err(CuratorError::UnknownAsset(state.db.path_of(key).to_string())),
                    Some(current) => Ok(self.next_step(state, key, current, flags, priority, imported)),
                }
            };
            self.events.publish_all(events);

            match next? {
                Next::Done(ticket) => return Ok(ticket),
                Next::Submit(request) => {
                    debug!(
                        path = %request.input.asset_path,
                        kind = %request.kind,
                        ?priority,
                        "submitting job"
                    );
                    return Ok(TransformTicket::Queued(self.coordinator.submit(request)));
                }
                Next::Import => {
                    imported = true;
                    self.import_asset(key)?;
                }
            }
        }
    }

    fn next_step(
        &self,
        state: &CuratorState,
        key: AssetKey,
        current: TransformState,
        flags: TransformFlags,
        priority: Priority,
        imported: bool,
    ) -> Next {
        let submit = |kind| match self.job_request(state, key, kind, priority) {
            Some(request) => Next::Submit(request),
            None => Next::Done(TransformTicket::Blocked(current)),
        };
        match current {
            TransformState::UpToDate if !flags.force => Next::Done(TransformTicket::UpToDate),
            TransformState::NeedsImport if !imported => Next::Import,
            TransformState::NeedsThumbnail if !flags.force => submit(JobKind::Thumbnail),
            TransformState::UpToDate
            | TransformState::NeedsTransform
            | TransformState::NeedsThumbnail
            | TransformState::NeedsPackage => submit(JobKind::Transform),
            other => Next::Done(TransformTicket::Blocked(other)),
        }
    }

    fn job_request(
        &self,
        state: &CuratorState,
        key: AssetKey,
        kind: JobKind,
        priority: Priority,
    ) -> Option<JobRequest> {
        let ctx = self.context(&state.db, &state.graph, state.profiles.active_profile());
        let info = state.db.asset(key)?;
        let hashes = state
            .states
            .hashes(key)
            .or_else(|| compute_hashes(&ctx, key))?;
        Some(JobRequest {
            guid: info.guid(),
            kind,
            profile: state.profiles.active,
            priority,
            input: JobInput {
                asset_path: info.path.clone(),
                abs_path: info.abs_path.clone(),
                asset_type: info.asset_type.clone(),
                profile_name: ctx.profile.name.clone(),
                platform: ctx.profile.platform.clone(),
                output_path: ctx.output_path(info),
                thumbnail_path: ctx.has_thumbnail(info).then(|| ctx.thumbnail_path(info)),
                asset_hash: hashes.dependency,
                thumbnail_hash: hashes.thumbnail,
                package_hash: hashes.package,
                dependencies: dependency_files(&ctx, key),
            },
        })
    }

    /// Re-imports an asset from its external source and rescans its document.
    fn import_asset(&self, key: AssetKey) -> Result<(), CuratorError> {
        let (abs_path, asset_type, mut document, source, dependency_hash) = {
            let state = self.state.lock();
            let info = state
                .db
                .asset(key)
                .ok_or_else(|| CuratorError::UnknownAsset(state.db.path_of(key).to_string()))?;
            let resolver = DataDirResolver::new(&state.db, &self.config.data_dirs);
            let Some(source) = info
                .document
                .import
                .as_ref()
                .and_then(|import| resolver.resolve_file(key, &import.source))
            else {
                return Ok(());
            };
            (
                info.abs_path.clone(),
                info.asset_type.clone(),
                info.document.clone(),
                source,
                state.states.hashes(key).map(|h| h.dependency),
            )
        };

        let source_hash = self.hashes.file_hash(&source).hash;
        let result = match self.registry.for_type(&asset_type) {
            Some(manager) => manager.import(&mut document, source_hash).and_then(|()| {
                manager.save_document(&abs_path, &document).map_err(|e| {
                    vec![LogEntry::error(codes::WRITE_FAILED, "cannot save the imported document")
                        .with_note(e.to_string())]
                })
            }),
            None => Err(vec![LogEntry::error(
                codes::TRANSFORM_FAILED,
                format!("no document manager for asset type '{asset_type}'"),
            )]),
        };

        match result {
            Ok(()) => {
                info!(path = %abs_path.display(), source = %source.display(), "re-imported asset");
                self.handle_file_event(&FileEvent::Changed(abs_path))?;
            }
            Err(log) => {
                warn!(path = %abs_path.display(), "import failed");
                let mut events = Vec::new();
                {
                    let mut guard = self.state.lock();
                    let state = &mut *guard;
                    if let Some(hash) = dependency_hash {
                        state.states.mark_failed(key, hash);
                    }
                    let path = state.db.path_of(key).to_string();
                    for entry in log {
                        state.db.push_log(key, with_default_path(entry, &path));
                    }
                    self.settle_one(state, key, &mut events);
                }
                self.events.publish_all(events);
            }
        }
        Ok(())
    }

    /// Transforms every asset that needs work, dependencies first.
    ///
    /// Assets are submitted in waves; within a wave nothing depends on
    /// anything else, so a wave runs in parallel and the next one starts
    /// when it is done. Dependents of a failed asset are skipped with a
    /// `D004` entry, and so are dependents of assets that were already
    /// blocked or failing when the batch started. `cancel` is checked before
    /// each submission; jobs already submitted run to completion. Assets in
    /// `TransformError` are skipped until retried manually.
    pub fn transform_all_assets(&self, flags: TransformFlags, cancel: &AtomicBool) -> Status {
        let mut events = Vec::new();
        let (waves, mut failed) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let keys = state.db.keys_by_path();
            for key in &keys {
                state.db.retain_log(*key, |e| e.code != codes::BLOCKED_BY_DEPENDENCY);
            }
            self.settle(state, &mut events);
            let work: Vec<AssetKey> = keys
                .into_iter()
                .filter(|key| {
                    state.states.state(*key).is_some_and(|s| {
                        s.needs_work() || (flags.force && s == TransformState::UpToDate)
                    })
                })
                .collect();
            // Assets already failing block their dependents from the start.
            let blocked: HashSet<AssetKey> = state
                .db
                .keys_by_path()
                .into_iter()
                .filter(|key| state.states.state(*key).is_some_and(TransformState::is_blocked))
                .collect();
            (dependency_levels(&state.graph, &work), blocked)
        };
        self.events.publish_all(events);
        info!(
            assets = waves.iter().map(Vec::len).sum::<usize>(),
            waves = waves.len(),
            "transforming all assets"
        );

        let mut status = Status::Success;
        for wave in waves {
            let mut handles = Vec::new();
            let mut cancelled = false;
            for key in wave {
                if cancel.load(Ordering::SeqCst) {
                    cancelled = true;
                    break;
                }
                if self.skip_blocked(key, &failed) {
                    failed.insert(key);
                    status = status.worst(Status::Warning);
                    continue;
                }
                match self.transform_key(key, flags, Priority::Background, false) {
                    Ok(TransformTicket::Queued(handle)) => handles.push((key, handle)),
                    Ok(TransformTicket::UpToDate) => {}
                    Ok(TransformTicket::Blocked(state)) => {
                        debug!(?key, %state, "asset became blocked before submission");
                        failed.insert(key);
                        status = status.worst(if state == TransformState::TransformError {
                            Status::Failure
                        } else {
                            Status::Warning
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot transform asset");
                        failed.insert(key);
                        status = status.worst(Status::Warning);
                    }
                }
            }
            for (key, handle) in handles {
                match handle.wait() {
                    JobOutcome::Success { .. } => {}
                    JobOutcome::Cancelled => status = status.worst(Status::Cancelled),
                    _ => {
                        failed.insert(key);
                        status = status.worst(Status::Failure);
                    }
                }
            }
            if cancelled {
                info!("transform of all assets cancelled");
                status = status.worst(Status::Cancelled);
                break;
            }
        }
        status
    }

    /// Annotates `key` if one of its transform dependencies failed in this
    /// batch. Returns `true` if it must be skipped.
    fn skip_blocked(&self, key: AssetKey, failed: &HashSet<AssetKey>) -> bool {
        if failed.is_empty() {
            return false;
        }
        let mut state = self.state.lock();
        let mut blockers: Vec<String> = state
            .graph
            .reachable(key, DependencyKind::Transform)
            .into_iter()
            .filter(|dep| *dep != key && failed.contains(dep))
            .map(|dep| state.db.path_of(dep).to_string())
            .collect();
        if blockers.is_empty() {
            return false;
        }
        blockers.sort();
        let path = state.db.path_of(key).to_string();
        debug!(%path, blockers = blockers.len(), "skipping asset blocked by failed dependency");
        let entry = blockers.into_iter().fold(
            LogEntry::warning(codes::BLOCKED_BY_DEPENDENCY, "skipped because a dependency failed")
                .with_path(path),
            |entry, blocker| entry.with_note(format!("failed dependency: {blocker}")),
        );
        state.db.push_log(key, entry);
        true
    }

    fn job_completed(&self, request: &JobRequest, outcome: &JobOutcome) {
        let mut events = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(key) = state.db.key_of(request.guid) else {
                debug!(guid = %request.guid, "job finished for an asset that no longer exists");
                return;
            };
            let path = state.db.path_of(key).to_string();
            let log = match outcome {
                JobOutcome::Success { output_hash } => {
                    debug!(%path, %output_hash, kind = %request.kind, "job succeeded");
                    state.states.clear_failure(key);
                    state.db.retain_log(key, |e| !is_job_entry(e));
                    None
                }
                JobOutcome::Failure { log } if log.is_empty() => Some(vec![LogEntry::error(
                    codes::TRANSFORM_FAILED,
                    format!("{} failed without a reason", request.kind),
                )]),
                JobOutcome::Failure { log } => Some(log.clone()),
                JobOutcome::Crashed { reason } => Some(vec![LogEntry::error(
                    codes::WORKER_CRASHED,
                    format!("worker crashed during {}", request.kind),
                )
                .with_note(reason.clone())]),
                JobOutcome::TimedOut => Some(vec![LogEntry::error(
                    codes::WORKER_TIMEOUT,
                    format!(
                        "{} did not finish within {}s",
                        request.kind,
                        self.config.job_timeout.as_secs()
                    ),
                )]),
                JobOutcome::Cancelled => return,
            };
            if let Some(log) = log {
                warn!(%path, kind = %request.kind, entries = log.len(), "job failed");
                state.states.mark_failed(key, request.input.asset_hash);
                state.db.retain_log(key, |e| !is_job_entry(e));
                for entry in log {
                    state.db.push_log(key, with_default_path(entry, &path));
                }
            }
            self.settle_one(state, key, &mut events);
        }
        self.events.publish_all(events);
    }

    /// Forgets a sticky transform error so the asset is evaluated afresh.
    pub fn clear_transform_error(&self, guid: Guid) -> bool {
        let mut events = Vec::new();
        let cleared = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(key) = state.db.key_of(guid) else {
                return false;
            };
            let cleared = state.states.clear_failure(key);
            if cleared {
                state.db.retain_log(key, |e| !is_job_entry(e));
                self.settle_one(state, key, &mut events);
            }
            cleared
        };
        self.events.publish_all(events);
        cleared
    }

    /// Blocks until no job is queued or running.
    pub fn wait_idle(&self) {
        self.coordinator.wait_idle();
    }

    /// Like [`wait_idle`](Self::wait_idle) but gives up after `timeout`.
    pub fn wait_idle_for(&self, timeout: Duration) -> bool {
        self.coordinator.wait_idle_for(timeout)
    }

    /// Number of jobs the workers have started so far.
    pub fn jobs_executed(&self) -> u64 {
        self.coordinator.executed()
    }

    // ----------------------------------------------------------------------
    // Outputs
    // ----------------------------------------------------------------------

    /// Writes the GUID lookup table of every data directory for every
    /// profile. A table that cannot be written fails the result without
    /// stopping the others.
    pub fn write_asset_tables(&self) -> Status {
        let mut tables: Vec<(PathBuf, BTreeMap<Guid, String>)> = Vec::new();
        {
            let state = self.state.lock();
            for data_dir in &self.config.data_dirs {
                let entries = self.table_entries(&state.db, &data_dir.alias);
                for profile in &state.profiles.profiles {
                    let dir = self.artifacts.profile_dir(&profile.name);
                    tables.push((table_path(&dir, &data_dir.alias), entries.clone()));
                }
            }
        }
        tables
            .into_iter()
            .map(|(path, entries)| match write_table(&path, &entries) {
                Ok(()) => {
                    debug!(table = %path.display(), entries = entries.len(), "wrote asset table");
                    Status::Success
                }
                Err(e) => {
                    error!(table = %path.display(), error = %e, "cannot write asset table");
                    Status::Failure
                }
            })
            .collect()
    }

    fn table_entries(&self, db: &AssetDatabase, alias: &str) -> BTreeMap<Guid, String> {
        db.iter()
            .filter(|info| info.data_dir == alias)
            .flat_map(|info| {
                let extension = self.output_extension(&info.asset_type);
                info.sub_assets.iter().filter_map(move |sub| {
                    sub_asset_output_path(info, sub.guid, extension).map(|path| (sub.guid, path))
                })
            })
            .collect()
    }

    fn output_extension(&self, asset_type: &str) -> &str {
        self.registry
            .for_type(asset_type)
            .map_or(FALLBACK_OUTPUT_EXTENSION, |m| m.output_extension())
    }

    /// Reads back the lookup table of one data directory for one profile.
    pub fn read_asset_table(&self, profile: usize, alias: &str) -> Result<BTreeMap<Guid, String>, CuratorError> {
        let name = {
            let state = self.state.lock();
            state
                .profiles
                .get(profile)
                .map(|p| p.name.clone())
                .ok_or(ConfigError::UnknownProfile(profile))?
        };
        read_table(&table_path(&self.artifacts.profile_dir(&name), alias))
    }

    /// The path a lookup table lists for a sub-asset.
    pub fn lookup_path(&self, guid: Guid) -> Option<String> {
        let state = self.state.lock();
        let (info, sub) = state.db.find_by_guid(guid)?;
        sub_asset_output_path(info, sub.guid, self.output_extension(&info.asset_type))
    }

    /// Loads and saves every document in its canonical form. Transform
    /// states are not touched; the next scan picks up rewritten files.
    pub fn resave_all_assets(&self) -> Status {
        let mut assets: Vec<(PathBuf, String)> = {
            let state = self.state.lock();
            state
                .db
                .iter()
                .map(|info| (info.abs_path.clone(), info.asset_type.clone()))
                .collect()
        };
        assets.sort();
        assets
            .into_iter()
            .map(|(path, asset_type)| {
                let Some(manager) = self.registry.for_type(&asset_type) else {
                    warn!(path = %path.display(), %asset_type, "no document manager, not resaved");
                    return Status::Warning;
                };
                let resaved = manager
                    .load_document(&path)
                    .and_then(|(document, _)| manager.save_document(&path, &document));
                match resaved {
                    Ok(()) => Status::Success,
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "cannot resave document");
                        Status::Failure
                    }
                }
            })
            .collect()
    }

    /// Writes the dependency subgraph reachable from `guid` as DGML.
    pub fn write_dependency_dgml(&self, guid: Guid, path: &Path) -> Result<(), CuratorError> {
        let dgml = {
            let state = self.state.lock();
            let key = state
                .db
                .key_of(guid)
                .ok_or_else(|| CuratorError::UnknownAsset(guid.to_string()))?;
            dependency_subgraph(&state.db, &state.graph, key)
        };
        dgml.write(path)?;
        info!(path = %path.display(), nodes = dgml.node_count(), "wrote dependency graph");
        Ok(())
    }

    /// Removes artifacts and thumbnails of assets that no longer exist.
    /// Returns the number of files removed.
    pub fn gc_outputs(&self) -> Result<usize, CuratorError> {
        let (live, profiles) = {
            let state = self.state.lock();
            let names: Vec<String> = state.profiles.profiles.iter().map(|p| p.name.clone()).collect();
            let mut live = HashSet::new();
            for info in state.db.iter() {
                let relative = output_relative_path(info, self.output_extension(&info.asset_type));
                for name in &names {
                    live.insert(self.artifacts.artifact_path(name, &relative));
                }
                live.insert(self.artifacts.thumbnail_path(&info.path));
            }
            (live, names)
        };
        let mut removed = 0;
        for name in &profiles {
            removed += self.artifacts.gc(name, &live)?;
        }
        removed += self.artifacts.gc(THUMBNAIL_DIR, &live)?;
        info!(removed, "removed orphaned outputs");
        Ok(removed)
    }

    /// Persists the file hash cache so the next session skips rehashing.
    pub fn save_caches(&self) -> Result<(), CuratorError> {
        HashManifest::from_cache(&self.hashes, CURATOR_VERSION).save(&self.config.output_dir)?;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Queries
    // ----------------------------------------------------------------------

    /// Looks up a sub-asset by GUID, qualified path (`alias/rel/path`) or
    /// absolute path and returns it with the curator lock held.
    ///
    /// Every other curator call blocks while the handle is alive; drop it
    /// before calling back into the curator from the same thread.
    pub fn find_sub_asset(&self, path_or_guid: &str) -> Option<LockedSubAsset<'_>> {
        let guard = self.state.lock();
        let found = match Guid::parse(path_or_guid) {
            Ok(guid) => guard.db.find_by_guid(guid).map(|(info, sub)| (info.key, sub.guid)),
            Err(_) => guard
                .db
                .find_by_path(path_or_guid)
                .map(|sub| (sub.owner, sub.guid))
                .or_else(|| {
                    guard
                        .db
                        .asset_by_abs_path(Path::new(path_or_guid))
                        .map(|info| (info.key, info.guid()))
                }),
        };
        let (key, guid) = found?;
        Some(LockedSubAsset { guard, key, guid })
    }

    /// Main GUIDs of the assets using the asset that owns `guid`.
    pub fn find_all_uses(&self, guid: Guid, transitive: bool) -> BTreeSet<Guid> {
        let state = self.state.lock();
        state.db.find_all_uses(&state.graph, guid, transitive)
    }

    /// Transform state of the asset owning `guid`.
    pub fn transform_state(&self, guid: Guid) -> Option<TransformState> {
        let state = self.state.lock();
        state.states.state(state.db.key_of(guid)?)
    }

    /// Log entries attached to the asset owning `guid`.
    pub fn asset_log(&self, guid: Guid) -> Vec<LogEntry> {
        let state = self.state.lock();
        state
            .db
            .key_of(guid)
            .and_then(|key| state.db.asset(key))
            .map(|info| info.log.clone())
            .unwrap_or_default()
    }

    /// Every asset's main GUID, qualified path and state, sorted by path.
    pub fn asset_states(&self) -> Vec<(Guid, String, TransformState)> {
        let state = self.state.lock();
        state
            .db
            .keys_by_path()
            .into_iter()
            .filter_map(|key| {
                let info = state.db.asset(key)?;
                let current = state.states.state(key).unwrap_or(TransformState::Unknown);
                Some((info.guid(), info.path.clone(), current))
            })
            .collect()
    }

    /// Number of assets per state name.
    pub fn state_summary(&self) -> BTreeMap<String, usize> {
        self.state.lock().states.summary()
    }

    /// Records an access to a sub-asset for recency sorting.
    pub fn touch(&self, guid: Guid) -> bool {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        self.state.lock().db.touch(guid, now_ms)
    }

    /// Most recently accessed sub-assets, newest first.
    pub fn recently_used(&self, limit: usize) -> Vec<Guid> {
        self.state.lock().db.recently_used(limit)
    }

    // ----------------------------------------------------------------------
    // Profiles
    // ----------------------------------------------------------------------

    /// A copy of the profile list.
    pub fn profiles(&self) -> ProfileSet {
        self.state.lock().profiles.clone()
    }

    /// Adds a profile and returns its index.
    pub fn add_profile(&self, name: &str, platform: &str) -> Result<usize, CuratorError> {
        let mut state = self.state.lock();
        let index = state.profiles.add(name, platform)?;
        state.profiles.save(&self.config.output_dir)?;
        info!(name, platform, index, "added platform profile");
        Ok(index)
    }

    /// Renames a profile other than the default one.
    pub fn rename_profile(&self, index: usize, name: &str) -> Result<(), CuratorError> {
        let mut state = self.state.lock();
        state.profiles.rename(index, name)?;
        state.profiles.save(&self.config.output_dir)?;
        Ok(())
    }

    /// Removes a profile that is neither the default nor the active one.
    pub fn remove_profile(&self, index: usize) -> Result<PlatformProfile, CuratorError> {
        let mut state = self.state.lock();
        let removed = state.profiles.remove(index)?;
        state.profiles.save(&self.config.output_dir)?;
        info!(name = %removed.name, "removed platform profile");
        Ok(removed)
    }

    /// Switches the active profile and re-evaluates every asset against it.
    pub fn set_active_profile(&self, index: usize) -> Result<(), CuratorError> {
        let mut events = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if state.profiles.active == index {
                return Ok(());
            }
            state.profiles.set_active(index)?;
            state.profiles.save(&self.config.output_dir)?;
            info!(profile = %state.profiles.active_profile().name, "active platform changed");
            events.push(CuratorEvent::ActivePlatformChanged);
            state.states.invalidate_all();
            self.settle(state, &mut events);
        }
        self.events.publish_all(events);
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Events
    // ----------------------------------------------------------------------

    /// Subscribes to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<CuratorEvent> {
        self.events.subscribe()
    }

    /// Number of events published so far.
    pub fn revision(&self) -> u64 {
        self.events.revision()
    }
}

/// A sub-asset together with the curator lock.
pub struct LockedSubAsset<'a> {
    guard: MutexGuard<'a, CuratorState>,
    key: AssetKey,
    guid: Guid,
}

impl LockedSubAsset<'_> {
    /// The owning asset.
    pub fn asset(&self) -> &AssetInfo {
        match self.guard.db.asset(self.key) {
            Some(info) => info,
            // Looked up under the same guard, which prevents removal.
            None => unreachable!("locked asset disappeared"),
        }
    }

    /// The sub-asset.
    pub fn sub_asset(&self) -> &SubAsset {
        match self.asset().sub_asset(self.guid) {
            Some(sub) => sub,
            None => unreachable!("locked sub-asset disappeared"),
        }
    }

    /// GUID of the sub-asset.
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// Transform state of the owning asset.
    pub fn state(&self) -> TransformState {
        self.guard
            .states
            .state(self.key)
            .unwrap_or(TransformState::Unknown)
    }

    /// Log entries of the owning asset.
    pub fn log(&self) -> &[LogEntry] {
        &self.asset().log
    }
}

fn backend_factory(
    config: &ResolvedConfig,
    registry: &Arc<ManagerRegistry>,
    artifacts: &ArtifactStore,
) -> Result<Arc<dyn BackendFactory>, CuratorError> {
    if config.in_process_workers {
        let runner = TransformRunner::new(Arc::clone(registry), artifacts.clone());
        return Ok(Arc::new(ThreadBackendFactory::new(Arc::new(runner))));
    }
    let command = match &config.worker_command {
        Some(command) => command.clone(),
        None => {
            let exe = std::env::current_exe().map_err(|e| CuratorError::io("<current executable>", e))?;
            vec![
                exe.display().to_string(),
                "--project".to_string(),
                config.project_root.display().to_string(),
                "worker".to_string(),
            ]
        }
    };
    Ok(Arc::new(ProcessBackendFactory::new(command)))
}

fn invalidate_with_users(state: &mut CuratorState, keys: impl IntoIterator<Item = AssetKey>) {
    for key in keys {
        let users = state.graph.find_all_uses(key, true);
        state.states.invalidate(key);
        state.states.invalidate_many(users);
    }
}

fn record_refresh(db: &mut AssetDatabase, refreshed: &Refreshed, events: &mut Vec<CuratorEvent>) {
    db.retain_log(refreshed.key, |e| {
        e.code != codes::MISSING_DEPENDENCY && e.code != codes::CIRCULAR_DEPENDENCY
    });
    for entry in &refreshed.log {
        db.push_log(refreshed.key, entry.clone());
    }
    if refreshed.changed() {
        if let Some(info) = db.asset(refreshed.key) {
            events.push(CuratorEvent::StateChanged {
                guid: info.guid(),
                old: refreshed.old,
                new: refreshed.new,
            });
        }
    }
}

/// Entries produced by running jobs, replaced on every job outcome.
fn is_job_entry(entry: &LogEntry) -> bool {
    matches!(
        entry.code.category,
        Category::Transform | Category::Worker | Category::Io
    ) || entry.code == codes::BLOCKED_BY_DEPENDENCY
}

fn with_default_path(entry: LogEntry, path: &str) -> LogEntry {
    if entry.path.is_some() {
        entry
    } else {
        entry.with_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_config::AssetTypeConfig;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Project {
        dir: tempfile::TempDir,
        curator: Arc<AssetCurator>,
    }

    impl Project {
        fn data(&self) -> PathBuf {
            self.dir.path().join("data")
        }

        fn write(&self, rel: &str, text: &str) -> PathBuf {
            let path = self.data().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, text).unwrap();
            path
        }

        fn guid(&self, rel: &str) -> Guid {
            self.curator
                .find_sub_asset(&format!("project/{rel}"))
                .map(|s| s.guid())
                .unwrap()
        }

        fn state(&self, rel: &str) -> TransformState {
            self.curator.transform_state(self.guid(rel)).unwrap()
        }
    }

    fn project() -> Project {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        let mut asset_types = BTreeMap::new();
        asset_types.insert(
            "mesh".to_string(),
            AssetTypeConfig {
                extensions: vec!["mesh".to_string()],
                version: 1,
                thumbnails: true,
                output_extension: "plMesh".to_string(),
            },
        );
        let config = ResolvedConfig {
            name: "test".to_string(),
            project_root: dir.path().to_path_buf(),
            data_dirs: vec![ResolvedDataDir {
                root: dir.path().join("data"),
                alias: "project".to_string(),
            }],
            output_dir: dir.path().join(".curator"),
            worker_count: 2,
            job_timeout: Duration::from_secs(30),
            worker_command: None,
            in_process_workers: true,
            asset_types: asset_types.clone(),
        };
        let curator =
            AssetCurator::with_registry(config, ManagerRegistry::from_config(&asset_types)).unwrap();
        Project { dir, curator }
    }

    fn drain(rx: &mut broadcast::Receiver<CuratorEvent>) -> Vec<CuratorEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return events,
                Err(e) => panic!("unexpected receive error: {e}"),
            }
        }
    }

    fn wait(ticket: TransformTicket) -> JobOutcome {
        match ticket {
            TransformTicket::Queued(handle) => handle.wait(),
            other => panic!("expected a queued job, got {other:?}"),
        }
    }

    #[test]
    fn scan_reports_added_assets_and_their_states() {
        let p = project();
        p.write("box.mesh", "{}");
        let mut rx = p.curator.subscribe();

        assert_eq!(p.curator.check_file_system().unwrap(), Status::Success);
        let events = drain(&mut rx);
        let guid = p.guid("box.mesh");
        assert!(events.contains(&CuratorEvent::AssetAdded(guid)));
        assert!(events.contains(&CuratorEvent::StateChanged {
            guid,
            old: TransformState::Unknown,
            new: TransformState::NeedsTransform,
        }));
    }

    #[test]
    fn second_scan_without_changes_is_silent() {
        let p = project();
        p.write("a.mesh", r#"{"transform_dependencies": ["b.mesh", "ghost.mesh"]}"#);
        p.write("b.mesh", "{}");
        p.curator.check_file_system().unwrap();
        let revision = p.curator.revision();

        p.curator.check_file_system().unwrap();
        assert_eq!(p.curator.revision(), revision);
    }

    #[test]
    fn transform_makes_asset_up_to_date() {
        let p = project();
        p.write("box.mesh", "{}");
        p.curator.check_file_system().unwrap();
        let guid = p.guid("box.mesh");

        let outcome = wait(p.curator.transform_asset(guid, TransformFlags::default()).unwrap());
        assert!(outcome.is_success());
        assert_eq!(p.state("box.mesh"), TransformState::UpToDate);
        assert!(matches!(
            p.curator.transform_asset(guid, TransformFlags::default()).unwrap(),
            TransformTicket::UpToDate
        ));
    }

    #[test]
    fn blocked_assets_are_not_submitted() {
        let p = project();
        p.write("a.mesh", r#"{"transform_dependencies": ["ghost.mesh"]}"#);
        p.curator.check_file_system().unwrap();
        let ticket = p
            .curator
            .transform_asset(p.guid("a.mesh"), TransformFlags::default())
            .unwrap();
        assert!(matches!(
            ticket,
            TransformTicket::Blocked(TransformState::MissingTransformDependency)
        ));
        assert_eq!(p.curator.jobs_executed(), 0);
    }

    #[test]
    fn file_events_update_single_assets() {
        let p = project();
        let path = p.write("box.mesh", "{}");
        p.curator.check_file_system().unwrap();
        let guid = p.guid("box.mesh");
        let mut rx = p.curator.subscribe();

        std::fs::remove_file(&path).unwrap();
        p.curator.handle_file_event(&FileEvent::Removed(path)).unwrap();
        assert_eq!(drain(&mut rx), vec![CuratorEvent::AssetRemoved(guid)]);
        assert!(p.curator.transform_state(guid).is_none());
    }

    #[test]
    fn plain_file_changes_invalidate_users() {
        let p = project();
        p.write("box.mesh", r#"{"transform_dependencies": ["wood.png"]}"#);
        let texture = p.write("wood.png", "v1");
        p.curator.check_file_system().unwrap();
        wait(p.curator.transform_asset(p.guid("box.mesh"), TransformFlags::default()).unwrap());
        assert_eq!(p.state("box.mesh"), TransformState::UpToDate);

        std::fs::write(&texture, "version two").unwrap();
        p.curator.handle_file_event(&FileEvent::Changed(texture)).unwrap();
        assert_eq!(p.state("box.mesh"), TransformState::NeedsTransform);
    }

    #[test]
    fn missing_data_directory_is_fatal() {
        let p = project();
        std::fs::remove_dir_all(p.data()).unwrap();
        let err = p.curator.check_file_system().unwrap_err();
        assert!(matches!(err, CuratorError::NoDataDirectory { .. }));
    }

    #[test]
    fn find_sub_asset_accepts_guid_and_paths() {
        let p = project();
        let abs = p.write("box.mesh", r#"{"outputs": ["lod1"]}"#);
        p.curator.check_file_system().unwrap();
        let main = p.guid("box.mesh");

        let by_guid = p.curator.find_sub_asset(&main.to_string()).unwrap();
        assert!(by_guid.sub_asset().is_main);
        assert_eq!(by_guid.asset().path, "project/box.mesh");
        assert_eq!(by_guid.state(), TransformState::NeedsTransform);
        drop(by_guid);

        let by_abs = p.curator.find_sub_asset(&abs.display().to_string()).unwrap();
        assert_eq!(by_abs.guid(), main);
        assert_eq!(by_abs.asset().sub_assets.len(), 2);
        drop(by_abs);

        assert!(p.curator.find_sub_asset("project/nope.mesh").is_none());
    }

    #[test]
    fn tables_list_every_sub_asset() {
        let p = project();
        p.write("box.mesh", r#"{"outputs": ["lod1"]}"#);
        p.curator.check_file_system().unwrap();
        assert_eq!(p.curator.write_asset_tables(), Status::Success);

        let table = p.curator.read_asset_table(0, "project").unwrap();
        let main = p.guid("box.mesh");
        assert_eq!(table.len(), 2);
        assert_eq!(table[&main], "project/box.plMesh");
        assert_eq!(table[&main.derive("lod1")], "project/box.plMesh#lod1");
        assert_eq!(p.curator.lookup_path(main).as_deref(), Some("project/box.plMesh"));
    }

    #[test]
    fn switching_profiles_reevaluates_everything() {
        let p = project();
        p.write("box.mesh", "{}");
        p.curator.check_file_system().unwrap();
        wait(p.curator.transform_asset(p.guid("box.mesh"), TransformFlags::default()).unwrap());
        let index = p.curator.add_profile("Android", "android").unwrap();
        let mut rx = p.curator.subscribe();

        p.curator.set_active_profile(index).unwrap();
        let events = drain(&mut rx);
        assert_eq!(events[0], CuratorEvent::ActivePlatformChanged);
        assert_eq!(p.state("box.mesh"), TransformState::NeedsTransform);
        assert!(p.curator.remove_profile(index).is_err());
        assert!(p.curator.remove_profile(0).is_err());
    }

    #[test]
    fn profiles_survive_reopening() {
        let p = project();
        p.curator.add_profile("Console", "console").unwrap();
        let reloaded = ProfileSet::load(&p.dir.path().join(".curator")).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(1).unwrap().name, "Console");
    }

    #[test]
    fn gc_removes_outputs_of_deleted_assets() {
        let p = project();
        let path = p.write("box.mesh", "{}");
        p.curator.check_file_system().unwrap();
        wait(p.curator.transform_asset(p.guid("box.mesh"), TransformFlags::default()).unwrap());

        std::fs::remove_file(&path).unwrap();
        p.curator.check_file_system().unwrap();
        // The artifact and its thumbnail.
        assert_eq!(p.curator.gc_outputs().unwrap(), 2);
        assert_eq!(p.curator.gc_outputs().unwrap(), 0);
    }

    #[test]
    fn resave_rewrites_documents_canonically() {
        let p = project();
        let path = p.write("box.mesh", r#"{"references":["x.mesh"]}"#);
        p.curator.check_file_system().unwrap();
        assert_eq!(p.curator.resave_all_assets(), Status::Success);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"references\": [\n"));
    }

    #[test]
    fn dependency_graph_export_names_dependencies() {
        let p = project();
        p.write("a.mesh", r#"{"transform_dependencies": ["b.mesh"]}"#);
        p.write("b.mesh", "{}");
        p.curator.check_file_system().unwrap();
        let out = p.dir.path().join("deps.dgml");
        p.curator.write_dependency_dgml(p.guid("a.mesh"), &out).unwrap();
        let xml = std::fs::read_to_string(out).unwrap();
        assert!(xml.contains("Target=\"project/b.mesh\""));
    }

    #[test]
    fn hash_cache_is_persisted() {
        let p = project();
        let path = p.write("box.mesh", "{}");
        p.curator.check_file_system().unwrap();
        p.curator.save_caches().unwrap();
        let manifest = HashManifest::load(&p.dir.path().join(".curator")).unwrap();
        assert!(manifest.is_compatible(CURATOR_VERSION));
        assert!(manifest.files.contains_key(&path));
    }

    #[test]
    fn touch_orders_recently_used() {
        let p = project();
        p.write("a.mesh", "{}");
        p.write("b.mesh", "{}");
        p.curator.check_file_system().unwrap();
        let (a, b) = (p.guid("a.mesh"), p.guid("b.mesh"));
        assert!(p.curator.touch(a));
        std::thread::sleep(Duration::from_millis(5));
        assert!(p.curator.touch(b));
        assert_eq!(p.curator.recently_used(10), vec![b, a]);
    }

    #[test]
    fn background_scan_reports_through_the_receiver() {
        let p = project();
        p.write("box.mesh", "{}");

        let rx = p.curator.spawn_check_file_system();
        assert_eq!(rx.blocking_recv().unwrap().unwrap(), Status::Success);
        assert_eq!(p.state("box.mesh"), TransformState::NeedsTransform);
    }

    #[test]
    fn reset_asset_list_announces_and_rebuilds() {
        let p = project();
        p.write("box.mesh", r#"{"outputs": ["lod1"]}"#);
        p.curator.check_file_system().unwrap();
        let guid = p.guid("box.mesh");
        let mut rx = p.curator.subscribe();

        assert_eq!(p.curator.reset_asset_list().unwrap(), Status::Success);
        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&CuratorEvent::AssetListReset));
        assert!(events.contains(&CuratorEvent::AssetAdded(guid)));
        assert!(events.contains(&CuratorEvent::AssetAdded(guid.derive("lod1"))));
        assert_eq!(p.guid("box.mesh"), guid);
        assert_eq!(p.state("box.mesh"), TransformState::NeedsTransform);
    }

    #[test]
    fn sub_assets_share_their_owners_state() {
        let p = project();
        p.write("box.mesh", r#"{"outputs": ["lod1"]}"#);
        p.curator.check_file_system().unwrap();
        let main = p.guid("box.mesh");
        let lod = main.derive("lod1");
        assert_eq!(
            p.curator.transform_state(lod),
            Some(TransformState::NeedsTransform)
        );

        assert!(wait(p.curator.transform_asset(lod, TransformFlags::default()).unwrap()).is_success());
        assert_eq!(p.state("box.mesh"), TransformState::UpToDate);
        assert_eq!(p.curator.transform_state(lod), Some(TransformState::UpToDate));
    }
}
