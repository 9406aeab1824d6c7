//! The per-asset transform state machine.
//!
//! Every asset carries one [`TransformState`]. Changes to the graph, to file
//! contents or to the active profile mark the affected assets dirty; the
//! curator then re-evaluates the dirty set under its lock and reports which
//! states actually changed. A clean asset is never re-evaluated on its own,
//! so evaluating twice without intervening changes produces no transitions.
//!
//! Evaluation applies these rules in order, the first match wins:
//!
//! 1. the asset is on, or depends on, a transform cycle: `CircularDependency`
//! 2. a transform dependency is missing, directly or transitively:
//!    `MissingTransformDependency`
//! 3. the last transform failed for the current dependency hash: `TransformError`
//! 4. the import source changed: `NeedsImport`
//! 5. the artifact header does not carry the current dependency hash:
//!    `NeedsTransform`
//! 6. for types with thumbnails, a thumbnail dependency is missing or the
//!    thumbnail is stale: `MissingThumbnailDependency` / `NeedsThumbnail`
//! 7. a package dependency is missing or the package hash is stale:
//!    `MissingPackageDependency` / `NeedsPackage`
//! 8. otherwise `UpToDate`

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use curator_assets::{
    AssetDatabase, AssetInfo, DependencyGraph, DependencyKind, MissingReport, TransformState,
};
use curator_cache::{ArtifactStore, HashCache};
use curator_common::{AssetKey, ContentHash};
use curator_config::{PlatformProfile, ResolvedDataDir};
use curator_diagnostics::{codes, LogEntry};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, trace};

use crate::hashing::{compute_hashes, output_relative_path, AssetHashes};
use crate::registry::ManagerRegistry;
use crate::resolver::DataDirResolver;

/// Output extension used when no manager handles an asset's type.
pub(crate) const FALLBACK_OUTPUT_EXTENSION: &str = "bin";

/// Read-only view of everything an evaluation looks at.
pub struct EvalContext<'a> {
    /// The asset database.
    pub db: &'a AssetDatabase,
    /// The dependency graph.
    pub graph: &'a DependencyGraph,
    /// File hash cache.
    pub hashes: &'a HashCache,
    /// Document managers.
    pub registry: &'a ManagerRegistry,
    /// Output artifact store.
    pub artifacts: &'a ArtifactStore,
    /// The active platform profile.
    pub profile: &'a PlatformProfile,
    /// Configured data directories.
    pub data_dirs: &'a [ResolvedDataDir],
}

impl EvalContext<'_> {
    /// Absolute path of the asset's artifact for the active profile.
    pub fn output_path(&self, info: &AssetInfo) -> PathBuf {
        self.artifacts
            .artifact_path(&self.profile.name, &self.output_relative(info))
    }

    /// Absolute path of the asset's thumbnail.
    pub fn thumbnail_path(&self, info: &AssetInfo) -> PathBuf {
        self.artifacts.thumbnail_path(&info.path)
    }

    /// Artifact path relative to the profile directory.
    pub fn output_relative(&self, info: &AssetInfo) -> String {
        let extension = self
            .registry
            .for_type(&info.asset_type)
            .map_or(FALLBACK_OUTPUT_EXTENSION, |m| m.output_extension());
        output_relative_path(info, extension)
    }

    /// Whether the asset's type produces thumbnails.
    pub fn has_thumbnail(&self, info: &AssetInfo) -> bool {
        self.registry
            .for_type(&info.asset_type)
            .is_some_and(|m| m.has_thumbnail())
    }
}

/// The result of evaluating one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// The state the asset should be in.
    pub state: TransformState,
    /// Current hashes, if the asset got far enough to compute them.
    pub hashes: Option<AssetHashes>,
    /// Dependency diagnostics explaining the state.
    pub log: Vec<LogEntry>,
}

/// An asset whose state was re-evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Refreshed {
    /// The asset.
    pub key: AssetKey,
    /// State before the evaluation.
    pub old: TransformState,
    /// State after the evaluation.
    pub new: TransformState,
    /// Dependency diagnostics to attach to the asset, replacing earlier ones.
    pub log: Vec<LogEntry>,
}

impl Refreshed {
    /// Returns `true` if the state changed.
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}

#[derive(Debug, Clone)]
struct StateRecord {
    state: TransformState,
    dirty: bool,
    hashes: Option<AssetHashes>,
    failed_hash: Option<ContentHash>,
}

impl StateRecord {
    fn new() -> Self {
        Self {
            state: TransformState::Unknown,
            dirty: true,
            hashes: None,
            failed_hash: None,
        }
    }
}

/// Transform state of every asset plus the sticky failure markers.
#[derive(Debug, Default)]
pub struct TransformStateEngine {
    records: HashMap<AssetKey, StateRecord>,
}

impl TransformStateEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `key` in state `Unknown`, marked dirty. Returns
    /// `false` if it was already tracked; its record is then only marked dirty.
    pub fn insert(&mut self, key: AssetKey) -> bool {
        match self.records.get_mut(&key) {
            Some(record) => {
                record.dirty = true;
                false
            }
            None => {
                self.records.insert(key, StateRecord::new());
                true
            }
        }
    }

    /// Stops tracking `key`, returning its last state.
    pub fn remove(&mut self, key: AssetKey) -> Option<TransformState> {
        self.records.remove(&key).map(|r| r.state)
    }

    /// Current state of `key`.
    pub fn state(&self, key: AssetKey) -> Option<TransformState> {
        self.records.get(&key).map(|r| r.state)
    }

    /// Hashes computed by the last evaluation of `key`.
    pub fn hashes(&self, key: AssetKey) -> Option<AssetHashes> {
        self.records.get(&key).and_then(|r| r.hashes)
    }

    /// Whether `key` awaits re-evaluation.
    pub fn is_dirty(&self, key: AssetKey) -> bool {
        self.records.get(&key).is_some_and(|r| r.dirty)
    }

    /// Marks `key` for re-evaluation.
    pub fn invalidate(&mut self, key: AssetKey) {
        if let Some(record) = self.records.get_mut(&key) {
            record.dirty = true;
        }
    }

    /// Marks every key in `keys` for re-evaluation.
    pub fn invalidate_many(&mut self, keys: impl IntoIterator<Item = AssetKey>) {
        for key in keys {
            self.invalidate(key);
        }
    }

    /// Marks every asset for re-evaluation.
    pub fn invalidate_all(&mut self) {
        for record in self.records.values_mut() {
            record.dirty = true;
        }
    }

    /// Dirty keys, sorted.
    pub fn dirty_keys(&self) -> Vec<AssetKey> {
        let mut keys: Vec<AssetKey> = self
            .records
            .iter()
            .filter(|(_, r)| r.dirty)
            .map(|(k, _)| *k)
            .collect();
        keys.sort();
        keys
    }

    /// Records that transforming `key` failed for `dependency_hash`. The asset
    /// stays in `TransformError` until that hash changes or the failure is
    /// cleared.
    pub fn mark_failed(&mut self, key: AssetKey, dependency_hash: ContentHash) {
        if let Some(record) = self.records.get_mut(&key) {
            record.failed_hash = Some(dependency_hash);
            record.dirty = true;
        }
    }

    /// Forgets a recorded failure. Returns `true` if there was one.
    pub fn clear_failure(&mut self, key: AssetKey) -> bool {
        let Some(record) = self.records.get_mut(&key) else {
            return false;
        };
        record.dirty = true;
        record.failed_hash.take().is_some()
    }

    /// Number of tracked assets.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no asset is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of assets per state.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.state.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Iterates every tracked asset with its state.
    pub fn iter(&self) -> impl Iterator<Item = (AssetKey, TransformState)> + '_ {
        self.records.iter().map(|(k, r)| (*k, r.state))
    }

    /// Decides the state of `key` without changing anything.
    pub fn evaluate(&self, ctx: &EvalContext<'_>, key: AssetKey) -> Evaluation {
        let Some(info) = ctx.db.asset(key) else {
            return Evaluation {
                state: TransformState::Unknown,
                hashes: None,
                log: Vec::new(),
            };
        };
        let blocked = |state, entry: LogEntry| Evaluation {
            state,
            hashes: None,
            log: vec![entry],
        };

        let cycle = ctx.graph.detect_cycles(key);
        if !cycle.is_empty() {
            return blocked(TransformState::CircularDependency, cycle_entry(ctx, info, &cycle));
        }

        let missing = ctx
            .graph
            .compute_missing_dependencies(key, DependencyKind::Transform);
        if !missing.is_empty() {
            return blocked(
                TransformState::MissingTransformDependency,
                missing_entry(ctx, info, DependencyKind::Transform, &missing),
            );
        }

        let Some(hashes) = compute_hashes(ctx, key) else {
            return Evaluation {
                state: TransformState::Unknown,
                hashes: None,
                log: Vec::new(),
            };
        };
        let with = |state, log| Evaluation {
            state,
            hashes: Some(hashes),
            log,
        };

        let failed = self.records.get(&key).and_then(|r| r.failed_hash);
        if failed == Some(hashes.dependency) {
            return with(TransformState::TransformError, Vec::new());
        }

        if needs_import(ctx, info) {
            return with(TransformState::NeedsImport, Vec::new());
        }

        let header = ctx.artifacts.read_header(&ctx.output_path(info));
        let Some(header) = header.filter(|h| h.asset_hash == hashes.dependency) else {
            return with(TransformState::NeedsTransform, Vec::new());
        };

        if ctx.has_thumbnail(info) {
            let missing = ctx
                .graph
                .compute_missing_dependencies(key, DependencyKind::Thumbnail);
            if !missing.is_empty() {
                let entry = missing_entry(ctx, info, DependencyKind::Thumbnail, &missing);
                return with(TransformState::MissingThumbnailDependency, vec![entry]);
            }
            let thumbnail = ctx.artifacts.read_header(&ctx.thumbnail_path(info));
            if thumbnail.map_or(true, |h| h.asset_hash != hashes.thumbnail) {
                return with(TransformState::NeedsThumbnail, Vec::new());
            }
        }

        let missing = ctx
            .graph
            .compute_missing_dependencies(key, DependencyKind::Package);
        if !missing.is_empty() {
            let entry = missing_entry(ctx, info, DependencyKind::Package, &missing);
            return with(TransformState::MissingPackageDependency, vec![entry]);
        }
        if header.package_hash != hashes.package {
            return with(TransformState::NeedsPackage, Vec::new());
        }

        with(TransformState::UpToDate, Vec::new())
    }

    /// Stores an evaluation for `key` and clears its dirty mark.
    pub fn apply(&mut self, key: AssetKey, evaluation: &Evaluation) -> Option<TransformState> {
        let record = self.records.get_mut(&key)?;
        let old = record.state;
        record.state = evaluation.state;
        record.hashes = evaluation.hashes;
        record.dirty = false;
        if old != evaluation.state {
            trace!(?key, %old, new = %evaluation.state, "state transition");
        }
        Some(old)
    }

    /// Evaluates and applies `key` regardless of its dirty mark.
    pub fn refresh_one(&mut self, ctx: &EvalContext<'_>, key: AssetKey) -> Option<Refreshed> {
        let evaluation = self.evaluate(ctx, key);
        let old = self.apply(key, &evaluation)?;
        Some(Refreshed {
            key,
            old,
            new: evaluation.state,
            log: evaluation.log,
        })
    }

    /// Re-evaluates every dirty asset.
    pub fn refresh(&mut self, ctx: &EvalContext<'_>) -> Vec<Refreshed> {
        let dirty = self.dirty_keys();
        let refreshed: Vec<Refreshed> = dirty
            .into_iter()
            .filter_map(|key| self.refresh_one(ctx, key))
            .collect();
        if !refreshed.is_empty() {
            debug!(
                evaluated = refreshed.len(),
                changed = refreshed.iter().filter(|r| r.changed()).count(),
                "re-evaluated transform states"
            );
        }
        refreshed
    }
}

/// Orders `keys` so that every asset comes after the assets among `keys` it
/// transitively depends on for transforming. Assets on a cycle have no valid
/// order; if any are present the keys are returned sorted.
pub fn topological_order(graph: &DependencyGraph, keys: &[AssetKey]) -> Vec<AssetKey> {
    let mut sorted = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    let members: HashSet<AssetKey> = sorted.iter().copied().collect();

    let mut dag = DiGraphMap::<AssetKey, ()>::new();
    for key in &sorted {
        dag.add_node(*key);
    }
    for key in &sorted {
        for dep in graph.reachable(*key, DependencyKind::Transform) {
            if dep != *key && members.contains(&dep) {
                dag.add_edge(dep, *key, ());
            }
        }
    }
    match toposort(&dag, None) {
        Ok(order) => order,
        Err(cycle) => {
            debug!(node = ?cycle.node_id(), "transform order has a cycle, using key order");
            sorted
        }
    }
}

/// Groups `keys` into waves. Every asset's dependencies among `keys` are in
/// earlier waves, so the assets of one wave can be transformed in parallel.
pub fn dependency_levels(graph: &DependencyGraph, keys: &[AssetKey]) -> Vec<Vec<AssetKey>> {
    let order = topological_order(graph, keys);
    let members: HashSet<AssetKey> = order.iter().copied().collect();
    let mut level: HashMap<AssetKey, usize> = HashMap::new();
    let mut waves: Vec<Vec<AssetKey>> = Vec::new();
    for key in order {
        let depth = graph
            .reachable(key, DependencyKind::Transform)
            .into_iter()
            .filter(|dep| *dep != key && members.contains(dep))
            .filter_map(|dep| level.get(&dep).map(|l| l + 1))
            .max()
            .unwrap_or(0);
        level.insert(key, depth);
        if waves.len() <= depth {
            waves.resize_with(depth + 1, Vec::new);
        }
        waves[depth].push(key);
    }
    waves
}

fn needs_import(ctx: &EvalContext<'_>, info: &AssetInfo) -> bool {
    let Some(import) = &info.document.import else {
        return false;
    };
    let resolver = DataDirResolver::new(ctx.db, ctx.data_dirs);
    let Some(source) = resolver.resolve_file(info.key, &import.source) else {
        return false;
    };
    let current = ctx.hashes.file_hash(&source).hash;
    current.is_valid() && import.hash != Some(current)
}

fn cycle_entry(ctx: &EvalContext<'_>, info: &AssetInfo, cycle: &BTreeSet<AssetKey>) -> LogEntry {
    let message = if cycle.contains(&info.key) {
        "asset is part of a circular transform dependency"
    } else {
        "asset depends on a circular transform dependency"
    };
    let mut members: Vec<&str> = cycle.iter().map(|k| ctx.db.path_of(*k)).collect();
    members.sort_unstable();
    members.into_iter().fold(
        LogEntry::error(codes::CIRCULAR_DEPENDENCY, message).with_path(info.path.clone()),
        |entry, member| entry.with_note(format!("cycle member: {member}")),
    )
}

fn missing_entry(
    ctx: &EvalContext<'_>,
    info: &AssetInfo,
    kind: DependencyKind,
    missing: &MissingReport,
) -> LogEntry {
    let what = match kind {
        DependencyKind::Transform => "transform",
        DependencyKind::Thumbnail => "thumbnail",
        DependencyKind::Package => "package",
        DependencyKind::Reference => "reference",
    };
    let message = format!(
        "{} {what} {} missing",
        missing.direct.len() + missing.transitive.len(),
        if missing.direct.len() + missing.transitive.len() == 1 {
            "dependency is"
        } else {
            "dependencies are"
        }
    );
    let entry = if kind == DependencyKind::Transform {
        LogEntry::error(codes::MISSING_DEPENDENCY, message)
    } else {
        LogEntry::warning(codes::MISSING_DEPENDENCY, message)
    };
    let mut entry = entry.with_path(info.path.clone());
    for reference in &missing.direct {
        entry = entry.with_note(format!("direct: '{reference}' does not resolve"));
    }
    let mut via: Vec<&str> = missing.transitive.iter().map(|k| ctx.db.path_of(*k)).collect();
    via.sort_unstable();
    for path in via {
        entry = entry.with_note(format!("transitive: {path} has missing dependencies"));
    }
    entry
}
