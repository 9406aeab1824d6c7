//! Incrementally maintained dependency graph.
//!
//! Edges are stored twice: forward on the declaring asset, keyed by the
//! declared reference, and reverse on the target so that "what uses X" is a
//! single lookup. References that do not resolve are kept in a pending table
//! instead of being dropped, and [`DependencyGraph::heal`] links them once the
//! file or asset they name appears.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use curator_common::AssetKey;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, trace};

use crate::asset::DependencyKind;
use crate::document::DeclaredDependency;

/// What a resolved reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeTarget {
    /// Another tracked asset.
    Asset(AssetKey),
    /// A plain file that is not an asset, by absolute path.
    File(PathBuf),
}

/// State of one declared dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// The reference resolved.
    Resolved(EdgeTarget),
    /// The reference does not resolve (yet).
    Pending,
}

/// Resolves reference strings to assets or files.
pub trait ReferenceResolver {
    /// Resolves `reference` as declared by `source`, or `None` if nothing
    /// matches at the moment.
    fn resolve(&self, source: AssetKey, reference: &str) -> Option<EdgeTarget>;
}

/// Missing dependencies of one asset for one dependency kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingReport {
    /// References declared by the asset itself that do not resolve.
    pub direct: BTreeSet<String>,
    /// Dependencies of the asset that have unresolved transform dependencies.
    pub transitive: BTreeSet<AssetKey>,
}

impl MissingReport {
    /// Returns `true` if nothing is missing.
    pub fn is_empty(&self) -> bool {
        self.direct.is_empty() && self.transitive.is_empty()
    }
}

/// Forward and reverse dependency edges between assets.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    forward: HashMap<AssetKey, BTreeMap<DeclaredDependency, Link>>,
    reverse: HashMap<AssetKey, BTreeSet<(AssetKey, DependencyKind)>>,
    file_users: HashMap<PathBuf, BTreeSet<(AssetKey, DependencyKind)>>,
    pending: BTreeSet<(AssetKey, DeclaredDependency)>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a change in the declared dependencies of `source`.
    ///
    /// Removed dependencies are unlinked; added ones are resolved through
    /// `resolver` and either linked or recorded as pending. Returns the added
    /// dependencies that did not resolve.
    pub fn apply_manifest_delta(
        &mut self,
        source: AssetKey,
        added: &[DeclaredDependency],
        removed: &[DeclaredDependency],
        resolver: &dyn ReferenceResolver,
    ) -> Vec<DeclaredDependency> {
        for dep in removed {
            let link = self.forward.get_mut(&source).and_then(|links| links.remove(dep));
            match link {
                Some(Link::Resolved(target)) => self.unlink_reverse(source, dep.kind, &target),
                Some(Link::Pending) => {
                    self.pending.remove(&(source, dep.clone()));
                }
                None => {}
            }
        }

        let mut unresolved = Vec::new();
        for dep in added {
            let link = match resolver.resolve(source, &dep.reference) {
                Some(target) => {
                    self.link_reverse(source, dep.kind, &target);
                    Link::Resolved(target)
                }
                None => {
                    self.pending.insert((source, dep.clone()));
                    unresolved.push(dep.clone());
                    Link::Pending
                }
            };
            let old = self
                .forward
                .entry(source)
                .or_default()
                .insert(dep.clone(), link);
            // Re-adding an existing dependency replaces its link.
            match old {
                Some(Link::Resolved(target)) => self.unlink_reverse(source, dep.kind, &target),
                Some(Link::Pending) if !unresolved.contains(dep) => {
                    self.pending.remove(&(source, dep.clone()));
                }
                _ => {}
            }
        }

        debug!(
            ?source,
            added = added.len(),
            removed = removed.len(),
            unresolved = unresolved.len(),
            "applied manifest delta"
        );
        unresolved
    }

    /// Drops every forward edge of `source`. Edges pointing at `source` are
    /// left alone; use [`DependencyGraph::detach_target`] for those.
    pub fn remove_node(&mut self, source: AssetKey) {
        let Some(links) = self.forward.remove(&source) else {
            return;
        };
        for (dep, link) in links {
            match link {
                Link::Resolved(target) => self.unlink_reverse(source, dep.kind, &target),
                Link::Pending => {
                    self.pending.remove(&(source, dep));
                }
            }
        }
    }

    /// Turns every edge pointing at the asset `target` into a pending
    /// reference. Returns the affected sources.
    pub fn detach_target(&mut self, target: AssetKey) -> BTreeSet<AssetKey> {
        let users = self.reverse.remove(&target).unwrap_or_default();
        self.detach(&EdgeTarget::Asset(target), users)
    }

    /// Turns every edge pointing at the plain file `path` into a pending
    /// reference. Returns the affected sources.
    pub fn detach_file(&mut self, path: &Path) -> BTreeSet<AssetKey> {
        let users = self.file_users.remove(path).unwrap_or_default();
        self.detach(&EdgeTarget::File(path.to_path_buf()), users)
    }

    fn detach(
        &mut self,
        target: &EdgeTarget,
        users: BTreeSet<(AssetKey, DependencyKind)>,
    ) -> BTreeSet<AssetKey> {
        let mut affected = BTreeSet::new();
        for (source, _) in users {
            let Some(links) = self.forward.get_mut(&source) else {
                continue;
            };
            for (dep, link) in links.iter_mut() {
                if matches!(link, Link::Resolved(t) if t == target) {
                    *link = Link::Pending;
                    self.pending.insert((source, dep.clone()));
                    affected.insert(source);
                }
            }
        }
        if !affected.is_empty() {
            debug!(?target, users = affected.len(), "detached dependency target");
        }
        affected
    }

    /// Re-resolves every pending reference. Returns the sources that gained
    /// at least one link.
    pub fn heal(&mut self, resolver: &dyn ReferenceResolver) -> BTreeSet<AssetKey> {
        let resolved: Vec<(AssetKey, DeclaredDependency, EdgeTarget)> = self
            .pending
            .iter()
            .filter_map(|(source, dep)| {
                resolver
                    .resolve(*source, &dep.reference)
                    .map(|target| (*source, dep.clone(), target))
            })
            .collect();

        let mut healed = BTreeSet::new();
        for (source, dep, target) in resolved {
            self.pending.remove(&(source, dep.clone()));
            self.link_reverse(source, dep.kind, &target);
            self.forward
                .entry(source)
                .or_default()
                .insert(dep, Link::Resolved(target));
            healed.insert(source);
        }
        if !healed.is_empty() {
            debug!(sources = healed.len(), "healed pending references");
        }
        healed
    }

    /// Iterates the declared dependencies of `source` and their links.
    pub fn links(&self, source: AssetKey) -> impl Iterator<Item = (&DeclaredDependency, &Link)> {
        self.forward.get(&source).into_iter().flatten()
    }

    /// Returns the resolved targets of `source` for one kind.
    pub fn dependencies(&self, source: AssetKey, kind: DependencyKind) -> Vec<&EdgeTarget> {
        self.links(source)
            .filter(|(dep, _)| dep.kind == kind)
            .filter_map(|(_, link)| match link {
                Link::Resolved(target) => Some(target),
                Link::Pending => None,
            })
            .collect()
    }

    /// Returns the assets `source` depends on for one kind, deduplicated.
    pub fn asset_dependencies(&self, source: AssetKey, kind: DependencyKind) -> BTreeSet<AssetKey> {
        self.dependencies(source, kind)
            .into_iter()
            .filter_map(|target| match target {
                EdgeTarget::Asset(key) => Some(*key),
                EdgeTarget::File(_) => None,
            })
            .collect()
    }

    /// Returns the unresolved references of `source` for one kind.
    pub fn pending_references(&self, source: AssetKey, kind: DependencyKind) -> BTreeSet<String> {
        self.links(source)
            .filter(|(dep, link)| dep.kind == kind && matches!(link, Link::Pending))
            .map(|(dep, _)| dep.reference.clone())
            .collect()
    }

    /// Returns the direct users of an asset, with the kind of each use.
    pub fn users(&self, target: AssetKey) -> impl Iterator<Item = &(AssetKey, DependencyKind)> {
        self.reverse.get(&target).into_iter().flatten()
    }

    /// Returns the direct users of a plain file.
    pub fn file_users(&self, path: &Path) -> impl Iterator<Item = &(AssetKey, DependencyKind)> {
        self.file_users.get(path).into_iter().flatten()
    }

    /// Iterates every plain file that some asset currently depends on.
    pub fn referenced_files(&self) -> impl Iterator<Item = &Path> {
        self.file_users.keys().map(PathBuf::as_path)
    }

    /// Returns the number of unresolved references in the whole graph.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the assets that use `target`, directly or, if `transitive`,
    /// through any chain of uses. `target` itself is never included.
    pub fn find_all_uses(&self, target: AssetKey, transitive: bool) -> BTreeSet<AssetKey> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([target]);
        while let Some(node) = queue.pop_front() {
            for &(user, _) in self.users(node) {
                if user != target && found.insert(user) && transitive {
                    queue.push_back(user);
                }
            }
        }
        found
    }

    /// Returns the assets reachable from `start` over edges of `kind`, not
    /// including `start` unless it lies on a cycle.
    pub fn reachable(&self, start: AssetKey, kind: DependencyKind) -> BTreeSet<AssetKey> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for dep in self.asset_dependencies(node, kind) {
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        seen
    }

    /// Returns every asset on a transform dependency cycle reachable from
    /// `start`.
    ///
    /// Only the part of the graph reachable from `start` is examined. An
    /// empty result means neither `start` nor anything it depends on is part
    /// of a cycle.
    pub fn detect_cycles(&self, start: AssetKey) -> BTreeSet<AssetKey> {
        let mut graph = DiGraphMap::<AssetKey, ()>::new();
        graph.add_node(start);
        let mut visited = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for dep in self.asset_dependencies(node, DependencyKind::Transform) {
                graph.add_edge(node, dep, ());
                if visited.insert(dep) {
                    stack.push(dep);
                }
            }
        }

        let mut on_cycle = BTreeSet::new();
        for component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1 || graph.contains_edge(component[0], component[0]);
            if cyclic {
                on_cycle.extend(component);
            }
        }
        if !on_cycle.is_empty() {
            trace!(?start, members = on_cycle.len(), "cycle reachable from asset");
        }
        on_cycle
    }

    /// Reports unresolved dependencies of `node` for one kind.
    ///
    /// Direct misses are `node`'s own unresolved references of `kind`.
    /// Transitive misses are the assets reachable through `node`'s `kind`
    /// edges, and from there through transform edges, that have unresolved
    /// transform references of their own.
    pub fn compute_missing_dependencies(&self, node: AssetKey, kind: DependencyKind) -> MissingReport {
        let direct = self.pending_references(node, kind);

        let mut transitive = BTreeSet::new();
        let mut visited: HashSet<AssetKey> = HashSet::from([node]);
        let mut stack: Vec<AssetKey> = self
            .asset_dependencies(node, kind)
            .into_iter()
            .filter(|k| *k != node)
            .collect();
        visited.extend(stack.iter().copied());
        while let Some(dep) = stack.pop() {
            if !self
                .pending_references(dep, DependencyKind::Transform)
                .is_empty()
            {
                transitive.insert(dep);
            }
            for next in self.asset_dependencies(dep, DependencyKind::Transform) {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }

        MissingReport { direct, transitive }
    }

    fn link_reverse(&mut self, source: AssetKey, kind: DependencyKind, target: &EdgeTarget) {
        match target {
            EdgeTarget::Asset(key) => {
                self.reverse.entry(*key).or_default().insert((source, kind));
            }
            EdgeTarget::File(path) => {
                self.file_users
                    .entry(path.clone())
                    .or_default()
                    .insert((source, kind));
            }
        }
    }

    fn unlink_reverse(&mut self, source: AssetKey, kind: DependencyKind, target: &EdgeTarget) {
        // Another reference of the same kind may still point at the target.
        let still_linked = self.links(source).any(|(dep, link)| {
            dep.kind == kind && matches!(link, Link::Resolved(t) if t == target)
        });
        if still_linked {
            return;
        }
        match target {
            EdgeTarget::Asset(key) => {
                if let Some(users) = self.reverse.get_mut(key) {
                    users.remove(&(source, kind));
                    if users.is_empty() {
                        self.reverse.remove(key);
                    }
                }
            }
            EdgeTarget::File(path) => {
                if let Some(users) = self.file_users.get_mut(path) {
                    users.remove(&(source, kind));
                    if users.is_empty() {
                        self.file_users.remove(path);
                    }
                }
            }
        }
    }
}
