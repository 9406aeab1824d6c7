//! Shared fixture for unit tests that need a database, graph and caches.

use std::collections::BTreeMap;
use std::path::Path;

use curator_assets::{AssetDatabase, AssetDocument, DependencyGraph, NewAsset};
use curator_cache::{ArtifactStore, HashCache};
use curator_common::{AssetKey, ContentHash};
use curator_config::{AssetTypeConfig, PlatformProfile, ResolvedDataDir};

use crate::hashing::compute_hashes;
use crate::registry::ManagerRegistry;
use crate::resolver::DataDirResolver;
use crate::state::EvalContext;

pub(crate) struct World {
    _tmp: tempfile::TempDir,
    pub dirs: Vec<ResolvedDataDir>,
    pub db: AssetDatabase,
    pub graph: DependencyGraph,
    pub hashes: HashCache,
    pub registry: ManagerRegistry,
    pub artifacts: ArtifactStore,
    pub profile: PlatformProfile,
}

impl World {
    /// One data dir aliased `project`, a `mesh` type with thumbnails.
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("data");
        std::fs::create_dir_all(&root).unwrap();
        let mut types = BTreeMap::new();
        types.insert(
            "mesh".to_string(),
            AssetTypeConfig {
                extensions: vec!["mesh".to_string()],
                version: 1,
                thumbnails: true,
                output_extension: "plMesh".to_string(),
            },
        );
        let artifacts = ArtifactStore::new(&tmp.path().join("out"));
        World {
            _tmp: tmp,
            dirs: vec![ResolvedDataDir {
                root,
                alias: "project".to_string(),
            }],
            db: AssetDatabase::new(),
            graph: DependencyGraph::new(),
            hashes: HashCache::new(),
            registry: ManagerRegistry::from_config(&types),
            artifacts,
            profile: PlatformProfile::host_default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.dirs[0].root
    }

    /// Upserts `project/<rel>` and links its dependencies.
    pub fn add(&mut self, rel: &str, content: u64, doc: AssetDocument) -> AssetKey {
        let outcome = self.db.upsert(NewAsset {
            path: format!("project/{rel}"),
            data_dir: "project".to_string(),
            abs_path: self.dirs[0].root.join(rel),
            asset_type: "mesh".to_string(),
            content_hash: ContentHash::from_raw(content),
            document: doc,
            warnings: Vec::new(),
        });
        let resolver = DataDirResolver::new(&self.db, &self.dirs);
        self.graph.apply_manifest_delta(
            outcome.key,
            &outcome.delta.added,
            &outcome.delta.removed,
            &resolver,
        );
        self.graph.heal(&resolver);
        outcome.key
    }

    /// Removes `project/<rel>` and turns edges pointing at it into pending ones.
    pub fn remove(&mut self, rel: &str) {
        let path = format!("project/{rel}");
        let key = self.db.key_of_path(&path).unwrap();
        self.db.remove(&path);
        self.graph.remove_node(key);
        self.graph.detach_target(key);
    }

    /// Writes artifact and thumbnail as a successful transform would.
    pub fn transform(&self, key: AssetKey) {
        let ctx = self.ctx();
        let hashes = compute_hashes(&ctx, key).unwrap();
        let info = self.db.asset(key).unwrap();
        self.artifacts
            .write_artifact(&ctx.output_path(info), hashes.dependency, hashes.package, b"out")
            .unwrap();
        self.artifacts
            .write_artifact(&ctx.thumbnail_path(info), hashes.thumbnail, hashes.package, b"thumb")
            .unwrap();
    }

    pub fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            db: &self.db,
            graph: &self.graph,
            hashes: &self.hashes,
            registry: &self.registry,
            artifacts: &self.artifacts,
            profile: &self.profile,
            data_dirs: &self.dirs,
        }
    }
}

/// A document declaring the given transform and thumbnail dependencies.
pub(crate) fn deps(transform: &[&str], thumbnail: &[&str]) -> AssetDocument {
    AssetDocument {
        transform_dependencies: transform.iter().map(|s| s.to_string()).collect(),
        thumbnail_dependencies: thumbnail.iter().map(|s| s.to_string()).collect(),
        ..AssetDocument::default()
    }
}
