//! The asset database: exclusive owner of every asset and sub-asset.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use curator_common::{AssetKey, ContentHash, Guid, PathInterner};
use curator_diagnostics::{codes, LogEntry};
use tracing::{debug, warn};

use crate::asset::{AssetInfo, SubAsset};
use crate::document::{AssetDocument, DeclaredDependency};
use crate::graph::DependencyGraph;

/// Everything needed to insert or update one asset.
#[derive(Debug, Clone)]
pub struct NewAsset {
    /// Qualified path: data dir alias, `/`, data-dir-relative path.
    pub path: String,
    /// Alias of the data directory containing the file.
    pub data_dir: String,
    /// Absolute path of the document.
    pub abs_path: PathBuf,
    /// Asset type name.
    pub asset_type: String,
    /// Content hash of the document file.
    pub content_hash: ContentHash,
    /// The parsed document.
    pub document: AssetDocument,
    /// Warnings produced while parsing the document.
    pub warnings: Vec<LogEntry>,
}

/// Declared dependencies added and removed by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyDelta {
    /// Dependencies declared now but not before.
    pub added: Vec<DeclaredDependency>,
    /// Dependencies declared before but not now.
    pub removed: Vec<DeclaredDependency>,
}

impl DependencyDelta {
    /// Returns `true` if the declared dependencies did not change.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What an upsert changed.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// Key of the inserted or updated asset.
    pub key: AssetKey,
    /// Whether the asset was new.
    pub created: bool,
    /// Whether the content hash changed. Always `true` for new assets.
    pub content_changed: bool,
    /// Whether the main GUID changed.
    pub guid_changed: bool,
    /// Change in declared dependencies, to feed into the graph.
    pub delta: DependencyDelta,
    /// Sub-assets that did not exist before.
    pub added_sub_assets: Vec<Guid>,
    /// Sub-assets that no longer exist.
    pub removed_sub_assets: Vec<Guid>,
    /// Sub-assets that kept their GUID.
    pub kept_sub_assets: Vec<Guid>,
}

/// Owner of all [`AssetInfo`] and [`SubAsset`] values, indexed by GUID and path.
pub struct AssetDatabase {
    interner: PathInterner,
    assets: HashMap<AssetKey, AssetInfo>,
    by_guid: HashMap<Guid, AssetKey>,
    by_abs_path: HashMap<PathBuf, AssetKey>,
}

impl AssetDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self {
            interner: PathInterner::new(),
            assets: HashMap::new(),
            by_guid: HashMap::new(),
            by_abs_path: HashMap::new(),
        }
    }

    /// Creates or updates the asset at `new.path`.
    ///
    /// Existing sub-assets whose GUID is unchanged keep their last-access
    /// time. The graph is not touched; the caller applies the returned
    /// [`DependencyDelta`].
    pub fn upsert(&mut self, new: NewAsset) -> UpsertOutcome {
        let key = self.interner.get_or_intern(&new.path);
        let previous = self.assets.remove(&key);
        let mut log = new.warnings;

        let main_guid = match new.document.guid {
            Some(declared) => match self.by_guid.get(&declared) {
                Some(owner) if *owner != key => {
                    let fallback = Guid::from_path(&new.path);
                    warn!(path = %new.path, guid = %declared, "duplicate GUID, deriving from path");
                    log.push(
                        LogEntry::warning(
                            codes::DUPLICATE_GUID,
                            format!("GUID {declared} is already used by another asset"),
                        )
                        .with_path(new.path.clone())
                        .with_note(format!("using the path-derived GUID {fallback} instead")),
                    );
                    fallback
                }
                _ => declared,
            },
            None => Guid::from_path(&new.path),
        };

        let mut sub_assets = vec![SubAsset {
            guid: main_guid,
            name: main_name(&new.path),
            is_main: true,
            owner: key,
            last_access: None,
        }];
        let mut seen_names = BTreeSet::new();
        for name in &new.document.outputs {
            if name.is_empty() || !seen_names.insert(name.as_str()) {
                continue;
            }
            sub_assets.push(SubAsset {
                guid: main_guid.derive(name),
                name: name.clone(),
                is_main: false,
                owner: key,
                last_access: None,
            });
        }

        let old_guids: Vec<Guid> = previous
            .as_ref()
            .map(|p| p.sub_assets.iter().map(|s| s.guid).collect())
            .unwrap_or_default();
        let mut kept_sub_assets = Vec::new();
        let mut added_sub_assets = Vec::new();
        for sub in &mut sub_assets {
            let old = previous.as_ref().and_then(|p| p.sub_asset(sub.guid));
            match old {
                Some(old) => {
                    sub.last_access = old.last_access;
                    kept_sub_assets.push(sub.guid);
                }
                None => added_sub_assets.push(sub.guid),
            }
        }
        let removed_sub_assets: Vec<Guid> = old_guids
            .into_iter()
            .filter(|g| !sub_assets.iter().any(|s| s.guid == *g))
            .collect();
        for guid in &removed_sub_assets {
            if self.by_guid.get(guid) == Some(&key) {
                self.by_guid.remove(guid);
            }
        }
        for sub in &sub_assets {
            self.by_guid.insert(sub.guid, key);
        }

        let new_deps = new.document.declared_dependencies();
        let old_deps = previous
            .as_ref()
            .map(|p| p.document.declared_dependencies())
            .unwrap_or_default();
        let delta = DependencyDelta {
            added: new_deps.difference(&old_deps).cloned().collect(),
            removed: old_deps.difference(&new_deps).cloned().collect(),
        };

        if let Some(prev) = &previous {
            if prev.abs_path != new.abs_path {
                self.by_abs_path.remove(&prev.abs_path);
            }
        }
        self.by_abs_path.insert(new.abs_path.clone(), key);

        let created = previous.is_none();
        let content_changed = previous
            .as_ref()
            .map_or(true, |p| p.content_hash != new.content_hash);
        let guid_changed = previous.as_ref().is_some_and(|p| p.guid() != main_guid);

        debug!(
            path = %new.path,
            created,
            added = delta.added.len(),
            removed = delta.removed.len(),
            "upserted asset"
        );

        self.assets.insert(
            key,
            AssetInfo {
                key,
                path: new.path,
                data_dir: new.data_dir,
                abs_path: new.abs_path,
                asset_type: new.asset_type,
                content_hash: new.content_hash,
                document: new.document,
                sub_assets,
                log,
            },
        );

        UpsertOutcome {
            key,
            created,
            content_changed,
            guid_changed,
            delta,
            added_sub_assets,
            removed_sub_assets,
            kept_sub_assets,
        }
    }

    /// Removes the asset at the qualified `path` and all its sub-assets.
    ///
    /// Returns the GUIDs of the removed sub-assets, main first. Removing an
    /// unknown path returns an empty list.
    pub fn remove(&mut self, path: &str) -> Vec<Guid> {
        let Some(key) = self.interner.get(path) else {
            return Vec::new();
        };
        let Some(info) = self.assets.remove(&key) else {
            return Vec::new();
        };
        self.by_abs_path.remove(&info.abs_path);
        let guids: Vec<Guid> = info.sub_assets.iter().map(|s| s.guid).collect();
        for guid in &guids {
            if self.by_guid.get(guid) == Some(&key) {
                self.by_guid.remove(guid);
            }
        }
        debug!(path, sub_assets = guids.len(), "removed asset");
        guids
    }

    /// Looks up a sub-asset and its owner by GUID.
    pub fn find_by_guid(&self, guid: Guid) -> Option<(&AssetInfo, &SubAsset)> {
        let key = self.by_guid.get(&guid)?;
        let info = self.assets.get(key)?;
        Some((info, info.sub_asset(guid)?))
    }

    /// Looks up the main sub-asset of the asset at the qualified `path`.
    pub fn find_by_path(&self, path: &str) -> Option<&SubAsset> {
        self.asset_by_path(path).map(AssetInfo::main)
    }

    /// Looks up an asset by its qualified path.
    pub fn asset_by_path(&self, path: &str) -> Option<&AssetInfo> {
        let key = self.interner.get(path)?;
        self.assets.get(&key)
    }

    /// Looks up an asset by the absolute path of its document.
    pub fn asset_by_abs_path(&self, abs_path: &Path) -> Option<&AssetInfo> {
        let key = self.by_abs_path.get(abs_path)?;
        self.assets.get(key)
    }

    /// Returns the key owning `guid`.
    pub fn key_of(&self, guid: Guid) -> Option<AssetKey> {
        self.by_guid.get(&guid).copied()
    }

    /// Returns the asset with the given key.
    pub fn asset(&self, key: AssetKey) -> Option<&AssetInfo> {
        self.assets.get(&key)
    }

    /// Appends a log entry to an asset.
    pub fn push_log(&mut self, key: AssetKey, entry: LogEntry) {
        if let Some(info) = self.assets.get_mut(&key) {
            info.log.push(entry);
        }
    }

    /// Removes log entries matching `predicate` from an asset.
    pub fn retain_log(&mut self, key: AssetKey, predicate: impl Fn(&LogEntry) -> bool) {
        if let Some(info) = self.assets.get_mut(&key) {
            info.log.retain(predicate);
        }
    }

    /// Iterates every asset, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &AssetInfo> {
        self.assets.values()
    }

    /// Returns every asset key, sorted by qualified path.
    pub fn keys_by_path(&self) -> Vec<AssetKey> {
        let mut keys: Vec<&AssetInfo> = self.assets.values().collect();
        keys.sort_by(|a, b| a.path.cmp(&b.path));
        keys.into_iter().map(|info| info.key).collect()
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns `true` if no assets are tracked.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Removes every asset. Interned keys stay valid.
    pub fn clear(&mut self) {
        self.assets.clear();
        self.by_guid.clear();
        self.by_abs_path.clear();
    }

    /// Records an access to a sub-asset at `now_ms` (milliseconds since the
    /// Unix epoch). Returns `false` for an unknown GUID.
    pub fn touch(&mut self, guid: Guid, now_ms: u64) -> bool {
        let Some(key) = self.by_guid.get(&guid) else {
            return false;
        };
        let Some(sub) = self
            .assets
            .get_mut(key)
            .and_then(|info| info.sub_assets.iter_mut().find(|s| s.guid == guid))
        else {
            return false;
        };
        sub.last_access = Some(now_ms);
        true
    }

    /// Returns up to `limit` sub-asset GUIDs, most recently accessed first.
    /// Sub-assets that were never accessed are not listed.
    pub fn recently_used(&self, limit: usize) -> Vec<Guid> {
        let mut accessed: Vec<(u64, Guid)> = self
            .assets
            .values()
            .flat_map(|info| info.sub_assets.iter())
            .filter_map(|s| s.last_access.map(|t| (t, s.guid)))
            .collect();
        accessed.sort_by(|a, b| b.cmp(a));
        accessed.into_iter().take(limit).map(|(_, g)| g).collect()
    }

    /// Returns the main GUIDs of the assets that use the asset owning `guid`,
    /// directly or transitively. Unknown GUIDs yield an empty set.
    pub fn find_all_uses(
        &self,
        graph: &DependencyGraph,
        guid: Guid,
        transitive: bool,
    ) -> BTreeSet<Guid> {
        let Some(key) = self.key_of(guid) else {
            return BTreeSet::new();
        };
        graph
            .find_all_uses(key, transitive)
            .into_iter()
            .filter_map(|user| self.assets.get(&user).map(AssetInfo::guid))
            .collect()
    }

    /// Resolves a key to its qualified path.
    pub fn path_of(&self, key: AssetKey) -> &str {
        self.interner.resolve(key)
    }

    /// Returns the key of an interned qualified path, if any asset ever had it.
    pub fn key_of_path(&self, path: &str) -> Option<AssetKey> {
        self.interner.get(path)
    }
}

impl Default for AssetDatabase {
    fn default() -> Self {
        Self::new()
    }
}

fn main_name(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::DependencyKind;
    use crate::graph::{EdgeTarget, ReferenceResolver};

    fn new_asset(path: &str, json: &str) -> NewAsset {
        let (document, warnings) = AssetDocument::parse(json);
        NewAsset {
            path: format!("project/{path}"),
            data_dir: "project".to_string(),
            abs_path: PathBuf::from(format!("/p/data/{path}")),
            asset_type: "mesh".to_string(),
            content_hash: ContentHash::from_bytes(json.as_bytes()),
            document,
            warnings,
        }
    }

    #[test]
    fn insert_creates_main_sub_asset() {
        let mut db = AssetDatabase::new();
        let out = db.upsert(new_asset("meshes/box.mesh", "{}"));
        assert!(out.created);
        assert!(out.content_changed);
        assert_eq!(out.added_sub_assets.len(), 1);

        let main = db.find_by_path("project/meshes/box.mesh").unwrap();
        assert!(main.is_main);
        assert_eq!(main.name, "box");
        assert_eq!(main.guid, Guid::from_path("project/meshes/box.mesh"));
        assert_eq!(db.find_by_guid(main.guid).unwrap().0.path, "project/meshes/box.mesh");
    }

    #[test]
    fn declared_guid_wins() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset(
            "a.mesh",
            r#"{ "guid": "000000000000000000000000000000aa" }"#,
        ));
        let main = db.find_by_path("project/a.mesh").unwrap();
        assert_eq!(main.guid, Guid::from_u128(0xaa));
    }

    #[test]
    fn guid_stable_across_unrelated_edits() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset("a.mesh", r#"{ "outputs": ["lod1"], "settings": { "x": 1 } }"#));
        let before: Vec<Guid> = db
            .asset_by_path("project/a.mesh")
            .unwrap()
            .sub_assets
            .iter()
            .map(|s| s.guid)
            .collect();
        db.touch(before[1], 42);

        let out = db.upsert(new_asset(
            "a.mesh",
            r#"{ "outputs": ["lod1", "lod2"], "settings": { "x": 2 } }"#,
        ));
        assert!(!out.created);
        assert!(!out.guid_changed);
        assert_eq!(out.kept_sub_assets, before);
        assert_eq!(out.added_sub_assets.len(), 1);
        assert!(out.removed_sub_assets.is_empty());

        let info = db.asset_by_path("project/a.mesh").unwrap();
        assert_eq!(info.sub_assets[1].last_access, Some(42));
        assert_eq!(info.sub_assets.len(), 3);
    }

    #[test]
    fn dropped_output_removes_sub_asset() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset("a.mesh", r#"{ "outputs": ["lod1"] }"#));
        let lod = db.asset_by_path("project/a.mesh").unwrap().sub_assets[1].guid;
        let out = db.upsert(new_asset("a.mesh", "{}"));
        assert_eq!(out.removed_sub_assets, vec![lod]);
        assert!(db.find_by_guid(lod).is_none());
    }

    #[test]
    fn upsert_reports_dependency_delta() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset(
            "s.scene",
            r#"{ "transform_dependencies": ["a.mesh", "b.mesh"] }"#,
        ));
        let out = db.upsert(new_asset(
            "s.scene",
            r#"{ "transform_dependencies": ["b.mesh", "c.mesh"] }"#,
        ));
        assert_eq!(
            out.delta.added,
            vec![DeclaredDependency::new(DependencyKind::Transform, "c.mesh")]
        );
        assert_eq!(
            out.delta.removed,
            vec![DeclaredDependency::new(DependencyKind::Transform, "a.mesh")]
        );
    }

    #[test]
    fn unchanged_document_has_empty_delta() {
        let mut db = AssetDatabase::new();
        let json = r#"{ "transform_dependencies": ["a.mesh"] }"#;
        db.upsert(new_asset("s.scene", json));
        let out = db.upsert(new_asset("s.scene", json));
        assert!(out.delta.is_empty());
        assert!(!out.content_changed);
    }

    #[test]
    fn duplicate_declared_guid_falls_back_to_path() {
        let mut db = AssetDatabase::new();
        let json = r#"{ "guid": "000000000000000000000000000000aa" }"#;
        db.upsert(new_asset("a.mesh", json));
        db.upsert(new_asset("b.mesh", json));
        let b = db.asset_by_path("project/b.mesh").unwrap();
        assert_eq!(b.guid(), Guid::from_path("project/b.mesh"));
        assert_eq!(b.log.len(), 1);
        assert_eq!(b.log[0].code, codes::DUPLICATE_GUID);
        assert_eq!(
            db.find_by_guid(Guid::from_u128(0xaa)).unwrap().0.path,
            "project/a.mesh"
        );
    }

    #[test]
    fn remove_returns_all_guids() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset("a.mesh", r#"{ "outputs": ["x", "y"] }"#));
        let guids = db.remove("project/a.mesh");
        assert_eq!(guids.len(), 3);
        assert!(db.is_empty());
        assert!(guids.iter().all(|g| db.find_by_guid(*g).is_none()));
        assert!(db.asset_by_abs_path(Path::new("/p/data/a.mesh")).is_none());
        assert!(db.remove("project/a.mesh").is_empty());
    }

    #[test]
    fn recently_used_orders_by_access() {
        let mut db = AssetDatabase::new();
        db.upsert(new_asset("a.mesh", "{}"));
        db.upsert(new_asset("b.mesh", "{}"));
        db.upsert(new_asset("c.mesh", "{}"));
        let a = db.find_by_path("project/a.mesh").unwrap().guid;
        let b = db.find_by_path("project/b.mesh").unwrap().guid;
        assert!(db.touch(a, 10));
        assert!(db.touch(b, 20));
        assert!(!db.touch(Guid::from_u128(7), 30));
        assert_eq!(db.recently_used(5), vec![b, a]);
        assert_eq!(db.recently_used(1), vec![b]);
    }

    struct DbResolver<'a>(&'a AssetDatabase);

    impl ReferenceResolver for DbResolver<'_> {
        fn resolve(&self, _source: AssetKey, reference: &str) -> Option<EdgeTarget> {
            self.0
                .asset_by_path(&format!("project/{reference}"))
                .map(|info| EdgeTarget::Asset(info.key))
        }
    }

    #[test]
    fn find_all_uses_maps_to_guids() {
        let mut db = AssetDatabase::new();
        let mut graph = DependencyGraph::new();
        db.upsert(new_asset("a.mesh", "{}"));
        let scene = db.upsert(new_asset(
            "s.scene",
            r#"{ "transform_dependencies": ["a.mesh"] }"#,
        ));
        let level = db.upsert(new_asset(
            "l.level",
            r#"{ "references": ["s.scene"] }"#,
        ));
        graph.apply_manifest_delta(scene.key, &scene.delta.added, &[], &DbResolver(&db));
        graph.apply_manifest_delta(level.key, &level.delta.added, &[], &DbResolver(&db));

        let a = db.find_by_path("project/a.mesh").unwrap().guid;
        let s = db.find_by_path("project/s.scene").unwrap().guid;
        let l = db.find_by_path("project/l.level").unwrap().guid;
        assert_eq!(db.find_all_uses(&graph, a, false), BTreeSet::from([s]));
        assert_eq!(db.find_all_uses(&graph, a, true), BTreeSet::from([s, l]));
        assert!(db.find_all_uses(&graph, Guid::from_u128(9), true).is_empty());
    }

    #[test]
    fn main_name_strips_extension() {
        assert_eq!(main_name("project/meshes/box.mesh"), "box");
        assert_eq!(main_name("project/.hidden"), ".hidden");
        assert_eq!(main_name("project/noext"), "noext");
    }
}
