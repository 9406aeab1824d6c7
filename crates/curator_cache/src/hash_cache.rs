//! File hashing with an mtime-keyed cache, settings hashes and change sets.
//!
//! [`HashCache`] remembers the modification time, size and content hash of
//! every file it has hashed. As long as a file's metadata is unchanged the
//! cached hash is returned without reading the file again.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use curator_common::{ContentHash, HashBuilder};
use curator_config::PlatformProfile;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Cached hash of one file, keyed by its metadata at hashing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: u64,
    /// File size in bytes.
    pub size: u64,
    /// Content hash of the file.
    pub hash: ContentHash,
}

/// Result of a [`HashCache::file_hash`] lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHash {
    /// The content hash, or [`ContentHash::INVALID`] if the file could not be read.
    pub hash: ContentHash,
    /// Whether the file had to be read (cache miss or unreadable file).
    pub recomputed: bool,
}

impl FileHash {
    /// Returns `true` if the file could be hashed.
    pub fn is_valid(&self) -> bool {
        self.hash.is_valid()
    }
}

/// Thread-safe cache of file content hashes.
///
/// Records live in a sharded map, so concurrent lookups only contend when
/// they hit the same shard. Reads of different files never block each other.
pub struct HashCache {
    records: DashMap<PathBuf, HashRecord>,
}

impl HashCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Returns the content hash of `path`, reading the file only if its
    /// modification time or size changed since it was last hashed.
    ///
    /// An unreadable file yields [`ContentHash::INVALID`] and its record is
    /// dropped so that the next call tries again.
    pub fn file_hash(&self, path: &Path) -> FileHash {
        let meta = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta,
            _ => return self.unreadable(path),
        };
        let (modified, size) = stamp(&meta);

        if let Some(record) = self.records.get(path) {
            if record.modified == modified && record.size == size {
                return FileHash {
                    hash: record.hash,
                    recomputed: false,
                };
            }
        }

        match std::fs::read(path) {
            Ok(content) => {
                let hash = ContentHash::from_bytes(&content);
                self.records.insert(
                    path.to_path_buf(),
                    HashRecord {
                        modified,
                        size,
                        hash,
                    },
                );
                debug!(path = %path.display(), %hash, "hashed file");
                FileHash {
                    hash,
                    recomputed: true,
                }
            }
            Err(_) => self.unreadable(path),
        }
    }

    fn unreadable(&self, path: &Path) -> FileHash {
        self.records.remove(path);
        FileHash {
            hash: ContentHash::INVALID,
            recomputed: true,
        }
    }

    /// Hashes many files in parallel on the shared thread pool.
    pub fn hash_files(&self, paths: &[PathBuf]) -> HashMap<PathBuf, FileHash> {
        paths
            .par_iter()
            .map(|p| (p.clone(), self.file_hash(p)))
            .collect()
    }

    /// Returns the cached record for `path` without touching the file.
    pub fn cached(&self, path: &Path) -> Option<HashRecord> {
        self.records.get(path).map(|r| *r)
    }

    /// Forgets the record for `path`, forcing the next lookup to re-read it.
    pub fn invalidate(&self, path: &Path) {
        self.records.remove(path);
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies all records out, e.g. for persisting them.
    pub fn snapshot(&self) -> HashMap<PathBuf, HashRecord> {
        self.records
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Seeds the cache with previously persisted records.
    pub fn restore(&self, records: HashMap<PathBuf, HashRecord>) {
        for (path, record) in records {
            self.records.insert(path, record);
        }
    }

    /// Computes the settings hash of an asset for a platform profile.
    ///
    /// Combines the asset type's transform version, the asset's canonical
    /// serialized settings and the profile's name, platform and settings.
    /// Bumping a type's version therefore invalidates every asset of that
    /// type, and switching profiles invalidates every asset.
    pub fn settings_hash(
        &self,
        profile: &PlatformProfile,
        asset_type: &str,
        type_version: u32,
        settings: &[u8],
    ) -> ContentHash {
        let mut builder = HashBuilder::new();
        builder
            .add_str(asset_type)
            .add_u32(type_version)
            .add_bytes(settings)
            .add_str(&profile.name)
            .add_str(&profile.platform);
        for (key, value) in &profile.settings {
            builder.add_str(key).add_str(value);
        }
        builder.finish()
    }
}

impl Default for HashCache {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp(meta: &Metadata) -> (u64, u64) {
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    (modified, meta.len())
}

/// Result of comparing current file hashes against the known hashes.
///
/// Categorizes all files into new (never seen), modified (hash changed),
/// deleted (known but not on disk), unreadable (present but could not be
/// hashed this time) and unchanged (hash matches).
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Files that are not present in the known set.
    pub new_files: Vec<PathBuf>,
    /// Files whose content hash differs from the known hash.
    pub modified_files: Vec<PathBuf>,
    /// Files known but not in the current file set.
    pub deleted_files: Vec<PathBuf>,
    /// Files present on disk that could not be hashed. These keep their
    /// previous state and are re-checked on the next scan.
    pub unreadable_files: Vec<PathBuf>,
    /// Files whose content hash matches.
    pub unchanged_files: Vec<PathBuf>,
}

impl ChangeSet {
    /// Compares current file hashes against the known hashes.
    pub fn detect(
        current: &HashMap<PathBuf, ContentHash>,
        known: &HashMap<PathBuf, ContentHash>,
    ) -> Self {
        let mut cs = ChangeSet::default();

        for (path, hash) in current {
            if !hash.is_valid() {
                cs.unreadable_files.push(path.clone());
                continue;
            }
            match known.get(path) {
                Some(old) if old == hash => cs.unchanged_files.push(path.clone()),
                Some(_) => cs.modified_files.push(path.clone()),
                None => cs.new_files.push(path.clone()),
            }
        }
        cs.deleted_files = known
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();

        // Sorted for deterministic processing order
        cs.new_files.sort();
        cs.modified_files.sort();
        cs.deleted_files.sort();
        cs.unreadable_files.sort();
        cs.unchanged_files.sort();
        cs
    }

    /// Returns `true` if there are no new, modified or deleted files.
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Returns the number of files that need re-reading (new + modified).
    pub fn dirty_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_hash_deterministic_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.mesh");
        std::fs::write(&path, "vertices 8").unwrap();

        let cache = HashCache::new();
        let first = cache.file_hash(&path);
        assert!(first.recomputed);
        assert!(first.is_valid());

        let second = cache.file_hash(&path);
        assert!(!second.recomputed, "unchanged file must come from the cache");
        assert_eq!(first.hash, second.hash);
    }

    #[test]
    fn file_hash_recomputes_after_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.mesh");
        std::fs::write(&path, "vertices 8").unwrap();

        let cache = HashCache::new();
        let before = cache.file_hash(&path);
        std::fs::write(&path, "vertices 24, normals 24").unwrap();
        let after = cache.file_hash(&path);
        assert!(after.recomputed);
        assert_ne!(before.hash, after.hash);
    }

    #[test]
    fn unreadable_file_is_invalid_and_uncached() {
        let cache = HashCache::new();
        let result = cache.file_hash(Path::new("/nonexistent/file.mesh"));
        assert_eq!(result.hash, ContentHash::INVALID);
        assert!(result.recomputed);
        assert!(cache.is_empty());
    }

    #[test]
    fn directory_is_not_hashable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HashCache::new();
        assert!(!cache.file_hash(dir.path()).is_valid());
    }

    #[test]
    fn invalidate_forces_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tex");
        std::fs::write(&path, "pixels").unwrap();
        let cache = HashCache::new();
        cache.file_hash(&path);
        cache.invalidate(&path);
        assert!(cache.file_hash(&path).recomputed);
    }

    #[test]
    fn hash_files_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..16)
            .map(|i| {
                let p = dir.path().join(format!("f{i}.mesh"));
                std::fs::write(&p, format!("content {i}")).unwrap();
                p
            })
            .collect();
        let cache = HashCache::new();
        let hashes = cache.hash_files(&paths);
        assert_eq!(hashes.len(), 16);
        assert!(hashes.values().all(FileHash::is_valid));
        assert_eq!(cache.len(), 16);
    }

    #[test]
    fn snapshot_restore_skips_rehash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mesh");
        std::fs::write(&path, "abc").unwrap();
        let cache = HashCache::new();
        cache.file_hash(&path);

        let restored = HashCache::new();
        restored.restore(cache.snapshot());
        assert!(!restored.file_hash(&path).recomputed);
    }

    #[test]
    fn settings_hash_depends_on_all_inputs() {
        let cache = HashCache::new();
        let profile = PlatformProfile::host_default();
        let base = cache.settings_hash(&profile, "mesh", 1, b"{}");
        assert_eq!(base, cache.settings_hash(&profile, "mesh", 1, b"{}"));
        assert_ne!(base, cache.settings_hash(&profile, "mesh", 2, b"{}"));
        assert_ne!(base, cache.settings_hash(&profile, "texture", 1, b"{}"));
        assert_ne!(base, cache.settings_hash(&profile, "mesh", 1, b"{\"lod\":2}"));

        let mut android = profile.clone();
        android.name = "Android".to_string();
        assert_ne!(base, cache.settings_hash(&android, "mesh", 1, b"{}"));

        let mut tuned = profile.clone();
        tuned
            .settings
            .insert("compression".to_string(), "high".to_string());
        assert_ne!(base, cache.settings_hash(&tuned, "mesh", 1, b"{}"));
    }

    fn h(s: &str) -> ContentHash {
        ContentHash::from_bytes(s.as_bytes())
    }

    #[test]
    fn detect_all_categories() {
        let mut known = HashMap::new();
        known.insert(PathBuf::from("same.mesh"), h("same"));
        known.insert(PathBuf::from("edited.mesh"), h("old"));
        known.insert(PathBuf::from("gone.mesh"), h("gone"));
        known.insert(PathBuf::from("locked.mesh"), h("locked"));

        let mut current = HashMap::new();
        current.insert(PathBuf::from("same.mesh"), h("same"));
        current.insert(PathBuf::from("edited.mesh"), h("new"));
        current.insert(PathBuf::from("fresh.mesh"), h("fresh"));
        current.insert(PathBuf::from("locked.mesh"), ContentHash::INVALID);

        let cs = ChangeSet::detect(&current, &known);
        assert_eq!(cs.unchanged_files, vec![PathBuf::from("same.mesh")]);
        assert_eq!(cs.modified_files, vec![PathBuf::from("edited.mesh")]);
        assert_eq!(cs.new_files, vec![PathBuf::from("fresh.mesh")]);
        assert_eq!(cs.deleted_files, vec![PathBuf::from("gone.mesh")]);
        assert_eq!(cs.unreadable_files, vec![PathBuf::from("locked.mesh")]);
        assert_eq!(cs.dirty_count(), 2);
        assert!(!cs.is_empty());
    }

    #[test]
    fn detect_no_changes() {
        let mut known = HashMap::new();
        known.insert(PathBuf::from("a.mesh"), h("a"));
        let cs = ChangeSet::detect(&known.clone(), &known);
        assert!(cs.is_empty());
        assert_eq!(cs.unchanged_files.len(), 1);
    }
}
