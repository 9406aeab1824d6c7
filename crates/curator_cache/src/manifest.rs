//! Persisted form of the file hash cache.
//!
//! The manifest is stored as `hashcache.json` in the output directory. It
//! lets a freshly started curator skip rehashing files whose modification
//! time and size have not changed since the previous session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::hash_cache::{HashCache, HashRecord};

/// Name of the manifest file within the output directory.
pub const HASH_MANIFEST_FILE: &str = "hashcache.json";

/// Snapshot of all file hash records, keyed by absolute path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashManifest {
    /// Curator version that produced this manifest. Invalidate on version change.
    pub curator_version: String,

    /// Per-file hash records.
    pub files: HashMap<PathBuf, HashRecord>,
}

impl HashManifest {
    /// Creates an empty manifest for the given curator version.
    pub fn new(curator_version: &str) -> Self {
        Self {
            curator_version: curator_version.to_string(),
            files: HashMap::new(),
        }
    }

    /// Captures the current contents of a hash cache.
    pub fn from_cache(cache: &HashCache, curator_version: &str) -> Self {
        Self {
            curator_version: curator_version.to_string(),
            files: cache.snapshot(),
        }
    }

    /// Loads the manifest from the output directory, returning `None` if
    /// the file doesn't exist or can't be parsed.
    pub fn load(output_dir: &Path) -> Option<Self> {
        let path = output_dir.join(HASH_MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Saves the manifest, creating the output directory if needed.
    pub fn save(&self, output_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(output_dir).map_err(|e| CacheError::io(output_dir, e))?;
        let path = output_dir.join(HASH_MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::io(path, e))
    }

    /// Returns `true` if this manifest was produced by a compatible curator version.
    pub fn is_compatible(&self, current_version: &str) -> bool {
        self.curator_version == current_version
    }

    /// Seeds `cache` with the stored records.
    pub fn restore_into(self, cache: &HashCache) {
        cache.restore(self.files);
    }
}
