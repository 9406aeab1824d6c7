//! Hash caching and output-artifact storage for incremental transforms.
//!
//! This crate provides the mtime-keyed file hash cache that lets the curator
//! decide "has this file changed" without re-reading unchanged files, the
//! persisted form of that cache, and the store for transformed output
//! artifacts whose headers record the dependency hash they were built from.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod hash_cache;
pub mod manifest;

pub use artifact::{ArtifactHeader, ArtifactStore, THUMBNAIL_DIR};
pub use error::CacheError;
pub use hash_cache::{ChangeSet, FileHash, HashCache, HashRecord};
pub use manifest::{HashManifest, HASH_MANIFEST_FILE};
