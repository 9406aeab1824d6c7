//! Storage for transformed output artifacts.
//!
//! Every artifact written by a transform carries a binary header that records
//! the dependency hash it was produced from. The state engine compares that
//! stored hash against the current one to decide whether the asset needs to be
//! transformed again, so reading the header must not require reading the
//! (possibly large) payload.
//!
//! On-disk layout: 4-byte little-endian header length, bincode header, payload.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use curator_common::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CacheError;

/// Magic bytes identifying a curator output artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"CRTR";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Upper bound for a plausible header; anything larger is treated as corrupt.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Directory below the output root that holds thumbnails for all profiles.
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Header prepended to every output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"CRTR"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Curator version that produced this artifact.
    pub curator_version: String,

    /// Dependency hash the artifact was transformed from. For thumbnails this
    /// is the thumbnail hash instead.
    pub asset_hash: ContentHash,

    /// Package hash at transform time.
    pub package_hash: ContentHash,

    /// Content hash of the payload, for integrity checks.
    pub checksum: ContentHash,
}

impl ArtifactHeader {
    /// Builds a header for `payload` produced from the given hashes.
    pub fn new(asset_hash: ContentHash, package_hash: ContentHash, payload: &[u8]) -> Self {
        Self {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            curator_version: env!("CARGO_PKG_VERSION").to_string(),
            asset_hash,
            package_hash,
            checksum: ContentHash::from_bytes(payload),
        }
    }

    fn is_current_format(&self) -> bool {
        self.magic == ARTIFACT_MAGIC && self.format_version == ARTIFACT_FORMAT_VERSION
    }
}

/// Store for output artifacts below the curator's output directory.
///
/// Artifacts for a profile live at `<output>/<profile>/<relative path>`;
/// thumbnails are shared across profiles at `<output>/thumbnails/<relative path>`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a store rooted at the given output directory.
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Returns the output root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns the directory holding every artifact of one profile.
    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.output_dir.join(profile)
    }

    /// Returns the file path of an artifact for a profile.
    pub fn artifact_path(&self, profile: &str, relative: &str) -> PathBuf {
        self.profile_dir(profile).join(relative)
    }

    /// Returns the file path of a thumbnail.
    pub fn thumbnail_path(&self, relative: &str) -> PathBuf {
        self.output_dir
            .join(THUMBNAIL_DIR)
            .join(format!("{relative}.thumb"))
    }

    /// Writes an artifact to `path` with a header for the given hashes.
    ///
    /// The file is first written next to its destination and then renamed
    /// over it, so readers either see the previous artifact or the new one.
    pub fn write_artifact(
        &self,
        path: &Path,
        asset_hash: ContentHash,
        package_hash: ContentHash,
        payload: &[u8],
    ) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let header = ArtifactHeader::new(asset_hash, package_hash, payload);
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);

        let mut temp_name = path.as_os_str().to_os_string();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        std::fs::write(&temp_path, &output).map_err(|e| CacheError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, path).map_err(|e| CacheError::io(path, e))?;

        debug!(path = %path.display(), %asset_hash, "wrote artifact");
        Ok(())
    }

    /// Reads only the header of the artifact at `path`.
    ///
    /// Returns `None` if the file doesn't exist or the header is invalid or
    /// from another format version. The payload checksum is not verified.
    pub fn read_header(&self, path: &Path) -> Option<ArtifactHeader> {
        let mut file = std::fs::File::open(path).ok()?;
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes).ok()?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN {
            return None;
        }
        let mut header_bytes = vec![0u8; header_len];
        file.read_exact(&mut header_bytes).ok()?;
        decode_header(&header_bytes)
    }

    /// Reads an artifact, validating its header and payload checksum.
    ///
    /// This is fail-safe: a missing or corrupt file results in `None`.
    pub fn read_artifact(&self, path: &Path) -> Option<(ArtifactHeader, Vec<u8>)> {
        let raw = std::fs::read(path).ok()?;
        if raw.len() < 4 {
            return None;
        }
        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }
        let header = decode_header(&raw[4..4 + header_len])?;
        let payload = &raw[4 + header_len..];
        if ContentHash::from_bytes(payload) != header.checksum {
            return None;
        }
        Some((header, payload.to_vec()))
    }

    /// Deletes an artifact if present. Returns whether a file was removed.
    pub fn remove_artifact(&self, path: &Path) -> Result<bool, CacheError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Removes every artifact below `subdir` whose path is not in `live`.
    ///
    /// Only files that carry a valid artifact header are considered, so
    /// lookup tables and other bookkeeping files next to the artifacts
    /// survive. Returns the number of files removed.
    pub fn gc(&self, subdir: &str, live: &HashSet<PathBuf>) -> Result<usize, CacheError> {
        let dir = self.output_dir.join(subdir);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in WalkDir::new(&dir) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable entry during gc");
                    continue;
                }
            };
            if !entry.file_type().is_file() || live.contains(entry.path()) {
                continue;
            }
            if self.read_header(entry.path()).is_none() {
                continue;
            }
            std::fs::remove_file(entry.path()).map_err(|e| CacheError::io(entry.path(), e))?;
            debug!(path = %entry.path().display(), "removed orphaned artifact");
            removed += 1;
        }

        Ok(removed)
    }
}

fn decode_header(bytes: &[u8]) -> Option<ArtifactHeader> {
    let header: ArtifactHeader =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .ok()?
            .0;
    header.is_current_format().then_some(header)
}
