//! Content hashing for change detection and dependency hashes.

use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// A 64-bit content hash computed using XXH3.
///
/// The raw value `0` is reserved for [`ContentHash::INVALID`], the sentinel
/// returned when a file could not be read. Real hashes never take that value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Sentinel for "could not be computed". Callers treat it as a cache miss.
    pub const INVALID: Self = Self(0);

    /// Computes a content hash from a byte slice using XXH3-64.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::from_raw(xxh3_64(data))
    }

    /// Wraps a raw 64-bit value. A raw `0` is remapped so that only
    /// [`ContentHash::INVALID`] compares equal to the sentinel.
    pub fn from_raw(value: u64) -> Self {
        if value == 0 {
            Self(1)
        } else {
            Self(value)
        }
    }

    /// Returns the raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns `false` for the [`ContentHash::INVALID`] sentinel.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:08x}..)", self.0 >> 32)
    }
}

/// Incremental combiner for hashes and raw inputs.
///
/// Used to fold an asset's own content hash, its settings hash and all of its
/// dependency hashes into a single dependency hash. The fold is order
/// sensitive, so callers feed inputs in a deterministic order.
pub struct HashBuilder {
    state: Xxh3,
}

impl HashBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self { state: Xxh3::new() }
    }

    /// Feeds another hash into the builder.
    pub fn add_hash(&mut self, hash: ContentHash) -> &mut Self {
        self.state.update(&hash.0.to_le_bytes());
        self
    }

    /// Feeds raw bytes, length-prefixed so adjacent inputs cannot alias.
    pub fn add_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(&(data.len() as u64).to_le_bytes());
        self.state.update(data);
        self
    }

    /// Feeds a string.
    pub fn add_str(&mut self, s: &str) -> &mut Self {
        self.add_bytes(s.as_bytes())
    }

    /// Feeds a 32-bit integer.
    pub fn add_u32(&mut self, value: u32) -> &mut Self {
        self.state.update(&value.to_le_bytes());
        self
    }

    /// Returns the combined hash.
    pub fn finish(&self) -> ContentHash {
        ContentHash::from_raw(self.state.digest())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}
