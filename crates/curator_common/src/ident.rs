//! Interned asset keys for cheap cloning and O(1) equality comparison.

use lasso::ThreadedRodeo;
use serde::{Deserialize, Serialize};

/// Identifies one asset file by its interned data-dir-relative path.
///
/// Keys are used as graph nodes and map keys throughout the curator. They are
/// only meaningful together with the [`PathInterner`] that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct AssetKey(u32);

impl AssetKey {
    /// Creates an `AssetKey` from a raw `u32` index.
    ///
    /// Intended for tests. In normal use keys come from
    /// [`PathInterner::get_or_intern`].
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index of this key.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

// SAFETY: `AssetKey` wraps a `u32` which is always a valid `usize` on 32-bit and
// 64-bit platforms. `try_from_usize` rejects values that don't fit in `u32`.
unsafe impl lasso::Key for AssetKey {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(AssetKey)
    }
}

/// Thread-safe interner for normalized data-dir-relative asset paths.
pub struct PathInterner {
    rodeo: ThreadedRodeo<AssetKey>,
}

impl PathInterner {
    /// Creates a new empty interner.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Interns a path, returning its [`AssetKey`].
    pub fn get_or_intern(&self, path: &str) -> AssetKey {
        self.rodeo.get_or_intern(path)
    }

    /// Returns the key of an already interned path without interning it.
    pub fn get(&self, path: &str) -> Option<AssetKey> {
        self.rodeo.get(path)
    }

    /// Resolves an [`AssetKey`] back to its path.
    ///
    /// # Panics
    ///
    /// Panics if the key was not created by this interner.
    pub fn resolve(&self, key: AssetKey) -> &str {
        self.rodeo.resolve(&key)
    }
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}
