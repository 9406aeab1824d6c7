//! Deterministic identifiers for assets and sub-assets.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::xxh3_128;

/// A 128-bit identifier for a sub-asset.
///
/// GUIDs are derived deterministically: a main asset either declares its GUID
/// in its document or gets one derived from its data-dir-relative path, and
/// every named sub-asset derives its GUID from the main GUID plus its name.
/// Re-scanning the same project therefore reproduces the same GUIDs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(u128);

/// Error returned when a string is not a valid GUID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid GUID '{0}'")]
pub struct ParseGuidError(pub String);

impl Guid {
    /// The all-zero GUID. Never produced by derivation.
    pub const NIL: Self = Self(0);

    /// Wraps a raw 128-bit value.
    pub fn from_u128(value: u128) -> Self {
        Self(value)
    }

    /// Returns the raw 128-bit value.
    pub fn as_u128(self) -> u128 {
        self.0
    }

    /// Returns `true` for [`Guid::NIL`].
    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    /// Derives the GUID of a main asset from its data-dir-relative path.
    ///
    /// Separators and case are normalized so that `Meshes\Box.mesh` and
    /// `meshes/box.mesh` map to the same identity.
    pub fn from_path(relative_path: &str) -> Self {
        let normalized = relative_path.replace('\\', "/").to_lowercase();
        let mut input = Vec::with_capacity(normalized.len() + 6);
        input.extend_from_slice(b"asset:");
        input.extend_from_slice(normalized.as_bytes());
        Self::non_nil(xxh3_128(&input))
    }

    /// Derives the GUID of a named sub-asset from its owner's main GUID.
    pub fn derive(self, name: &str) -> Self {
        let mut input = Vec::with_capacity(16 + name.len());
        input.extend_from_slice(&self.0.to_le_bytes());
        input.extend_from_slice(name.as_bytes());
        Self::non_nil(xxh3_128(&input))
    }

    /// Parses either 32 plain hex digits or the braced `{8-4-4-4-12}` form.
    pub fn parse(s: &str) -> Result<Self, ParseGuidError> {
        let trimmed = s.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);
        let digits: String = inner.chars().filter(|c| *c != '-').collect();
        if digits.len() != 32 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseGuidError(s.to_string()));
        }
        u128::from_str_radix(&digits, 16)
            .map(Self)
            .map_err(|_| ParseGuidError(s.to_string()))
    }

    /// Returns `true` if `s` looks like a GUID rather than a path.
    pub fn looks_like_guid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    fn non_nil(value: u128) -> Self {
        if value == 0 {
            Self(1)
        } else {
            Self(value)
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({:08x}..)", self.0 >> 96)
    }
}

impl FromStr for Guid {
    type Err = ParseGuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_is_stable_and_normalized() {
        let a = Guid::from_path("Meshes\\Box.mesh");
        let b = Guid::from_path("meshes/box.mesh");
        assert_eq!(a, b);
        assert!(!a.is_nil());
    }

    #[test]
    fn different_paths_differ() {
        assert_ne!(Guid::from_path("a.mesh"), Guid::from_path("b.mesh"));
    }

    #[test]
    fn derive_depends_on_name() {
        let main = Guid::from_path("collection.col");
        let one = main.derive("first");
        let two = main.derive("second");
        assert_ne!(one, two);
        assert_eq!(one, main.derive("first"));
        assert_ne!(one, main);
    }

    #[test]
    fn parse_plain_and_braced() {
        let g = Guid::from_path("x.mesh");
        let plain = g.to_string();
        assert_eq!(Guid::parse(&plain).unwrap(), g);

        let braced = format!(
            "{{{}-{}-{}-{}-{}}}",
            &plain[0..8],
            &plain[8..12],
            &plain[12..16],
            &plain[16..20],
            &plain[20..32]
        );
        assert_eq!(Guid::parse(&braced).unwrap(), g);
    }

    #[test]
    fn parse_rejects_paths() {
        assert!(Guid::parse("meshes/box.mesh").is_err());
        assert!(Guid::parse("").is_err());
        assert!(!Guid::looks_like_guid("abc"));
    }

    #[test]
    fn display_is_32_hex() {
        let s = Guid::from_path("x").to_string();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let g = Guid::from_path("serde.mesh");
        let json = serde_json::to_string(&g).unwrap();
        assert!(json.starts_with('"'));
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(g, back);
    }
}
