//! Platform profiles: named transform configurations.
//!
//! The profile list is stored as `profiles.toml` in the output directory.
//! Index 0 is always the `Default` development profile; it cannot be removed
//! or renamed, and it is recreated whenever the stored list does not start
//! with it.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Name of the profile list file within the output directory.
pub const PROFILES_FILE: &str = "profiles.toml";

/// Name of the profile at index 0.
pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// A named configuration affecting transform output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PlatformProfile {
    /// Display name, unique within the set (case-insensitive).
    pub name: String,
    /// Target platform identifier, e.g. `"windows"` or `"android"`.
    pub platform: String,
    /// Free-form transform settings. Part of every asset's settings hash.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl PlatformProfile {
    /// Creates the default development profile for the host platform.
    pub fn host_default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            platform: host_platform().to_string(),
            settings: BTreeMap::new(),
        }
    }
}

fn host_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" | "ios" => "osx",
        "windows" => "windows",
        "android" => "android",
        _ => "linux",
    }
}

/// The ordered list of profiles plus the active index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProfileSet {
    /// Index of the active profile.
    #[serde(default)]
    pub active: usize,
    /// All profiles. Index 0 is the `Default` profile.
    #[serde(default)]
    pub profiles: Vec<PlatformProfile>,
}

impl ProfileSet {
    /// Creates a set containing only the host default profile.
    pub fn new() -> Self {
        Self {
            active: 0,
            profiles: vec![PlatformProfile::host_default()],
        }
    }

    /// Loads `profiles.toml` from `dir`.
    ///
    /// A missing file yields the default set. A file whose first entry is not
    /// named `Default` gets a default profile inserted at index 0.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(PROFILES_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Parses a profile list and repairs its `Default` entry.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut set: ProfileSet =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        set.ensure_default();
        Ok(set)
    }

    /// Saves the list as `profiles.toml` in `dir`, creating the directory.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(dir)?;
        let text =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(dir.join(PROFILES_FILE), text)?;
        Ok(())
    }

    /// Re-establishes the index-0 invariant and clamps the active index.
    ///
    /// Returns `true` if anything had to be repaired.
    pub fn ensure_default(&mut self) -> bool {
        let mut repaired = false;
        let first_is_default = self
            .profiles
            .first()
            .is_some_and(|p| p.name == DEFAULT_PROFILE_NAME);
        if !first_is_default {
            // A misplaced "Default" further down would collide with the new entry.
            self.profiles.retain(|p| p.name != DEFAULT_PROFILE_NAME);
            self.profiles.insert(0, PlatformProfile::host_default());
            self.active = 0;
            repaired = true;
        }
        if self.active >= self.profiles.len() {
            self.active = 0;
            repaired = true;
        }
        repaired
    }

    /// Returns the active profile.
    pub fn active_profile(&self) -> &PlatformProfile {
        &self.profiles[self.active.min(self.profiles.len() - 1)]
    }

    /// Returns the profile at `index`.
    pub fn get(&self, index: usize) -> Option<&PlatformProfile> {
        self.profiles.get(index)
    }

    /// Returns the index of the profile with the given name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<usize> {
        self.profiles
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Number of profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Always `false`: the default profile is always present.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Appends a new profile and returns its index.
    pub fn add(&mut self, name: &str, platform: &str) -> Result<usize, ConfigError> {
        self.check_name(name)?;
        self.profiles.push(PlatformProfile {
            name: name.to_string(),
            platform: platform.to_string(),
            settings: BTreeMap::new(),
        });
        Ok(self.profiles.len() - 1)
    }

    /// Renames a profile. The default profile cannot be renamed.
    pub fn rename(&mut self, index: usize, name: &str) -> Result<(), ConfigError> {
        if index == 0 {
            return Err(ConfigError::ProfileRejected(
                "the Default profile cannot be renamed".to_string(),
            ));
        }
        if index >= self.profiles.len() {
            return Err(ConfigError::UnknownProfile(index));
        }
        if self.profiles[index].name.eq_ignore_ascii_case(name) {
            return Ok(());
        }
        self.check_name(name)?;
        self.profiles[index].name = name.to_string();
        Ok(())
    }

    /// Removes a profile. Neither the default nor the active profile can be
    /// removed. The active index is shifted if it sits after `index`.
    pub fn remove(&mut self, index: usize) -> Result<PlatformProfile, ConfigError> {
        if index == 0 {
            return Err(ConfigError::ProfileRejected(
                "the Default profile cannot be removed".to_string(),
            ));
        }
        if index >= self.profiles.len() {
            return Err(ConfigError::UnknownProfile(index));
        }
        if index == self.active {
            return Err(ConfigError::ProfileRejected(
                "the active profile cannot be removed".to_string(),
            ));
        }
        let removed = self.profiles.remove(index);
        if self.active > index {
            self.active -= 1;
        }
        Ok(removed)
    }

    /// Makes `index` the active profile.
    pub fn set_active(&mut self, index: usize) -> Result<(), ConfigError> {
        if index >= self.profiles.len() {
            return Err(ConfigError::UnknownProfile(index));
        }
        self.active = index;
        Ok(())
    }

    fn check_name(&self, name: &str) -> Result<(), ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "profile name must not be empty".to_string(),
            ));
        }
        if self.find(name).is_some() {
            return Err(ConfigError::ValidationError(format!(
                "a profile named '{name}' already exists"
            )));
        }
        Ok(())
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::new()
    }
}
