//! Parsing and validation of `curator.toml` and `profiles.toml`.
//!
//! This crate reads the project configuration (data directories, worker pool
//! settings, output location, asset types) and the platform-profile list,
//! and resolves them against the project root into a [`ResolvedConfig`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod profiles;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use profiles::{PlatformProfile, ProfileSet, DEFAULT_PROFILE_NAME, PROFILES_FILE};
pub use resolve::{resolve_config, ResolvedConfig, ResolvedDataDir};
pub use types::*;
