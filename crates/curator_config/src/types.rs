//! Configuration types deserialized from `curator.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The top-level project configuration parsed from `curator.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CuratorConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Data directories scanned for assets, in priority order.
    #[serde(default)]
    pub data_dirs: Vec<DataDirConfig>,
    /// Worker pool settings.
    #[serde(default)]
    pub workers: WorkerConfig,
    /// Output location for transformed artifacts, tables and caches.
    #[serde(default)]
    pub output: OutputConfig,
    /// Asset types handled by the built-in document manager, keyed by type name.
    #[serde(default)]
    pub asset_types: BTreeMap<String, AssetTypeConfig>,
}

/// Core project metadata.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
}

/// One configured data directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataDirConfig {
    /// Directory path, relative to the project root unless absolute.
    pub path: String,
    /// Special-path alias. References of the form `:alias/rel/path` resolve
    /// inside this directory.
    pub alias: String,
}

/// Worker pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of worker slots. Defaults to the number of cores minus one.
    #[serde(default)]
    pub count: Option<usize>,
    /// Seconds a job may run before its worker is considered hung.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Command line used to spawn a worker process. Defaults to the running
    /// executable with a `worker` argument.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Run jobs on in-process threads instead of child processes.
    #[serde(default)]
    pub in_process: bool,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: None,
            timeout_secs: default_timeout_secs(),
            command: None,
            in_process: false,
        }
    }
}

/// Where the curator writes its outputs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Output directory, relative to the project root unless absolute.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    ".curator".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// An asset type handled by the built-in document manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetTypeConfig {
    /// File extensions (without the dot) that identify documents of this type.
    pub extensions: Vec<String>,
    /// Format version of the type's transform. Bumping it invalidates every
    /// asset of the type.
    #[serde(default = "default_type_version")]
    pub version: u32,
    /// Whether the type produces thumbnails.
    #[serde(default)]
    pub thumbnails: bool,
    /// Extension of transformed output artifacts.
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

fn default_type_version() -> u32 {
    1
}

fn default_output_extension() -> String {
    "bin".to_string()
}
