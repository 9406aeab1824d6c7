//! Resolution of configuration paths and defaults against the project root.

use crate::types::{AssetTypeConfig, CuratorConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A data directory with its absolute root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDataDir {
    /// Absolute (or project-root-joined) directory path.
    pub root: PathBuf,
    /// Special-path alias used in `:alias/...` references.
    pub alias: String,
}

/// A configuration with every path and default resolved.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Project name.
    pub name: String,
    /// The project root the relative paths were resolved against.
    pub project_root: PathBuf,
    /// Data directories in priority order.
    pub data_dirs: Vec<ResolvedDataDir>,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Number of worker slots.
    pub worker_count: usize,
    /// Per-job timeout.
    pub job_timeout: Duration,
    /// Command line for spawning a worker process, if configured.
    pub worker_command: Option<Vec<String>>,
    /// Whether workers run in-process.
    pub in_process_workers: bool,
    /// Asset types for the built-in document manager.
    pub asset_types: BTreeMap<String, AssetTypeConfig>,
}

/// Resolves relative paths against `project_root` and fills in defaults.
///
/// The worker count defaults to the number of available cores minus one,
/// never less than one.
pub fn resolve_config(config: &CuratorConfig, project_root: &Path) -> ResolvedConfig {
    let join = |p: &str| {
        let path = Path::new(p);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        }
    };

    let worker_count = config.workers.count.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    });

    ResolvedConfig {
        name: config.project.name.clone(),
        project_root: project_root.to_path_buf(),
        data_dirs: config
            .data_dirs
            .iter()
            .map(|d| ResolvedDataDir {
                root: join(&d.path),
                alias: d.alias.clone(),
            })
            .collect(),
        output_dir: join(&config.output.dir),
        worker_count,
        job_timeout: Duration::from_secs(config.workers.timeout_secs),
        worker_command: config.workers.command.clone(),
        in_process_workers: config.workers.in_process,
        asset_types: config.asset_types.clone(),
    }
}
