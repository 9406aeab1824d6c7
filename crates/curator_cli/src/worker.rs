//! `curator worker`: the out-of-process transform worker.
//!
//! Spawned by the curator's process backend. Requests arrive as frames on
//! stdin and responses leave on stdout, so nothing else may be printed there.

use curator_config::{load_config, resolve_config};
use curator_core::{serve_worker, ManagerRegistry};
use tracing::info;

use crate::project::resolve_project_root;
use crate::GlobalArgs;

/// Runs the worker loop until the curator shuts it down.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let config = resolve_config(&load_config(&root)?, &root);
    let registry = ManagerRegistry::from_config(&config.asset_types);
    info!(project = %config.name, pid = std::process::id(), "worker started");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_worker(&config, registry, stdin.lock(), stdout.lock())?;
    Ok(0)
}
