//! Shared helpers for CLI commands: project discovery, opening the curator,
//! asset lookup and log rendering.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_common::Guid;
use curator_config::CONFIG_FILE;
use curator_core::AssetCurator;
use curator_diagnostics::{LogEntry, LogRenderer, TerminalRenderer};

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing
/// `curator.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root from `--project` (a directory or its config
/// file) or by walking up from the current directory.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match &global.project {
        Some(p) if p.is_file() => Ok(p
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))),
        Some(p) => Ok(p.clone()),
        None => find_project_root(&std::env::current_dir()?),
    }
}

/// Opens the curator for the selected project and runs a first scan.
pub fn open_and_scan(global: &GlobalArgs) -> Result<Arc<AssetCurator>, Box<dyn std::error::Error>> {
    let root = resolve_project_root(global)?;
    let curator = AssetCurator::open(&root)?;
    if !global.quiet {
        eprintln!("   Scanning {}", curator.config().name);
    }
    let status = curator.check_file_system()?;
    if !status.is_ok() && !global.quiet {
        eprintln!("warning: scan finished with status {status}");
    }
    Ok(curator)
}

/// Finds the main GUID for a GUID, qualified path or file path argument.
pub fn resolve_asset(curator: &AssetCurator, query: &str) -> Result<Guid, Box<dyn std::error::Error>> {
    if let Some(found) = curator.find_sub_asset(query) {
        return Ok(found.asset().guid());
    }
    let absolute = std::path::absolute(query).ok();
    absolute
        .and_then(|path| curator.find_sub_asset(&path.display().to_string()))
        .map(|found| found.asset().guid())
        .ok_or_else(|| format!("no asset matches '{query}'").into())
}

/// Prints log entries to stderr in the terminal format.
pub fn print_log(entries: &[LogEntry], global: &GlobalArgs) {
    let renderer = TerminalRenderer::new(global.color);
    for entry in entries {
        eprintln!("{}", renderer.render(entry));
    }
}
