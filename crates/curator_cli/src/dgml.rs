//! `curator dgml`: dependency graph export.

use crate::project::{open_and_scan, resolve_asset};
use crate::{DgmlArgs, GlobalArgs};

/// Runs the `curator dgml` command.
pub fn run(args: &DgmlArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;
    let guid = resolve_asset(&curator, &args.asset)?;
    curator.write_dependency_dgml(guid, &args.output)?;
    if !global.quiet {
        eprintln!("   Wrote {}", args.output.display());
    }
    Ok(0)
}
