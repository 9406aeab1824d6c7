//! `curator tables`: write the GUID lookup tables.

use crate::project::open_and_scan;
use crate::GlobalArgs;

/// Runs the `curator tables` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;
    let status = curator.write_asset_tables();
    if !global.quiet {
        eprintln!(
            "   Wrote lookup tables for {} profile(s): {status}",
            curator.profiles().len()
        );
    }
    Ok(if status.is_failure() { 1 } else { 0 })
}
