//! `curator resave`: rewrite every asset document canonically.

use crate::project::open_and_scan;
use crate::GlobalArgs;

/// Runs the `curator resave` command.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;
    let status = curator.resave_all_assets();
    if !global.quiet {
        eprintln!("   Resaved documents: {status}");
    }
    Ok(if status.is_failure() { 1 } else { 0 })
}
