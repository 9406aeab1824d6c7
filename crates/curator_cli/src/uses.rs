//! `curator uses`: reverse dependency lookup.

use crate::project::{open_and_scan, resolve_asset};
use crate::{GlobalArgs, UsesArgs};

/// Runs the `curator uses` command, printing one qualified path per user.
pub fn run(args: &UsesArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;
    let guid = resolve_asset(&curator, &args.asset)?;
    let users = curator.find_all_uses(guid, args.transitive);

    let mut paths: Vec<String> = users
        .into_iter()
        .filter_map(|user| curator.find_sub_asset(&user.to_string()).map(|s| s.asset().path.clone()))
        .collect();
    paths.sort();
    for path in &paths {
        println!("{path}");
    }
    if !global.quiet {
        eprintln!("   {} user(s) of {}", paths.len(), args.asset);
    }
    Ok(0)
}
