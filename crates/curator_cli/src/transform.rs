//! `curator transform`: bring one asset or the whole project up to date.

use std::sync::atomic::AtomicBool;

use curator_assets::TransformState;
use curator_common::Status;
use curator_core::{AssetCurator, TransformFlags, TransformTicket};

use crate::project::{open_and_scan, print_log, resolve_asset};
use crate::{GlobalArgs, TransformArgs};

/// Runs the `curator transform` command.
///
/// A single asset is transformed as a manual request, which also retries it
/// after an earlier failure. Without an asset every asset that needs work is
/// transformed, dependencies first. Lookup tables and the hash cache are
/// written afterwards either way.
pub fn run(args: &TransformArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;

    let status = match &args.asset {
        Some(query) => transform_one(&curator, query, args.force, global)?,
        None => {
            let flags = TransformFlags {
                force: args.force,
                manual: false,
            };
            let status = curator.transform_all_assets(flags, &AtomicBool::new(false));
            report_failures(&curator, global);
            status
        }
    };
    curator.wait_idle();

    let status = status.worst(curator.write_asset_tables());
    curator.save_caches()?;
    if args.gc {
        let removed = curator.gc_outputs()?;
        if !global.quiet {
            eprintln!("   Removed {removed} orphaned output(s)");
        }
    }

    if !global.quiet {
        eprintln!(
            "   Result: {status}, {} job(s) executed",
            curator.jobs_executed()
        );
    }
    Ok(if status.is_failure() { 1 } else { 0 })
}

fn transform_one(
    curator: &AssetCurator,
    query: &str,
    force: bool,
    global: &GlobalArgs,
) -> Result<Status, Box<dyn std::error::Error>> {
    let guid = resolve_asset(curator, query)?;
    let flags = TransformFlags {
        force,
        manual: true,
    };
    let status = match curator.transform_asset(guid, flags)? {
        TransformTicket::UpToDate => Status::Success,
        TransformTicket::Blocked(state) => {
            eprintln!("error: {query} cannot be transformed: {state}");
            Status::Failure
        }
        TransformTicket::Queued(handle) => {
            if handle.wait().is_success() {
                Status::Success
            } else {
                Status::Failure
            }
        }
    };
    print_log(&curator.asset_log(guid), global);
    Ok(status)
}

fn report_failures(curator: &AssetCurator, global: &GlobalArgs) {
    for (guid, path, state) in curator.asset_states() {
        if state == TransformState::TransformError {
            eprintln!("error: {path} failed to transform");
            print_log(&curator.asset_log(guid), global);
        }
    }
}
