//! `curator check`: scan and report transform states.

use curator_assets::TransformState;
use serde_json::json;

use crate::project::{open_and_scan, print_log};
use crate::{CheckArgs, GlobalArgs, ReportFormat};

/// Runs the `curator check` command.
///
/// Returns exit code 1 if any asset is blocked by a missing dependency, a
/// cycle or a failed transform.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let curator = open_and_scan(global)?;
    let states = curator.asset_states();
    let blocked = states.iter().filter(|(_, _, s)| s.is_blocked()).count();
    let listed = states
        .iter()
        .filter(|(_, _, s)| args.all || *s != TransformState::UpToDate);

    match args.format {
        ReportFormat::Text => {
            for (guid, path, state) in listed {
                println!("{:<28} {path}", state.to_string());
                print_log(&curator.asset_log(*guid), global);
            }
            if !global.quiet {
                let summary: Vec<String> = curator
                    .state_summary()
                    .into_iter()
                    .map(|(state, count)| format!("{count} {state}"))
                    .collect();
                eprintln!("   Result: {} asset(s): {}", states.len(), summary.join(", "));
            }
        }
        ReportFormat::Json => {
            let report: Vec<_> = listed
                .map(|(guid, path, state)| {
                    json!({
                        "guid": guid,
                        "path": path,
                        "state": state,
                        "log": curator.asset_log(*guid),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(if blocked > 0 { 1 } else { 0 })
}
