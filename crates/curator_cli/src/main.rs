//! Curator CLI: the command-line front end of the asset curator.
//!
//! `curator check` scans the data directories and reports every asset's
//! transform state, `curator transform` brings assets up to date, and the
//! remaining commands write lookup tables, query dependencies, export the
//! dependency graph, resave documents and manage platform profiles. The
//! hidden `curator worker` mode is what the curator spawns as its
//! out-of-process transform workers.

#![warn(missing_docs)]

mod check;
mod dgml;
mod profiles;
mod project;
mod resave;
mod tables;
mod transform;
mod uses;
mod worker;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Curator: dependency tracking and incremental asset transforms.
#[derive(Parser, Debug)]
#[command(name = "curator", version, about = "Asset curator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Project directory or path to its `curator.toml`.
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the data directories and report transform states.
    Check(CheckArgs),
    /// Transform one asset or every asset that needs it.
    Transform(TransformArgs),
    /// Write the GUID lookup tables for every profile.
    Tables,
    /// List the assets that use an asset.
    Uses(UsesArgs),
    /// Export the dependencies of an asset as a DGML graph.
    Dgml(DgmlArgs),
    /// Load and save every asset document in canonical form.
    Resave,
    /// Manage platform profiles.
    Profiles {
        /// The profile operation.
        #[command(subcommand)]
        action: Option<ProfileAction>,
    },
    /// Serve transform jobs on stdin/stdout.
    #[command(hide = true)]
    Worker,
}

/// Arguments for `curator check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,

    /// Also list assets that are up to date.
    #[arg(short, long)]
    pub all: bool,
}

/// Arguments for `curator transform`.
#[derive(Parser, Debug)]
pub struct TransformArgs {
    /// GUID, qualified path or file path of a single asset.
    pub asset: Option<String>,

    /// Transform even if outputs are current.
    #[arg(long)]
    pub force: bool,

    /// Remove outputs of assets that no longer exist.
    #[arg(long)]
    pub gc: bool,
}

/// Arguments for `curator uses`.
#[derive(Parser, Debug)]
pub struct UsesArgs {
    /// GUID, qualified path or file path of the asset.
    pub asset: String,

    /// Include indirect users.
    #[arg(short, long)]
    pub transitive: bool,
}

/// Arguments for `curator dgml`.
#[derive(Parser, Debug)]
pub struct DgmlArgs {
    /// GUID, qualified path or file path of the asset.
    pub asset: String,

    /// Output file.
    #[arg(short, long, default_value = "dependencies.dgml")]
    pub output: PathBuf,
}

/// Profile operations.
#[derive(Subcommand, Debug)]
pub enum ProfileAction {
    /// List the profiles.
    List,
    /// Add a profile.
    Add {
        /// Profile name.
        name: String,
        /// Target platform.
        platform: String,
    },
    /// Rename a profile.
    Rename {
        /// Profile index.
        index: usize,
        /// New name.
        name: String,
    },
    /// Remove a profile.
    Remove {
        /// Profile index.
        index: usize,
    },
    /// Make a profile the active one.
    Select {
        /// Profile index.
        index: usize,
    },
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Report format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Explicit project directory or config file.
    pub project: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        project: cli.project,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Check(ref args) => check::run(args, &global),
        Command::Transform(ref args) => transform::run(args, &global),
        Command::Tables => tables::run(&global),
        Command::Uses(ref args) => uses::run(args, &global),
        Command::Dgml(ref args) => dgml::run(args, &global),
        Command::Resave => resave::run(&global),
        Command::Profiles { ref action } => profiles::run(action.as_ref(), &global),
        Command::Worker => worker::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout carries reports and, in worker mode, frames.
fn init_tracing(global: &GlobalArgs) {
    let default = if global.verbose {
        "debug"
    } else if global.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(global.color)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_check_default() {
        let cli = Cli::parse_from(["curator", "check"]);
        match cli.command {
            Command::Check(ref args) => {
                assert_eq!(args.format, ReportFormat::Text);
                assert!(!args.all);
            }
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn parse_transform_single_asset() {
        let cli = Cli::parse_from(["curator", "transform", "project/box.mesh", "--force"]);
        match cli.command {
            Command::Transform(ref args) => {
                assert_eq!(args.asset.as_deref(), Some("project/box.mesh"));
                assert!(args.force);
                assert!(!args.gc);
            }
            _ => panic!("expected Transform command"),
        }
    }

    #[test]
    fn parse_transform_all() {
        let cli = Cli::parse_from(["curator", "transform", "--gc"]);
        match cli.command {
            Command::Transform(ref args) => {
                assert!(args.asset.is_none());
                assert!(args.gc);
            }
            _ => panic!("expected Transform command"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["curator", "tables", "--project", "/work/game", "-q"]);
        assert!(cli.quiet);
        assert_eq!(cli.project.as_deref(), Some(std::path::Path::new("/work/game")));
        assert!(matches!(cli.command, Command::Tables));
    }

    #[test]
    fn parse_uses_transitive() {
        let cli = Cli::parse_from(["curator", "uses", "project/wood.tex", "-t"]);
        match cli.command {
            Command::Uses(ref args) => {
                assert_eq!(args.asset, "project/wood.tex");
                assert!(args.transitive);
            }
            _ => panic!("expected Uses command"),
        }
    }

    #[test]
    fn parse_dgml_default_output() {
        let cli = Cli::parse_from(["curator", "dgml", "project/box.mesh"]);
        match cli.command {
            Command::Dgml(ref args) => {
                assert_eq!(args.output, PathBuf::from("dependencies.dgml"));
            }
            _ => panic!("expected Dgml command"),
        }
    }

    #[test]
    fn parse_profile_actions() {
        let cli = Cli::parse_from(["curator", "profiles", "add", "Android", "android"]);
        match cli.command {
            Command::Profiles {
                action: Some(ProfileAction::Add { name, platform }),
            } => {
                assert_eq!(name, "Android");
                assert_eq!(platform, "android");
            }
            _ => panic!("expected Profiles add"),
        }

        let cli = Cli::parse_from(["curator", "profiles"]);
        assert!(matches!(cli.command, Command::Profiles { action: None }));
    }

    #[test]
    fn parse_hidden_worker() {
        let cli = Cli::parse_from(["curator", "--project", "/p", "worker"]);
        assert!(matches!(cli.command, Command::Worker));
    }

    #[test]
    fn parse_color_never() {
        let cli = Cli::parse_from(["curator", "--color", "never", "check"]);
        assert_eq!(cli.color, ColorChoice::Never);
    }
}
