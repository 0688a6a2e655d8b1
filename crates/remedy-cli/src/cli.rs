//! Command-line definition and config overrides

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use remedy_core::EngineConfig;
use std::path::PathBuf;

pub(crate) fn command() -> Command {
    Command::new("remedy")
        .version(remedy_core::VERSION)
        .about("Self-healing remediation: observe, decide, act, verify, learn")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("run")
                .about("Run one remediation cycle")
                .arg(workspace_arg())
                .arg(
                    Arg::new("max-files")
                        .long("max-files")
                        .value_parser(value_parser!(usize))
                        .help("Distinct files one cycle may touch"),
                )
                .arg(
                    Arg::new("max-loc-per-file")
                        .long("max-loc-per-file")
                        .value_parser(value_parser!(u32))
                        .help("Changed lines allowed per file"),
                )
                .arg(
                    Arg::new("min-trust")
                        .long("min-trust")
                        .value_parser(value_parser!(f64))
                        .help("Minimum trust x confidence for an action"),
                )
                .arg(
                    Arg::new("report")
                        .long("report")
                        .value_parser(value_parser!(PathBuf))
                        .help("Analysis report, relative to the workspace"),
                )
                .arg(
                    Arg::new("build-cmd")
                        .long("build-cmd")
                        .conflicts_with("build-argv")
                        .help("Build command run during verification, split on whitespace"),
                )
                .arg(
                    Arg::new("build-argv")
                        .value_name("BUILD")
                        .num_args(1..)
                        .last(true)
                        .help("Build command after `--`, each word passed as given"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the cycle result as JSON"),
                ),
        )
        .subcommand(
            Command::new("verify-chain")
                .about("Verify the attestation chain")
                .arg(workspace_arg()),
        )
        .subcommand(
            Command::new("restore")
                .about("Undo a cycle from its snapshot")
                .arg(workspace_arg())
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .help("Snapshot id (defaults to the newest)"),
                ),
        )
        .subcommand(
            Command::new("trust")
                .about("List recipe trust scores")
                .arg(workspace_arg())
                .arg(
                    Arg::new("disable")
                        .long("disable")
                        .value_name("RECIPE")
                        .conflicts_with("enable")
                        .help("Stop selecting a recipe"),
                )
                .arg(
                    Arg::new("enable")
                        .long("enable")
                        .value_name("RECIPE")
                        .help("Re-enable a disabled recipe"),
                ),
        )
        .subcommand(
            Command::new("snapshots")
                .about("List retained snapshots, newest first")
                .arg(workspace_arg()),
        )
}

fn workspace_arg() -> Arg {
    Arg::new("workspace")
        .default_value(".")
        .value_parser(value_parser!(PathBuf))
        .help("Workspace root")
}

pub(crate) fn workspace(args: &ArgMatches) -> PathBuf {
    args.get_one::<PathBuf>("workspace")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Fold `run` flags over the loaded configuration
pub(crate) fn apply_overrides(mut config: EngineConfig, args: &ArgMatches) -> EngineConfig {
    if let Some(max) = args.get_one::<usize>("max-files") {
        config = config.with_max_files(*max);
    }
    if let Some(max) = args.get_one::<u32>("max-loc-per-file") {
        config = config.with_max_loc_per_file(*max);
    }
    if let Some(min) = args.get_one::<f64>("min-trust") {
        config = config.with_min_trust_threshold(*min);
    }
    if let Some(report) = args.get_one::<PathBuf>("report") {
        config = config.with_report_path(report.clone());
    }
    let argv: Vec<String> = match args.get_many::<String>("build-argv") {
        Some(words) => words.cloned().collect(),
        None => args
            .get_one::<String>("build-cmd")
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    };
    if !argv.is_empty() {
        config = config.with_build_command(argv);
    }
    config
}
