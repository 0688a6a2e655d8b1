//! Subcommand bodies; each returns the process exit code

use crate::cli;
use anyhow::{Context, Result};
use clap::ArgMatches;
use remedy_core::{CycleController, CycleId, CycleResult, EngineConfig};
use remedy_ledger::{
    AttestationLog, FileAttestationLog, FileRestore, FileTrustStore, FsSnapshotStore,
    SnapshotStore, StateLayout, TrustStore, WorkspaceLock,
};
use std::path::Path;
use std::time::Duration;

/// Cycle ended in failure or was rolled back
pub(crate) const EXIT_FAILURE: i32 = 1;
/// No cycle could run
pub(crate) const EXIT_FATAL: i32 = 2;

fn load_config(workspace: &Path) -> Result<EngineConfig> {
    EngineConfig::load(workspace)
        .with_context(|| format!("loading configuration for {}", workspace.display()))
}

fn layout(workspace: &Path, config: &EngineConfig) -> StateLayout {
    StateLayout::new(workspace, &config.state_dir)
}

pub(crate) async fn run(args: &ArgMatches) -> Result<i32> {
    let workspace = cli::workspace(args);
    let config = cli::apply_overrides(load_config(&workspace)?, args);
    let controller = CycleController::open(&workspace, config).context("preparing the cycle")?;

    match controller.run_cycle().await {
        Ok(result) => {
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            Ok(result.exit_code())
        }
        Err(err) => {
            eprintln!("remedy: cycle not run: {err} [{}]", err.kind());
            Ok(EXIT_FATAL)
        }
    }
}

fn print_result(result: &CycleResult) {
    println!("cycle {} {}: {}", result.cycle_id, result.phase, result.verdict);
    println!("  issues   {} -> {}", result.issues_before, result.issues_after);
    let files: Vec<String> = result.files_changed.iter().map(ToString::to_string).collect();
    println!("  files    {} {}", files.len(), files.join(" "));
    println!("  recipes  {}", result.recipes_applied.join(" "));
    if let Some(snapshot) = result.snapshot {
        println!("  snapshot {snapshot}");
    }
    println!("  attest   {}", result.attestation_hash.short());
    if let (Some(kind), Some(message)) = (result.error, &result.error_message) {
        println!("  error    {kind}: {message}");
    }
}

pub(crate) fn verify_chain(args: &ArgMatches) -> Result<i32> {
    let workspace = cli::workspace(args);
    let config = load_config(&workspace)?;
    let log = FileAttestationLog::new(layout(&workspace, &config).attestation_file());

    match log.records() {
        Ok(records) => {
            println!("attestation chain intact: {} records", records.len());
            if let Some(last) = records.last() {
                println!("  head {} (cycle {}, {})", last.self_hash, last.cycle_id, last.verdict);
            }
            Ok(0)
        }
        Err(err) => {
            tracing::error!(error = %err, "attestation chain is broken");
            eprintln!("ATTESTATION CHAIN BROKEN: {err}");
            Ok(EXIT_FAILURE)
        }
    }
}

pub(crate) fn restore(args: &ArgMatches) -> Result<i32> {
    let workspace = cli::workspace(args);
    let config = load_config(&workspace)?;
    let layout = layout(&workspace, &config);
    let snapshot = args
        .get_one::<String>("snapshot")
        .map(|id| id.parse::<CycleId>().with_context(|| format!("invalid snapshot id '{id}'")))
        .transpose()?;

    let _lock = acquire_lock(&layout, &config)?;
    let store = FsSnapshotStore::new(layout.snapshot_dir());
    let report = match snapshot {
        Some(id) => store.restore(id, &workspace)?,
        None => store.restore_latest(&workspace)?,
    };

    println!("restored snapshot {}: {} files changed", report.snapshot, report.changed());
    for (path, outcome) in &report.files {
        let status = match outcome {
            FileRestore::Restored => "restored".to_string(),
            FileRestore::Removed => "removed".to_string(),
            FileRestore::AlreadyRestored => "unchanged".to_string(),
            FileRestore::Drifted { found: Some(hash) } => format!("DRIFTED (now {})", hash.short()),
            FileRestore::Drifted { found: None } => "DRIFTED (missing)".to_string(),
        };
        println!("  {path} {status}");
    }
    if !report.is_complete() {
        eprintln!("remedy: files changed since the cycle were left as found");
        return Ok(EXIT_FAILURE);
    }
    Ok(0)
}

fn acquire_lock(layout: &StateLayout, config: &EngineConfig) -> Result<WorkspaceLock> {
    let wait = Duration::from_millis(config.lock_wait_ms);
    Ok(WorkspaceLock::acquire(&layout.lock_file(), wait)?)
}

pub(crate) fn trust(args: &ArgMatches) -> Result<i32> {
    let workspace = cli::workspace(args);
    let config = load_config(&workspace)?;
    let layout = layout(&workspace, &config);

    let toggle = match (args.get_one::<String>("disable"), args.get_one::<String>("enable")) {
        (Some(id), _) => Some((id, true)),
        (None, Some(id)) => Some((id, false)),
        (None, None) => None,
    };
    if let Some((id, disabled)) = toggle {
        let registry = config.build_registry()?;
        anyhow::ensure!(registry.contains(id), "no recipe named '{id}'");
        let _lock = acquire_lock(&layout, &config)?;
        FileTrustStore::open(layout.trust_file())?.set_disabled(id, disabled)?;
        println!("{id} {}", if disabled { "disabled" } else { "enabled" });
    }

    let table = FileTrustStore::open(layout.trust_file())?.all()?;
    if table.is_empty() {
        println!("no trust recorded yet");
    }
    for (id, record) in &table {
        println!(
            "{id:<28} {:.3}  ok {:>3}  partial {:>3}  failed {:>3}{}",
            record.score,
            record.successes,
            record.partials,
            record.failures,
            if record.disabled { "  (disabled)" } else { "" }
        );
    }
    Ok(0)
}

pub(crate) fn snapshots(args: &ArgMatches) -> Result<i32> {
    let workspace = cli::workspace(args);
    let config = load_config(&workspace)?;
    let store = FsSnapshotStore::new(layout(&workspace, &config).snapshot_dir());

    let ids = store.list()?;
    if ids.is_empty() {
        println!("no snapshots");
    }
    for id in ids {
        match store.load(id) {
            Ok(snapshot) => println!(
                "{id}  {}  {} files",
                snapshot.created_at.to_rfc3339(),
                snapshot.files.len()
            ),
            Err(err) => println!("{id}  unreadable: {err}"),
        }
    }
    Ok(0)
}
