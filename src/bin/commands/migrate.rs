//! Migrate command: bring a database up to the latest patch version

use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use sqlpatch::{
    AccessMode, BackupManager, BackupOutcome, Database, Error, MigrationReport, PatchFile,
    PatchRunner, SqlpatchConfig, StorageHandle, VersionLedger,
};

use super::{exit_with_error, OutputFormat};

/// Arguments for the Migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Path to the SQLite database file (created if missing)
    pub database: PathBuf,

    /// Patch file (toml or json) holding a `patches` array
    #[clap(short, long)]
    pub patches: PathBuf,

    /// Directory for the pre-migration snapshot, overriding the configured one
    #[clap(short, long)]
    pub backup_dir: Option<PathBuf>,

    /// Only list the patches that would be applied
    #[clap(long)]
    pub dry_run: bool,
}

pub fn run(config: &SqlpatchConfig, args: MigrateArgs, output_format: OutputFormat) {
    let patch_file = match PatchFile::load(&args.patches) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let backup_dir = args
        .backup_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.backup_dir));

    if args.dry_run {
        run_dry(&args, patch_file, backup_dir, output_format);
        return;
    }

    let options = config
        .database_options(&args.database)
        .read_write()
        .backup_dir(backup_dir)
        .patches(patch_file.patches);

    let mut db = match Database::new(options) {
        Ok(db) => db,
        Err(e) => exit_with_error("Invalid patch set", &e, output_format),
    };

    match db.initialize() {
        Ok(Some(report)) => print_report(&report, output_format),
        Ok(None) => eprintln!("No patches found in {}", args.patches.display()),
        Err(e) => exit_with_error("Migration failed", &e, output_format),
    }

    if let Err(e) = db.close() {
        eprintln!("WARNING: Failed to close database: {}", e);
    }
}

fn run_dry(
    args: &MigrateArgs,
    patch_file: PatchFile,
    backup_dir: PathBuf,
    output_format: OutputFormat,
) {
    let runner = match PatchRunner::new(patch_file.patches, BackupManager::new(backup_dir)) {
        Ok(r) => r,
        Err(e) => exit_with_error("Invalid patch set", &e, output_format),
    };

    // read-only so the ledger is not created; a missing file is version 0
    let current = match StorageHandle::open_path(&args.database, AccessMode::ReadOnly) {
        Ok(mut handle) => {
            let version = VersionLedger::current_version(&handle);
            if let Err(e) = handle.close() {
                eprintln!("WARNING: Failed to close database: {}", e);
            }
            version
        }
        Err(Error::NotFound { .. }) => Ok(0),
        Err(e) => Err(e),
    };
    let current = match current {
        Ok(v) => v,
        Err(e) => exit_with_error("Failed to read schema version", &e, output_format),
    };

    let pending: Vec<u32> = runner.pending(current).iter().map(|p| p.version).collect();

    if output_format.is_json() {
        output_format.print_json(&json!({
            "current": current,
            "latest": runner.latest_version().max(current),
            "pending": pending,
        }));
        return;
    }

    println!("Current version: {}", current);
    if pending.is_empty() {
        println!("Up to date, nothing to apply.");
    } else {
        println!("Would apply {} patch(es): {}", pending.len(), join(&pending));
    }
}

fn print_report(report: &MigrationReport, output_format: OutputFormat) {
    if output_format.is_json() {
        output_format.print_json(report);
        return;
    }

    if report.is_noop() {
        println!("Already at version {}, nothing to apply.", report.to);
        return;
    }

    println!(
        "Migrated from version {} to {} ({})",
        report.from,
        report.to,
        join(&report.applied)
    );
    match &report.backup {
        BackupOutcome::Skipped => {}
        BackupOutcome::Removed(path) => {
            println!("Snapshot {} removed", path.display());
        }
        BackupOutcome::Retained(path) => {
            eprintln!(
                "WARNING: Could not remove snapshot {}; delete it manually",
                path.display()
            );
        }
    }
}

fn join(versions: &[u32]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
