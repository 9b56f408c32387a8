//! Backup command: take a snapshot outside a migration

use std::path::PathBuf;

use clap::Args;
use sqlpatch::{AccessMode, BackupManager, SqlpatchConfig, StorageHandle};

use super::{exit_with_error, OutputFormat};

/// Arguments for the Backup command
#[derive(Args)]
pub struct BackupArgs {
    /// Path to the SQLite database file
    pub database: PathBuf,

    /// Directory to write the snapshot into, overriding the configured one
    #[clap(short, long)]
    pub dir: Option<PathBuf>,
}

pub fn run(config: &SqlpatchConfig, args: BackupArgs, output_format: OutputFormat) {
    if !args.database.is_file() {
        eprintln!("ERROR: Database file not found: {}", args.database.display());
        std::process::exit(1);
    }

    // Fold pending WAL pages into the main file so the copy is complete
    match StorageHandle::open_path(&args.database, AccessMode::ReadWrite) {
        Ok(mut handle) => {
            if let Err(e) = handle.checkpoint() {
                eprintln!("WARNING: WAL checkpoint failed: {}", e);
            }
            if let Err(e) = handle.close() {
                eprintln!("WARNING: Failed to close database: {}", e);
            }
        }
        Err(e) => exit_with_error("Failed to open database", &e, output_format),
    }

    let manager = BackupManager::new(
        args.dir
            .unwrap_or_else(|| PathBuf::from(&config.backup_dir)),
    );
    let record = match manager.create_backup(&args.database) {
        Ok(r) => r,
        Err(e) => exit_with_error("Backup failed", &e, output_format),
    };

    if output_format.is_json() {
        output_format.print_json(&record);
    } else {
        println!("Snapshot written to {}", record.path.display());
    }
}
