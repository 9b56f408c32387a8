//! Restore command: copy a snapshot back over a database file

use std::path::PathBuf;

use clap::Args;
use serde_json::json;
use sqlpatch::BackupManager;

use super::{exit_with_error, OutputFormat};

/// Arguments for the Restore command
#[derive(Args)]
pub struct RestoreArgs {
    /// Snapshot file produced by `migrate` or `backup`
    pub backup: PathBuf,

    /// Database file to overwrite
    pub database: PathBuf,

    /// Skip confirmation prompt
    #[clap(short, long)]
    pub yes: bool,
}

pub fn run(args: RestoreArgs, output_format: OutputFormat) {
    if !args.yes && !output_format.is_json() && args.database.exists() {
        eprintln!(
            "This will overwrite {} with {}",
            args.database.display(),
            args.backup.display()
        );
        eprint!("Are you sure? [y/N] ");

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_ok() {
            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                eprintln!("Aborted.");
                return;
            }
        } else {
            eprintln!("Aborted.");
            return;
        }
    }

    if let Err(e) = BackupManager::restore_backup(&args.backup, &args.database) {
        exit_with_error("Restore failed", &e, output_format);
    }

    if output_format.is_json() {
        output_format.print_json(&json!({
            "restored": args.database,
            "from": args.backup,
        }));
    } else {
        println!(
            "Restored {} from {}",
            args.database.display(),
            args.backup.display()
        );
    }
}
