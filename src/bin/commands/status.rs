//! Status command: report the installed schema version of a database

use std::path::PathBuf;

use chrono::Utc;
use chrono_humanize::HumanTime;
use clap::Args;
use serde::Serialize;
use sqlpatch::{Database, LedgerEntry, SqlpatchConfig};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{exit_with_error, OutputFormat};

/// Arguments for the Status command
#[derive(Args)]
pub struct StatusArgs {
    /// Path to the SQLite database file
    pub database: PathBuf,
}

#[derive(Serialize)]
struct StatusInfo {
    path: PathBuf,
    size_bytes: u64,
    version: u32,
    history: Vec<LedgerEntry>,
}

#[derive(Tabled)]
struct HistoryRow {
    version: u32,
    installed_at: String,
    age: String,
}

impl From<&LedgerEntry> for HistoryRow {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            version: entry.version,
            installed_at: entry.installed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            age: HumanTime::from(entry.installed_at - Utc::now()).to_string(),
        }
    }
}

pub fn run(config: &SqlpatchConfig, args: StatusArgs, output_format: OutputFormat) {
    // read-only: status never creates the ledger or touches the file
    let mut db = match Database::new(config.database_options(&args.database).read_only()) {
        Ok(db) => db,
        Err(e) => exit_with_error("Failed to create database", &e, output_format),
    };
    if let Err(e) = db.initialize() {
        exit_with_error("Failed to open database", &e, output_format);
    }

    let (version, history) = match db.schema_version().and_then(|v| Ok((v, db.history()?))) {
        Ok(res) => res,
        Err(e) => exit_with_error("Failed to read schema version", &e, output_format),
    };

    let info = StatusInfo {
        path: db.path().to_path_buf(),
        size_bytes: std::fs::metadata(db.path()).map(|m| m.len()).unwrap_or(0),
        version,
        history,
    };

    if output_format.is_json() {
        output_format.print_json(&info);
    } else {
        println!("Database:        {}", info.path.display());
        println!("Size:            {} bytes", info.size_bytes);
        println!("Schema Version:  {}", info.version);

        if info.history.is_empty() {
            println!();
            println!("No version ledger found; the database has never been patched.");
        } else {
            let rows: Vec<HistoryRow> = info.history.iter().map(HistoryRow::from).collect();
            println!();
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }

    if let Err(e) = db.close() {
        eprintln!("WARNING: Failed to close database: {}", e);
    }
}
