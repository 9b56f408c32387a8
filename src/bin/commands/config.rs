use std::path::Path;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use sqlpatch::SqlpatchConfig;

use super::OutputFormat;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list snapshots found in the backup directory
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    backup_dir: String,
    tuning: Vec<String>,
    info_logging: bool,
    error_logging: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    backups: Option<Vec<BackupFileInfo>>,
}

#[derive(Debug, Serialize)]
struct BackupFileInfo {
    name: String,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

pub fn run(config: &SqlpatchConfig, args: ConfigArgs, output_format: OutputFormat) {
    let ConfigArgs { verbose } = args;

    let info = ConfigInfo {
        config_file: SqlpatchConfig::config_file_path(),
        backup_dir: config.backup_dir.clone(),
        tuning: config.tuning.clone(),
        info_logging: config.info_logging,
        error_logging: config.error_logging,
        backups: verbose.then(|| list_backups(Path::new(&config.backup_dir))),
    };

    if output_format.is_json() {
        output_format.print_json(&info);
        return;
    }

    println!("Configuration:");
    println!("  Config file:        {}", info.config_file);
    for line in config.summary().lines() {
        println!("  {}", line);
    }

    if let Some(backups) = &info.backups {
        println!();
        if backups.is_empty() {
            println!("No snapshots in {}", info.backup_dir);
        } else {
            println!("Snapshots in {}:", info.backup_dir);
            for b in backups {
                println!(
                    "  {:<32} {:>12} bytes  {}",
                    b.name,
                    b.size_bytes,
                    b.modified.as_deref().unwrap_or("-")
                );
            }
        }
    }
}

/// Snapshot files (`bkp-*`) in `dir`, oldest first
fn list_backups(dir: &Path) -> Vec<BackupFileInfo> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut backups: Vec<BackupFileInfo> = entries
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("bkp-") || name.ends_with(".partial") {
                return None;
            }
            let meta = entry.metadata().ok()?;
            let modified = meta
                .modified()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S UTC").to_string());
            Some(BackupFileInfo {
                name,
                size_bytes: meta.len(),
                modified,
            })
        })
        .collect();

    // names embed epoch millis of equal width for any realistic date
    backups.sort_by(|a, b| a.name.cmp(&b.name));
    backups
}
