pub mod backup;
pub mod config;
pub mod migrate;
pub mod restore;
pub mod status;

use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

/// Output format shared by every subcommand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables and summaries (default)
    #[default]
    Table,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON with indentation
    JsonPretty,
}

impl OutputFormat {
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    /// Print `value` as JSON in the selected flavor
    ///
    /// Only meaningful for the JSON variants; `Table` falls back to pretty JSON.
    pub fn print_json<T: Serialize>(&self, value: &T) {
        let rendered = match self {
            Self::Json => serde_json::to_string(value),
            Self::Table | Self::JsonPretty => serde_json::to_string_pretty(value),
        };
        match rendered {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("ERROR: Failed to serialize output: {}", e),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

/// Print an engine error and exit
///
/// A failed patch also names the snapshot that holds the pre-migration file.
pub fn exit_with_error(context: &str, err: &sqlpatch::Error, output_format: OutputFormat) -> ! {
    if output_format.is_json() {
        output_format.print_json(&serde_json::json!({
            "error": format!("{}: {}", context, err),
            "failed_version": err.patch_version(),
            "backup": err.backup_path(),
        }));
    } else {
        eprintln!("ERROR: {}: {}", context, err);
        if let Some(backup) = err.backup_path() {
            eprintln!();
            eprintln!("The database may hold a partly applied patch.");
            eprintln!("Pre-migration snapshot: {}", backup.display());
            eprintln!("Restore it with `sqlpatch restore {} <DATABASE>`", backup.display());
        }
    }
    std::process::exit(1);
}
