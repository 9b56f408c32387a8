//! Schema migration
//!
//! - `VersionLedger`: which schema version is installed
//! - `BackupManager`: file snapshots taken before patching
//! - `PatchRunner`: computes and applies the missing patches

mod backup;
mod ledger;
mod runner;

pub use backup::{BackupManager, BackupRecord};
pub use ledger::{LedgerDefinitions, LedgerEntry, VersionLedger, LEDGER_TABLE};
pub use runner::{BackupOutcome, MigrationReport, Patch, PatchRunner};
