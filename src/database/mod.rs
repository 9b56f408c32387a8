//! Database module
//!
//! This module provides the schema patching engine, organized into:
//!
//! - **core**: the single-connection `StorageHandle`, parameter binding, tuning
//! - **migration**: version ledger, file backups and the patch runner
//! - **lifecycle**: the `Database` state machine that gates every operation
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # StorageHandle and AccessMode
//! │   ├── params      # Positional / named parameters, result rows
//! │   └── tuning      # Startup pragma directives
//! │
//! ├── migration/      # Schema versioning
//! │   ├── ledger      # db_version table (append-only history)
//! │   ├── backup      # bkp-<millis>.<ext> snapshots
//! │   └── runner      # Ordered, per-patch transactional application
//! │
//! └── lifecycle       # Database: Uninitialized → Initializing → Ready → Closed
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sqlpatch::database::{Database, DatabaseOptions, Patch};
//!
//! let mut db = Database::new(
//!     DatabaseOptions::new("app.sqlite3")
//!         .read_write()
//!         .backup_dir("/var/backups/app")
//!         .patches(vec![
//!             Patch::new(1, ["CREATE TABLE messages (id INTEGER PRIMARY KEY, text TEXT)"]),
//!             Patch::new(2, ["ALTER TABLE messages ADD COLUMN created_at INTEGER"]),
//!         ]),
//! )?;
//!
//! match db.initialize() {
//!     Ok(report) => println!("{:?}", report),
//!     Err(e) => {
//!         if let Some(backup) = e.backup_path() {
//!             eprintln!("restore from {}", backup.display());
//!         }
//!         return Err(e);
//!     }
//! }
//! ```

pub mod core;
pub mod lifecycle;
pub mod migration;

pub use core::{
    AccessMode, Params, Row, StorageHandle, Tuning, Value, READ_ONLY_DEFAULTS,
    READ_WRITE_DEFAULTS,
};
pub use lifecycle::{Database, DatabaseOptions, LifecycleState};
pub use migration::{
    BackupManager, BackupOutcome, BackupRecord, LedgerEntry, MigrationReport, Patch, PatchRunner,
    VersionLedger, LEDGER_TABLE,
};
