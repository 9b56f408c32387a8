#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! sqlpatch - Versioned schema patching for embedded SQLite databases
//!
//! sqlpatch takes a SQLite file at an unknown schema version, works out which
//! patches it is missing, snapshots the file, and applies the missing patches in
//! version order. A failed run leaves either the snapshot or a database rolled
//! back to the last fully applied patch; never a half-applied one.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Engine, ledger, backups, config loading | `rusqlite`, `config` |
//! | `display` | Table formatting of ledger entries | `tabled` |
//! | `cli` | The `sqlpatch` binary | All above + `clap`, `tracing-subscriber` |
//!
//! ```toml
//! # Library only
//! sqlpatch = { version = "0.3", default-features = false }
//! ```
//!
//! # Architecture
//!
//! - **[`database`]**: the engine
//!   - `core`: `StorageHandle`, parameters, tuning
//!   - `migration`: `VersionLedger`, `BackupManager`, `PatchRunner`
//!   - `lifecycle`: `Database` state machine
//! - **[`logger`]**: the logging capability injected into a `Database`
//! - **[`config`]**: CLI configuration and patch-file loading
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sqlpatch::{Database, DatabaseOptions, Params, Patch, Value};
//!
//! let mut db = Database::new(
//!     DatabaseOptions::new("messages.sqlite3")
//!         .read_write()
//!         .patches(vec![
//!             Patch::new(1, ["CREATE TABLE messages (id INTEGER PRIMARY KEY, text TEXT)"]),
//!         ]),
//! )?;
//! db.initialize()?;
//!
//! db.execute(
//!     "INSERT INTO messages (id, text) VALUES (:id, :text)",
//!     &Params::named([("id", Value::Integer(1)), ("text", Value::Text("hi".into()))]),
//! )?;
//! let row = db.query_one("SELECT COUNT(*) AS cnt FROM messages", &Params::none())?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod logger;

pub use config::{PatchFile, SqlpatchConfig};

pub use database::{
    AccessMode, BackupManager, BackupOutcome, BackupRecord, Database, DatabaseOptions,
    LedgerEntry, LifecycleState, MigrationReport, Params, Patch, PatchRunner, Row, StorageHandle,
    Tuning, Value, VersionLedger,
};

pub use error::{Error, Result};
pub use logger::{Logger, NullLogger, SharedLogger, TracingLogger};
