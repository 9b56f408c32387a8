//! Database lifecycle
//!
//! [`Database`] sequences the engine's components behind an explicit
//! [`LifecycleState`]. Data access is only possible once
//! [`initialize`](Database::initialize) has opened the file, applied tuning and
//! brought the schema up to date.
//!
//! Domain-specific queries belong in a separate type that holds a reference to
//! a `Database` and calls its primitives:
//!
//! ```rust,ignore
//! use sqlpatch::{Database, DatabaseOptions, Params, Patch, Value};
//!
//! struct Messages<'a> {
//!     db: &'a Database,
//! }
//!
//! impl Messages<'_> {
//!     fn add(&self, id: i64, text: &str) -> sqlpatch::Result<usize> {
//!         self.db.execute(
//!             "INSERT INTO messages (id, text) VALUES (?, ?)",
//!             &Params::positional([Value::Integer(id), Value::Text(text.into())]),
//!         )
//!     }
//! }
//!
//! let mut db = Database::new(
//!     DatabaseOptions::new("messages.sqlite3")
//!         .read_write()
//!         .patches(vec![Patch::new(1, ["CREATE TABLE messages (id INTEGER PRIMARY KEY, text TEXT)"])]),
//! )?;
//! db.initialize()?;
//! Messages { db: &db }.add(1, "hello")?;
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::core::{AccessMode, Params, Row, StorageHandle, Tuning};
use super::migration::{BackupManager, LedgerEntry, MigrationReport, Patch, PatchRunner, VersionLedger};
use crate::error::{Error, Result};
use crate::logger::{SharedLogger, TracingLogger};

/// Where a [`Database`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Construction-time configuration of a [`Database`]
#[derive(Clone)]
pub struct DatabaseOptions {
    path: PathBuf,
    mode: AccessMode,
    patches: Vec<Patch>,
    backup_dir: Option<PathBuf>,
    tuning: Tuning,
    info_logging: bool,
    error_logging: bool,
    logger: Option<SharedLogger>,
}

impl DatabaseOptions {
    /// Read-only options for `path`, default tuning, logging on
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mode: AccessMode::ReadOnly,
            patches: Vec::new(),
            backup_dir: None,
            tuning: Tuning::Defaults,
            info_logging: true,
            error_logging: true,
            logger: None,
        }
    }

    pub fn mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn read_only(self) -> Self {
        self.mode(AccessMode::ReadOnly)
    }

    pub fn read_write(self) -> Self {
        self.mode(AccessMode::ReadWrite)
    }

    /// Patch set to apply on initialize; ignored for read-only databases
    pub fn patches(mut self, patches: Vec<Patch>) -> Self {
        self.patches = patches;
        self
    }

    /// Directory for pre-migration snapshots (default: the platform temp dir)
    pub fn backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = Some(dir.into());
        self
    }

    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Replace the default tuning with explicit pragma directives
    pub fn tuning_directives<I, S>(self, directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tuning(Tuning::custom(directives))
    }

    pub fn info_logging(mut self, enabled: bool) -> Self {
        self.info_logging = enabled;
        self
    }

    pub fn error_logging(mut self, enabled: bool) -> Self {
        self.error_logging = enabled;
        self
    }

    /// Use a custom logger; the logging switches then no longer apply
    pub fn logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl fmt::Debug for DatabaseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseOptions")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("patches", &self.patches.len())
            .field("backup_dir", &self.backup_dir)
            .field("tuning", &self.tuning)
            .field("info_logging", &self.info_logging)
            .field("error_logging", &self.error_logging)
            .field("custom_logger", &self.logger.is_some())
            .finish()
    }
}

/// An embedded database with a gated lifecycle and schema patching
///
/// Not synchronised: one `Database` per file, used from one call path at a
/// time.
pub struct Database {
    path: PathBuf,
    mode: AccessMode,
    tuning: Tuning,
    runner: Option<PatchRunner>,
    patches_dropped: bool,
    logger: SharedLogger,
    state: LifecycleState,
    handle: Option<StorageHandle>,
}

impl Database {
    /// Build a database from options without touching the file
    ///
    /// Patches given for a read-only database are dropped; this is reported
    /// through the logger and [`patches_dropped`](Self::patches_dropped), not
    /// as an error. An invalid patch set fails with [`Error::InvalidPatches`].
    pub fn new(options: DatabaseOptions) -> Result<Self> {
        let logger: SharedLogger = match options.logger {
            Some(logger) => logger,
            None => Arc::new(TracingLogger::new(
                options.info_logging,
                options.error_logging,
            )),
        };

        let mut patches_dropped = false;
        let runner = if options.patches.is_empty() {
            None
        } else if options.mode.is_read_only() {
            logger.info("No patches possible for a read-only database, ignoring them");
            patches_dropped = true;
            None
        } else {
            let backups = options
                .backup_dir
                .map(BackupManager::new)
                .unwrap_or_else(BackupManager::in_temp_dir);
            Some(PatchRunner::new(options.patches, backups)?)
        };

        Ok(Self {
            path: options.path,
            mode: options.mode,
            tuning: options.tuning,
            runner,
            patches_dropped,
            logger,
            state: LifecycleState::Uninitialized,
            handle: None,
        })
    }

    /// Open, tune and patch the database
    ///
    /// Returns the migration report when patches are configured. On failure
    /// the state stays [`LifecycleState::Initializing`] and the instance cannot
    /// be initialized again; create a new one. Calling this on a ready
    /// database re-checks the patch level, which applies nothing unless the
    /// file changed underneath.
    pub fn initialize(&mut self) -> Result<Option<MigrationReport>> {
        match self.state {
            LifecycleState::Uninitialized => {}
            LifecycleState::Ready => return self.check_patches(),
            LifecycleState::Closed => return Err(Error::Closed),
            LifecycleState::Initializing => {
                return Err(Error::StateViolation {
                    operation: "initialize".to_string(),
                    state: self.state,
                })
            }
        }

        self.state = LifecycleState::Initializing;
        match self.setup() {
            Ok(report) => {
                self.state = LifecycleState::Ready;
                self.logger.info("Database is ready");
                Ok(report)
            }
            Err(e) => {
                self.logger
                    .error(&format!("Could not set up database: {}", e));
                Err(e)
            }
        }
    }

    fn setup(&mut self) -> Result<Option<MigrationReport>> {
        let handle = self
            .handle
            .insert(StorageHandle::new(&self.path, self.mode)?);
        handle.open()?;
        handle.apply_tuning(&self.tuning, self.logger.as_ref())?;

        match &self.runner {
            Some(runner) => runner.run(handle, self.logger.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    fn check_patches(&self) -> Result<Option<MigrationReport>> {
        let handle = self.ready("check patches")?;
        match &self.runner {
            Some(runner) => runner.run(handle, self.logger.as_ref()).map(Some),
            None => Ok(None),
        }
    }

    /// Release the connection; the database cannot be used afterwards
    pub fn close(&mut self) -> Result<()> {
        self.state = LifecycleState::Closed;
        match self.handle.take() {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        }
    }

    /// The open handle, if the database is ready
    fn ready(&self, operation: &str) -> Result<&StorageHandle> {
        match self.state {
            LifecycleState::Ready => self.handle.as_ref().ok_or(Error::NotOpen),
            LifecycleState::Closed => Err(Error::Closed),
            state => Err(Error::StateViolation {
                operation: operation.to_string(),
                state,
            }),
        }
    }

    /// Execute a single statement, returning the number of changed rows
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        self.ready("execute")?
            .execute(sql, params)
            .inspect_err(|e| self.log_failure("execute", e))
    }

    /// Execute one statement for every parameter set in one transaction
    pub fn execute_many(&self, sql: &str, param_sets: &[Params]) -> Result<usize> {
        self.ready("execute many")?
            .execute_many(sql, param_sets)
            .inspect_err(|e| self.log_failure("execute many", e))
    }

    pub fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        self.ready("query")?
            .query_one(sql, params)
            .inspect_err(|e| self.log_failure("query one", e))
    }

    pub fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        self.ready("query")?
            .query_all(sql, params)
            .inspect_err(|e| self.log_failure("query all", e))
    }

    /// Run `f` in a transaction; see [`StorageHandle::run_in_transaction`]
    pub fn run_in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StorageHandle) -> Result<T>,
    {
        self.ready("run transaction")?.run_in_transaction(f)
    }

    /// Installed schema version
    pub fn schema_version(&self) -> Result<u32> {
        VersionLedger::current_version(self.ready("read schema version")?)
    }

    /// Every recorded schema version with its install time
    pub fn history(&self) -> Result<Vec<LedgerEntry>> {
        VersionLedger::history(self.ready("read schema history")?)
    }

    /// The underlying handle, for collaborators that need more than the
    /// primitives
    pub fn handle(&self) -> Result<&StorageHandle> {
        self.ready("access handle")
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Whether patches were configured but dropped because the database is
    /// read-only
    pub fn patches_dropped(&self) -> bool {
        self.patches_dropped
    }

    /// Highest configured patch version, 0 without patches
    pub fn latest_patch_version(&self) -> u32 {
        self.runner
            .as_ref()
            .map(PatchRunner::latest_version)
            .unwrap_or(0)
    }

    fn log_failure(&self, operation: &str, e: &Error) {
        self.logger.error(&format!("{} failed: {}", operation, e));
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("latest_patch_version", &self.latest_patch_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::Value;
    use crate::database::migration::BackupOutcome;
    use crate::logger::testing::RecordingLogger;
    use crate::logger::NullLogger;
    use std::fs;

    fn messages_v1() -> Patch {
        Patch::new(
            1,
            ["CREATE TABLE messages (id INTEGER PRIMARY KEY, text TEXT)"],
        )
    }

    fn messages_v2() -> Patch {
        Patch::new(2, ["ALTER TABLE messages ADD COLUMN created_at INTEGER"])
    }

    fn options(path: &Path) -> DatabaseOptions {
        DatabaseOptions::new(path)
            .read_write()
            .backup_dir(path.with_file_name("bkp"))
            .logger(Arc::new(NullLogger))
    }

    /// Domain layer composed over the engine
    struct Messages<'a> {
        db: &'a Database,
    }

    impl Messages<'_> {
        fn add(&self, id: i64, text: &str) -> Result<usize> {
            self.db.execute(
                "INSERT INTO messages (id, text) VALUES (?, ?)",
                &Params::positional([Value::Integer(id), Value::Text(text.to_string())]),
            )
        }

        fn count(&self) -> Result<i64> {
            let row = self
                .db
                .query_one("SELECT COUNT(*) AS cnt FROM messages", &Params::none())?;
            Ok(row.and_then(|r| r.get_i64("cnt")).unwrap_or(0))
        }
    }

    #[test]
    fn test_new_database_with_patch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.sqlite");
        let mut db = Database::new(options(&path).patches(vec![messages_v1()])).unwrap();
        assert_eq!(db.state(), LifecycleState::Uninitialized);

        let report = db.initialize().unwrap().unwrap();
        assert_eq!(db.state(), LifecycleState::Ready);
        assert_eq!(report.applied, vec![1]);
        assert_eq!(db.schema_version().unwrap(), 1);

        let messages = Messages { db: &db };
        assert_eq!(messages.count().unwrap(), 0);
        messages.add(1, "Hello").unwrap();
        messages.add(2, "Hello2").unwrap();
        assert_eq!(messages.count().unwrap(), 2);
    }

    #[test]
    fn test_upgrade_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upgrade.sqlite");

        let mut db = Database::new(options(&path).patches(vec![messages_v1()])).unwrap();
        db.initialize().unwrap();
        Messages { db: &db }.add(1, "Hello").unwrap();
        db.close().unwrap();

        let mut db = Database::new(options(&path).patches(vec![messages_v2(), messages_v1()])).unwrap();
        let report = db.initialize().unwrap().unwrap();
        assert_eq!(report.from, 1);
        assert_eq!(report.to, 2);
        assert!(matches!(report.backup, BackupOutcome::Removed(_)));
        assert_eq!(db.schema_version().unwrap(), 2);

        let row = db
            .query_one("SELECT created_at FROM messages WHERE id = 1", &Params::none())
            .unwrap()
            .unwrap();
        assert!(row.is_null("created_at"));

        let messages = Messages { db: &db };
        messages.add(1_000_000, "Hello2").unwrap();
        assert_eq!(messages.count().unwrap(), 2);
    }

    #[test]
    fn test_initialize_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.sqlite");
        let patches = vec![messages_v1(), messages_v2()];

        let mut db = Database::new(options(&path).patches(patches.clone())).unwrap();
        db.initialize().unwrap();
        let history = db.history().unwrap();

        let again = db.initialize().unwrap().unwrap();
        assert!(again.is_noop());
        assert_eq!(db.history().unwrap(), history);
        db.close().unwrap();

        let mut db = Database::new(options(&path).patches(patches)).unwrap();
        let report = db.initialize().unwrap().unwrap();
        assert!(report.is_noop());
        assert_eq!(report.backup, BackupOutcome::Skipped);
        assert_eq!(db.history().unwrap(), history);
    }

    #[test]
    fn test_invalid_statement_in_first_patch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invalid.sqlite");
        let bkp_dir = path.with_file_name("bkp");

        let mut db = Database::new(
            options(&path).patches(vec![Patch::new(1, ["CREATE TABLE messages (id INTEGER"])]),
        )
        .unwrap();

        let err = db.initialize().unwrap_err();
        assert!(matches!(err, Error::Patch { version: 1, .. }));
        assert_eq!(err.backup_path(), None);
        assert_eq!(db.state(), LifecycleState::Initializing);
        assert!(!bkp_dir.exists() || fs::read_dir(&bkp_dir).unwrap().next().is_none());

        // A failed instance is not retried
        assert!(matches!(
            db.initialize(),
            Err(Error::StateViolation { .. })
        ));
        db.close().unwrap();

        let handle = StorageHandle::open_path(&path, AccessMode::ReadOnly).unwrap();
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 0);
    }

    #[test]
    fn test_operations_gated_by_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gated.sqlite");
        let mut db = Database::new(options(&path)).unwrap();

        let err = db.query_all("SELECT 1", &Params::none()).unwrap_err();
        assert!(matches!(
            err,
            Error::StateViolation {
                state: LifecycleState::Uninitialized,
                ..
            }
        ));
        assert!(matches!(db.schema_version(), Err(Error::StateViolation { .. })));

        assert!(db.initialize().unwrap().is_none());
        assert_eq!(db.query_all("SELECT 1", &Params::none()).unwrap().len(), 1);

        db.close().unwrap();
        assert_eq!(db.state(), LifecycleState::Closed);
        assert!(matches!(
            db.execute("SELECT 1", &Params::none()),
            Err(Error::Closed)
        ));
        assert!(matches!(db.initialize(), Err(Error::Closed)));
    }

    #[test]
    fn test_without_patches_no_ledger_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.sqlite");
        let mut db = Database::new(options(&path)).unwrap();
        db.initialize().unwrap();
        assert!(!db.handle().unwrap().table_exists("db_version").unwrap());
    }

    #[test]
    fn test_read_only_drops_patches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.sqlite");
        {
            let mut db = Database::new(options(&path).patches(vec![messages_v1()])).unwrap();
            db.initialize().unwrap();
            Messages { db: &db }.add(1, "Hello").unwrap();
        }

        let logger = Arc::new(RecordingLogger::default());
        let mut db = Database::new(
            DatabaseOptions::new(&path)
                .patches(vec![messages_v1(), messages_v2()])
                .logger(logger.clone()),
        )
        .unwrap();
        assert_eq!(db.mode(), AccessMode::ReadOnly);
        assert!(db.patches_dropped());
        assert_eq!(db.latest_patch_version(), 0);
        assert!(logger.infos().iter().any(|m| m.contains("read-only")));

        assert!(db.initialize().unwrap().is_none());
        assert_eq!(db.schema_version().unwrap(), 1);
        assert_eq!(Messages { db: &db }.count().unwrap(), 1);

        let err = Messages { db: &db }.add(2, "nope").unwrap_err();
        assert!(matches!(err, Error::ReadOnlyViolation { .. }));
        assert!(matches!(
            db.execute_many(
                "INSERT INTO messages (id, text) VALUES (?, ?)",
                &[Params::positional([Value::Integer(3), Value::Null])]
            ),
            Err(Error::ReadOnlyViolation { .. })
        ));
    }

    #[test]
    fn test_read_only_missing_file_fails_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sqlite");
        let mut db = Database::new(DatabaseOptions::new(&path).logger(Arc::new(NullLogger))).unwrap();

        assert!(matches!(db.initialize(), Err(Error::NotFound { .. })));
        assert_eq!(db.state(), LifecycleState::Initializing);
        assert!(!path.exists());
    }

    #[test]
    fn test_invalid_patch_set_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::new(
            options(&dir.path().join("dup.sqlite")).patches(vec![messages_v1(), messages_v1()]),
        );
        assert!(matches!(result, Err(Error::InvalidPatches(_))));
    }

    #[test]
    fn test_custom_tuning_directives() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuned.sqlite");
        let mut db = Database::new(options(&path).tuning_directives(["journal_mode=MEMORY"])).unwrap();
        db.initialize().unwrap();

        let row = db
            .query_one("PRAGMA journal_mode", &Params::none())
            .unwrap()
            .unwrap();
        assert_eq!(row.get_str("journal_mode"), Some("memory"));
    }

    #[test]
    fn test_transaction_through_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.sqlite");
        let mut db = Database::new(options(&path).patches(vec![messages_v1()])).unwrap();
        db.initialize().unwrap();

        let result: Result<()> = db.run_in_transaction(|h| {
            h.execute("INSERT INTO messages (id, text) VALUES (1, 'a')", &Params::none())?;
            h.execute("INSERT INTO messages (id, text) VALUES (1, 'b')", &Params::none())?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Sqlite { .. })));
        assert_eq!(Messages { db: &db }.count().unwrap(), 0);
    }
}
