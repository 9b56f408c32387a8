//! Database connection management
//!
//! This module provides the single-connection handle the rest of the engine is
//! built on.

use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use super::params::{Params, Row};
use super::tuning::{pragma_statement, Tuning};
use crate::error::{Error, Result};
use crate::logger::Logger;

/// Access mode of a handle, fixed when it is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

impl AccessMode {
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    fn open_flags(&self) -> OpenFlags {
        match self {
            Self::ReadOnly => {
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
            Self::ReadWrite => OpenFlags::default(),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

enum Slot {
    Unopened,
    Open(Connection),
    Closed,
}

/// Owner of exactly one SQLite connection
///
/// `StorageHandle` resolves the database path, opens the connection in the
/// configured [`AccessMode`], applies startup tuning, and exposes the four
/// primitives the engine needs: [`execute`](Self::execute),
/// [`query_one`](Self::query_one), [`query_all`](Self::query_all) and
/// [`run_in_transaction`](Self::run_in_transaction).
///
/// The handle is not synchronised; it must only be used from one call path at
/// a time.
pub struct StorageHandle {
    path: PathBuf,
    mode: AccessMode,
    slot: Slot,
}

impl StorageHandle {
    /// Create an unopened handle, resolving `path` to an absolute form
    pub fn new(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        let path = std::path::absolute(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot resolve database path '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Ok(Self {
            path,
            mode,
            slot: Slot::Unopened,
        })
    }

    /// Create and open a handle in one step
    pub fn open_path(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        let mut handle = Self::new(path, mode)?;
        handle.open()?;
        Ok(handle)
    }

    /// Open the connection
    ///
    /// Read-only handles never create a file: a missing database fails with
    /// [`Error::NotFound`]. Re-opening an open handle fails with
    /// [`Error::AlreadyOpen`], and a closed handle stays closed.
    pub fn open(&mut self) -> Result<()> {
        match self.slot {
            Slot::Open(_) => {
                return Err(Error::AlreadyOpen {
                    path: self.path.clone(),
                })
            }
            Slot::Closed => return Err(Error::Closed),
            Slot::Unopened => {}
        }

        if self.mode.is_read_only() && !self.path.exists() {
            return Err(Error::NotFound {
                path: self.path.clone(),
            });
        }

        let conn = Connection::open_with_flags(&self.path, self.mode.open_flags()).map_err(|e| {
            Error::sqlite(format!("open database at '{}'", self.path.display()), e)
        })?;

        self.slot = Slot::Open(conn);
        Ok(())
    }

    /// Apply startup tuning
    ///
    /// Best-effort: a directive SQLite rejects is reported through `logger`
    /// and skipped. Returns the number of directives that were applied.
    pub fn apply_tuning(&self, tuning: &Tuning, logger: &dyn Logger) -> Result<usize> {
        let conn = self.connection()?;
        let mut applied = 0;

        for directive in tuning.directives(self.mode) {
            match run_pragma(conn, &pragma_statement(&directive)) {
                Ok(()) => applied += 1,
                Err(e) => logger.error(&format!(
                    "Ignoring tuning directive '{}': {}",
                    directive, e
                )),
            }
        }

        Ok(applied)
    }

    /// Execute a single statement, returning the number of changed rows
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::sqlite("prepare statement", e))?;

        if self.mode.is_read_only() && !stmt.readonly() {
            return Err(Error::read_only("execute a writing statement"));
        }

        params.bind(&mut stmt)?;
        stmt.raw_execute().map_err(|e| self.wrap("execute statement", e))
    }

    /// Execute a script of statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        if self.mode.is_read_only() {
            return Err(Error::read_only("execute a statement batch"));
        }
        self.connection()?
            .execute_batch(sql)
            .map_err(|e| self.wrap("execute statement batch", e))
    }

    /// Execute one statement for each parameter set, all inside one transaction
    pub fn execute_many(&self, sql: &str, param_sets: &[Params]) -> Result<usize> {
        if self.mode.is_read_only() {
            return Err(Error::read_only("modify data"));
        }

        self.run_in_transaction(|handle| {
            let conn = handle.connection()?;
            let mut stmt = conn
                .prepare_cached(sql)
                .map_err(|e| Error::sqlite("prepare statement", e))?;

            let mut changed = 0;
            for params in param_sets {
                params.bind(&mut stmt)?;
                changed += stmt
                    .raw_execute()
                    .map_err(|e| handle.wrap("execute statement", e))?;
            }
            Ok(changed)
        })
    }

    /// First row of a query, if any
    pub fn query_one(&self, sql: &str, params: &Params) -> Result<Option<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::sqlite("prepare query", e))?;
        params.bind(&mut stmt)?;

        let columns = column_names(&stmt);
        let mut rows = stmt.raw_query();
        match rows.next().map_err(|e| self.wrap("read row", e))? {
            Some(row) => Ok(Some(Row::from_sqlite(&columns, row)?)),
            None => Ok(None),
        }
    }

    /// Every row of a query
    pub fn query_all(&self, sql: &str, params: &Params) -> Result<Vec<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::sqlite("prepare query", e))?;
        params.bind(&mut stmt)?;

        let columns = column_names(&stmt);
        let mut rows = stmt.raw_query();
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| self.wrap("read row", e))? {
            out.push(Row::from_sqlite(&columns, row)?);
        }
        Ok(out)
    }

    /// Run `f` inside a transaction
    ///
    /// Everything `f` does through this handle commits together, or not at all
    /// when `f` returns an error. The error from `f` is returned unchanged.
    pub fn run_in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let tx = self
            .connection()?
            .unchecked_transaction()
            .map_err(|e| Error::sqlite("begin transaction", e))?;

        // Dropping `tx` on the error path rolls back
        let value = f(self)?;

        tx.commit()
            .map_err(|e| Error::sqlite("commit transaction", e))?;
        Ok(value)
    }

    /// Check if a table exists in the database (case-insensitive)
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self
            .connection()?
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND lower(name) = lower(?1)",
                [table_name],
                |row| row.get(0),
            )
            .map_err(|e| Error::sqlite("check table existence", e))?;
        Ok(count > 0)
    }

    /// Flush the write-ahead log into the main file
    ///
    /// A no-op for databases not in WAL mode.
    pub fn checkpoint(&self) -> Result<()> {
        run_pragma(self.connection()?, "PRAGMA wal_checkpoint(TRUNCATE)")
            .map_err(|e| Error::sqlite("checkpoint write-ahead log", e))
    }

    /// Release the connection
    ///
    /// Every later operation on this handle fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Open(conn) => conn
                .close()
                .map_err(|(_, e)| Error::sqlite("close database", e)),
            Slot::Unopened | Slot::Closed => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        matches!(self.slot, Slot::Open(_))
    }

    /// The underlying connection, for queries the primitives do not cover
    pub fn connection(&self) -> Result<&Connection> {
        match &self.slot {
            Slot::Open(conn) => Ok(conn),
            Slot::Unopened => Err(Error::NotOpen),
            Slot::Closed => Err(Error::Closed),
        }
    }

    /// Wrap an engine error, mapping SQLite's read-only refusal to its own kind
    fn wrap(&self, context: &str, e: rusqlite::Error) -> Error {
        if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ReadOnly) {
            Error::read_only(context)
        } else {
            Error::sqlite(context, e)
        }
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("open", &self.is_open())
            .finish()
    }
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

/// Run a pragma, draining any rows it returns
fn run_pragma(conn: &Connection, sql: &str) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    while rows.next()?.is_some() {}
    Ok(())
}
