//! Error types
//!
//! Every fallible operation in the engine returns [`Error`]. Engine errors are
//! wrapped in [`Error::Sqlite`] together with a short description of the
//! operation that failed; everything else maps to one of the dedicated kinds.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::database::LifecycleState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A read-only open was attempted against a file that does not exist
    #[error("database does not exist: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A write was attempted through a read-only handle
    #[error("cannot {operation} in read-only mode")]
    ReadOnlyViolation { operation: String },

    /// An operation was attempted while the database was not ready
    #[error("cannot {operation} while database is {state}")]
    StateViolation {
        operation: String,
        state: LifecycleState,
    },

    /// Snapshot creation, removal or restore failed
    #[error("backup error at {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A patch's statements failed; the original error is the source
    #[error("failed to apply patch version {version}{}: {source}", backup_hint(.backup))]
    Patch {
        version: u32,
        backup: Option<PathBuf>,
        #[source]
        source: Box<Error>,
    },

    /// Operation after `close()`
    #[error("database connection is closed")]
    Closed,

    /// Operation on a handle that was never opened
    #[error("database connection is not open")]
    NotOpen,

    /// `open()` called on a handle that already holds a connection
    #[error("database connection is already open: {}", .path.display())]
    AlreadyOpen { path: PathBuf },

    /// Patch set rejected at construction
    #[error("invalid patch set: {0}")]
    InvalidPatches(String),

    /// Parameter values do not fit the statement
    #[error("parameter error: {0}")]
    Parameter(String),

    #[error("failed to {context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Stored data violates an invariant: a corrupt ledger row, or foreign
    /// key violations left behind by a patch
    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("configuration error: {0}")]
    Config(String),
}

fn backup_hint(backup: &Option<PathBuf>) -> String {
    match backup {
        Some(path) => format!(" (backup at {})", path.display()),
        None => String::new(),
    }
}

impl Error {
    /// Wrap an engine error with the operation it interrupted
    pub fn sqlite(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sqlite {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn read_only(operation: impl Into<String>) -> Self {
        Self::ReadOnlyViolation {
            operation: operation.into(),
        }
    }

    /// Path of the pre-migration snapshot, if this error carries one
    pub fn backup_path(&self) -> Option<&Path> {
        match self {
            Self::Patch {
                backup: Some(path), ..
            } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Patch version that failed, if this is a patch error
    pub fn patch_version(&self) -> Option<u32> {
        match self {
            Self::Patch { version, .. } => Some(*version),
            _ => None,
        }
    }
}
