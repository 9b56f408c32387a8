//! Installed schema version ledger
//!
//! The ledger is a table inside the patched database itself. Every successful
//! patch appends a row; rows are never updated or deleted, so the table doubles
//! as the migration history. The current version is the highest recorded one.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::database::core::{Params, StorageHandle, Value};
use crate::error::{Error, Result};

/// Name of the ledger table
pub const LEDGER_TABLE: &str = "db_version";

/// SQL definitions for the ledger
pub struct LedgerDefinitions;

impl LedgerDefinitions {
    pub const TABLE: &'static str = r#"
        CREATE TABLE db_version (
            version INTEGER PRIMARY KEY,
            installed_at INTEGER NOT NULL
        );
    "#;

    pub const INSERT: &'static str = r#"
        INSERT INTO db_version (version, installed_at) VALUES (?1, ?2)
    "#;

    pub const MAX_VERSION: &'static str = "SELECT MAX(version) AS max FROM db_version";

    pub const HISTORY: &'static str =
        "SELECT version, installed_at FROM db_version ORDER BY version ASC";
}

/// One row of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct LedgerEntry {
    pub version: u32,
    pub installed_at: DateTime<Utc>,
}

/// Reads and appends the installed schema version
pub struct VersionLedger;

impl VersionLedger {
    /// Current schema version
    ///
    /// On first access the ledger table is created with an initial row for
    /// version 0. A read-only handle cannot create it, so a database without a
    /// ledger reads as version 0 and is left untouched.
    ///
    /// The check-then-create is not atomic; callers own the database exclusively.
    pub fn current_version(handle: &StorageHandle) -> Result<u32> {
        if !handle.table_exists(LEDGER_TABLE)? {
            if handle.mode().is_read_only() {
                return Ok(0);
            }
            handle.execute(LedgerDefinitions::TABLE, &Params::none())?;
            Self::record_version(handle, 0)?;
            return Ok(0);
        }

        let row = handle.query_one(LedgerDefinitions::MAX_VERSION, &Params::none())?;
        // An empty ledger table reads as version 0
        let max = row.and_then(|r| r.get_i64("max")).unwrap_or(0);
        u32::try_from(max)
            .map_err(|_| Error::Integrity(format!("ledger holds out-of-range version {}", max)))
    }

    /// Append a row for `version`, stamped with the current time
    pub fn record_version(handle: &StorageHandle, version: u32) -> Result<()> {
        if handle.mode().is_read_only() {
            return Err(Error::read_only("record schema version"));
        }

        let now = Utc::now().timestamp_millis();
        handle.execute(
            LedgerDefinitions::INSERT,
            &Params::positional([Value::Integer(i64::from(version)), Value::Integer(now)]),
        )?;
        Ok(())
    }

    /// Every recorded version in ascending order
    pub fn history(handle: &StorageHandle) -> Result<Vec<LedgerEntry>> {
        if !handle.table_exists(LEDGER_TABLE)? {
            return Ok(Vec::new());
        }

        handle
            .query_all(LedgerDefinitions::HISTORY, &Params::none())?
            .into_iter()
            .map(|row| {
                let version = row
                    .get_i64("version")
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::Integrity("ledger row without a valid version".into()))?;
                let millis = row.get_i64("installed_at").unwrap_or(0);
                let installed_at = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_default();
                Ok(LedgerEntry {
                    version,
                    installed_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::AccessMode;

    fn open(dir: &tempfile::TempDir, mode: AccessMode) -> StorageHandle {
        StorageHandle::open_path(dir.path().join("ledger.sqlite"), mode).unwrap()
    }

    #[test]
    fn test_first_access_creates_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open(&dir, AccessMode::ReadWrite);

        assert!(!handle.table_exists(LEDGER_TABLE).unwrap());
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 0);
        assert!(handle.table_exists(LEDGER_TABLE).unwrap());

        let history = VersionLedger::history(&handle).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 0);
    }

    #[test]
    fn test_record_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open(&dir, AccessMode::ReadWrite);
        VersionLedger::current_version(&handle).unwrap();

        VersionLedger::record_version(&handle, 1).unwrap();
        VersionLedger::record_version(&handle, 3).unwrap();
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 3);

        let versions: Vec<u32> = VersionLedger::history(&handle)
            .unwrap()
            .into_iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![0, 1, 3]);

        // Same version twice violates the primary key
        assert!(VersionLedger::record_version(&handle, 3).is_err());
    }

    #[test]
    fn test_installed_at_is_recent() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open(&dir, AccessMode::ReadWrite);
        let before = Utc::now().timestamp_millis();
        VersionLedger::current_version(&handle).unwrap();

        let entry = &VersionLedger::history(&handle).unwrap()[0];
        assert!(entry.installed_at.timestamp_millis() >= before);
    }

    #[test]
    fn test_mixed_case_table_name_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open(&dir, AccessMode::ReadWrite);
        handle
            .execute_batch(
                "CREATE TABLE DB_VERSION (version INTEGER PRIMARY KEY, installed_at INTEGER NOT NULL);
                 INSERT INTO DB_VERSION VALUES (4, 0);",
            )
            .unwrap();
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 4);
    }

    #[test]
    fn test_read_only_ledger() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut handle = open(&dir, AccessMode::ReadWrite);
            handle.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
            handle.close().unwrap();
        }

        let handle = open(&dir, AccessMode::ReadOnly);
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 0);
        assert!(!handle.table_exists(LEDGER_TABLE).unwrap());
        assert!(VersionLedger::history(&handle).unwrap().is_empty());
        assert!(matches!(
            VersionLedger::record_version(&handle, 1),
            Err(Error::ReadOnlyViolation { .. })
        ));
    }

    #[test]
    fn test_corrupt_ledger_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = open(&dir, AccessMode::ReadWrite);
        VersionLedger::current_version(&handle).unwrap();
        handle
            .execute_batch("INSERT INTO db_version (version, installed_at) VALUES (-3, 0)")
            .unwrap();

        // MAX is still 0, but the negative row cannot be listed
        assert_eq!(VersionLedger::current_version(&handle).unwrap(), 0);
        assert!(matches!(
            VersionLedger::history(&handle),
            Err(Error::Integrity(_))
        ));

        handle
            .execute_batch("INSERT INTO db_version (version, installed_at) VALUES (5000000000, 0)")
            .unwrap();
        assert!(matches!(
            VersionLedger::current_version(&handle),
            Err(Error::Integrity(_))
        ));
    }
}
