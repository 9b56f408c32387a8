//! Patch runner
//!
//! Brings a database from whatever version its ledger records up to the
//! highest configured patch version.
//!
//! Each patch runs in its own transaction together with its ledger row, so a
//! patch is either fully applied and recorded or not applied at all. Patches
//! are not grouped: once a patch commits, its version is a durable checkpoint
//! even if a later patch fails.
//!
//! A patch holding statements SQLite refuses inside a transaction (`VACUUM`,
//! explicit `BEGIN`/`COMMIT`, `ATTACH`) runs statement by statement instead,
//! and its version is recorded once the last one succeeds. A failure part way
//! through such a patch leaves the earlier statements applied; the file
//! snapshot taken before the first patch is the recovery path.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::backup::{BackupManager, BackupRecord};
use super::ledger::VersionLedger;
use crate::database::core::{Params, StorageHandle};
use crate::error::{Error, Result};
use crate::logger::Logger;

/// Leading keywords of statements SQLite refuses to run inside a transaction
const NON_TRANSACTIONAL: [&str; 6] = ["VACUUM", "BEGIN", "COMMIT", "ROLLBACK", "ATTACH", "DETACH"];

/// One schema version step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub version: u32,
    pub statements: Vec<String>,
}

impl Patch {
    pub fn new<I, S>(version: u32, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version,
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether any statement has to run outside a transaction
    ///
    /// Statements are split on `;` and judged by their first keyword. `END`
    /// is not in the list since it also closes trigger bodies.
    pub fn needs_autocommit(&self) -> bool {
        self.statements
            .iter()
            .flat_map(|s| s.split(';'))
            .filter_map(leading_keyword)
            .any(|kw| NON_TRANSACTIONAL.iter().any(|n| n.eq_ignore_ascii_case(kw)))
    }
}

/// What happened to the snapshot during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "path")]
pub enum BackupOutcome {
    /// Nothing to apply, or the database started at version 0
    Skipped,
    /// Created and removed after every patch succeeded
    Removed(PathBuf),
    /// Created, but removing it failed; the file is still on disk
    Retained(PathBuf),
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Version before the run
    pub from: u32,
    /// Version after the run
    pub to: u32,
    /// Versions applied, in order
    pub applied: Vec<u32>,
    pub backup: BackupOutcome,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applies an ordered patch set through a [`StorageHandle`]
#[derive(Debug, Clone)]
pub struct PatchRunner {
    patches: Vec<Patch>,
    backups: BackupManager,
}

impl PatchRunner {
    /// Create a runner, sorting `patches` by version
    ///
    /// Versions must be distinct and greater than zero; version 0 is the
    /// ledger's "nothing applied yet" state.
    pub fn new(mut patches: Vec<Patch>, backups: BackupManager) -> Result<Self> {
        let mut seen = HashSet::new();
        for patch in &patches {
            if patch.version == 0 {
                return Err(Error::InvalidPatches(
                    "patch versions must be greater than 0".to_string(),
                ));
            }
            if !seen.insert(patch.version) {
                return Err(Error::InvalidPatches(format!(
                    "duplicate patch version {}",
                    patch.version
                )));
            }
        }
        patches.sort_by_key(|p| p.version);

        Ok(Self { patches, backups })
    }

    /// Patches in application order
    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Highest configured version, 0 when the set is empty
    pub fn latest_version(&self) -> u32 {
        self.patches.last().map(|p| p.version).unwrap_or(0)
    }

    /// Patches newer than `version`, in ascending order
    pub fn pending(&self, version: u32) -> &[Patch] {
        let start = self.patches.partition_point(|p| p.version <= version);
        &self.patches[start..]
    }

    /// Bring the database up to [`latest_version`](Self::latest_version)
    ///
    /// Stops at the first failing patch. The returned [`Error::Patch`] names
    /// the version and, when one was taken, the snapshot path; earlier patches
    /// of this run stay applied.
    pub fn run(&self, handle: &StorageHandle, logger: &dyn Logger) -> Result<MigrationReport> {
        let from = VersionLedger::current_version(handle)?;
        let pending = self.pending(from);

        if pending.is_empty() {
            logger.info(&format!("No patches to apply, schema at version {}", from));
            return Ok(MigrationReport {
                from,
                to: from,
                applied: Vec::new(),
                backup: BackupOutcome::Skipped,
            });
        }

        if handle.mode().is_read_only() {
            return Err(Error::read_only("apply patches"));
        }

        // A fresh database has nothing worth protecting yet
        let backup = if from == 0 {
            None
        } else {
            handle.checkpoint()?;
            let record = self.backups.create_backup(handle.path()).inspect_err(|e| {
                logger.error(&format!("Could not create backup: {}", e));
            })?;
            logger.info(&format!(
                "Backed up version {} to {}",
                from,
                record.path.display()
            ));
            Some(record)
        };

        let mut applied = Vec::with_capacity(pending.len());
        for patch in pending {
            if let Err(e) = apply_patch(handle, patch, logger) {
                logger.error(&format!(
                    "Failed while patching database to version {}: {}",
                    patch.version, e
                ));
                if let Some(record) = &backup {
                    logger.info(&format!(
                        "Check backup of version {} at {}",
                        from,
                        record.path.display()
                    ));
                }
                return Err(Error::Patch {
                    version: patch.version,
                    backup: backup.map(|r| r.path),
                    source: Box::new(e),
                });
            }
            applied.push(patch.version);
        }

        let backup = match backup {
            None => BackupOutcome::Skipped,
            Some(record) => self.discard(record, logger),
        };

        Ok(MigrationReport {
            from,
            to: self.latest_version(),
            applied,
            backup,
        })
    }

    /// Remove the snapshot after a successful run; failure only leaves it behind
    fn discard(&self, record: BackupRecord, logger: &dyn Logger) -> BackupOutcome {
        match self.backups.remove_backup(&record) {
            Ok(()) => BackupOutcome::Removed(record.path),
            Err(e) => {
                logger.error(&format!("Could not remove backup: {}", e));
                BackupOutcome::Retained(record.path)
            }
        }
    }
}

/// Apply one patch and record its version
///
/// Foreign key enforcement is switched off for the duration of the patch, so
/// table rebuilds do not cascade; `PRAGMA foreign_keys` is a no-op inside a
/// transaction and cannot be left to the patch itself. When enforcement was on,
/// `foreign_key_check` must come back clean before the version is recorded.
/// The previous setting is restored afterwards whatever the outcome.
fn apply_patch(handle: &StorageHandle, patch: &Patch, logger: &dyn Logger) -> Result<()> {
    logger.info(&format!("Patching database to version {}", patch.version));

    let foreign_keys = foreign_keys_enabled(handle)?;
    set_foreign_keys(handle, false)?;

    let result = if patch.needs_autocommit() {
        logger.info(&format!(
            "Patch {} holds statements that cannot run inside a transaction, applying without one",
            patch.version
        ));
        apply_unguarded(handle, patch, foreign_keys, logger)
    } else {
        handle.run_in_transaction(|h| {
            run_statements(h, patch, logger)?;
            if foreign_keys {
                check_foreign_keys(h)?;
            }
            VersionLedger::record_version(h, patch.version)
        })
    };

    if let Err(e) = set_foreign_keys(handle, foreign_keys) {
        logger.error(&format!(
            "Could not restore foreign key enforcement after patch {}: {}",
            patch.version, e
        ));
    }
    result?;

    logger.info(&format!("Database patched to version {}", patch.version));
    Ok(())
}

/// Run a patch in autocommit mode; the snapshot is the only way back
fn apply_unguarded(
    handle: &StorageHandle,
    patch: &Patch,
    foreign_keys: bool,
    logger: &dyn Logger,
) -> Result<()> {
    let result = run_statements(handle, patch, logger).and_then(|()| {
        if foreign_keys {
            check_foreign_keys(handle)?;
        }
        Ok(())
    });

    if let Err(e) = result {
        // An explicit BEGIN in the patch may still be open
        if !handle.connection()?.is_autocommit() {
            if let Err(rollback) = handle.execute_batch("ROLLBACK") {
                logger.error(&format!(
                    "Could not roll back transaction left open by patch {}: {}",
                    patch.version, rollback
                ));
            }
        }
        return Err(e);
    }

    VersionLedger::record_version(handle, patch.version)
}

fn run_statements(handle: &StorageHandle, patch: &Patch, logger: &dyn Logger) -> Result<()> {
    for statement in &patch.statements {
        logger.info(&format!(
            "Applying statement: {}",
            statement.split_whitespace().collect::<Vec<_>>().join(" ")
        ));
        handle.execute_batch(statement)?;
    }
    Ok(())
}

fn foreign_keys_enabled(handle: &StorageHandle) -> Result<bool> {
    let row = handle.query_one("PRAGMA foreign_keys", &Params::none())?;
    Ok(row.and_then(|r| r.get_i64("foreign_keys")) == Some(1))
}

fn set_foreign_keys(handle: &StorageHandle, enabled: bool) -> Result<()> {
    handle.execute_batch(if enabled {
        "PRAGMA foreign_keys = ON"
    } else {
        "PRAGMA foreign_keys = OFF"
    })
}

fn check_foreign_keys(handle: &StorageHandle) -> Result<()> {
    let violations = handle.query_all("PRAGMA foreign_key_check", &Params::none())?;
    match violations.first() {
        None => Ok(()),
        Some(first) => Err(Error::Integrity(format!(
            "{} foreign key violation(s), first in table '{}'",
            violations.len(),
            first.get_str("table").unwrap_or("?")
        ))),
    }
}

/// Leading keyword of a statement, skipping whitespace and comments
fn leading_keyword(sql: &str) -> Option<&str> {
    let mut rest = sql.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, r)| r).trim_start();
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, r)| r).trim_start();
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}
