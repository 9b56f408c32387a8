//! File-level database snapshots
//!
//! A snapshot is a plain copy of the database file, taken right before the
//! first patch runs. It is the manual recovery path for a patch whose
//! statements partly applied before failing; the engine never restores it on
//! its own.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// Extension used when the source file has none
const DEFAULT_EXTENSION: &str = "sqlite";

/// A snapshot created for one patch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Creates, removes and restores snapshots inside one directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Manager writing into the platform temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` to `bkp-<epoch-millis>.<ext>` in the backup directory
    ///
    /// The copy goes to a `.partial` file first and is renamed once it has
    /// been flushed, so a crash mid-copy never leaves a truncated snapshot
    /// behind under the final name.
    pub fn create_backup(&self, source: &Path) -> Result<BackupRecord> {
        let source = std::path::absolute(source).map_err(|e| backup_error(source, e))?;
        if !source.is_file() {
            return Err(backup_error(
                &source,
                io::Error::new(io::ErrorKind::NotFound, "source database file not found"),
            ));
        }

        fs::create_dir_all(&self.dir).map_err(|e| backup_error(&self.dir, e))?;
        let dir = std::path::absolute(&self.dir).map_err(|e| backup_error(&self.dir, e))?;

        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION);

        let (created_at, path) = unique_name(&dir, ext);
        let partial = path.with_extension(format!("{}.partial", ext));

        copy_durably(&source, &partial).inspect_err(|_| {
            let _ = fs::remove_file(&partial);
        })?;
        fs::rename(&partial, &path).map_err(|e| {
            let _ = fs::remove_file(&partial);
            backup_error(&path, e)
        })?;

        Ok(BackupRecord { path, created_at })
    }

    /// Delete a snapshot
    pub fn remove_backup(&self, backup: &BackupRecord) -> Result<()> {
        fs::remove_file(&backup.path).map_err(|e| backup_error(&backup.path, e))
    }

    /// Copy a snapshot back over `target`
    ///
    /// `target` must not be open. Stale `-wal` and `-shm` side files of the
    /// target are removed so SQLite does not replay them onto the restored
    /// content.
    pub fn restore_backup(backup: &Path, target: &Path) -> Result<()> {
        if !backup.is_file() {
            return Err(backup_error(
                backup,
                io::Error::new(io::ErrorKind::NotFound, "backup file not found"),
            ));
        }

        let mut partial = target.as_os_str().to_owned();
        partial.push(".restore");
        let partial = PathBuf::from(partial);

        copy_durably(backup, &partial).inspect_err(|_| {
            let _ = fs::remove_file(&partial);
        })?;
        fs::rename(&partial, target).map_err(|e| backup_error(target, e))?;

        for suffix in ["-wal", "-shm"] {
            let mut side = target.as_os_str().to_owned();
            side.push(suffix);
            let side = PathBuf::from(side);
            match fs::remove_file(&side) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(backup_error(&side, e)),
            }
        }

        Ok(())
    }
}

/// Pick a `bkp-<millis>.<ext>` name not yet present in `dir`
fn unique_name(dir: &Path, ext: &str) -> (DateTime<Utc>, PathBuf) {
    let created_at = Utc::now();
    let mut millis = created_at.timestamp_millis();
    loop {
        let candidate = dir.join(format!("bkp-{}.{}", millis, ext));
        if !candidate.exists() {
            return (created_at, candidate);
        }
        millis += 1;
    }
}

fn copy_durably(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| backup_error(from, e))?;
    File::open(to)
        .and_then(|f| f.sync_all())
        .map_err(|e| backup_error(to, e))
}

fn backup_error(path: &Path, source: io::Error) -> Error {
    Error::Backup {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_create_backup_copies_content() {
        let src_dir = tempfile::tempdir().unwrap();
        let bkp_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "data.sqlite3", b"hello");

        let manager = BackupManager::new(bkp_dir.path());
        let record = manager.create_backup(&source).unwrap();

        let name = record.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("bkp-"));
        assert!(name.ends_with(".sqlite3"));
        assert_eq!(fs::read(&record.path).unwrap(), b"hello");

        // No partial files left around
        let entries: Vec<_> = fs::read_dir(bkp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_backup_names_are_unique() {
        let src_dir = tempfile::tempdir().unwrap();
        let bkp_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "db", b"x");

        let manager = BackupManager::new(bkp_dir.path());
        let first = manager.create_backup(&source).unwrap();
        let second = manager.create_backup(&source).unwrap();
        assert_ne!(first.path, second.path);
        assert_eq!(first.path.extension().unwrap(), DEFAULT_EXTENSION);
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let err = manager
            .create_backup(&dir.path().join("missing.sqlite"))
            .unwrap_err();
        assert!(matches!(err, Error::Backup { .. }));
    }

    #[test]
    fn test_creates_missing_backup_dir() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "db.sqlite", b"x");
        let nested = src_dir.path().join("backups/nested");

        let record = BackupManager::new(&nested).create_backup(&source).unwrap();
        assert!(record.path.starts_with(std::path::absolute(&nested).unwrap()));
    }

    #[test]
    fn test_remove_backup() {
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), "db.sqlite", b"x");
        let manager = BackupManager::new(src_dir.path().join("bkp"));

        let record = manager.create_backup(&source).unwrap();
        manager.remove_backup(&record).unwrap();
        assert!(!record.path.exists());

        // Second removal surfaces the error
        assert!(matches!(
            manager.remove_backup(&record),
            Err(Error::Backup { .. })
        ));
    }

    #[test]
    fn test_restore_backup() {
        let dir = tempfile::tempdir().unwrap();
        let target = write_source(dir.path(), "db.sqlite", b"before");
        let wal = write_source(dir.path(), "db.sqlite-wal", b"stale");

        let manager = BackupManager::new(dir.path().join("bkp"));
        let record = manager.create_backup(&target).unwrap();
        fs::write(&target, b"after").unwrap();

        BackupManager::restore_backup(&record.path, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"before");
        assert!(!wal.exists());
        assert!(record.path.exists());
    }
}
