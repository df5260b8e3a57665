//! Durable store files.
//!
//! A store lives in a single snapshot file with two transient siblings:
//!
//! ```text
//! app.rldb        # CBOR snapshot of every table
//! app.rldb.lock   # Advisory lock, held while the store is open
//! app.rldb.tmp    # Staging file for atomic saves
//! ```
//!
//! The lock file ensures only one process opens a store at a time. Saves
//! use the write-then-rename pattern so a crash mid-save leaves the
//! previous snapshot intact.

use crate::error::{EngineError, EngineResult};
use crate::table::Table;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Snapshot format understood by this build.
const FORMAT_VERSION: u16 = 1;

const LOCK_SUFFIX: &str = ".lock";
const TEMP_SUFFIX: &str = ".tmp";

/// Serializable store contents: the schema stamp plus every table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub(crate) format: u16,
    pub(crate) schema_version: i64,
    pub(crate) tables: BTreeMap<String, Table>,
}

impl StoreState {
    pub(crate) fn new() -> Self {
        Self {
            format: FORMAT_VERSION,
            schema_version: 0,
            tables: BTreeMap::new(),
        }
    }
}

/// Handle on a store file, holding its advisory lock.
///
/// Only one `StoreFile` instance can exist per path at a time. The lock
/// is released when the handle is dropped.
#[derive(Debug)]
pub(crate) struct StoreFile {
    path: PathBuf,
    _lock_file: File,
}

impl StoreFile {
    /// Opens a store file and acquires its lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreMissing` if the file doesn't exist and
    /// `create_if_missing` is false, and `Locked` if another handle
    /// holds the lock.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(EngineError::StoreMissing {
                    path: path.to_path_buf(),
                });
            }
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let lock_path = sibling(path, LOCK_SUFFIX);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    #[must_use]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot from disk.
    ///
    /// Returns `None` if the file doesn't exist yet or is empty (a new
    /// store that has never been saved).
    pub(crate) fn load(&self) -> EngineResult<Option<StoreState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(None);
        }

        let state: StoreState = ciborium::de::from_reader(data.as_slice()).map_err(|e| {
            EngineError::snapshot(format!(
                "unreadable store file {}: {e}",
                self.path.display()
            ))
        })?;
        if state.format != FORMAT_VERSION {
            return Err(EngineError::snapshot(format!(
                "store file {} has format {} but this build reads format {}",
                self.path.display(),
                state.format,
                FORMAT_VERSION
            )));
        }
        Ok(Some(state))
    }

    /// Saves the snapshot to disk atomically.
    ///
    /// Write-then-rename for crash safety:
    /// 1. Write to the temporary sibling
    /// 2. Sync the temporary file to disk
    /// 3. Rename it over the snapshot
    /// 4. Fsync the directory so the rename itself is durable
    pub(crate) fn save(&self, state: &StoreState) -> EngineResult<()> {
        let temp_path = sibling(&self.path, TEMP_SUFFIX);

        let mut file = File::create(&temp_path)?;
        ciborium::ser::into_writer(state, &mut file)
            .map_err(|e| EngineError::snapshot(format!("cannot encode store state: {e}")))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        self.sync_directory()?;

        Ok(())
    }

    /// Fsyncs the parent directory so renames are durable.
    ///
    /// Windows NTFS journals metadata itself, so the explicit fsync is
    /// Unix-only.
    #[cfg(unix)]
    fn sync_directory(&self) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let dir = File::open(parent)?;
                dir.sync_all()?;
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> EngineResult<()> {
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDef;
    use tempfile::tempdir;

    #[test]
    fn missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.rowlite");

        let result = StoreFile::open(&path, false);
        assert!(matches!(result, Err(EngineError::StoreMissing { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("app.rowlite");

        let file = StoreFile::open(&path, true).unwrap();
        assert!(path.parent().unwrap().exists());
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.rowlite");

        let _first = StoreFile::open(&path, true).unwrap();
        let result = StoreFile::open(&path, true);
        assert!(matches!(result, Err(EngineError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.rowlite");

        {
            let _file = StoreFile::open(&path, true).unwrap();
        }
        let _reopened = StoreFile::open(&path, true).unwrap();
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.rowlite");

        {
            let file = StoreFile::open(&path, true).unwrap();
            let mut state = StoreState::new();
            state.schema_version = 3;
            let mut table =
                Table::new("users", &[ColumnDef::new("id").auto_increment()]).unwrap();
            table.insert(&crate::ColumnMap::new()).unwrap();
            state.tables.insert("users".to_string(), table);
            file.save(&state).unwrap();
        }

        let file = StoreFile::open(&path, true).unwrap();
        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.schema_version, 3);
        assert_eq!(loaded.tables["users"].rows.len(), 1);
    }

    #[test]
    fn corrupt_file_reports_snapshot_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.rowlite");
        fs::write(&path, b"not a snapshot").unwrap();

        let file = StoreFile::open(&path, true).unwrap();
        assert!(matches!(file.load(), Err(EngineError::Snapshot { .. })));
    }

    #[test]
    fn future_format_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.rowlite");

        let file = StoreFile::open(&path, true).unwrap();
        let mut state = StoreState::new();
        state.format = FORMAT_VERSION + 1;
        file.save(&state).unwrap();

        assert!(matches!(file.load(), Err(EngineError::Snapshot { .. })));
    }
}
