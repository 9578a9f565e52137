// crates/sync-engine/src/store/file.rs
//! File-backed record store
//!
//! The whole collection lives in one JSON document. Each commit writes a
//! temporary file next to it and renames it into place, so a crash leaves
//! either the old or the new document, never a mix.

use super::state::STATE_VERSION;
use super::{BackedStore, StoreBackend, StoreState};
use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name used when a store is opened from a data directory
pub const RECORDS_FILE: &str = "records.json";

/// Backend that persists the state as a JSON document
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> StorageResult<StoreState> {
        if !self.path.exists() {
            log::info!(
                "No record store at {}, starting empty",
                self.path.display()
            );
            return Ok(StoreState::default());
        }

        let bytes = fs::read(&self.path).map_err(|e| self.io_error(e))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(self.corrupted("file is empty"));
        }

        let mut state: StoreState =
            serde_json::from_slice(&bytes).map_err(|e| self.corrupted(e.to_string()))?;

        if state.version > STATE_VERSION {
            log::warn!(
                "Record store version {} is newer than supported version {}, reading known fields only",
                state.version,
                STATE_VERSION
            );
        }
        state.validate().map_err(|reason| self.corrupted(reason))?;
        state.recount();

        log::info!(
            "Loaded {} records from {}",
            state.records.len(),
            self.path.display()
        );
        Ok(state)
    }

    fn ensure_parent_exists(&self) -> StorageResult<&Path> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
            log::info!("Created data directory: {}", dir.display());
        }
        Ok(dir)
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupted(&self, reason: impl Into<String>) -> StorageError {
        StorageError::Corrupted {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl StoreBackend for FileBackend {
    fn commit(&self, state: &StoreState) -> StorageResult<()> {
        let bytes = serde_json::to_vec(state)?;
        let dir = self.ensure_parent_exists()?;

        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        temp_file.write_all(&bytes).map_err(|e| self.io_error(e))?;
        temp_file.flush().map_err(|e| self.io_error(e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| self.io_error(e))?;

        temp_file
            .persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        log::debug!(
            "Committed {} records to {}",
            state.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Record store that survives process restarts
pub type FileRecordStore = BackedStore<FileBackend>;

impl BackedStore<FileBackend> {
    /// Opens the store at `path`, loading any existing records
    ///
    /// A missing file starts an empty store. An empty or unparsable file is
    /// a [`StorageError::Corrupted`] and is left untouched.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let backend = FileBackend { path: path.into() };
        let state = backend.load()?;
        Ok(Self::from_parts(state, backend))
    }

    /// Opens `records.json` inside `dir`
    pub fn open_in_dir(dir: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open(dir.as_ref().join(RECORDS_FILE))
    }

    pub fn path(&self) -> &Path {
        self.backend().path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use crate::types::{OfflineRecord, Priority};
    use tempfile::TempDir;

    fn setup_test_dir() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join(RECORDS_FILE);
        (temp_dir, path)
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let (_temp_dir, path) = setup_test_dir();
        let store = FileRecordStore::open(&path).unwrap();
        assert!(store.list_all().unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_records_survive_reopen() {
        let (_temp_dir, path) = setup_test_dir();
        {
            let store = FileRecordStore::open(&path).unwrap();
            store
                .put(
                    OfflineRecord::new("vote", serde_json::json!({"candidateId": "c1"}))
                        .with_id("v1")
                        .with_priority(Priority::High),
                    false,
                )
                .unwrap();
            store
                .put(OfflineRecord::new("vote", serde_json::json!({})).with_id("v2"), false)
                .unwrap();
            store.mark_synced("v2").unwrap();
            store.remove("v2").unwrap();
        }

        let store = FileRecordStore::open(&path).unwrap();
        let record = store.get("v1").unwrap().unwrap();
        assert_eq!(record.priority, Priority::High);
        assert_eq!(record.payload["candidateId"], "c1");
        assert!(store.is_tombstoned("v2").unwrap());

        let next = store
            .put(OfflineRecord::new("vote", serde_json::json!({})).with_id("v3"), false)
            .unwrap();
        assert!(store.get(&next).unwrap().unwrap().sequence > record.sequence);
    }

    #[test]
    fn test_empty_file_is_corrupted() {
        let (_temp_dir, path) = setup_test_dir();
        fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            FileRecordStore::open(&path),
            Err(StorageError::Corrupted { .. })
        ));
    }

    #[test]
    fn test_garbage_file_is_corrupted_and_kept() {
        let (_temp_dir, path) = setup_test_dir();
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileRecordStore::open(&path),
            Err(StorageError::Corrupted { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileRecordStore::open_in_dir(temp_dir.path().join("nested").join("data")).unwrap();
        store
            .put(OfflineRecord::new("bookmark", serde_json::json!({})), false)
            .unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (temp_dir, path) = setup_test_dir();
        let store = FileRecordStore::open(&path).unwrap();
        for i in 0..5 {
            store
                .put(OfflineRecord::new("vote", serde_json::json!({"n": i})), false)
                .unwrap();
        }

        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_usage_is_recounted_on_reopen() {
        let (_temp_dir, path) = setup_test_dir();
        let used = {
            let store = FileRecordStore::open(&path).unwrap();
            store
                .put(OfflineRecord::new("vote", serde_json::json!({"candidateId": "c9"})), false)
                .unwrap();
            store.usage().unwrap().used
        };

        assert!(used > 0);
        assert_eq!(FileRecordStore::open(&path).unwrap().usage().unwrap().used, used);
    }
}
