// crates/sync-engine/src/store/memory.rs
//! Volatile record store

use super::{BackedStore, StoreBackend, StoreState};
use crate::error::{StorageError, StorageResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Backend that keeps nothing outside the process
#[derive(Debug, Default)]
pub struct MemoryBackend {
    fail_writes: AtomicBool,
}

impl StoreBackend for MemoryBackend {
    fn commit(&self, _state: &StoreState) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("injected write failure"),
            });
        }
        Ok(())
    }
}

/// Record store with the same semantics as [`FileRecordStore`](super::FileRecordStore) and no I/O
pub type MemoryRecordStore = BackedStore<MemoryBackend>;

impl BackedStore<MemoryBackend> {
    pub fn new() -> Self {
        Self::from_parts(StoreState::default(), MemoryBackend::default())
    }

    /// Makes every following write fail until switched off again
    pub fn fail_writes(&self, fail: bool) {
        self.backend().fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Default for BackedStore<MemoryBackend> {
    fn default() -> Self {
        Self::new()
    }
}
