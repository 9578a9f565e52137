// crates/sync-engine/src/store/mod.rs
//! Durable record store
//!
//! [`RecordStore`] is the seam the orchestrator and the facade work against.
//! [`BackedStore`] implements it once over a [`StoreBackend`], which only
//! decides how a fully built new state is made durable:
//!
//! - [`FileRecordStore`]: one JSON document, replaced atomically
//! - [`MemoryRecordStore`]: no I/O, with write failure injection for tests
//!
//! Every mutation is applied to a copy of the state, committed through the
//! backend, and only then becomes visible. A failed write changes nothing.

mod file;
mod memory;
mod state;

pub use file::{FileBackend, FileRecordStore, RECORDS_FILE};
pub use memory::{MemoryBackend, MemoryRecordStore};
pub use state::StoreState;

use crate::error::{StorageError, StorageResult};
use crate::types::{OfflineRecord, StorageUsage};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Default storage ceiling: 50 MiB
pub const DEFAULT_CAPACITY: u64 = 50 * 1024 * 1024;

/// Durable, id-keyed collection of offline records
///
/// Listing methods return records in insertion order. Synced records are
/// never modified by the narrow orchestrator mutations.
pub trait RecordStore: Send + Sync {
    /// Stores a record and returns its id
    ///
    /// An empty id is replaced with a generated UUID. An existing id is a
    /// [`StorageError::DuplicateId`] unless `overwrite` is set.
    fn put(&self, record: OfflineRecord, overwrite: bool) -> StorageResult<String>;

    fn get(&self, id: &str) -> StorageResult<Option<OfflineRecord>>;

    fn list_by_type(&self, record_type: &str) -> StorageResult<Vec<OfflineRecord>>;

    fn list_unsynced(&self) -> StorageResult<Vec<OfflineRecord>>;

    fn list_all(&self) -> StorageResult<Vec<OfflineRecord>>;

    /// Returns false if absent; already synced records are left as they are
    fn mark_synced(&self, id: &str) -> StorageResult<bool>;

    /// Marks the revision a push carried as synced
    ///
    /// Returns false, changing nothing, if the record is gone or was
    /// overwritten since `sequence` was read.
    fn mark_pushed(&self, id: &str, sequence: u64) -> StorageResult<bool>;

    fn remove(&self, id: &str) -> StorageResult<bool>;

    fn clear(&self) -> StorageResult<()>;

    fn usage(&self) -> StorageResult<StorageUsage>;

    /// Counts a failed remote attempt against revision `sequence`
    ///
    /// `None` if the record is gone or was overwritten since.
    fn record_failure(
        &self,
        id: &str,
        sequence: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<OfflineRecord>>;

    /// Counts a pass skipped because of an unsatisfiable dependency
    fn record_deferral(&self, id: &str) -> StorageResult<Option<OfflineRecord>>;

    /// Holds a permanently rejected revision for a manual decision
    fn mark_conflicted(
        &self,
        id: &str,
        sequence: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<OfflineRecord>>;

    /// Releases a conflicted record back into the queue
    fn clear_conflict(&self, id: &str) -> StorageResult<Option<OfflineRecord>>;

    /// Deletes records synced before `before`, remembering their ids
    ///
    /// Ids remembered since before `before` are forgotten unless an unsynced
    /// record still depends on them.
    fn prune_synced(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Returns true if `id` was removed or pruned while synced
    fn is_tombstoned(&self, id: &str) -> StorageResult<bool>;

    /// Sets the storage ceiling in bytes
    fn set_capacity(&self, bytes: u64);
}

/// Makes a new store state durable
pub trait StoreBackend: Send + Sync {
    /// Commits `state`; on error the previous state must stay authoritative
    fn commit(&self, state: &StoreState) -> StorageResult<()>;
}

/// A [`RecordStore`] over any [`StoreBackend`]
pub struct BackedStore<B: StoreBackend> {
    state: Mutex<StoreState>,
    capacity: AtomicU64,
    backend: B,
}

impl<B: StoreBackend> BackedStore<B> {
    pub(crate) fn from_parts(state: StoreState, backend: B) -> Self {
        Self {
            state: Mutex::new(state),
            capacity: AtomicU64::new(DEFAULT_CAPACITY),
            backend,
        }
    }

    /// Sets the storage ceiling at construction
    pub fn with_capacity(self, bytes: u64) -> Self {
        self.capacity.store(bytes, Ordering::SeqCst);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn capacity(&self) -> u64 {
        self.capacity.load(Ordering::SeqCst)
    }

    fn read<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&StoreState) -> T,
    {
        let state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&state))
    }

    /// Runs `op` on a copy and commits it if `op` reports a change
    fn mutate<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: FnOnce(&mut StoreState) -> StorageResult<(T, bool)>,
    {
        let mut state = self.state.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut next = state.clone();
        let (value, changed) = op(&mut next)?;
        if changed {
            self.backend.commit(&next)?;
            *state = next;
        }
        Ok(value)
    }
}

impl<B: StoreBackend> RecordStore for BackedStore<B> {
    fn put(&self, record: OfflineRecord, overwrite: bool) -> StorageResult<String> {
        let capacity = self.capacity();
        let id = self.mutate(|state| Ok((state.put(record, overwrite, capacity)?, true)))?;
        log::debug!("Stored record {}", id);
        Ok(id)
    }

    fn get(&self, id: &str) -> StorageResult<Option<OfflineRecord>> {
        self.read(|state| state.get(id))
    }

    fn list_by_type(&self, record_type: &str) -> StorageResult<Vec<OfflineRecord>> {
        self.read(|state| state.list(|r| r.record_type == record_type))
    }

    fn list_unsynced(&self) -> StorageResult<Vec<OfflineRecord>> {
        self.read(|state| state.list(|r| !r.synced))
    }

    fn list_all(&self) -> StorageResult<Vec<OfflineRecord>> {
        self.read(|state| state.list(|_| true))
    }

    fn mark_synced(&self, id: &str) -> StorageResult<bool> {
        let now = Utc::now();
        self.mutate(|state| Ok(state.mark_synced(id, now)))
    }

    fn mark_pushed(&self, id: &str, sequence: u64) -> StorageResult<bool> {
        let now = Utc::now();
        self.mutate(|state| Ok(state.mark_revision_synced(id, sequence, now)))
    }

    fn remove(&self, id: &str) -> StorageResult<bool> {
        let now = Utc::now();
        self.mutate(|state| {
            let removed = state.remove(id, now);
            Ok((removed, removed))
        })
    }

    fn clear(&self) -> StorageResult<()> {
        self.mutate(|state| {
            state.clear();
            Ok(((), true))
        })
    }

    fn usage(&self) -> StorageResult<StorageUsage> {
        let capacity = self.capacity();
        self.read(|state| StorageUsage::new(state.used_bytes(), capacity))
    }

    fn record_failure(
        &self,
        id: &str,
        sequence: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<OfflineRecord>> {
        self.mutate(|state| {
            Ok(state.update_revision(id, sequence, |record| {
                record.attempts = record.attempts.saturating_add(1);
                record.last_attempt_at = Some(at);
                record.last_error = Some(reason.to_string());
            }))
        })
    }

    fn record_deferral(&self, id: &str) -> StorageResult<Option<OfflineRecord>> {
        self.mutate(|state| {
            Ok(state.update_unsynced(id, |record| {
                record.deferrals = record.deferrals.saturating_add(1);
            }))
        })
    }

    fn mark_conflicted(
        &self,
        id: &str,
        sequence: u64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<Option<OfflineRecord>> {
        self.mutate(|state| {
            Ok(state.update_revision(id, sequence, |record| {
                record.attempts = record.attempts.saturating_add(1);
                record.last_attempt_at = Some(at);
                record.last_error = Some(reason.to_string());
                record.conflict = Some(reason.to_string());
            }))
        })
    }

    fn clear_conflict(&self, id: &str) -> StorageResult<Option<OfflineRecord>> {
        self.mutate(|state| {
            Ok(state.update_unsynced(id, |record| {
                record.conflict = None;
                record.deferrals = 0;
            }))
        })
    }

    fn prune_synced(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let now = Utc::now();
        self.mutate(|state| {
            let tombstones = state.tombstones.len();
            let pruned = state.prune_synced(before, now);
            Ok((pruned, pruned > 0 || state.tombstones.len() != tombstones))
        })
    }

    fn is_tombstoned(&self, id: &str) -> StorageResult<bool> {
        self.read(|state| state.is_tombstoned(id))
    }

    fn set_capacity(&self, bytes: u64) {
        self.capacity.store(bytes, Ordering::SeqCst);
    }
}
