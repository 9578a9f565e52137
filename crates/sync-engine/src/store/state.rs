// crates/sync-engine/src/store/state.rs
//! In-memory record collection shared by every store backend

use crate::error::{StorageError, StorageResult};
use crate::types::OfflineRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

pub(crate) const STATE_VERSION: u32 = 1;

/// Everything a store persists: records, tombstones and the next sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub(crate) version: u32,
    pub(crate) records: HashMap<String, OfflineRecord>,
    /// Ids of records removed or pruned while synced, with the removal time
    #[serde(default)]
    pub(crate) tombstones: BTreeMap<String, DateTime<Utc>>,
    pub(crate) next_sequence: u64,
    /// Sum of [`OfflineRecord::size_bytes`]; rebuilt by [`recount`](Self::recount) after loading
    #[serde(skip)]
    used: u64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            records: HashMap::new(),
            tombstones: BTreeMap::new(),
            next_sequence: 1,
            used: 0,
        }
    }
}

impl StoreState {
    pub(crate) fn get(&self, id: &str) -> Option<OfflineRecord> {
        self.records.get(id).cloned()
    }

    /// Records matching `filter`, in insertion order
    pub(crate) fn list<F>(&self, filter: F) -> Vec<OfflineRecord>
    where
        F: Fn(&OfflineRecord) -> bool,
    {
        let mut records: Vec<OfflineRecord> =
            self.records.values().filter(|r| filter(r)).cloned().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    pub(crate) fn used_bytes(&self) -> u64 {
        self.used
    }

    /// Recomputes the byte counter from scratch
    pub(crate) fn recount(&mut self) {
        self.used = self.records.values().map(OfflineRecord::size_bytes).sum();
    }

    pub(crate) fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains_key(id)
    }

    /// Inserts a record, assigning an id if empty and the next sequence
    pub(crate) fn put(
        &mut self,
        mut record: OfflineRecord,
        overwrite: bool,
        capacity: u64,
    ) -> StorageResult<String> {
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }

        let replaced = self.records.get(&record.id);
        if replaced.is_some() && !overwrite {
            return Err(StorageError::DuplicateId(record.id));
        }

        record.sequence = self.next_sequence;
        let needed = record.size_bytes();
        let freed = replaced.map(OfflineRecord::size_bytes).unwrap_or(0);
        let remaining = self.used.saturating_sub(freed);
        let available = capacity.saturating_sub(remaining);
        if needed > available {
            return Err(StorageError::QuotaExceeded { needed, available });
        }

        self.next_sequence += 1;
        self.tombstones.remove(&record.id);
        self.used = remaining + needed;
        let id = record.id.clone();
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    /// Returns `(present, changed)`
    pub(crate) fn mark_synced(&mut self, id: &str, at: DateTime<Utc>) -> (bool, bool) {
        let (found, changed) = self.edit(id, |record| {
            if record.synced {
                return false;
            }
            record.synced = true;
            record.synced_at = Some(at);
            record.conflict = None;
            true
        });
        (found.is_some(), changed)
    }

    /// [`mark_synced`](Self::mark_synced) for one revision only
    ///
    /// A record replaced since `sequence` was read is left unsynced.
    pub(crate) fn mark_revision_synced(
        &mut self,
        id: &str,
        sequence: u64,
        at: DateTime<Utc>,
    ) -> (bool, bool) {
        if !self.is_revision(id, sequence) {
            return (false, false);
        }
        self.mark_synced(id, at)
    }

    pub(crate) fn remove(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        let Some(record) = self.records.remove(id) else {
            return false;
        };
        self.used = self.used.saturating_sub(record.size_bytes());
        if record.synced {
            self.tombstones.insert(record.id, at);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.tombstones.clear();
        self.used = 0;
    }

    /// Applies `update` to an unsynced record
    ///
    /// Returns the record as it stands afterwards and whether it changed.
    pub(crate) fn update_unsynced<F>(&mut self, id: &str, update: F) -> (Option<OfflineRecord>, bool)
    where
        F: FnOnce(&mut OfflineRecord),
    {
        self.edit(id, |record| {
            if record.synced {
                return false;
            }
            update(record);
            true
        })
    }

    /// [`update_unsynced`](Self::update_unsynced) for one revision only
    ///
    /// Returns `(None, false)` if the record is gone or was replaced.
    pub(crate) fn update_revision<F>(
        &mut self,
        id: &str,
        sequence: u64,
        update: F,
    ) -> (Option<OfflineRecord>, bool)
    where
        F: FnOnce(&mut OfflineRecord),
    {
        if !self.is_revision(id, sequence) {
            return (None, false);
        }
        self.update_unsynced(id, update)
    }

    /// Deletes synced records synced before `before`; returns how many
    ///
    /// Tombstones older than `before` are dropped as well, unless an unsynced
    /// record still depends on them.
    pub(crate) fn prune_synced(&mut self, before: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .records
            .values()
            .filter(|r| r.synced && r.synced_at.is_some_and(|at| at < before))
            .map(|r| r.id.clone())
            .collect();

        for id in &expired {
            self.remove(id, now);
        }
        self.expire_tombstones(before);
        expired.len()
    }

    fn expire_tombstones(&mut self, before: DateTime<Utc>) {
        let referenced: std::collections::HashSet<&str> = self
            .records
            .values()
            .filter(|r| !r.synced)
            .flat_map(|r| r.dependencies.iter().map(String::as_str))
            .collect();

        let stale: Vec<String> = self
            .tombstones
            .iter()
            .filter(|(id, at)| **at < before && !referenced.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            self.tombstones.remove(id);
        }
        if !stale.is_empty() {
            log::debug!("Dropped {} expired tombstones", stale.len());
        }
    }

    fn is_revision(&self, id: &str, sequence: u64) -> bool {
        self.records.get(id).is_some_and(|r| r.sequence == sequence)
    }

    /// Runs `edit` on one record, keeping the byte counter in step
    fn edit<F>(&mut self, id: &str, edit: F) -> (Option<OfflineRecord>, bool)
    where
        F: FnOnce(&mut OfflineRecord) -> bool,
    {
        let Some(record) = self.records.get_mut(id) else {
            return (None, false);
        };
        let before = record.size_bytes();
        let changed = edit(record);
        if changed {
            self.used = self.used.saturating_sub(before) + record.size_bytes();
        }
        (Some(record.clone()), changed)
    }

    /// Checks internal consistency after loading from disk
    pub(crate) fn validate(&self) -> Result<(), String> {
        for (key, record) in &self.records {
            if key != &record.id {
                return Err(format!("record stored under '{}' has id '{}'", key, record.id));
            }
            if record.sequence >= self.next_sequence {
                return Err(format!(
                    "record '{}' has sequence {} beyond next sequence {}",
                    record.id, record.sequence, self.next_sequence
                ));
            }
        }
        Ok(())
    }
}
