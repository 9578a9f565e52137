// crates/sync-engine/src/tracker.rs
//! Status tracking for synchronization

use crate::types::{OfflineRecord, RecordState, StatusError, SyncPhase, SyncStatus};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Errors kept for status reporting
pub const MAX_STATUS_ERRORS: usize = 20;

#[derive(Debug, Default)]
struct TrackerState {
    phase: SyncPhase,
    last_sync: Option<DateTime<Utc>>,
    last_pass_aborted: bool,
    errors: VecDeque<StatusError>,
}

/// Remembers what the store cannot: phase, last sync and recent errors
#[derive(Debug, Default)]
pub struct StatusTracker {
    state: Mutex<TrackerState>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned tracker keeps serving its last state.
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    pub fn set_phase(&self, phase: SyncPhase) {
        self.lock().phase = phase;
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.lock().last_sync
    }

    pub fn set_last_sync(&self, at: DateTime<Utc>) {
        self.lock().last_sync = Some(at);
    }

    pub fn last_pass_aborted(&self) -> bool {
        self.lock().last_pass_aborted
    }

    pub fn set_last_pass_aborted(&self, aborted: bool) {
        self.lock().last_pass_aborted = aborted;
    }

    /// Records an error, dropping the oldest beyond [`MAX_STATUS_ERRORS`]
    pub fn push_error(&self, record_id: Option<&str>, message: impl Into<String>) {
        let mut state = self.lock();
        state.errors.push_front(StatusError {
            at: Utc::now(),
            record_id: record_id.map(str::to_string),
            message: message.into(),
        });
        state.errors.truncate(MAX_STATUS_ERRORS);
    }

    /// Newest first
    pub fn errors(&self) -> Vec<StatusError> {
        self.lock().errors.iter().cloned().collect()
    }

    pub fn clear_errors(&self) {
        self.lock().errors.clear();
    }

    /// Derives the status from the full record list
    pub fn status(
        &self,
        records: &[OfflineRecord],
        max_retries: u32,
        is_online: bool,
        is_syncing: bool,
    ) -> SyncStatus {
        let mut pending = 0;
        let mut failed = 0;
        let mut conflicted = 0;
        for record in records {
            match record.state(max_retries) {
                RecordState::Pending => pending += 1,
                RecordState::Failed => failed += 1,
                RecordState::Conflicted => conflicted += 1,
                RecordState::Synced => {}
            }
        }

        let total = records.len();
        let sync_progress = if total == 0 {
            100.0
        } else {
            (total - pending - failed - conflicted) as f64 / total as f64 * 100.0
        };

        let state = self.lock();
        SyncStatus {
            is_online,
            is_syncing,
            phase: state.phase,
            last_pass_aborted: state.last_pass_aborted,
            pending_items: pending,
            failed_items: failed,
            conflicted_items: conflicted,
            total_items: total,
            sync_progress,
            errors: state.errors.iter().cloned().collect(),
            last_sync: state.last_sync,
        }
    }
}
