// crates/sync-engine/src/orchestrator.rs
//! Sync orchestrator
//!
//! Drains the record store into the remote endpoint, one pass at a time:
//!
//! 1. Snapshot unsynced records and drop those not eligible for this trigger
//! 2. Sort by priority (high first), then creation time, then insertion order
//! 3. Push records one by one in batches, re-reading each from the store
//! 4. Give records whose dependencies synced during the pass another chance
//!
//! The network signal is checked before every push; going offline stops the
//! pass but the result of a push already in flight is always applied.

use crate::conflict::{ConflictOutcome, ConflictResolver};
use crate::error::SyncResult;
use crate::events::{EventBus, OfflineEvent};
use crate::store::RecordStore;
use crate::tracker::StatusTracker;
use crate::types::{OfflineRecord, RecordState, SyncPhase, SyncReport, SyncTrigger};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use votesync_config::SyncSettings;
use votesync_network::{NetworkError, NetworkSignal, PushOutcome, Rejection, RemoteEndpoint};
use votesync_resilience::{with_timeout, RetryPolicy};

/// Whether a record's dependencies allow it to be pushed now
#[derive(Debug, Clone, PartialEq, Eq)]
enum DependencyCheck {
    Satisfied,
    /// A dependency is still queued and may sync later
    Waiting,
    /// A dependency can never sync as things stand
    Blocked(String),
}

/// What processing one record amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    Waiting,
    Offline,
}

/// Per-pass parameters derived from the settings
struct Pass<'a> {
    trigger: SyncTrigger,
    settings: &'a SyncSettings,
    resolver: ConflictResolver,
}

/// Resets the single-flight flag however a pass ends
struct SyncingGuard<'a> {
    flag: &'a AtomicBool,
    tracker: &'a StatusTracker,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        if self.tracker.phase() == SyncPhase::Draining {
            self.tracker.set_phase(SyncPhase::Idle);
        }
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Runs sync passes; at most one at a time
pub struct SyncOrchestrator {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteEndpoint>,
    network: Arc<dyn NetworkSignal>,
    events: Arc<EventBus>,
    tracker: Arc<StatusTracker>,
    syncing: AtomicBool,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteEndpoint>,
        network: Arc<dyn NetworkSignal>,
        events: Arc<EventBus>,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self {
            store,
            remote,
            network,
            events,
            tracker,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Runs one pass
    ///
    /// Returns `Ok(None)` without doing anything if a pass is already running
    /// or the device is offline.
    pub async fn run(
        &self,
        trigger: SyncTrigger,
        settings: &SyncSettings,
    ) -> SyncResult<Option<SyncReport>> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("Sync already in progress, ignoring {:?} trigger", trigger);
            return Ok(None);
        }
        let guard = SyncingGuard {
            flag: &self.syncing,
            tracker: &self.tracker,
        };

        if !self.network.is_online() {
            log::debug!("Offline, skipping {:?} sync", trigger);
            return Ok(None);
        }

        log::info!("Sync pass started ({:?})", trigger);
        self.tracker.set_phase(SyncPhase::Draining);
        self.events.emit(OfflineEvent::SyncStarted { trigger });

        let pass = Pass {
            trigger,
            settings,
            resolver: ConflictResolver::new(settings.enable_conflict_resolution),
        };

        match self.drain(&pass).await {
            Ok(report) => {
                self.tracker.set_last_pass_aborted(report.aborted);
                if report.aborted {
                    self.tracker.set_phase(SyncPhase::Aborted);
                    log::warn!(
                        "Sync pass aborted, went offline after {} pushes",
                        report.attempted
                    );
                } else {
                    self.tracker.set_phase(SyncPhase::Settling);
                    self.tracker.set_last_sync(Utc::now());
                    log::info!(
                        "Sync pass finished: {} synced, {} failed, {} resolved, {} conflicted, {} deferred",
                        report.synced,
                        report.failed,
                        report.resolved,
                        report.conflicted,
                        report.deferred
                    );
                }

                self.tracker.set_phase(SyncPhase::Idle);
                drop(guard);
                self.events.emit(OfflineEvent::SyncCompleted {
                    report: report.clone(),
                });
                Ok(Some(report))
            }
            Err(e) => {
                log::error!("Sync pass failed: {}", e);
                self.tracker.push_error(None, e.to_string());
                self.tracker.set_phase(SyncPhase::Idle);
                drop(guard);
                self.events.emit(OfflineEvent::SyncFailed {
                    trigger,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drain(&self, pass: &Pass<'_>) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(pass.trigger);
        let queue = self.snapshot(pass)?;
        log::debug!("{} records eligible for this pass", queue.len());

        let mut waiting = Vec::new();
        'batches: for batch in queue.chunks(pass.settings.batch_size.max(1)) {
            for record in batch {
                match self.process(&record.id, pass, &mut report).await? {
                    Step::Done => {}
                    Step::Waiting => waiting.push(record.id.clone()),
                    Step::Offline => {
                        report.aborted = true;
                        break 'batches;
                    }
                }
            }
        }

        // Records that waited on a dependency synced later in this pass
        while !report.aborted && !waiting.is_empty() {
            let before = waiting.len();
            let mut still_waiting = Vec::new();
            for id in waiting {
                match self.process(&id, pass, &mut report).await? {
                    Step::Done => {}
                    Step::Waiting => still_waiting.push(id),
                    Step::Offline => {
                        report.aborted = true;
                        break;
                    }
                }
            }

            let stalled = still_waiting.len() == before;
            waiting = still_waiting;
            if stalled {
                break;
            }
        }
        report.deferred += waiting.len();

        Ok(report)
    }

    /// Unsynced records eligible for `pass`, in drain order
    fn snapshot(&self, pass: &Pass<'_>) -> SyncResult<Vec<OfflineRecord>> {
        let max_retries = pass.settings.max_retries;
        let policy = retry_policy(pass.settings);
        let now = Utc::now();

        let mut queue: Vec<OfflineRecord> = self
            .store
            .list_unsynced()?
            .into_iter()
            .filter(|record| match record.state(max_retries) {
                RecordState::Pending => {
                    !pass.trigger.is_automatic() || !record.in_backoff(&policy, now)
                }
                RecordState::Failed => !pass.trigger.is_automatic(),
                RecordState::Conflicted | RecordState::Synced => false,
            })
            .collect();

        sort_for_drain(&mut queue);
        Ok(queue)
    }

    async fn process(
        &self,
        id: &str,
        pass: &Pass<'_>,
        report: &mut SyncReport,
    ) -> SyncResult<Step> {
        if !self.network.is_online() {
            return Ok(Step::Offline);
        }

        // Removed or settled administratively since the snapshot
        let Some(record) = self.store.get(id)? else {
            return Ok(Step::Done);
        };
        if record.synced || record.conflict.is_some() {
            return Ok(Step::Done);
        }

        match self.check_dependencies(&record, pass)? {
            DependencyCheck::Satisfied => {}
            DependencyCheck::Waiting => return Ok(Step::Waiting),
            DependencyCheck::Blocked(dependency) => {
                report.deferred += 1;
                self.defer(&record, &dependency, pass)?;
                return Ok(Step::Done);
            }
        }

        report.attempted += 1;
        let outcome = match with_timeout(
            pass.settings.request_timeout(),
            self.remote.push(&record.to_push_request()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => PushOutcome::Rejected(Rejection::from(NetworkError::from(e))),
        };

        self.apply_outcome(&record, outcome, pass, report)?;
        Ok(Step::Done)
    }

    fn check_dependencies(
        &self,
        record: &OfflineRecord,
        pass: &Pass<'_>,
    ) -> SyncResult<DependencyCheck> {
        let max_retries = pass.settings.max_retries;
        let mut waiting = false;

        for dependency_id in &record.dependencies {
            if dependency_id == &record.id {
                return Ok(DependencyCheck::Blocked(dependency_id.clone()));
            }

            let Some(dependency) = self.store.get(dependency_id)? else {
                if self.store.is_tombstoned(dependency_id)? {
                    continue;
                }
                return Ok(DependencyCheck::Blocked(dependency_id.clone()));
            };

            match dependency.state(max_retries) {
                RecordState::Synced => {}
                RecordState::Pending => waiting = true,
                // A manual pass retries failed records, so this one may still go out
                RecordState::Failed if !pass.trigger.is_automatic() => waiting = true,
                RecordState::Failed | RecordState::Conflicted => {
                    return Ok(DependencyCheck::Blocked(dependency_id.clone()));
                }
            }
        }

        if waiting && self.depends_on_itself(record)? {
            return Ok(DependencyCheck::Blocked(record.id.clone()));
        }

        Ok(if waiting {
            DependencyCheck::Waiting
        } else {
            DependencyCheck::Satisfied
        })
    }

    /// Detects a dependency cycle through unsynced records
    fn depends_on_itself(&self, record: &OfflineRecord) -> SyncResult<bool> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = record.dependencies.clone();

        while let Some(id) = stack.pop() {
            if id == record.id {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(dependency) = self.store.get(&id)? {
                if !dependency.synced {
                    stack.extend(dependency.dependencies);
                }
            }
        }
        Ok(false)
    }

    fn defer(
        &self,
        record: &OfflineRecord,
        dependency: &str,
        pass: &Pass<'_>,
    ) -> SyncResult<()> {
        log::debug!(
            "Deferring {}: dependency {} cannot be satisfied",
            record.id,
            dependency
        );

        let Some(updated) = self.store.record_deferral(&record.id)? else {
            return Ok(());
        };

        if updated.state(pass.settings.max_retries) == RecordState::Failed
            && record.state(pass.settings.max_retries) != RecordState::Failed
        {
            let error = format!("dependency {} cannot be synced", dependency);
            self.tracker.push_error(Some(&record.id), error.clone());
            self.events.emit(OfflineEvent::RecordFailed {
                id: updated.id,
                record_type: updated.record_type,
                attempts: updated.attempts,
                error,
            });
        }
        Ok(())
    }

    fn apply_outcome(
        &self,
        record: &OfflineRecord,
        outcome: PushOutcome,
        pass: &Pass<'_>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let rejection = match outcome {
            PushOutcome::Accepted => {
                if !self.store.mark_pushed(&record.id, record.sequence)? {
                    log::debug!(
                        "Record {} was removed or overwritten during its push, keeping the newer state",
                        record.id
                    );
                    return Ok(());
                }
                report.synced += 1;
                log::debug!("Synced {}", record.id);
                self.events.emit(OfflineEvent::RecordSynced {
                    id: record.id.clone(),
                    record_type: record.record_type.clone(),
                });
                return Ok(());
            }
            PushOutcome::Rejected(rejection) => rejection,
        };

        if rejection.retryable {
            report.failed += 1;
            self.tracker
                .push_error(Some(&record.id), rejection.reason.clone());

            let Some(updated) =
                self.store
                    .record_failure(&record.id, record.sequence, &rejection.reason, Utc::now())?
            else {
                return Ok(());
            };

            if updated.state(pass.settings.max_retries) == RecordState::Failed {
                log::warn!(
                    "Record {} failed after {} attempts: {}",
                    updated.id,
                    updated.attempts,
                    rejection.reason
                );
                self.events.emit(OfflineEvent::RecordFailed {
                    id: updated.id,
                    record_type: updated.record_type,
                    attempts: updated.attempts,
                    error: rejection.reason,
                });
            } else {
                log::debug!(
                    "Push of {} failed (attempt {}): {}",
                    updated.id,
                    updated.attempts,
                    rejection.reason
                );
            }
            return Ok(());
        }

        match pass
            .resolver
            .on_rejection(self.store.as_ref(), record, &rejection)?
        {
            ConflictOutcome::Resolved => {
                report.resolved += 1;
                self.events.emit(OfflineEvent::RecordConflictResolved {
                    id: record.id.clone(),
                    record_type: record.record_type.clone(),
                    reason: rejection.reason,
                });
            }
            ConflictOutcome::Held(held) => {
                report.conflicted += 1;
                self.tracker
                    .push_error(Some(&held.id), rejection.reason.clone());
                self.events.emit(OfflineEvent::RecordConflicted {
                    id: held.id,
                    record_type: held.record_type,
                    reason: rejection.reason,
                });
            }
            ConflictOutcome::Vanished => {}
        }
        Ok(())
    }
}

/// Backoff policy for the given settings
pub fn retry_policy(settings: &SyncSettings) -> RetryPolicy {
    RetryPolicy::new(settings.max_retries)
        .with_base_delay(settings.retry_delay())
        .with_max_delay(settings.max_retry_delay())
}

/// Orders records high priority first, then oldest first
pub fn sort_for_drain(records: &mut [OfflineRecord]) {
    records.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.sequence.cmp(&b.sequence))
    });
}
