// crates/sync-engine/src/types.rs
//! Core offline queue types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use votesync_network::PushRequest;
use votesync_resilience::RetryPolicy;

/// Drain priority of a queued record
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// A locally queued mutation waiting to reach the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRecord {
    /// Unique id; caller supplied or a generated UUID v4
    pub id: String,
    /// Opaque tag used for retrieval filtering and the remote route
    pub record_type: String,
    /// Record body, pushed to the backend verbatim
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Ids that must be synced before this record may be sent
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub synced: bool,
    /// Remote attempts so far; never decreases
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Insertion sequence assigned by the store
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Passes skipped because a dependency can never be satisfied
    #[serde(default)]
    pub deferrals: u32,
    /// Reason of a permanent rejection awaiting a manual decision
    #[serde(default)]
    pub conflict: Option<String>,
}

impl OfflineRecord {
    /// Creates an unsynced record with a generated id
    pub fn new(record_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            record_type: record_type.into(),
            payload,
            priority: Priority::Normal,
            dependencies: Vec::new(),
            synced: false,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            last_error: None,
            sequence: 0,
            synced_at: None,
            deferrals: 0,
            conflict: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dependencies, dropping duplicates and keeping first occurrence order
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !unique.contains(&dep) {
                unique.push(dep);
            }
        }
        self.dependencies = unique;
        self
    }

    /// Classifies the record against a retry budget
    pub fn state(&self, max_retries: u32) -> RecordState {
        if self.synced {
            RecordState::Synced
        } else if self.conflict.is_some() {
            RecordState::Conflicted
        } else if self.is_exhausted(max_retries) {
            RecordState::Failed
        } else {
            RecordState::Pending
        }
    }

    /// Returns true once attempts or deferrals used up the budget
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        let budget = RetryPolicy::new(max_retries);
        budget.is_exhausted(self.attempts) || budget.is_exhausted(self.deferrals)
    }

    /// Earliest time an automatic pass may push this record again
    ///
    /// `None` means immediately.
    pub fn next_attempt_at(&self, policy: &RetryPolicy) -> Option<DateTime<Utc>> {
        let last = self.last_attempt_at?;
        if self.attempts == 0 {
            return None;
        }

        let wait = policy.delay_for_attempt(self.attempts);
        let wait = chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::days(1));
        last.checked_add_signed(wait)
    }

    /// Returns true if an automatic pass at `now` must still wait
    pub fn in_backoff(&self, policy: &RetryPolicy, now: DateTime<Utc>) -> bool {
        self.next_attempt_at(policy).is_some_and(|at| at > now)
    }

    /// Builds the request the remote endpoint receives
    pub fn to_push_request(&self) -> PushRequest {
        PushRequest {
            record_type: self.record_type.clone(),
            id: self.id.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Bytes this record accounts for against the storage ceiling
    pub fn size_bytes(&self) -> u64 {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0)
    }
}

/// Where a record stands, given the active retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Pending,
    Failed,
    Conflicted,
    Synced,
}

/// Options accepted when storing a record
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Caller supplied id; a UUID is generated when absent or empty
    pub id: Option<String>,
    /// Replace an existing record with the same id
    pub overwrite: bool,
    pub priority: Priority,
    pub dependencies: Vec<String>,
}

impl StoreOptions {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }
}

/// Storage consumption against the configured ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used: u64,
    pub available: u64,
    /// `used / capacity * 100`, clamped to 100
    pub percentage: f64,
}

impl StorageUsage {
    pub fn new(used: u64, capacity: u64) -> Self {
        let percentage = if capacity == 0 {
            100.0
        } else {
            (used as f64 / capacity as f64 * 100.0).min(100.0)
        };

        Self {
            used,
            available: capacity.saturating_sub(used),
            percentage,
        }
    }
}

/// Orchestrator lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Draining,
    Settling,
    /// The pass is stopping early because the device went offline
    Aborted,
}

/// What started a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    /// Explicit `sync_data` call; retries failed records and ignores backoff
    Manual,
    /// Offline to online transition
    Reconnect,
    /// Periodic timer
    Timer,
}

impl SyncTrigger {
    pub fn is_automatic(&self) -> bool {
        !matches!(self, SyncTrigger::Manual)
    }
}

/// Outcome counters of one sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    /// Records pushed to the remote
    pub attempted: usize,
    pub synced: usize,
    /// Retryable failures
    pub failed: usize,
    /// Permanent rejections resolved in favor of the server
    pub resolved: usize,
    /// Permanent rejections held for a manual decision
    pub conflicted: usize,
    /// Records skipped because of unsatisfied dependencies
    pub deferred: usize,
    /// The pass stopped early because the device went offline
    pub aborted: bool,
}

impl SyncReport {
    pub fn new(trigger: SyncTrigger) -> Self {
        Self {
            trigger,
            attempted: 0,
            synced: 0,
            failed: 0,
            resolved: 0,
            conflicted: 0,
            deferred: 0,
            aborted: false,
        }
    }
}

/// A failure remembered for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusError {
    pub at: DateTime<Utc>,
    pub record_id: Option<String>,
    pub message: String,
}

/// Derived sync status; recomputed from the store on every query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub phase: SyncPhase,
    /// The most recent pass stopped early because the device went offline
    pub last_pass_aborted: bool,
    pub pending_items: usize,
    pub failed_items: usize,
    pub conflicted_items: usize,
    pub total_items: usize,
    /// 0 to 100; 100 when the store is empty
    pub sync_progress: f64,
    /// Newest first
    pub errors: Vec<StatusError>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Manual decision for a conflicted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictChoice {
    /// Keep the server's state; the record is marked synced
    AcceptServer,
    /// Clear the conflict and queue the local record again
    RetryLocal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_record_creation() {
        let record = OfflineRecord::new("vote", serde_json::json!({"candidateId": "c1"}));
        assert!(!record.id.is_empty());
        assert_eq!(record.priority, Priority::Normal);
        assert!(!record.synced);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.state(3), RecordState::Pending);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let record = OfflineRecord::new("vote", serde_json::json!({})).with_dependencies(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
        ]);
        assert_eq!(record.dependencies, vec!["b", "a"]);
    }

    #[test]
    fn test_state_classification() {
        let mut record = OfflineRecord::new("vote", serde_json::json!({}));
        record.attempts = 2;
        assert_eq!(record.state(3), RecordState::Pending);
        assert_eq!(record.state(2), RecordState::Failed);

        record.conflict = Some("rejected".to_string());
        assert_eq!(record.state(2), RecordState::Conflicted);

        record.synced = true;
        assert_eq!(record.state(2), RecordState::Synced);
    }

    #[test]
    fn test_zero_retry_budget_allows_one_attempt() {
        let mut record = OfflineRecord::new("vote", serde_json::json!({}));
        assert_eq!(record.state(0), RecordState::Pending);
        record.attempts = 1;
        assert_eq!(record.state(0), RecordState::Failed);
    }

    #[test]
    fn test_deferrals_exhaust_budget() {
        let mut record = OfflineRecord::new("vote", serde_json::json!({}));
        record.deferrals = 3;
        assert_eq!(record.state(3), RecordState::Failed);
    }

    #[test]
    fn test_backoff_window() {
        let policy = RetryPolicy::new(5)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250));
        let now = Utc::now();

        let mut record = OfflineRecord::new("vote", serde_json::json!({}));
        assert!(!record.in_backoff(&policy, now));

        record.attempts = 1;
        record.last_attempt_at = Some(now);
        assert!(record.in_backoff(&policy, now));
        assert!(!record.in_backoff(&policy, now + chrono::Duration::milliseconds(100)));

        // capped at 250ms even after many attempts
        record.attempts = 10;
        assert!(record.in_backoff(&policy, now + chrono::Duration::milliseconds(200)));
        assert!(!record.in_backoff(&policy, now + chrono::Duration::milliseconds(250)));
    }

    #[test]
    fn test_storage_usage() {
        let usage = StorageUsage::new(25, 100);
        assert_eq!(usage.available, 75);
        assert!((usage.percentage - 25.0).abs() < f64::EPSILON);

        let full = StorageUsage::new(150, 100);
        assert_eq!(full.available, 0);
        assert!((full.percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_serialization() {
        let record = OfflineRecord::new("profile", serde_json::json!({"name": "Ada"}))
            .with_priority(Priority::High);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["priority"], "high");
        assert_eq!(json["record_type"], "profile");
        assert!(record.size_bytes() > 0);
    }

    #[test]
    fn test_push_request_carries_payload() {
        let record = OfflineRecord::new("bookmark", serde_json::json!({"electionId": "e1"}))
            .with_id("bm-1");
        let request = record.to_push_request();
        assert_eq!(request.id, "bm-1");
        assert_eq!(request.record_type, "bookmark");
        assert_eq!(request.payload["electionId"], "e1");
    }

    #[test]
    fn test_trigger_kind() {
        assert!(!SyncTrigger::Manual.is_automatic());
        assert!(SyncTrigger::Timer.is_automatic());
        assert!(SyncTrigger::Reconnect.is_automatic());
    }
}
