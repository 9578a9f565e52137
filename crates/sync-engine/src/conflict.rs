// crates/sync-engine/src/conflict.rs
//! Handling of permanent rejections

use crate::error::{SyncError, SyncResult};
use crate::store::RecordStore;
use crate::types::{ConflictChoice, OfflineRecord};
use chrono::Utc;
use votesync_network::Rejection;

/// What happened to a permanently rejected record
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    /// The server's decision was accepted and the record marked synced
    Resolved,
    /// The record is held as conflicted until [`ConflictResolver::resolve`]
    Held(OfflineRecord),
    /// The record was removed or overwritten while the push was in flight
    Vanished,
}

/// Applies the conflict policy selected by `enable_conflict_resolution`
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    auto_resolve: bool,
}

impl ConflictResolver {
    /// Creates a resolver; `auto_resolve` accepts the server state without asking
    pub fn new(auto_resolve: bool) -> Self {
        Self { auto_resolve }
    }

    /// Records the outcome of a permanent rejection in the store
    pub fn on_rejection(
        &self,
        store: &dyn RecordStore,
        record: &OfflineRecord,
        rejection: &Rejection,
    ) -> SyncResult<ConflictOutcome> {
        if self.auto_resolve {
            log::info!(
                "Record {} rejected by server, keeping server state: {}",
                record.id,
                rejection.reason
            );
            return Ok(if store.mark_pushed(&record.id, record.sequence)? {
                ConflictOutcome::Resolved
            } else {
                ConflictOutcome::Vanished
            });
        }

        log::warn!(
            "Record {} rejected by server, holding for resolution: {}",
            record.id,
            rejection.reason
        );
        Ok(
            match store.mark_conflicted(&record.id, record.sequence, &rejection.reason, Utc::now())? {
                Some(held) => ConflictOutcome::Held(held),
                None => ConflictOutcome::Vanished,
            },
        )
    }

    /// Applies a manual decision to a conflicted record
    pub fn resolve(
        store: &dyn RecordStore,
        id: &str,
        choice: ConflictChoice,
    ) -> SyncResult<OfflineRecord> {
        let record = store
            .get(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        if record.conflict.is_none() {
            return Err(SyncError::InvalidInput(format!(
                "record {} has no pending conflict",
                id
            )));
        }

        match choice {
            ConflictChoice::AcceptServer => {
                store.mark_synced(id)?;
            }
            ConflictChoice::RetryLocal => {
                store.clear_conflict(id)?;
            }
        }

        log::info!("Resolved conflict on {} with {:?}", id, choice);
        store
            .get(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::types::RecordState;

    fn store_with_vote() -> MemoryRecordStore {
        let store = MemoryRecordStore::new();
        store
            .put(
                OfflineRecord::new("vote", serde_json::json!({"candidateId": "c1"})).with_id("v1"),
                false,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_auto_resolve_marks_synced() {
        let store = store_with_vote();
        let record = store.get("v1").unwrap().unwrap();
        let resolver = ConflictResolver::new(true);

        let outcome = resolver
            .on_rejection(&store, &record, &Rejection::permanent("HTTP 409: Conflict"))
            .unwrap();

        assert_eq!(outcome, ConflictOutcome::Resolved);
        assert!(store.get("v1").unwrap().unwrap().synced);
    }

    #[test]
    fn test_hold_marks_conflicted() {
        let store = store_with_vote();
        let record = store.get("v1").unwrap().unwrap();
        let resolver = ConflictResolver::new(false);

        let outcome = resolver
            .on_rejection(&store, &record, &Rejection::permanent("HTTP 422"))
            .unwrap();

        match outcome {
            ConflictOutcome::Held(held) => {
                assert_eq!(held.conflict.as_deref(), Some("HTTP 422"));
                assert_eq!(held.state(3), RecordState::Conflicted);
            }
            other => panic!("expected held record, got {:?}", other),
        }
    }

    #[test]
    fn test_vanished_record() {
        let store = store_with_vote();
        let record = store.get("v1").unwrap().unwrap();
        store.remove("v1").unwrap();

        let outcome = ConflictResolver::new(false)
            .on_rejection(&store, &record, &Rejection::permanent("gone"))
            .unwrap();
        assert_eq!(outcome, ConflictOutcome::Vanished);
    }

    #[test]
    fn test_resolve_accept_server() {
        let store = store_with_vote();
        store.mark_conflicted("v1", 1, "HTTP 409", Utc::now()).unwrap();

        let record = ConflictResolver::resolve(&store, "v1", ConflictChoice::AcceptServer).unwrap();
        assert!(record.synced);
        assert!(record.conflict.is_none());
    }

    #[test]
    fn test_resolve_retry_local() {
        let store = store_with_vote();
        store.mark_conflicted("v1", 1, "HTTP 409", Utc::now()).unwrap();

        let record = ConflictResolver::resolve(&store, "v1", ConflictChoice::RetryLocal).unwrap();
        assert!(!record.synced);
        assert_eq!(record.state(3), RecordState::Pending);
    }

    #[test]
    fn test_resolve_requires_conflict() {
        let store = store_with_vote();
        assert!(matches!(
            ConflictResolver::resolve(&store, "v1", ConflictChoice::RetryLocal),
            Err(SyncError::InvalidInput(_))
        ));
        assert!(matches!(
            ConflictResolver::resolve(&store, "nope", ConflictChoice::AcceptServer),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_overwritten_record_is_not_resolved() {
        let store = store_with_vote();
        let pushed = store.get("v1").unwrap().unwrap();
        store
            .put(
                OfflineRecord::new("vote", serde_json::json!({"candidateId": "c2"})).with_id("v1"),
                true,
            )
            .unwrap();

        for auto_resolve in [true, false] {
            let outcome = ConflictResolver::new(auto_resolve)
                .on_rejection(&store, &pushed, &Rejection::permanent("HTTP 409"))
                .unwrap();
            assert_eq!(outcome, ConflictOutcome::Vanished);
        }

        let current = store.get("v1").unwrap().unwrap();
        assert_eq!(current.state(3), RecordState::Pending);
        assert_eq!(current.payload["candidateId"], "c2");
    }
}
