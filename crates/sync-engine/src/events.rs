// crates/sync-engine/src/events.rs
//! Event delivery to observers
//!
//! Every event goes out twice: on a `broadcast` channel for async
//! subscribers, and synchronously to callbacks registered for its kind.

use crate::types::{SyncReport, SyncTrigger};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Default buffer of the broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Something observable happened to the offline queue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OfflineEvent {
    DataStored { id: String, record_type: String },
    RecordSynced { id: String, record_type: String },
    RecordConflictResolved {
        id: String,
        record_type: String,
        reason: String,
    },
    SyncStarted { trigger: SyncTrigger },
    SyncCompleted { report: SyncReport },
    SyncFailed { trigger: SyncTrigger, error: String },
    /// The record used up its retry budget
    RecordFailed {
        id: String,
        record_type: String,
        attempts: u32,
        error: String,
    },
    RecordConflicted {
        id: String,
        record_type: String,
        reason: String,
    },
    NetworkChanged { online: bool },
    DataRemoved { id: String },
    DataCleared,
    RecordsPruned { count: usize },
}

/// Discriminant of [`OfflineEvent`] used to register callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DataStored,
    RecordSynced,
    RecordConflictResolved,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
    RecordFailed,
    RecordConflicted,
    NetworkChanged,
    DataRemoved,
    DataCleared,
    RecordsPruned,
}

impl OfflineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OfflineEvent::DataStored { .. } => EventKind::DataStored,
            OfflineEvent::RecordSynced { .. } => EventKind::RecordSynced,
            OfflineEvent::RecordConflictResolved { .. } => EventKind::RecordConflictResolved,
            OfflineEvent::SyncStarted { .. } => EventKind::SyncStarted,
            OfflineEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            OfflineEvent::SyncFailed { .. } => EventKind::SyncFailed,
            OfflineEvent::RecordFailed { .. } => EventKind::RecordFailed,
            OfflineEvent::RecordConflicted { .. } => EventKind::RecordConflicted,
            OfflineEvent::NetworkChanged { .. } => EventKind::NetworkChanged,
            OfflineEvent::DataRemoved { .. } => EventKind::DataRemoved,
            OfflineEvent::DataCleared => EventKind::DataCleared,
            OfflineEvent::RecordsPruned { .. } => EventKind::RecordsPruned,
        }
    }
}

/// Handle returned when registering a callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&OfflineEvent) + Send + Sync>;

struct Listener {
    id: ListenerId,
    kind: EventKind,
    callback: Callback,
}

/// Fan-out of [`OfflineEvent`]s
pub struct EventBus {
    sender: broadcast::Sender<OfflineEvent>,
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Receives every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<OfflineEvent> {
        self.sender.subscribe()
    }

    /// Registers `callback` for events of `kind`
    pub fn add_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&OfflineEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push(Listener {
            id,
            kind,
            callback: Arc::new(callback),
        });
        id
    }

    /// Returns false if no listener had this id
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Delivers `event` to subscribers and matching callbacks
    ///
    /// Callbacks run on the emitting task, outside the listener lock, so a
    /// callback may register or remove listeners. A panicking callback is
    /// logged and does not reach the emitter.
    pub fn emit(&self, event: OfflineEvent) {
        let kind = event.kind();
        let callbacks: Vec<Callback> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners
                .iter()
                .filter(|l| l.kind == kind)
                .map(|l| Arc::clone(&l.callback))
                .collect()
        };

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                log::warn!("Event listener for {:?} panicked", kind);
            }
        }

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(OfflineEvent::DataCleared.kind(), EventKind::DataCleared);
        assert_eq!(
            OfflineEvent::NetworkChanged { online: true }.kind(),
            EventKind::NetworkChanged
        );
    }

    #[test]
    fn test_listener_receives_matching_kind_only() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.add_listener(EventKind::DataRemoved, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(OfflineEvent::DataRemoved { id: "a".to_string() });
        bus.emit(OfflineEvent::DataCleared);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_listener() {
        let bus = EventBus::default();
        let id = bus.add_listener(EventKind::DataCleared, |_| {});
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.remove_listener(id));
        assert!(!bus.remove_listener(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_is_contained() {
        let bus = EventBus::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bus.add_listener(EventKind::DataCleared, |_| panic!("listener bug"));
        bus.add_listener(EventKind::DataCleared, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(OfflineEvent::DataCleared);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(OfflineEvent::RecordsPruned { count: 3 });

        let event = rx.recv().await.unwrap();
        assert_eq!(event, OfflineEvent::RecordsPruned { count: 3 });
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(OfflineEvent::DataStored {
            id: "v1".to_string(),
            record_type: "vote".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "data_stored");
        assert_eq!(json["id"], "v1");
    }
}
