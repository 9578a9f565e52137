// crates/sync-engine/src/lib.rs
//! Offline-first synchronization engine
//!
//! This module keeps a durable local queue of user mutations and reconciles
//! it with a remote backend once connectivity returns:
//! - Durable record store that survives restarts and enforces a storage quota
//! - Priority and dependency aware draining, one pass at a time
//! - Per-record retry budget with capped backoff
//! - Conflict handling for permanent rejections
//! - Status reporting and event notifications
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use votesync_network::{PushOutcome, PushRequest, RemoteEndpoint};
//! use votesync_sync_engine::{OfflineManager, Priority, StoreOptions};
//!
//! struct Backend;
//!
//! #[async_trait::async_trait]
//! impl RemoteEndpoint for Backend {
//!     async fn push(&self, _request: &PushRequest) -> PushOutcome {
//!         PushOutcome::Accepted
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = OfflineManager::builder()
//!     .remote(Arc::new(Backend))
//!     .build()?;
//!
//! let id = manager
//!     .store_data(
//!         "vote",
//!         serde_json::json!({"candidateId": "c-7"}),
//!         StoreOptions::default().with_priority(Priority::High),
//!     )
//!     .await?;
//!
//! assert!(manager.sync_data().await);
//! assert!(manager.get_data(&id)?.unwrap().synced);
//! # Ok(())
//! # }
//! ```

mod conflict;
mod error;
mod events;
mod manager;
mod orchestrator;
mod store;
mod tracker;
mod types;

pub use conflict::{ConflictOutcome, ConflictResolver};
pub use error::{StorageError, StorageResult, SyncError, SyncResult};
pub use events::{EventBus, EventKind, ListenerId, OfflineEvent, DEFAULT_EVENT_CAPACITY};
pub use manager::{OfflineManager, OfflineManagerBuilder};
pub use orchestrator::{retry_policy, sort_for_drain, SyncOrchestrator};
pub use store::{
    BackedStore, FileBackend, FileRecordStore, MemoryBackend, MemoryRecordStore, RecordStore,
    StoreBackend, StoreState, DEFAULT_CAPACITY, RECORDS_FILE,
};
pub use tracker::{StatusTracker, MAX_STATUS_ERRORS};
pub use types::{
    ConflictChoice, OfflineRecord, Priority, RecordState, StatusError, StorageUsage,
    StoreOptions, SyncPhase, SyncReport, SyncStatus, SyncTrigger,
};
