// crates/sync-engine/src/manager.rs
//! Offline manager: the public entry point of the engine
//!
//! Producers store records through it, the UI reads status and events from
//! it, and it owns the background work: the network watcher, the periodic
//! sync timer and the cleanup sweep. It is an explicit instance, cheap to
//! clone; background tasks only hold a weak reference and stop once the last
//! handle is dropped.

use crate::conflict::ConflictResolver;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, EventKind, ListenerId, OfflineEvent, DEFAULT_EVENT_CAPACITY};
use crate::orchestrator::SyncOrchestrator;
use crate::store::{MemoryRecordStore, RecordStore};
use crate::tracker::StatusTracker;
use crate::types::{
    ConflictChoice, OfflineRecord, StorageUsage, StoreOptions, SyncReport, SyncStatus,
    SyncTrigger,
};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use votesync_config::{ConfigManager, ConfigSection, SettingsPatch, SyncSettings};
use votesync_network::{ManualNetworkSignal, NetworkSignal, RemoteEndpoint};

/// Builds an [`OfflineManager`]
pub struct OfflineManagerBuilder {
    store: Option<Arc<dyn RecordStore>>,
    remote: Option<Arc<dyn RemoteEndpoint>>,
    network: Option<Arc<dyn NetworkSignal>>,
    settings: SyncSettings,
    config: Option<ConfigManager>,
    event_capacity: usize,
}

impl OfflineManagerBuilder {
    fn new() -> Self {
        Self {
            store: None,
            remote: None,
            network: None,
            settings: SyncSettings::default(),
            config: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Record store; defaults to a volatile [`MemoryRecordStore`]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Remote endpoint records are pushed to (required)
    pub fn remote(mut self, remote: Arc<dyn RemoteEndpoint>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Connectivity source; defaults to an always-online manual signal
    pub fn network(mut self, network: Arc<dyn NetworkSignal>) -> Self {
        self.network = Some(network);
        self
    }

    /// Initial settings, before persisted overrides are applied
    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Loads overrides on `initialize` and persists `configure` changes
    pub fn config_manager(mut self, config: ConfigManager) -> Self {
        self.config = Some(config);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> SyncResult<OfflineManager> {
        let remote = self
            .remote
            .ok_or_else(|| SyncError::Configuration("a remote endpoint is required".to_string()))?;
        self.settings
            .validate()
            .map_err(votesync_config::ConfigError::Invalid)?;

        let store = self.store.unwrap_or_else(|| {
            log::warn!("No record store configured, queued records will not survive a restart");
            Arc::new(MemoryRecordStore::new())
        });
        let network = self
            .network
            .unwrap_or_else(|| Arc::new(ManualNetworkSignal::default()));
        store.set_capacity(self.settings.max_storage_size);

        let events = Arc::new(EventBus::new(self.event_capacity));
        let tracker = Arc::new(StatusTracker::new());
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&store),
            remote,
            Arc::clone(&network),
            Arc::clone(&events),
            Arc::clone(&tracker),
        );

        Ok(OfflineManager {
            inner: Arc::new(Inner {
                store,
                network,
                orchestrator,
                events,
                tracker,
                settings: RwLock::new(self.settings),
                config: self.config,
                initialized: Mutex::new(None),
                tasks: Mutex::new(Tasks::default()),
            }),
        })
    }
}

#[derive(Default)]
struct Tasks {
    watcher: Option<JoinHandle<()>>,
    sync_timer: Option<JoinHandle<()>>,
    cleanup_timer: Option<JoinHandle<()>>,
}

impl Tasks {
    fn stop_timers(&mut self) {
        for handle in [self.sync_timer.take(), self.cleanup_timer.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn stop_all(&mut self) {
        self.stop_timers();
        if let Some(handle) = self.watcher.take() {
            handle.abort();
        }
    }
}

struct Inner {
    store: Arc<dyn RecordStore>,
    network: Arc<dyn NetworkSignal>,
    orchestrator: SyncOrchestrator,
    events: Arc<EventBus>,
    tracker: Arc<StatusTracker>,
    settings: RwLock<SyncSettings>,
    config: Option<ConfigManager>,
    /// Cached result of `initialize`; `None` until called or after `cleanup`
    initialized: Mutex<Option<bool>>,
    tasks: Mutex<Tasks>,
}

impl Inner {
    fn settings(&self) -> SyncSettings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_settings(&self, settings: SyncSettings) {
        match self.settings.write() {
            Ok(mut current) => *current = settings,
            Err(e) => *e.into_inner() = settings,
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_initialized(&self) -> bool {
        matches!(
            *self.initialized.lock().unwrap_or_else(|e| e.into_inner()),
            Some(true)
        )
    }

    async fn sync(&self, trigger: SyncTrigger) -> SyncResult<Option<SyncReport>> {
        let settings = self.settings();
        self.orchestrator.run(trigger, &settings).await
    }

    fn prune_synced(&self) -> SyncResult<usize> {
        let retention = self.settings().synced_retention();
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .ok_or_else(|| {
                SyncError::Configuration(format!("synced retention of {:?} is out of range", retention))
            })?;
        let pruned = self.store.prune_synced(cutoff)?;
        if pruned > 0 {
            log::info!("Pruned {} synced records", pruned);
            self.events
                .emit(OfflineEvent::RecordsPruned { count: pruned });
        }
        Ok(pruned)
    }

    /// Starts the sync and cleanup timers for the current settings
    fn start_timers(self: &Arc<Self>) {
        let settings = self.settings();
        let mut tasks = self.tasks();
        tasks.stop_timers();
        tasks.sync_timer = Some(spawn_sync_timer(
            Arc::downgrade(self),
            settings.sync_interval(),
        ));
        tasks.cleanup_timer = Some(spawn_cleanup_timer(
            Arc::downgrade(self),
            settings.cleanup_interval(),
        ));
        log::debug!(
            "Timers started: sync every {:?}, cleanup every {:?}",
            settings.sync_interval(),
            settings.cleanup_interval()
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.tasks().stop_all();
    }
}

fn interval_after(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn spawn_sync_timer(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_after(period);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if !inner.settings().enable_auto_sync {
                continue;
            }
            if let Err(e) = inner.sync(SyncTrigger::Timer).await {
                log::warn!("Periodic sync failed: {}", e);
            }
        }
    })
}

fn spawn_cleanup_timer(inner: Weak<Inner>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_after(period);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let result = tokio::task::spawn_blocking(move || inner.prune_synced()).await;
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => log::warn!("Cleanup sweep failed: {}", e),
                Err(e) => log::warn!("Cleanup sweep task failed: {}", e),
            }
        }
    })
}

fn spawn_network_watcher(inner: &Arc<Inner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let mut changes = inner.network.subscribe();
    let mut was_online = *changes.borrow_and_update();

    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let online = *changes.borrow_and_update();
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if online == was_online {
                continue;
            }
            was_online = online;

            log::info!("Network is now {}", if online { "online" } else { "offline" });
            inner.events.emit(OfflineEvent::NetworkChanged { online });

            if online && inner.settings().enable_auto_sync {
                if let Err(e) = inner.sync(SyncTrigger::Reconnect).await {
                    log::warn!("Reconnect sync failed: {}", e);
                }
            }
        }
    })
}

/// Offline-first queue with background synchronization
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use votesync_network::{Client, HttpRemoteEndpoint};
/// use votesync_sync_engine::{FileRecordStore, OfflineManager, StoreOptions};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = HttpRemoteEndpoint::new(Client::new()?, "https://api.example.com/sync")?;
/// let manager = OfflineManager::builder()
///     .store(Arc::new(FileRecordStore::open_in_dir("/tmp/votesync")?))
///     .remote(Arc::new(remote))
///     .build()?;
///
/// manager.initialize().await;
/// manager
///     .store_data("vote", serde_json::json!({"candidateId": "c1"}), StoreOptions::default())
///     .await?;
/// manager.sync_data().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct OfflineManager {
    inner: Arc<Inner>,
}

impl OfflineManager {
    pub fn builder() -> OfflineManagerBuilder {
        OfflineManagerBuilder::new()
    }

    /// Loads persisted settings and starts the background tasks
    ///
    /// Returns false if the store is unusable. Repeated calls return the
    /// first result without doing anything until [`cleanup`](Self::cleanup).
    pub async fn initialize(&self) -> bool {
        let mut initialized = self
            .inner
            .initialized
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(result) = *initialized {
            return result;
        }

        if let Some(config) = &self.inner.config {
            match config.load_with_env_overrides() {
                Ok(config) => self.inner.set_settings(config.sync),
                Err(e) => log::warn!("Failed to load sync settings, keeping current: {}", e),
            }
        }

        let settings = self.inner.settings();
        self.inner.store.set_capacity(settings.max_storage_size);

        let result = match self.inner.store.usage() {
            Ok(usage) => {
                log::info!(
                    "Offline manager initialized: {} bytes queued ({:.1}% of quota)",
                    usage.used,
                    usage.percentage
                );
                self.inner.tasks().watcher = Some(spawn_network_watcher(&self.inner));
                self.inner.start_timers();
                true
            }
            Err(e) => {
                log::error!("Record store unavailable: {}", e);
                false
            }
        };

        *initialized = Some(result);
        result
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    /// Stops the network watcher and both timers; stored data is kept
    pub fn cleanup(&self) {
        self.inner.tasks().stop_all();
        *self
            .inner
            .initialized
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        log::info!("Offline manager stopped");
    }

    /// Durably queues a record and returns its id
    ///
    /// Storing never starts a sync; the record goes out on the next trigger.
    pub async fn store_data(
        &self,
        record_type: &str,
        payload: serde_json::Value,
        options: StoreOptions,
    ) -> SyncResult<String> {
        if record_type.trim().is_empty() {
            return Err(SyncError::InvalidInput(
                "record type must not be empty".to_string(),
            ));
        }

        let mut record = OfflineRecord::new(record_type, payload)
            .with_priority(options.priority)
            .with_dependencies(options.dependencies);
        if let Some(id) = options.id.filter(|id| !id.is_empty()) {
            record = record.with_id(id);
        }
        if record.dependencies.contains(&record.id) {
            return Err(SyncError::InvalidInput(format!(
                "record {} cannot depend on itself",
                record.id
            )));
        }

        let store = Arc::clone(&self.inner.store);
        let overwrite = options.overwrite;
        let id = tokio::task::spawn_blocking(move || store.put(record, overwrite)).await??;

        self.inner.events.emit(OfflineEvent::DataStored {
            id: id.clone(),
            record_type: record_type.to_string(),
        });
        Ok(id)
    }

    pub fn get_data(&self, id: &str) -> SyncResult<Option<OfflineRecord>> {
        Ok(self.inner.store.get(id)?)
    }

    pub fn get_data_by_type(&self, record_type: &str) -> SyncResult<Vec<OfflineRecord>> {
        Ok(self.inner.store.list_by_type(record_type)?)
    }

    pub fn get_unsynced_data(&self) -> SyncResult<Vec<OfflineRecord>> {
        Ok(self.inner.store.list_unsynced()?)
    }

    /// Marks a record synced without pushing it
    pub async fn mark_as_synced(&self, id: &str) -> SyncResult<bool> {
        let store = Arc::clone(&self.inner.store);
        let id = id.to_string();
        Ok(tokio::task::spawn_blocking(move || store.mark_synced(&id)).await??)
    }

    pub async fn remove_data(&self, id: &str) -> SyncResult<bool> {
        let store = Arc::clone(&self.inner.store);
        let owned = id.to_string();
        let removed = tokio::task::spawn_blocking(move || store.remove(&owned)).await??;

        if removed {
            self.inner
                .events
                .emit(OfflineEvent::DataRemoved { id: id.to_string() });
        }
        Ok(removed)
    }

    pub async fn clear_all_data(&self) -> SyncResult<()> {
        let store = Arc::clone(&self.inner.store);
        tokio::task::spawn_blocking(move || store.clear()).await??;

        self.inner.tracker.clear_errors();
        self.inner.events.emit(OfflineEvent::DataCleared);
        log::info!("Cleared all offline data");
        Ok(())
    }

    /// Applies a manual decision to a record held as conflicted
    pub async fn resolve_conflict(
        &self,
        id: &str,
        choice: ConflictChoice,
    ) -> SyncResult<OfflineRecord> {
        let store = Arc::clone(&self.inner.store);
        let owned = id.to_string();
        let (record, reason) = tokio::task::spawn_blocking(move || {
            let reason = store.get(&owned)?.and_then(|r| r.conflict);
            ConflictResolver::resolve(store.as_ref(), &owned, choice).map(|record| (record, reason))
        })
        .await??;

        if choice == ConflictChoice::AcceptServer {
            self.inner.events.emit(OfflineEvent::RecordConflictResolved {
                id: record.id.clone(),
                record_type: record.record_type.clone(),
                reason: reason.unwrap_or_default(),
            });
        }
        Ok(record)
    }

    /// Runs a pass now, including records that used up their retries
    ///
    /// Returns false without doing anything if offline or already syncing.
    pub async fn sync_data(&self) -> bool {
        match self.inner.sync(SyncTrigger::Manual).await {
            Ok(report) => report.is_some(),
            Err(e) => {
                log::error!("Sync failed: {}", e);
                false
            }
        }
    }

    /// Validates, persists and applies a settings change
    ///
    /// On any error the previous settings stay in effect.
    pub async fn configure(&self, patch: SettingsPatch) -> SyncResult<SyncSettings> {
        let current = self.inner.settings();
        let next = current.patched(&patch)?;
        if next == current {
            return Ok(next);
        }

        if self.inner.config.is_some() {
            let inner = Arc::clone(&self.inner);
            let to_save = next.clone();
            tokio::task::spawn_blocking(move || match &inner.config {
                Some(config) => config.save_settings(&to_save),
                None => Ok(()),
            })
            .await??;
        }

        self.inner.set_settings(next.clone());
        self.inner.store.set_capacity(next.max_storage_size);
        if self.is_initialized() && current.timers_differ(&next) {
            self.inner.start_timers();
        }

        log::info!("Sync settings updated");
        Ok(next)
    }

    pub fn get_config(&self) -> SyncSettings {
        self.inner.settings()
    }

    /// Registers `callback` for events of `kind`
    pub fn add_event_listener<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&OfflineEvent) + Send + Sync + 'static,
    {
        self.inner.events.add_listener(kind, callback)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.inner.events.remove_listener(id)
    }

    /// Receives every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<OfflineEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.inner.network.is_online()
    }

    pub fn get_sync_status(&self) -> SyncResult<SyncStatus> {
        let records = self.inner.store.list_all()?;
        Ok(self.inner.tracker.status(
            &records,
            self.inner.settings().max_retries,
            self.inner.network.is_online(),
            self.inner.orchestrator.is_syncing(),
        ))
    }

    pub fn get_storage_usage(&self) -> SyncResult<StorageUsage> {
        Ok(self.inner.store.usage()?)
    }

    /// Deletes synced records older than the retention period
    pub async fn prune_synced(&self) -> SyncResult<usize> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.prune_synced()).await?
    }
}
