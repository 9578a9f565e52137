// crates/network/src/connectivity.rs
//! Network connectivity monitoring

use crate::client::Client;
use crate::signal::NetworkSignal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Polls a set of probe URLs and publishes the online state
///
/// The device is considered online as soon as any probe answers.
pub struct ConnectivityMonitor {
    client: Client,
    probe_urls: Vec<String>,
    interval: Duration,
    state: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with default probe URLs, initially offline
    pub fn new(client: Client) -> Self {
        Self::with_urls(
            client,
            vec![
                "https://www.google.com".to_string(),
                "https://www.cloudflare.com".to_string(),
            ],
        )
    }

    /// Creates a monitor with custom probe URLs
    pub fn with_urls(client: Client, urls: Vec<String>) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            client,
            probe_urls: urls,
            interval: Duration::from_secs(15),
            state,
            task: Mutex::new(None),
        }
    }

    /// Sets the polling interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one probe round and publishes the result
    pub async fn probe(&self) -> bool {
        let mut online = false;
        for url in &self.probe_urls {
            if self.client.is_accessible(url).await {
                online = true;
                break;
            }
        }

        let changed = self.state.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            log::info!("Connectivity changed: online={}", online);
        }

        online
    }

    /// Starts background polling; a second call is a no-op
    pub fn start(self: &Arc<Self>) {
        let Ok(mut task) = self.task.lock() else {
            log::error!("Connectivity monitor lock poisoned, not starting");
            return;
        };
        if task.is_some() {
            return;
        }

        let monitor = Arc::downgrade(self);
        let interval = self.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.probe().await;
            }
        }));
    }

    /// Stops background polling
    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl NetworkSignal for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
