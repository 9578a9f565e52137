// crates/network/src/signal.rs
//! Online/offline signal consumed by the sync engine

use tokio::sync::watch;

/// Source of the current connectivity state and its changes
///
/// Implementations publish every change on a `watch` channel; subscribers
/// see only the latest value, which is all a reconnect trigger needs.
pub trait NetworkSignal: Send + Sync {
    /// Returns true if the device currently believes it is online
    fn is_online(&self) -> bool;

    /// Returns a receiver that is notified on every online/offline change
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A signal driven by hand
///
/// Used by platform glue that already receives OS reachability callbacks,
/// and by tests.
#[derive(Debug)]
pub struct ManualNetworkSignal {
    state: watch::Sender<bool>,
}

impl ManualNetworkSignal {
    /// Creates a signal with the given initial state
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    /// Sets the state, returning true if it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            log::debug!("Network signal changed: online={}", online);
        }
        changed
    }
}

impl Default for ManualNetworkSignal {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkSignal for ManualNetworkSignal {
    fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}
