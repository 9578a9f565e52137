// crates/network/src/lib.rs
//! Network plumbing for the sync engine: HTTP client, connectivity signal
//! and the remote upsert endpoint

mod client;
mod connectivity;
mod error;
mod remote;
mod signal;

pub use client::{Client, ClientConfig, IDEMPOTENCY_HEADER};
pub use connectivity::ConnectivityMonitor;
pub use error::{is_retryable_status, NetworkError, NetworkResult};
pub use remote::{HttpRemoteEndpoint, PushOutcome, PushRequest, Rejection, RemoteEndpoint};
pub use signal::{ManualNetworkSignal, NetworkSignal};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_exports_accessible() {
        let client = Client::new().expect("Failed to create client");
        let _: ConnectivityMonitor = ConnectivityMonitor::new(client.clone());
        let _: HttpRemoteEndpoint =
            HttpRemoteEndpoint::new(client, "http://localhost/sync").expect("endpoint");
        let signal: Box<dyn NetworkSignal> = Box::new(ManualNetworkSignal::default());
        assert!(signal.is_online());
    }
}
