// crates/network/examples/push_probe.rs
//! Probes connectivity and pushes one record to a sync endpoint
//!
//! Usage: cargo run --example push_probe -- https://api.example.com/sync

use std::sync::Arc;
use std::time::Duration;
use votesync_network::{
    Client, ConnectivityMonitor, HttpRemoteEndpoint, NetworkSignal, PushOutcome, PushRequest,
    RemoteEndpoint,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080/api/sync".to_string());

    let client = Client::new()?;
    let monitor = Arc::new(
        ConnectivityMonitor::with_urls(client.clone(), vec![base_url.clone()])
            .with_interval(Duration::from_secs(5)),
    );

    monitor.start();
    println!("Probing {} ...", base_url);
    let online = monitor.probe().await;
    println!("Online: {}", online);
    if !online {
        println!("Endpoint not reachable, nothing pushed");
        return Ok(());
    }

    let endpoint = HttpRemoteEndpoint::new(client, &base_url)?;
    let request = PushRequest {
        record_type: "vote".to_string(),
        id: probe_id(),
        payload: serde_json::json!({"candidateId": "c-7", "electionId": "demo"}),
    };

    println!("PUT {}", endpoint.record_url(&request.record_type, &request.id)?);
    match endpoint.push(&request).await {
        PushOutcome::Accepted => println!("✓ Accepted"),
        PushOutcome::Rejected(rejection) => println!(
            "✗ Rejected ({}): {}",
            if rejection.retryable { "retryable" } else { "permanent" },
            rejection.reason
        ),
    }

    monitor.stop();
    println!("Signal reports online: {}", monitor.is_online());
    Ok(())
}

fn probe_id() -> String {
    format!(
        "probe-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default()
    )
}
