// crates/sync-engine/examples/offline_demo.rs
//! Demonstration of the offline queue and its sync passes

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use votesync_network::{ManualNetworkSignal, PushOutcome, PushRequest, Rejection, RemoteEndpoint};
use votesync_sync_engine::{
    ConflictChoice, EventKind, OfflineEvent, OfflineManager, Priority, StoreOptions,
};

/// Stand-in backend that refuses ballots for closed elections
struct DemoBackend {
    received: AtomicUsize,
}

#[async_trait]
impl RemoteEndpoint for DemoBackend {
    async fn push(&self, request: &PushRequest) -> PushOutcome {
        self.received.fetch_add(1, Ordering::SeqCst);
        if request.payload["electionId"] == "closed" {
            return PushOutcome::Rejected(Rejection::permanent("HTTP 409: election closed"));
        }
        PushOutcome::Accepted
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("VoteSync Offline Demo");
    println!("=====================\n");

    let backend = Arc::new(DemoBackend {
        received: AtomicUsize::new(0),
    });
    let network = Arc::new(ManualNetworkSignal::new(false));
    let manager = OfflineManager::builder()
        .remote(backend.clone())
        .network(network.clone())
        .build()?;

    manager.add_event_listener(EventKind::RecordSynced, |event| {
        if let OfflineEvent::RecordSynced { id, record_type } = event {
            println!("  ✓ Synced {} {}", record_type, id);
        }
    });
    manager.add_event_listener(EventKind::RecordConflicted, |event| {
        if let OfflineEvent::RecordConflicted { id, reason, .. } = event {
            println!("  ! Conflict on {}: {}", id, reason);
        }
    });

    demo_offline_queue(&manager).await?;
    println!();
    demo_reconnect(&manager, &network).await?;
    println!();
    demo_conflicts(&manager).await?;

    println!(
        "\nBackend received {} pushes",
        backend.received.load(Ordering::SeqCst)
    );
    Ok(())
}

async fn demo_offline_queue(manager: &OfflineManager) -> Result<(), Box<dyn std::error::Error>> {
    println!("1. Queueing While Offline");
    println!("-------------------------");

    let profile = manager
        .store_data(
            "profile",
            serde_json::json!({"displayName": "Ada"}),
            StoreOptions::default().with_id("profile-ada"),
        )
        .await?;
    println!("  ✓ Stored profile {}", profile);

    manager
        .store_data(
            "vote",
            serde_json::json!({"electionId": "city-2026", "candidateId": "c-7"}),
            StoreOptions::default()
                .with_priority(Priority::High)
                .with_dependencies([profile.as_str()]),
        )
        .await?;
    println!("  ✓ Stored vote (depends on the profile)");

    let status = manager.get_sync_status()?;
    let usage = manager.get_storage_usage()?;
    println!("\nOnline: {}", status.is_online);
    println!("Pending items: {}", status.pending_items);
    println!("Storage used: {} bytes ({:.3}%)", usage.used, usage.percentage);
    Ok(())
}

async fn demo_reconnect(
    manager: &OfflineManager,
    network: &ManualNetworkSignal,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("2. Reconnecting");
    println!("---------------");

    println!("Sync while offline started: {}", manager.sync_data().await);

    network.set_online(true);
    println!("Network is back\n");

    let started = manager.sync_data().await;
    let status = manager.get_sync_status()?;
    println!("\nSync started: {}", started);
    println!(
        "Progress: {:.0}% ({} pending)",
        status.sync_progress, status.pending_items
    );
    Ok(())
}

async fn demo_conflicts(manager: &OfflineManager) -> Result<(), Box<dyn std::error::Error>> {
    println!("3. Conflict Handling");
    println!("--------------------");

    manager
        .configure(votesync_config::SettingsPatch {
            enable_conflict_resolution: Some(false),
            ..Default::default()
        })
        .await?;
    println!("Automatic conflict resolution disabled\n");

    let late = manager
        .store_data(
            "vote",
            serde_json::json!({"electionId": "closed", "candidateId": "c-2"}),
            StoreOptions::default(),
        )
        .await?;
    manager.sync_data().await;

    let status = manager.get_sync_status()?;
    println!("\nConflicted items: {}", status.conflicted_items);

    let record = manager
        .resolve_conflict(&late, ConflictChoice::AcceptServer)
        .await?;
    println!("✓ Kept the server's state, record synced: {}", record.synced);
    Ok(())
}
