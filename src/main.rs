use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stage_sync::models::{Group, GroupUser, GroupVolume, Stage, User};
use stage_sync::utils::{retry_with_backoff, RetryConfig};
use stage_sync::{Config, EventKind, Metrics, ScyllaBackend, SyncBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stage_sync=debug")),
        )
        .init();

    tracing::info!("🚀 Starting stage synchronization bridge");

    let config = Config::from_env();

    // === 1. Establish the storage connection (with startup retry) ===
    let backend = retry_with_backoff(RetryConfig::startup(), |attempt| {
        let config = config.clone();
        async move {
            tracing::debug!(attempt = attempt, "connecting to storage");
            ScyllaBackend::connect(&config.storage_host, config.storage_port, &config.keyspace)
                .await
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("storage connection failed: {}", e))?;
    let backend = Arc::new(backend);

    // === 2. Initialize metrics and the bridge ===
    let metrics = Arc::new(Metrics::new()?);
    let bridge = Arc::new(SyncBridge::new(backend, metrics.clone()));

    // Start metrics HTTP server in background thread
    let registry = Arc::new(metrics.registry().clone());
    let health = bridge.health_board();
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("metrics runtime");
        rt.block_on(async {
            if let Err(e) = stage_sync::metrics::start_metrics_server(registry, health, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 3. Attach all watchers ===
    bridge.start().await?;

    // Surface watcher failures to the supervising layer
    if let Some(mut failures) = bridge.failures() {
        tokio::spawn(async move {
            while let Some(failure) = failures.recv().await {
                tracing::error!(
                    collection = %failure.collection,
                    reason = %failure.reason,
                    "watcher terminated, supervisor should restart it or the connection"
                );
            }
        });
    }

    // === 4. Subscribe like a transport layer would ===
    bridge.on(EventKind::StageAdded, |payload| {
        tracing::info!(stage = %payload, "📣 stage added");
        Ok(())
    });
    bridge.on(EventKind::GroupUserAdded, |payload| {
        tracing::info!(membership = %payload, "📣 user joined group");
        Ok(())
    });
    bridge.on(EventKind::GroupVolumeChanged, |payload| {
        tracing::info!(volume = %payload, "📣 group volume changed");
        Ok(())
    });

    // === 5. Demonstrate a full stage lifecycle ===
    tracing::info!("📝 Demonstrating stage lifecycle");

    let stage = bridge
        .create_stage(Stage {
            name: "Rehearsal Room".into(),
            ..Default::default()
        })
        .await?;
    tracing::info!("✅ Stage created: {}", stage.id);

    let group = bridge
        .create_group(Group {
            stage_id: stage.id.clone(),
            name: "Strings".into(),
            ..Default::default()
        })
        .await?;

    let user = bridge
        .create_user(User {
            name: "Ada".into(),
            ..Default::default()
        })
        .await?;
    bridge
        .update_user(&user.id, serde_json::json!({ "stage_id": stage.id }))
        .await?;

    let membership = bridge
        .create_group_user(GroupUser {
            group_id: group.id.clone(),
            user_id: user.id.clone(),
            ..Default::default()
        })
        .await?;

    let volume = bridge
        .create_group_volume(GroupVolume {
            group_id: group.id.clone(),
            volume: 0.8,
            ..Default::default()
        })
        .await?;

    // Wait a bit for the change feeds to deliver
    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

    bridge
        .update_group_volume(&volume.id, serde_json::json!({ "volume": 0.5 }))
        .await?;
    tracing::info!("✅ Group volume adjusted");

    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

    bridge.delete_group_user(&membership.id).await?;
    tracing::info!("✅ Membership removed");

    // Let the watchers publish the remaining events
    tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;

    tracing::info!(health = ?bridge.system_health().overall_status, "Bridge health");

    bridge.shutdown().await;
    tracing::info!("🎉 Demo complete!");

    Ok(())
}
