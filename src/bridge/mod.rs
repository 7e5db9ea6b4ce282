use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::bus::{EventBus, SubscriptionId};
use crate::events::{Collection, EventKind};
use crate::health::{HealthBoard, SystemHealth};
use crate::metrics::Metrics;
use crate::models::{
    Device, Group, GroupUser, GroupUserVolume, GroupVolume, Producer, Router, Stage, User,
};
use crate::store::{EntityStore, StorageBackend, StoreError};
use crate::watch::{run_watcher, WatcherContext, WatcherFailure};

// ============================================================================
// Synchronization Facade
// ============================================================================
//
// Composes store, watchers, bus and catalog into a single lifecycle:
//
//   start() → ensure collections → attach one watcher per collection
//
// and exposes the combined surface: CRUD (generic and per entity kind),
// event subscription, the watcher failure channel, health, and shutdown.
//
// The facade owns the storage handle; nothing else opens or closes it.
//
// ============================================================================

/// Per-entity CRUD wrappers with the generic store contracts: create assigns
/// the key and returns the stored record, read is explicit about absence,
/// update/delete report whether a record was actually touched.
macro_rules! entity_crud {
    ($entity:ty, $collection:expr, $create:ident, $read:ident, $update:ident, $delete:ident) => {
        pub async fn $create(&self, record: $entity) -> Result<$entity, StoreError> {
            let stored = self.store.create($collection, serde_json::to_value(&record)?).await?;
            Ok(serde_json::from_value(stored)?)
        }

        pub async fn $read(&self, id: &str) -> Result<Option<$entity>, StoreError> {
            match self.store.read($collection, id).await? {
                Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
                None => Ok(None),
            }
        }

        pub async fn $update(&self, id: &str, partial: Value) -> Result<bool, StoreError> {
            self.store.update($collection, id, partial).await
        }

        pub async fn $delete(&self, id: &str) -> Result<bool, StoreError> {
            self.store.delete($collection, id).await
        }
    };
}

/// The realtime persistence-and-change-notification bridge.
pub struct SyncBridge<B: StorageBackend> {
    backend: Arc<B>,
    store: EntityStore<B>,
    bus: Arc<EventBus>,
    metrics: Arc<Metrics>,
    health: Arc<HealthBoard>,
    started: Mutex<bool>,
    shutting_down: Arc<AtomicBool>,
    failure_tx: mpsc::UnboundedSender<WatcherFailure>,
    failure_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<WatcherFailure>>>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: StorageBackend> SyncBridge<B> {
    /// Take ownership of an established storage handle. Watchers are not
    /// attached until [`start`](Self::start).
    pub fn new(backend: Arc<B>, metrics: Arc<Metrics>) -> Self {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        Self {
            store: EntityStore::new(backend.clone(), metrics.clone()),
            bus: Arc::new(EventBus::with_metrics(metrics.clone())),
            health: Arc::new(HealthBoard::new()),
            metrics,
            backend,
            started: Mutex::new(false),
            shutting_down: Arc::new(AtomicBool::new(false)),
            failure_tx,
            failure_rx: std::sync::Mutex::new(Some(failure_rx)),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Ensure the schema and attach one change feed watcher per collection.
    /// Completes once all watchers are attached — they themselves never
    /// finish while the bridge runs. Idempotent: a second call awaits the
    /// first and attaches nothing new, so no handler ever sees an event
    /// twice for a single mutation.
    pub async fn start(&self) -> Result<(), StoreError> {
        let mut started = self.started.lock().await;
        if *started {
            tracing::debug!("bridge already started, nothing to attach");
            return Ok(());
        }

        self.store.ensure_collections().await?;

        // Open every feed before spawning any watcher so a failure attaches
        // nothing at all.
        let feeds = futures_util::future::try_join_all(Collection::ALL.iter().map(
            |&collection| async move {
                let feed = self.backend.changes(collection).await?;
                Ok::<_, StoreError>((collection, feed))
            },
        ))
        .await?;

        let mut watchers = self.watchers.lock().await;
        for (collection, feed) in feeds {
            let ctx = WatcherContext {
                bus: self.bus.clone(),
                metrics: self.metrics.clone(),
                health: self.health.clone(),
                failure_tx: self.failure_tx.clone(),
                shutting_down: self.shutting_down.clone(),
            };
            watchers.push(tokio::spawn(run_watcher(collection, feed, ctx)));
        }

        *started = true;
        tracing::info!(
            watchers = Collection::ALL.len(),
            "🚀 Synchronization bridge started, all watchers attached"
        );
        Ok(())
    }

    /// Register a handler for one catalog event kind.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.bus.on(kind, handler)
    }

    /// Remove a previously registered handler.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.off(kind, id)
    }

    /// Take the watcher failure channel. Infrastructure failures are reported
    /// here, never on the domain event bus. Yields the receiver once; later
    /// calls return `None`.
    pub fn failures(&self) -> Option<mpsc::UnboundedReceiver<WatcherFailure>> {
        self.failure_rx.lock().ok().and_then(|mut rx| rx.take())
    }

    /// Aggregated health of the watcher fleet.
    pub fn system_health(&self) -> SystemHealth {
        self.health.system_health()
    }

    /// Shared health board, e.g. for the metrics server's /health endpoint.
    pub fn health_board(&self) -> Arc<HealthBoard> {
        self.health.clone()
    }

    /// Graceful shutdown: close the storage handle and wait for the watchers
    /// to wind down. Feeds ending this way are not reported as failures.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.backend.close().await;

        let mut watchers = self.watchers.lock().await;
        for handle in watchers.drain(..) {
            let _ = handle.await;
        }

        tracing::info!("🛑 Synchronization bridge shut down");
    }

    // ------------------------------------------------------------------
    // Generic CRUD surface
    // ------------------------------------------------------------------

    pub async fn create(&self, collection: Collection, record: Value) -> Result<Value, StoreError> {
        self.store.create(collection, record).await
    }

    pub async fn read(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.store.read(collection, id).await
    }

    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Value,
    ) -> Result<bool, StoreError> {
        self.store.update(collection, id, partial).await
    }

    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.store.delete(collection, id).await
    }

    // ------------------------------------------------------------------
    // Per-entity wrappers
    // ------------------------------------------------------------------

    entity_crud!(Router, Collection::Routers, create_router, read_router, update_router, delete_router);
    entity_crud!(User, Collection::Users, create_user, read_user, update_user, delete_user);
    entity_crud!(Device, Collection::Devices, create_device, read_device, update_device, delete_device);
    entity_crud!(Producer, Collection::Producers, create_producer, read_producer, update_producer, delete_producer);
    entity_crud!(Stage, Collection::Stages, create_stage, read_stage, update_stage, delete_stage);
    entity_crud!(Group, Collection::Groups, create_group, read_group, update_group, delete_group);
    entity_crud!(GroupVolume, Collection::GroupVolumes, create_group_volume, read_group_volume, update_group_volume, delete_group_volume);
    entity_crud!(GroupUser, Collection::GroupUsers, create_group_user, read_group_user, update_group_user, delete_group_user);
    entity_crud!(GroupUserVolume, Collection::GroupUserVolumes, create_group_user_volume, read_group_user_volume, update_group_user_volume, delete_group_user_volume);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn bridge_over_memory() -> (Arc<SyncBridge<MemoryBackend>>, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let bridge = Arc::new(SyncBridge::new(
            backend.clone(),
            Arc::new(Metrics::new().unwrap()),
        ));
        (bridge, backend)
    }

    async fn started_bridge() -> (Arc<SyncBridge<MemoryBackend>>, Arc<MemoryBackend>) {
        let (bridge, backend) = bridge_over_memory();
        bridge.start().await.unwrap();
        (bridge, backend)
    }

    fn record_events(
        bridge: &SyncBridge<MemoryBackend>,
        kind: EventKind,
    ) -> Arc<StdMutex<Vec<Value>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        bridge.on(kind, move |payload| {
            sink.lock().unwrap().push(payload.clone());
            Ok(())
        });
        seen
    }

    async fn wait_until(description: &str, mut condition: impl FnMut() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for: {}", description);
    }

    #[tokio::test]
    async fn creating_a_stage_publishes_added_with_a_fresh_key() {
        let (bridge, _backend) = started_bridge().await;
        let seen = record_events(&bridge, EventKind::StageAdded);

        let stage = bridge
            .create_stage(Stage {
                name: "Rehearsal Room".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(!stage.id.is_empty());

        wait_until("stage added event", || !seen.lock().unwrap().is_empty()).await;

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        let published: Stage = serde_json::from_value(events[0].clone()).unwrap();
        assert_eq!(published.name, "Rehearsal Room");
        assert_eq!(published.id, stage.id);
    }

    #[tokio::test]
    async fn create_then_delete_yields_added_then_removed() {
        let (bridge, _backend) = started_bridge().await;
        let added = record_events(&bridge, EventKind::UserAdded);
        let removed = record_events(&bridge, EventKind::UserRemoved);

        let user = bridge
            .create_user(User {
                name: "Ada".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(bridge.delete_user(&user.id).await.unwrap());

        wait_until("user added then removed", || {
            !added.lock().unwrap().is_empty() && !removed.lock().unwrap().is_empty()
        })
        .await;

        assert_eq!(added.lock().unwrap().len(), 1);
        let gone: User = serde_json::from_value(removed.lock().unwrap()[0].clone()).unwrap();
        assert_eq!(gone.id, user.id);

        assert!(bridge.read_user(&user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn updating_an_absent_device_emits_nothing() {
        let (bridge, _backend) = started_bridge().await;
        let changed = record_events(&bridge, EventKind::DeviceChanged);

        let modified = bridge
            .update_device("missing", json!({"online": true}))
            .await
            .unwrap();
        assert!(!modified);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(changed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_each_publish_one_added_with_distinct_keys() {
        let (bridge, _backend) = started_bridge().await;
        let seen = record_events(&bridge, EventKind::GroupAdded);

        let (first, second) = tokio::join!(
            bridge.create_group(Group {
                stage_id: "s1".into(),
                name: "Strings".into(),
                ..Default::default()
            }),
            bridge.create_group(Group {
                stage_id: "s1".into(),
                name: "Brass".into(),
                ..Default::default()
            }),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first.id, second.id);

        wait_until("both group added events", || seen.lock().unwrap().len() == 2).await;

        let ids: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect();
        assert!(ids.contains(&first.id));
        assert!(ids.contains(&second.id));
    }

    #[tokio::test]
    async fn changed_events_preserve_update_order() {
        let (bridge, _backend) = started_bridge().await;
        let changed = record_events(&bridge, EventKind::RouterChanged);

        let router = bridge
            .create_router(Router {
                url: "turn.example".into(),
                port: 3478,
                ..Default::default()
            })
            .await
            .unwrap();

        for port in 1..=5u16 {
            assert!(bridge
                .update_router(&router.id, json!({"port": 4000 + port}))
                .await
                .unwrap());
        }

        wait_until("five changed events", || changed.lock().unwrap().len() == 5).await;

        let ports: Vec<u64> = changed
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["port"].as_u64().unwrap())
            .collect();
        assert_eq!(ports, vec![4001, 4002, 4003, 4004, 4005]);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_never_duplicates_events() {
        let (bridge, _backend) = started_bridge().await;
        bridge.start().await.unwrap();

        let seen = record_events(&bridge, EventKind::StageAdded);
        bridge
            .create_stage(Stage {
                name: "Main Hall".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        wait_until("stage added event", || !seen.lock().unwrap().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watcher_failures_surface_on_the_failure_channel() {
        let (bridge, backend) = started_bridge().await;
        let mut failures = bridge.failures().unwrap();

        // Connection lost out from under the bridge: every feed ends while
        // the bridge is still live.
        backend.close().await;

        let mut reported = Vec::new();
        for _ in 0..Collection::ALL.len() {
            let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
                .await
                .unwrap()
                .unwrap();
            reported.push(failure.collection);
        }

        for collection in Collection::ALL {
            assert!(reported.contains(&collection));
        }
        assert!(bridge.system_health().overall_status.is_unhealthy());
    }

    #[tokio::test]
    async fn graceful_shutdown_reports_no_failures() {
        let (bridge, _backend) = started_bridge().await;
        let mut failures = bridge.failures().unwrap();

        bridge.shutdown().await;

        // The failure sender side stays open on the bridge; nothing may have
        // been delivered during shutdown.
        let outcome = tokio::time::timeout(Duration::from_millis(200), failures.recv()).await;
        assert!(outcome.is_err(), "graceful shutdown must not report failures");
    }

    #[tokio::test]
    async fn all_watchers_report_healthy_after_start() {
        let (bridge, _backend) = started_bridge().await;

        wait_until("all watchers healthy", || {
            let snapshot = bridge.system_health();
            snapshot.components.len() == Collection::ALL.len()
                && snapshot.overall_status.is_healthy()
        })
        .await;
    }

    #[tokio::test]
    async fn generic_and_typed_surfaces_share_contracts() {
        let (bridge, _backend) = started_bridge().await;

        let created = bridge
            .create(Collection::GroupVolumes, json!({"group_id": "g1", "volume": 0.5}))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap();

        let typed = bridge.read_group_volume(id).await.unwrap().unwrap();
        assert_eq!(typed.group_id, "g1");
        assert!((typed.volume - 0.5).abs() < f64::EPSILON);

        assert!(bridge.delete(Collection::GroupVolumes, id).await.unwrap());
        assert!(bridge.read_group_volume(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handlers_may_issue_crud_calls_reentrantly() {
        let (bridge, _backend) = started_bridge().await;
        let group_added = record_events(&bridge, EventKind::GroupAdded);

        // Joining a stage automatically creates a default group for it.
        let reentrant = bridge.clone();
        bridge.on(EventKind::StageAdded, move |payload| {
            let stage_id = payload["id"].as_str().unwrap_or_default().to_string();
            let bridge = reentrant.clone();
            tokio::spawn(async move {
                let _ = bridge
                    .create_group(Group {
                        stage_id,
                        name: "default".into(),
                        ..Default::default()
                    })
                    .await;
            });
            Ok(())
        });

        bridge
            .create_stage(Stage {
                name: "Jam Space".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        wait_until("group created from handler", || {
            !group_added.lock().unwrap().is_empty()
        })
        .await;
    }
}
