use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::bus::EventBus;
use crate::events::{Collection, EventKind, Transition};
use crate::health::{HealthBoard, HealthStatus};
use crate::metrics::Metrics;
use crate::store::{ChangeFeed, ChangeRecord};

// ============================================================================
// Change Feed Watcher
// ============================================================================
//
// One long-lived task per collection: consume the ordered mutation feed,
// classify each record into its lifecycle transition, and publish the catalog
// event kind on the bus. All nine watchers share this single task body,
// parameterized by collection — there are no per-collection copies to drift
// apart.
//
// A malformed record is logged, counted and skipped; it never stops the loop
// and is never forwarded as a domain event. When the feed ends the watcher
// reports a `WatcherFailure` on the facade's failure channel — unless the
// bridge is shutting down, in which case ending the feed is the expected way
// for the loop to wind down.
//
// ============================================================================

/// Terminal failure of one collection watcher: the underlying feed closed or
/// errored unrecoverably. Delivered on the facade's failure channel, never on
/// the domain event bus, so event consumers are not forced to handle
/// infrastructure failures.
#[derive(Debug, Clone)]
pub struct WatcherFailure {
    pub collection: Collection,
    pub reason: String,
}

/// Classify one mutation record by the presence of its before/after images —
/// never by their contents — and hand back the event payload:
///
/// | old     | new     | result                        |
/// |---------|---------|-------------------------------|
/// | absent  | present | Added, carrying the new value |
/// | present | present | Changed, carrying the new value |
/// | present | absent  | Removed, carrying the old value |
/// | absent  | absent  | invalid, not forwarded        |
pub fn classify(record: ChangeRecord) -> Option<(Transition, Value)> {
    match (record.old, record.new) {
        (None, Some(new)) => Some((Transition::Added, new)),
        (Some(_), Some(new)) => Some((Transition::Changed, new)),
        (Some(old), None) => Some((Transition::Removed, old)),
        (None, None) => None,
    }
}

/// Everything a watcher task shares with its owner.
pub(crate) struct WatcherContext {
    pub bus: Arc<EventBus>,
    pub metrics: Arc<Metrics>,
    pub health: Arc<HealthBoard>,
    pub failure_tx: mpsc::UnboundedSender<WatcherFailure>,
    pub shutting_down: Arc<AtomicBool>,
}

/// Consume one collection's feed until it ends. Never returns while the feed
/// is live.
pub(crate) async fn run_watcher(collection: Collection, mut feed: ChangeFeed, ctx: WatcherContext) {
    let component = format!("watcher:{}", collection);
    ctx.health
        .update(&component, HealthStatus::Healthy, Some("watching".into()));
    tracing::info!(collection = %collection, "🔄 Change feed watcher attached");

    while let Some(item) = feed.recv().await {
        match item {
            Ok(record) => match classify(record) {
                Some((transition, payload)) => {
                    let kind = EventKind::for_transition(collection, transition);
                    tracing::debug!(
                        collection = %collection,
                        event = %kind,
                        "📤 Publishing transition"
                    );
                    ctx.metrics.record_event_published(collection, transition);
                    ctx.bus.emit(kind, &payload);
                }
                None => {
                    // Neither image present: invalid, must not be forwarded.
                    ctx.metrics.record_stream_fault(collection);
                    tracing::warn!(
                        collection = %collection,
                        "change record with neither old nor new value, skipping"
                    );
                }
            },
            Err(fault) => {
                ctx.metrics.record_stream_fault(collection);
                ctx.health.update(
                    &component,
                    HealthStatus::Degraded(fault.reason.clone()),
                    None,
                );
                tracing::warn!(
                    collection = %collection,
                    reason = %fault.reason,
                    "skipping malformed change record"
                );
            }
        }
    }

    if ctx.shutting_down.load(Ordering::SeqCst) {
        tracing::info!(collection = %collection, "change feed closed during shutdown");
        return;
    }

    // The feed ended while the bridge was live: report so a supervising
    // collaborator can restart the watcher or the connection.
    ctx.metrics.record_watcher_termination(collection);
    ctx.health.update(
        &component,
        HealthStatus::Unhealthy("change feed terminated".into()),
        None,
    );
    tracing::error!(collection = %collection, "❌ Change feed terminated unexpectedly");

    let _ = ctx.failure_tx.send(WatcherFailure {
        collection,
        reason: "change feed terminated".to_string(),
    });
}
