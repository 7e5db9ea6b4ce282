use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::events::EventKind;
use crate::metrics::Metrics;

// ============================================================================
// Event Bus - In-process publish/subscribe
// ============================================================================
//
// Decouples the change feed watchers from consumers. Handlers for one event
// kind run synchronously relative to `emit`, in registration order; a handler
// returning an error never prevents the remaining handlers from running.
//
// Handlers must tolerate re-entrancy: the registry lock is released before
// invocation, so a handler may subscribe, unsubscribe or trigger CRUD calls
// that cause further emissions before it returns.
//
// ============================================================================

/// Event handler. Receives the post-mutation record (Added/Changed) or the
/// pre-deletion record (Removed).
pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Token returned by [`EventBus::on`], consumed by [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

/// In-process publish/subscribe keyed by event kind.
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<Subscription>>>,
    metrics: Option<Arc<Metrics>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Bus that counts handler failures on the given registry.
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
            metrics: Some(metrics),
        }
    }

    /// Register a handler for one event kind. Handlers run in registration
    /// order on every emission of that kind.
    pub fn on(
        &self,
        kind: EventKind,
        handler: impl Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            handler: Arc::new(handler),
        };

        if let Ok(mut handlers) = self.handlers.write() {
            handlers.entry(kind).or_default().push(subscription);
        }

        tracing::debug!(event = %kind, subscription = id.0, "handler registered");
        id
    }

    /// Remove a previously registered handler. Returns whether anything was
    /// removed.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let Ok(mut handlers) = self.handlers.write() else {
            return false;
        };

        let Some(subscriptions) = handlers.get_mut(&kind) else {
            return false;
        };

        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        before != subscriptions.len()
    }

    /// Invoke every handler registered for `kind`, in registration order.
    /// Handler errors are logged and counted; later handlers still run.
    pub fn emit(&self, kind: EventKind, payload: &Value) {
        // Snapshot under the lock, invoke outside it: handlers may re-enter.
        let snapshot: Vec<Subscription> = match self.handlers.read() {
            Ok(handlers) => handlers.get(&kind).cloned().unwrap_or_default(),
            Err(_) => return,
        };

        for subscription in snapshot {
            if let Err(error) = (subscription.handler)(payload) {
                if let Some(metrics) = &self.metrics {
                    metrics.record_handler_error(kind);
                }
                tracing::warn!(
                    event = %kind,
                    subscription = subscription.id.0,
                    error = %error,
                    "event handler failed, continuing with remaining handlers"
                );
            }
        }
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .map(|handlers| handlers.get(&kind).map_or(0, |s| s.len()))
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
