pub mod backend;
pub mod memory;
pub mod scylla;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use crate::events::Collection;
use crate::metrics::Metrics;

pub use backend::{ChangeFeed, ChangeRecord, FeedItem, StorageBackend, StreamFault};
pub use memory::MemoryBackend;
pub use scylla::ScyllaBackend;

// ============================================================================
// Entity Store - keyed CRUD over the nine collections
// ============================================================================
//
// Generic over the storage backend. Assigns identifiers on create and gates
// every operation on startup having completed (connection established,
// collections ensured). The store emits no events itself — mutation
// visibility flows through the backend's change feed to the watchers.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No connection is established, or the connection has been lost.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The storage request itself failed.
    #[error("storage request failed: {0}")]
    Backend(String),

    /// A record could not be (de)serialized.
    #[error("record serialization failed: {0}")]
    Codec(#[from] serde_json::Error),

    /// Records and update patches must be JSON objects.
    #[error("record must be a JSON object")]
    InvalidRecord,
}

/// Keyed document storage for the entity collections.
pub struct EntityStore<B: StorageBackend> {
    backend: Arc<B>,
    metrics: Arc<Metrics>,
    ready: AtomicBool,
}

impl<B: StorageBackend> EntityStore<B> {
    pub fn new(backend: Arc<B>, metrics: Arc<Metrics>) -> Self {
        Self {
            backend,
            metrics,
            ready: AtomicBool::new(false),
        }
    }

    /// Ensure every collection exists. Must complete before any CRUD call
    /// succeeds; safe to call repeatedly (the backend ensure is idempotent).
    pub async fn ensure_collections(&self) -> Result<(), StoreError> {
        self.backend.ensure_collections(&Collection::ALL).await?;
        self.ready.store(true, Ordering::SeqCst);
        tracing::info!(collections = Collection::ALL.len(), "✅ Collections ensured");
        Ok(())
    }

    fn guard_ready(&self) -> Result<(), StoreError> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "store has not been started".to_string(),
            ))
        }
    }

    /// Construct an identifier, merge it into the record, persist, and return
    /// the stored record.
    pub async fn create(&self, collection: Collection, record: Value) -> Result<Value, StoreError> {
        self.guard_ready()?;

        let Value::Object(mut doc) = record else {
            return Err(StoreError::InvalidRecord);
        };

        let id = Uuid::new_v4().to_string();
        doc.insert("id".to_string(), Value::String(id.clone()));
        let stored = Value::Object(doc);

        let started = Instant::now();
        self.backend.insert(collection, &id, &stored).await?;
        self.metrics
            .record_store_operation(collection, "create", started.elapsed().as_secs_f64());

        tracing::debug!(collection = %collection, id = %id, "record created");
        Ok(stored)
    }

    /// Fetch one record. Absence is `Ok(None)` — never a placeholder.
    pub async fn read(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.guard_ready()?;

        let started = Instant::now();
        let record = self.backend.fetch(collection, id).await?;
        self.metrics
            .record_store_operation(collection, "read", started.elapsed().as_secs_f64());

        Ok(record)
    }

    /// Merge `partial` into the record under `id`. Returns whether a record
    /// was actually modified; never creates one as a side effect.
    pub async fn update(
        &self,
        collection: Collection,
        id: &str,
        partial: Value,
    ) -> Result<bool, StoreError> {
        self.guard_ready()?;

        if !partial.is_object() {
            return Err(StoreError::InvalidRecord);
        }

        let started = Instant::now();
        let modified = self.backend.merge(collection, id, &partial).await?;
        self.metrics
            .record_store_operation(collection, "update", started.elapsed().as_secs_f64());

        if modified {
            tracing::debug!(collection = %collection, id = %id, "record updated");
        } else {
            self.metrics.record_store_miss(collection, "update");
            tracing::debug!(collection = %collection, id = %id, "update addressed absent key");
        }
        Ok(modified)
    }

    /// Remove the record under `id`. Returns whether one was removed.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.guard_ready()?;

        let started = Instant::now();
        let removed = self.backend.remove(collection, id).await?;
        self.metrics
            .record_store_operation(collection, "delete", started.elapsed().as_secs_f64());

        if removed {
            tracing::debug!(collection = %collection, id = %id, "record deleted");
        } else {
            self.metrics.record_store_miss(collection, "delete");
        }
        Ok(removed)
    }
}
