use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::events::Collection;

use super::StoreError;

// ============================================================================
// Storage Backend Seam
// ============================================================================
//
// The single shared storage connection behind a narrow interface. The entity
// store issues document operations through it; the watchers consume its
// per-collection change feeds. Production uses ScyllaDB with CDC; tests use
// the in-memory backend. Only the facade opens or closes a backend.
//
// ============================================================================

/// Before/after image pair for one observed mutation.
///
/// `old` is absent on creation, `new` is absent on deletion. Classification
/// into a lifecycle transition uses presence only, never contents.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// A single malformed record in a change feed. Skipped and counted by the
/// watcher; never forwarded as a domain event and never fatal to the loop.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed change record in `{collection}`: {reason}")]
pub struct StreamFault {
    pub collection: Collection,
    pub reason: String,
}

pub type FeedItem = Result<ChangeRecord, StreamFault>;

/// One collection's mutation feed. The receiver ends when the underlying
/// feed closes — the watcher decides whether that is a failure or a shutdown.
pub type ChangeFeed = mpsc::UnboundedReceiver<FeedItem>;

/// Narrow storage interface shared by the entity store and the watchers.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Idempotently create whatever schema the given collections need.
    /// Concurrent calls must not create duplicates.
    async fn ensure_collections(&self, collections: &[Collection]) -> Result<(), StoreError>;

    /// Fetch one document by key. Absence is `Ok(None)`, never an error.
    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError>;

    /// Persist a new document under `id`.
    async fn insert(&self, collection: Collection, id: &str, doc: &Value) -> Result<(), StoreError>;

    /// Merge `partial` into the stored document. Returns `false` — and writes
    /// nothing — when no document exists under `id`.
    async fn merge(&self, collection: Collection, id: &str, partial: &Value)
        -> Result<bool, StoreError>;

    /// Remove the document under `id`. Returns whether one was removed.
    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError>;

    /// Open the mutation feed for one collection. Records arrive in the order
    /// the storage applied them.
    async fn changes(&self, collection: Collection) -> Result<ChangeFeed, StoreError>;

    /// Release the connection. Open feeds end without yielding an error.
    async fn close(&self);
}

/// Top-level merge of `partial` into `existing`. Fields present in the patch
/// replace fields in the base; everything else is kept.
pub(crate) fn merge_documents(existing: Value, partial: &Value) -> Value {
    match (existing, partial) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
            Value::Object(base)
        }
        // The store only persists objects; a non-object patch replaces.
        (_, other) => other.clone(),
    }
}
