use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::events::Collection;

use super::backend::{merge_documents, ChangeFeed, ChangeRecord, FeedItem, StorageBackend};
use super::StoreError;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Backend over plain hash maps with hand-fed change feeds. Carries the full
// `StorageBackend` contract — including per-collection mutation ordering and
// feed closure on `close()` — so the bridge can be exercised end to end
// without a storage node. Used by the test suite.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    tables: HashMap<Collection, HashMap<String, Value>>,
    feeds: HashMap<Collection, Vec<mpsc::UnboundedSender<FeedItem>>>,
    closed: bool,
}

impl Inner {
    /// Publish one mutation to every open feed of the collection, pruning
    /// feeds whose receiver is gone.
    fn publish(&mut self, collection: Collection, record: ChangeRecord) {
        if let Some(senders) = self.feeds.get_mut(&collection) {
            senders.retain(|sender| sender.send(Ok(record.clone())).is_ok());
        }
    }
}

/// In-memory implementation of [`StorageBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard_open(inner: &Inner) -> Result<(), StoreError> {
        if inner.closed {
            Err(StoreError::Unavailable("backend closed".into()))
        } else {
            Ok(())
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("state lock poisoned".into()))
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn ensure_collections(&self, collections: &[Collection]) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        Self::guard_open(&inner)?;

        for &collection in collections {
            inner.tables.entry(collection).or_default();
        }
        Ok(())
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("state lock poisoned".into()))?;
        Self::guard_open(&inner)?;

        Ok(inner
            .tables
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn insert(&self, collection: Collection, id: &str, doc: &Value) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        Self::guard_open(&inner)?;

        let old = inner
            .tables
            .entry(collection)
            .or_default()
            .insert(id.to_string(), doc.clone());

        inner.publish(
            collection,
            ChangeRecord {
                old,
                new: Some(doc.clone()),
            },
        );
        Ok(())
    }

    async fn merge(
        &self,
        collection: Collection,
        id: &str,
        partial: &Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        Self::guard_open(&inner)?;

        let table = inner.tables.entry(collection).or_default();
        let Some(existing) = table.get(id).cloned() else {
            return Ok(false);
        };

        let merged = merge_documents(existing.clone(), partial);
        table.insert(id.to_string(), merged.clone());

        inner.publish(
            collection,
            ChangeRecord {
                old: Some(existing),
                new: Some(merged),
            },
        );
        Ok(true)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.write()?;
        Self::guard_open(&inner)?;

        let Some(old) = inner.tables.entry(collection).or_default().remove(id) else {
            return Ok(false);
        };

        inner.publish(
            collection,
            ChangeRecord {
                old: Some(old),
                new: None,
            },
        );
        Ok(true)
    }

    async fn changes(&self, collection: Collection) -> Result<ChangeFeed, StoreError> {
        let mut inner = self.write()?;
        Self::guard_open(&inner)?;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.feeds.entry(collection).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.closed = true;
            // Dropping the senders ends every open feed.
            inner.feeds.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn feed_carries_before_and_after_images_in_order() {
        let backend = MemoryBackend::new();
        backend
            .ensure_collections(&[Collection::Users])
            .await
            .unwrap();
        let mut feed = backend.changes(Collection::Users).await.unwrap();

        let doc = json!({"id": "u1", "name": "Ada"});
        backend.insert(Collection::Users, "u1", &doc).await.unwrap();
        assert!(backend
            .merge(Collection::Users, "u1", &json!({"name": "Grace"}))
            .await
            .unwrap());
        assert!(backend.remove(Collection::Users, "u1").await.unwrap());

        let created = feed.recv().await.unwrap().unwrap();
        assert!(created.old.is_none());
        assert_eq!(created.new.unwrap()["name"], "Ada");

        let changed = feed.recv().await.unwrap().unwrap();
        assert_eq!(changed.old.unwrap()["name"], "Ada");
        assert_eq!(changed.new.unwrap()["name"], "Grace");

        let removed = feed.recv().await.unwrap().unwrap();
        assert_eq!(removed.old.unwrap()["name"], "Grace");
        assert!(removed.new.is_none());
    }

    #[tokio::test]
    async fn merge_and_remove_miss_without_publishing() {
        let backend = MemoryBackend::new();
        backend
            .ensure_collections(&[Collection::Devices])
            .await
            .unwrap();
        let mut feed = backend.changes(Collection::Devices).await.unwrap();

        assert!(!backend
            .merge(Collection::Devices, "missing", &json!({"online": true}))
            .await
            .unwrap());
        assert!(!backend.remove(Collection::Devices, "missing").await.unwrap());

        assert!(backend.fetch(Collection::Devices, "missing").await.unwrap().is_none());
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_ends_open_feeds_and_rejects_operations() {
        let backend = MemoryBackend::new();
        backend
            .ensure_collections(&[Collection::Stages])
            .await
            .unwrap();
        let mut feed = backend.changes(Collection::Stages).await.unwrap();

        backend.close().await;

        assert!(feed.recv().await.is_none());
        assert!(matches!(
            backend.fetch(Collection::Stages, "s1").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn ensure_collections_is_idempotent() {
        let backend = MemoryBackend::new();
        backend
            .ensure_collections(&Collection::ALL)
            .await
            .unwrap();

        backend
            .insert(Collection::Groups, "g1", &json!({"id": "g1"}))
            .await
            .unwrap();

        // A second ensure pass must not wipe existing data.
        backend
            .ensure_collections(&Collection::ALL)
            .await
            .unwrap();
        assert!(backend.fetch(Collection::Groups, "g1").await.unwrap().is_some());
    }
}
