use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla_cdc::consumer::{CDCRow, Consumer, ConsumerFactory, OperationType};
use scylla_cdc::log_reader::{CDCLogReader, CDCLogReaderBuilder};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::events::Collection;

use super::backend::{
    merge_documents, ChangeFeed, ChangeRecord, FeedItem, StorageBackend, StreamFault,
};
use super::StoreError;

// ============================================================================
// ScyllaDB Backend - documents + CDC change feeds
// ============================================================================
//
// Each collection is one table `(id text PRIMARY KEY, doc text)` with CDC
// enabled (full preimage), so every mutation surfaces in the CDC log with its
// before image. One CDC log reader per watched collection adapts CDC rows
// into before/after `ChangeRecord`s:
//
// - The reader delivers a PreImage row (the old document, if any) followed by
//   the delta row for the same mutation on the same stream.
// - RowInsert / RowUpdate carry the new document; RowDelete carries none.
// - Ordering within a stream follows the order ScyllaDB applied the writes,
//   which is what the per-collection ordering guarantee rests on.
//
// ============================================================================

/// ScyllaDB implementation of [`StorageBackend`]. The session is the single
/// shared connection handle; only the facade opens or closes it.
pub struct ScyllaBackend {
    session: Arc<Session>,
    keyspace: String,
    readers: Mutex<Vec<CDCLogReader>>,
    closed: AtomicBool,
}

impl ScyllaBackend {
    /// Establish the storage connection.
    pub async fn connect(host: &str, port: u16, keyspace: &str) -> Result<Self, StoreError> {
        tracing::info!(host = %host, port = port, "Connecting to ScyllaDB...");

        let session: Session = SessionBuilder::new()
            .known_node(format!("{}:{}", host, port))
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            session: Arc::new(session),
            keyspace: keyspace.to_string(),
            readers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn guard_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection closed".into()))
        } else {
            Ok(())
        }
    }

    fn backend_err(e: impl std::fmt::Display) -> StoreError {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl StorageBackend for ScyllaBackend {
    async fn ensure_collections(&self, collections: &[Collection]) -> Result<(), StoreError> {
        self.guard_open()?;

        // IF NOT EXISTS keeps concurrent startups from creating duplicates.
        self.session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    self.keyspace
                ),
                &[],
            )
            .await
            .map_err(Self::backend_err)?;

        self.session
            .use_keyspace(self.keyspace.as_str(), false)
            .await
            .map_err(Self::backend_err)?;

        for &collection in collections {
            self.session
                .query_unpaged(
                    format!(
                        "CREATE TABLE IF NOT EXISTS {} (id text PRIMARY KEY, doc text) \
                         WITH cdc = {{'enabled': true, 'preimage': 'full'}}",
                        collection.table_name()
                    ),
                    &[],
                )
                .await
                .map_err(Self::backend_err)?;
        }

        Ok(())
    }

    async fn fetch(&self, collection: Collection, id: &str) -> Result<Option<Value>, StoreError> {
        self.guard_open()?;

        let result = self
            .session
            .query_unpaged(
                format!("SELECT doc FROM {} WHERE id = ?", collection.table_name()),
                (id,),
            )
            .await
            .map_err(Self::backend_err)?;

        let rows_result = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None), // No rows
        };

        match rows_result.maybe_first_row::<(String,)>() {
            Ok(Some((doc,))) => Ok(Some(serde_json::from_str(&doc)?)),
            _ => Ok(None),
        }
    }

    async fn insert(&self, collection: Collection, id: &str, doc: &Value) -> Result<(), StoreError> {
        self.guard_open()?;

        self.session
            .query_unpaged(
                format!(
                    "INSERT INTO {} (id, doc) VALUES (?, ?)",
                    collection.table_name()
                ),
                (id, doc.to_string()),
            )
            .await
            .map_err(Self::backend_err)?;

        Ok(())
    }

    async fn merge(
        &self,
        collection: Collection,
        id: &str,
        partial: &Value,
    ) -> Result<bool, StoreError> {
        self.guard_open()?;

        // Read-merge-write; single-record atomicity is all the cooperative
        // scheduling model requires.
        let Some(existing) = self.fetch(collection, id).await? else {
            return Ok(false);
        };

        let merged = merge_documents(existing, partial);
        self.session
            .query_unpaged(
                format!("UPDATE {} SET doc = ? WHERE id = ?", collection.table_name()),
                (merged.to_string(), id),
            )
            .await
            .map_err(Self::backend_err)?;

        Ok(true)
    }

    async fn remove(&self, collection: Collection, id: &str) -> Result<bool, StoreError> {
        self.guard_open()?;

        if self.fetch(collection, id).await?.is_none() {
            return Ok(false);
        }

        self.session
            .query_unpaged(
                format!("DELETE FROM {} WHERE id = ?", collection.table_name()),
                (id,),
            )
            .await
            .map_err(Self::backend_err)?;

        Ok(true)
    }

    async fn changes(&self, collection: Collection) -> Result<ChangeFeed, StoreError> {
        self.guard_open()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let factory = Arc::new(DocFeedConsumerFactory {
            collection,
            tx,
        });

        // The reader starts from "now" and keeps consuming until stopped.
        let (reader, handle) = CDCLogReaderBuilder::new()
            .session(self.session.clone())
            .keyspace(self.keyspace.as_str())
            .table_name(collection.table_name())
            .consumer_factory(factory)
            .build()
            .await
            .map_err(|e| {
                StoreError::Backend(format!(
                    "failed to open change feed for {}: {}",
                    collection, e
                ))
            })?;

        self.readers.lock().await.push(reader);

        // When the reader ends, its consumers (and their senders) drop, which
        // ends the feed; the watcher decides whether that is a failure.
        tokio::spawn(async move {
            match handle.await {
                Ok(_) => {
                    tracing::info!(collection = %collection, "CDC log reader finished");
                }
                Err(e) => {
                    tracing::error!(collection = %collection, error = %e, "CDC log reader failed");
                }
            }
        });

        tracing::info!(collection = %collection, "🎯 Change feed attached");
        Ok(rx)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut readers = self.readers.lock().await;
        for mut reader in readers.drain(..) {
            reader.stop();
        }

        tracing::info!("Storage connection closed");
    }
}

// ============================================================================
// CDC row adaptation
// ============================================================================

/// Consumer adapting CDC rows of one collection into `ChangeRecord`s. The
/// CDC library creates one consumer per stream group; the preimage row and
/// the delta row of a single mutation arrive on the same stream, in order.
struct DocFeedConsumer {
    collection: Collection,
    tx: mpsc::UnboundedSender<FeedItem>,
    pending_old: Option<Value>,
}

impl DocFeedConsumer {
    /// Extract and parse the `doc` column, if present on this CDC row.
    fn doc_value(&self, data: &CDCRow<'_>) -> Result<Option<Value>, StreamFault> {
        let text = data
            .get_value("doc")
            .as_ref()
            .and_then(|v| v.as_text())
            .map(|s| s.to_string());

        match text {
            Some(json) => serde_json::from_str(&json).map(Some).map_err(|e| StreamFault {
                collection: self.collection,
                reason: format!("invalid document JSON: {}", e),
            }),
            None => Ok(None),
        }
    }

    fn forward(&self, old: Option<Value>, new: Option<Value>) {
        // A dropped receiver means the watcher is gone; nothing left to do.
        let _ = self.tx.send(Ok(ChangeRecord { old, new }));
    }

    fn fault(&self, fault: StreamFault) {
        let _ = self.tx.send(Err(fault));
    }
}

#[async_trait]
impl Consumer for DocFeedConsumer {
    async fn consume_cdc(&mut self, data: CDCRow<'_>) -> anyhow::Result<()> {
        tracing::debug!(
            collection = %self.collection,
            operation = %data.operation,
            "Received CDC row"
        );

        match data.operation {
            OperationType::PreImage => {
                // Stash the before image for the delta row that follows.
                self.pending_old = match self.doc_value(&data) {
                    Ok(doc) => doc,
                    Err(fault) => {
                        self.fault(fault);
                        None
                    }
                };
            }
            OperationType::RowInsert | OperationType::RowUpdate => {
                let old = self.pending_old.take();
                match self.doc_value(&data) {
                    Ok(Some(new)) => self.forward(old, Some(new)),
                    Ok(None) => self.fault(StreamFault {
                        collection: self.collection,
                        reason: "mutation row without document column".to_string(),
                    }),
                    Err(fault) => self.fault(fault),
                }
            }
            OperationType::RowDelete => {
                // The delta row of a delete carries only the key; the before
                // image arrived as the preceding PreImage row.
                let old = self.pending_old.take();
                self.forward(old, None);
            }
            _ => {
                tracing::debug!(
                    operation = %data.operation,
                    "Skipping CDC operation with no document semantics"
                );
            }
        }

        Ok(())
    }
}

/// Factory handed to the CDC log reader; one consumer per stream group.
struct DocFeedConsumerFactory {
    collection: Collection,
    tx: mpsc::UnboundedSender<FeedItem>,
}

#[async_trait]
impl ConsumerFactory for DocFeedConsumerFactory {
    async fn new_consumer(&self) -> Box<dyn Consumer> {
        Box::new(DocFeedConsumer {
            collection: self.collection,
            tx: self.tx.clone(),
            pending_old: None,
        })
    }
}

// The backend itself requires a running ScyllaDB node; its behavior against
// real CDC streams is covered by integration runs, while the record adaptation
// and merge semantics shared with the in-memory backend are unit tested in
// `backend.rs` and exercised end to end through `MemoryBackend`.
