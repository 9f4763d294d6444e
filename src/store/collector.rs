//! The backend's native collector: buffered adds, written on flush

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::{CollectionOptions, StoreClient, WriteMode};
use crate::collector::AsyncCollector;
use crate::context::cancellable;
use crate::error::{BackendError, BindError};

pub struct StoreCollector {
    client: Arc<dyn StoreClient>,
    collection: String,
    mode: WriteMode,
    create: Option<CollectionOptions>,
    cancellation: CancellationToken,
    pending: Mutex<Vec<Value>>,
}

impl fmt::Debug for StoreCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCollector")
            .field("collection", &self.collection)
            .field("mode", &self.mode)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

impl StoreCollector {
    pub fn new(
        client: Arc<dyn StoreClient>,
        collection: impl Into<String>,
        mode: WriteMode,
        create: Option<CollectionOptions>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            collection: collection.into(),
            mode,
            create,
            cancellation,
            pending: Mutex::new(Vec::new()),
        }
    }

    async fn write(&self, record: Value) -> Result<(), BindError> {
        let first = cancellable(
            &self.cancellation,
            self.client.write(self.mode, &self.collection, record.clone()),
        )
        .await;

        let create = match &self.create {
            Some(create) if first.as_ref().is_err_and(|e| e.is_not_found()) => create,
            _ => return first,
        };

        info!(collection = %self.collection, "Collection missing, creating before retry");
        let created = cancellable(
            &self.cancellation,
            self.client
                .create_collection_if_not_exists(&self.collection, create),
        )
        .await;
        match created {
            Err(BindError::Backend(BackendError::Conflict { .. })) | Ok(()) => {}
            Err(e) => return Err(e),
        }

        cancellable(
            &self.cancellation,
            self.client.write(self.mode, &self.collection, record),
        )
        .await
    }
}

#[async_trait]
impl AsyncCollector<Value> for StoreCollector {
    async fn add(&self, item: Value) -> Result<(), BindError> {
        self.pending.lock().push(item);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BindError> {
        let batch = std::mem::take(&mut *self.pending.lock());
        debug!(
            collection = %self.collection,
            count = batch.len(),
            mode = ?self.mode,
            "Flushing collector"
        );
        for record in batch {
            self.write(record).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreCall};
    use serde_json::json;

    fn collector(store: Arc<MemoryStore>, create: Option<CollectionOptions>) -> StoreCollector {
        StoreCollector::new(
            store,
            "db/items",
            WriteMode::Upsert,
            create,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn nothing_written_before_flush() {
        let store = Arc::new(MemoryStore::new());
        let collector = collector(store.clone(), None);

        collector.add(json!({"id": "1"})).await.unwrap();
        assert!(store.records("db/items").is_empty());

        collector.flush().await.unwrap();
        assert_eq!(store.records("db/items"), vec![json!({"id": "1"})]);
    }

    #[tokio::test]
    async fn missing_collection_is_created_then_retried_once() {
        let store = Arc::new(MemoryStore::requiring_collections());
        let create = CollectionOptions {
            partition_key: Some("/pk".into()),
            throughput: Some(400),
        };
        let collector = collector(store.clone(), Some(create.clone()));

        collector.add(json!({"id": "1"})).await.unwrap();
        collector.flush().await.unwrap();

        let calls = store.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], StoreCall::Upsert { .. }));
        assert_eq!(
            calls[1],
            StoreCall::CreateCollection {
                collection: "db/items".into(),
                options: create,
            }
        );
        assert!(matches!(calls[2], StoreCall::Upsert { .. }));
        assert_eq!(store.records("db/items").len(), 1);
    }

    #[tokio::test]
    async fn missing_collection_without_create_propagates() {
        let store = Arc::new(MemoryStore::requiring_collections());
        let collector = collector(store.clone(), None);

        collector.add(json!({"id": "1"})).await.unwrap();
        let err = collector.flush().await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let store = Arc::new(MemoryStore::new());
        store.seed("items", vec![json!({"id": "1"})]);
        let collector = StoreCollector::new(
            store.clone(),
            "items",
            WriteMode::Insert,
            Some(CollectionOptions::default()),
            CancellationToken::new(),
        );

        collector.add(json!({"id": "1"})).await.unwrap();
        let err = collector.flush().await.unwrap_err();

        assert!(matches!(err, BindError::Backend(BackendError::Conflict { .. })));
        assert_eq!(store.calls().len(), 1);
    }
}
