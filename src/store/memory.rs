//! In-process store backend
//!
//! Records live in per-collection vectors keyed by their `id` field (matched
//! case-insensitively). Every capability call is recorded so callers can
//! assert on exactly what reached the backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::client::{
    CollectionOptions, ConnectionIdentity, QuerySpec, StoreClient, StoreClientFactory,
};
use crate::error::BackendError;
use crate::jsonpath;

/// A capability call as received by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Lookup {
        collection: String,
        id: String,
        partition_key: Option<String>,
    },
    Insert { collection: String, record: Value },
    Update { collection: String, record: Value },
    Upsert { collection: String, record: Value },
    CreateCollection {
        collection: String,
        options: CollectionOptions,
    },
    Query { collection: String, spec: QuerySpec },
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
    calls: Mutex<Vec<StoreCall>>,
    require_collections: bool,
}

impl MemoryStore {
    /// Store that creates collections implicitly on first write
    pub fn new() -> Self {
        Self::default()
    }

    /// Store where writes to an unknown collection fail with `NotFound`
    pub fn requiring_collections() -> Self {
        Self {
            require_collections: true,
            ..Self::default()
        }
    }

    /// Add records without recording a call
    pub fn seed(&self, collection: &str, records: Vec<Value>) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(records);
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn missing(&self, collection: &str) -> BackendError {
        BackendError::not_found(collection)
    }

    /// Run `write` against a collection, honoring `require_collections`
    fn with_collection<T>(
        &self,
        collection: &str,
        write: impl FnOnce(&mut Vec<Value>) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        if self.require_collections {
            let mut records = self
                .collections
                .get_mut(collection)
                .ok_or_else(|| self.missing(collection))?;
            return write(&mut *records);
        }
        let mut records = self.collections.entry(collection.to_string()).or_default();
        write(&mut *records)
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn position(records: &[Value], id: &str) -> Option<usize> {
    records
        .iter()
        .position(|r| record_id(r).is_some_and(|rid| rid.eq_ignore_ascii_case(id)))
}

fn required_id(collection: &str, record: &Value) -> Result<String, BackendError> {
    record_id(record)
        .map(str::to_string)
        .ok_or_else(|| BackendError::Fatal(format!("record for '{collection}' has no string 'id'")))
}

fn matches_filters(record: &Value, filters: &[(String, Value)]) -> bool {
    filters.iter().all(|(path, expected)| {
        jsonpath::parse(path)
            .ok()
            .and_then(|segments| jsonpath::apply(record, &segments).cloned())
            .is_some_and(|actual| &actual == expected)
    })
}

fn project(record: Value, fields: &[String]) -> Value {
    let Value::Object(map) = record else {
        return record;
    };
    let projected: Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| fields.iter().any(|f| f == key))
        .collect();
    Value::Object(projected)
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn lookup(
        &self,
        collection: &str,
        id: &str,
        partition_key: Option<&str>,
    ) -> Result<Value, BackendError> {
        self.record(StoreCall::Lookup {
            collection: collection.to_string(),
            id: id.to_string(),
            partition_key: partition_key.map(str::to_string),
        });

        let records = self
            .collections
            .get(collection)
            .ok_or_else(|| self.missing(collection))?;
        position(&records, id)
            .map(|i| records[i].clone())
            .ok_or_else(|| BackendError::not_found(format!("{collection}/{id}")))
    }

    async fn insert(&self, collection: &str, record: Value) -> Result<(), BackendError> {
        self.record(StoreCall::Insert {
            collection: collection.to_string(),
            record: record.clone(),
        });

        let id = required_id(collection, &record)?;
        self.with_collection(collection, |records| {
            if position(records, &id).is_some() {
                return Err(BackendError::Conflict {
                    resource: format!("{collection}/{id}"),
                });
            }
            records.push(record);
            Ok(())
        })
    }

    async fn update(&self, collection: &str, record: Value) -> Result<(), BackendError> {
        self.record(StoreCall::Update {
            collection: collection.to_string(),
            record: record.clone(),
        });

        let id = required_id(collection, &record)?;
        let mut records = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| self.missing(collection))?;
        let index = position(&records, &id)
            .ok_or_else(|| BackendError::not_found(format!("{collection}/{id}")))?;
        records[index] = record;
        Ok(())
    }

    async fn upsert(&self, collection: &str, record: Value) -> Result<(), BackendError> {
        self.record(StoreCall::Upsert {
            collection: collection.to_string(),
            record: record.clone(),
        });

        self.with_collection(collection, |records| {
            match record_id(&record).and_then(|id| position(records, id)) {
                Some(index) => records[index] = record,
                None => records.push(record),
            }
            Ok(())
        })
    }

    async fn create_collection_if_not_exists(
        &self,
        collection: &str,
        options: &CollectionOptions,
    ) -> Result<(), BackendError> {
        self.record(StoreCall::CreateCollection {
            collection: collection.to_string(),
            options: options.clone(),
        });
        self.collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn query(&self, collection: &str, spec: &QuerySpec) -> Result<Vec<Value>, BackendError> {
        self.record(StoreCall::Query {
            collection: collection.to_string(),
            spec: spec.clone(),
        });

        let records = match self.collections.get(collection) {
            Some(records) => records.clone(),
            None if self.require_collections => return Err(self.missing(collection)),
            None => Vec::new(),
        };

        let limit = spec.limit.unwrap_or(usize::MAX);
        Ok(records
            .into_iter()
            .filter(|r| matches_filters(r, &spec.filters))
            .take(limit)
            .map(|r| match &spec.projection {
                Some(fields) => project(r, fields),
                None => r,
            })
            .collect())
    }
}

/// Factory handing out one shared [`MemoryStore`] and counting constructions
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    store: Arc<MemoryStore>,
    created: AtomicUsize,
    identities: Mutex<Vec<ConnectionIdentity>>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Number of `create_client` calls
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn identities(&self) -> Vec<ConnectionIdentity> {
        self.identities.lock().clone()
    }
}

impl StoreClientFactory for MemoryStoreFactory {
    fn create_client(
        &self,
        identity: &ConnectionIdentity,
    ) -> Result<Arc<dyn StoreClient>, BackendError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.identities.lock().push(identity.clone());
        Ok(Arc::clone(&self.store) as Arc<dyn StoreClient>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn lookup_is_case_insensitive_on_id() {
        let store = MemoryStore::new();
        store.seed("items", vec![json!({"id": "Abc", "n": 1})]);

        let found = store.lookup("items", "aBC", None).await.unwrap();
        assert_eq!(found, json!({"id": "Abc", "n": 1}));
        assert!(store.lookup("items", "zzz", None).await.unwrap_err().is_not_found());
        assert!(store.lookup("other", "abc", None).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn update_replaces_existing_record_only() {
        let store = MemoryStore::new();
        store.seed("items", vec![json!({"id": "1", "text": "a"})]);

        store
            .update("items", json!({"id": "1", "text": "b"}))
            .await
            .unwrap();
        assert_eq!(store.records("items"), vec![json!({"id": "1", "text": "b"})]);

        let err = store.update("items", json!({"id": "2"})).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn insert_conflicts_upsert_does_not() {
        let store = MemoryStore::new();
        store.insert("items", json!({"id": "1"})).await.unwrap();

        let err = store.insert("items", json!({"id": "1"})).await.unwrap_err();
        assert!(err.is_conflict());

        store
            .upsert("items", json!({"id": "1", "v": 2}))
            .await
            .unwrap();
        assert_eq!(store.records("items"), vec![json!({"id": "1", "v": 2})]);
    }

    #[tokio::test]
    async fn query_projects_and_records_sql() {
        let store = MemoryStore::new();
        store.seed(
            "items",
            vec![
                json!({"id": "1", "owner": {"name": "ann"}, "n": 1}),
                json!({"id": "2", "owner": {"name": "bob"}, "n": 2}),
            ],
        );
        let spec = QuerySpec {
            filters: vec![("owner.name".into(), json!("bob"))],
            projection: Some(vec!["n".into()]),
            ..Default::default()
        };

        let found = store.query("items", &spec).await.unwrap();
        assert_eq!(found, vec![json!({"n": 2})]);
        assert_eq!(
            store.count(|c| matches!(c, StoreCall::Query { .. })),
            1
        );
    }

    #[tokio::test]
    async fn factory_counts_constructions() {
        let factory = MemoryStoreFactory::new();
        let identity = ConnectionIdentity::new("e", None);
        factory.create_client(&identity).unwrap();
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.identities(), vec![identity]);
    }
}
