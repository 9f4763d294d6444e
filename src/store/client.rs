//! Capability interface required from each storage backend

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::binding::ParameterizedQuery;
use crate::error::BackendError;

/// Client cache key: endpoint (or connection string) plus optional key.
///
/// Derived only from connection settings, never from table names or ids.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    endpoint: String,
    key: Option<String>,
}

impl ConnectionIdentity {
    pub fn new(endpoint: impl Into<String>, key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }
}

// Keys stay out of logs and panics
impl fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("endpoint", &self.endpoint)
            .field("key", &self.key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint)
    }
}

/// How collector writes reach the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    Insert,
    Upsert,
}

/// Creation hints for `create_collection_if_not_exists`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    pub partition_key: Option<String>,
    pub throughput: Option<u32>,
}

/// Filter/projection expression for `query`.
///
/// Filters are field equality tests on dotted paths. A SQL query, when
/// present, is passed through to the backend with its parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub sql: Option<ParameterizedQuery>,
    pub filters: Vec<(String, Value)>,
    pub projection: Option<Vec<String>>,
    pub limit: Option<usize>,
}

/// One client per connection identity, shared by every binding that targets it
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetch one record. Absent records are `BackendError::NotFound`.
    async fn lookup(
        &self,
        collection: &str,
        id: &str,
        partition_key: Option<&str>,
    ) -> Result<Value, BackendError>;

    async fn insert(&self, collection: &str, record: Value) -> Result<(), BackendError>;

    async fn update(&self, collection: &str, record: Value) -> Result<(), BackendError>;

    async fn upsert(&self, collection: &str, record: Value) -> Result<(), BackendError>;

    async fn create_collection_if_not_exists(
        &self,
        collection: &str,
        options: &CollectionOptions,
    ) -> Result<(), BackendError>;

    async fn query(&self, collection: &str, spec: &QuerySpec) -> Result<Vec<Value>, BackendError>;

    /// Write with the given mode
    async fn write(
        &self,
        mode: WriteMode,
        collection: &str,
        record: Value,
    ) -> Result<(), BackendError> {
        match mode {
            WriteMode::Insert => self.insert(collection, record).await,
            WriteMode::Upsert => self.upsert(collection, record).await,
        }
    }
}

/// Creates backend clients. Called at most once per identity through the cache.
///
/// Construction is synchronous and blocks other first callers of the same
/// identity until it returns. A factory may fetch clients for other
/// identities from the cache, but asking for its own identity deadlocks.
pub trait StoreClientFactory: Send + Sync {
    fn create_client(
        &self,
        identity: &ConnectionIdentity,
    ) -> Result<Arc<dyn StoreClient>, BackendError>;
}

impl<F> StoreClientFactory for F
where
    F: Fn(&ConnectionIdentity) -> Result<Arc<dyn StoreClient>, BackendError> + Send + Sync,
{
    fn create_client(
        &self,
        identity: &ConnectionIdentity,
    ) -> Result<Arc<dyn StoreClient>, BackendError> {
        self(identity)
    }
}
