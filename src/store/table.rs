//! Table handles and queries handed to functions

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::client::{QuerySpec, StoreClient};
use crate::binding::ParameterizedQuery;
use crate::context::cancellable;
use crate::error::{BackendError, BindError};

/// Untyped handle to one table or collection
#[derive(Clone)]
pub struct TableHandle {
    client: Arc<dyn StoreClient>,
    name: String,
    partition_key: Option<String>,
    cancellation: CancellationToken,
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("name", &self.name)
            .field("partition_key", &self.partition_key)
            .finish()
    }
}

impl TableHandle {
    pub fn new(
        client: Arc<dyn StoreClient>,
        name: impl Into<String>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            partition_key: None,
            cancellation,
        }
    }

    pub fn with_partition_key(mut self, partition_key: Option<String>) -> Self {
        self.partition_key = partition_key;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    /// Fetch a record by id. `NotFound` becomes `None`.
    pub async fn lookup(&self, id: &str) -> Result<Option<Value>, BindError> {
        let result = cancellable(
            &self.cancellation,
            self.client
                .lookup(&self.name, id, self.partition_key.as_deref()),
        )
        .await;

        match result {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn insert(&self, record: Value) -> Result<(), BindError> {
        cancellable(&self.cancellation, self.client.insert(&self.name, record)).await
    }

    pub async fn update(&self, record: Value) -> Result<(), BindError> {
        cancellable(&self.cancellation, self.client.update(&self.name, record)).await
    }

    pub async fn upsert(&self, record: Value) -> Result<(), BindError> {
        cancellable(&self.cancellation, self.client.upsert(&self.name, record)).await
    }

    pub fn query(&self) -> Query<Value> {
        Query::new(self.clone())
    }

    async fn run(&self, spec: &QuerySpec) -> Result<Vec<Value>, BindError> {
        cancellable::<_, BackendError, _>(&self.cancellation, self.client.query(&self.name, spec))
            .await
    }
}

/// Table handle that reads and writes `T`
pub struct TypedTable<T> {
    inner: TableHandle,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for TypedTable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for TypedTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedTable").field(&self.inner).finish()
    }
}

impl<T> TypedTable<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(inner: TableHandle) -> Self {
        Self {
            inner,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn untyped(&self) -> &TableHandle {
        &self.inner
    }

    pub async fn lookup(&self, id: &str) -> Result<Option<T>, BindError> {
        match self.inner.lookup(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, record: &T) -> Result<(), BindError> {
        self.inner.insert(serde_json::to_value(record)?).await
    }

    pub async fn update(&self, record: &T) -> Result<(), BindError> {
        self.inner.update(serde_json::to_value(record)?).await
    }

    pub async fn upsert(&self, record: &T) -> Result<(), BindError> {
        self.inner.upsert(serde_json::to_value(record)?).await
    }

    pub fn query(&self) -> Query<T> {
        self.inner.query().typed()
    }
}

/// Query over one table, executed against the backend on `execute`
pub struct Query<T> {
    table: TableHandle,
    spec: QuerySpec,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            spec: self.spec.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table.name)
            .field("spec", &self.spec)
            .finish()
    }
}

impl<T> Query<T> {
    pub fn new(table: TableHandle) -> Self {
        Self {
            table,
            spec: QuerySpec::default(),
            _record: PhantomData,
        }
    }

    /// Keep records whose field at `path` equals `value`
    pub fn where_eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spec.filters.push((path.into(), value.into()));
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.spec.limit = Some(limit);
        self
    }

    pub fn with_sql(mut self, query: Option<ParameterizedQuery>) -> Self {
        self.spec.sql = query;
        self
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn table(&self) -> &str {
        self.table.name()
    }

    /// Same query, reading records as `U`
    pub fn typed<U>(self) -> Query<U> {
        Query {
            table: self.table,
            spec: self.spec,
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Query<T> {
    pub async fn execute(&self) -> Result<Vec<T>, BindError> {
        self.table
            .run(&self.spec)
            .await?
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(BindError::from))
            .collect()
    }
}
