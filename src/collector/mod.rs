//! Collectors - buffered, flush-on-completion writes
//!
//! - [`AsyncCollector`]: the capability a backend exposes for writes
//! - [`Collector`] / [`Out`]: synchronous shapes handed to functions, replayed
//!   into the backend collector after the function returns
//! - `converter`: element conversion between a function's type and the
//!   backend's native message type
//! - `binder`: adapts a backend collector to every parameter shape

mod binder;
mod converter;

pub use binder::{
    bind_collector, BoundCollector, CollectorBuilder, CollectorCompletion, CollectorShape,
};
pub use converter::{Converter, ConverterManager};

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BindError;

/// Buffered asynchronous writer
#[async_trait]
pub trait AsyncCollector<T>: Send + Sync {
    async fn add(&self, item: T) -> Result<(), BindError>;

    /// Write everything added so far
    async fn flush(&self) -> Result<(), BindError>;
}

/// Shared handle to an asynchronous collector, as handed to functions
pub type AsyncCollectorHandle<T> = Arc<dyn AsyncCollector<T>>;

/// Synchronous collector. Items are written after the function returns.
#[derive(Debug)]
pub struct Collector<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Collector<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, item: T) {
        self.items.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items.into_inner()
    }
}

/// Output slot for `out T` and `out Vec<T>` parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Out<T>(Option<T>);

impl<T> Default for Out<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Out<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, value: T) {
        self.0 = Some(value);
    }

    pub fn get(&self) -> Option<&T> {
        self.0.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

/// Converts each element before handing it to the wrapped collector
pub struct ConvertingCollector<T, M> {
    inner: Arc<dyn AsyncCollector<M>>,
    convert: Converter<T, M>,
}

impl<T, M> ConvertingCollector<T, M> {
    pub fn new(inner: Arc<dyn AsyncCollector<M>>, convert: Converter<T, M>) -> Self {
        Self { inner, convert }
    }
}

#[async_trait]
impl<T, M> AsyncCollector<T> for ConvertingCollector<T, M>
where
    T: Send + 'static,
    M: Send + 'static,
{
    async fn add(&self, item: T) -> Result<(), BindError> {
        let message = (self.convert)(item)?;
        self.inner.add(message).await
    }

    async fn flush(&self) -> Result<(), BindError> {
        self.inner.flush().await
    }
}

/// In-memory collector recording adds and flushes
#[derive(Debug)]
pub struct RecordingCollector<T> {
    pending: Mutex<Vec<T>>,
    flushed: Mutex<Vec<Vec<T>>>,
}

impl<T> Default for RecordingCollector<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            flushed: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> RecordingCollector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per flush call, holding the items that flush wrote
    pub fn flushes(&self) -> Vec<Vec<T>> {
        self.flushed.lock().clone()
    }

    pub fn pending(&self) -> Vec<T> {
        self.pending.lock().clone()
    }
}

#[async_trait]
impl<T> AsyncCollector<T> for RecordingCollector<T>
where
    T: Send + 'static,
{
    async fn add(&self, item: T) -> Result<(), BindError> {
        self.pending.lock().push(item);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BindError> {
        let batch = std::mem::take(&mut *self.pending.lock());
        self.flushed.lock().push(batch);
        Ok(())
    }
}
