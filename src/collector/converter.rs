//! Element converters keyed by (source type, target type)

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::BindError;

/// Conversion from a function's element type to a backend message type
pub type Converter<S, D> = Arc<dyn Fn(S) -> Result<D, BindError> + Send + Sync>;

/// Registry of element converters.
///
/// Cloning shares the underlying table. Lookups happen at registration, so a
/// missing converter is reported before any invocation.
#[derive(Clone, Default)]
pub struct ConverterManager {
    converters: Arc<DashMap<(TypeId, TypeId), Arc<dyn Any + Send + Sync>>>,
}

impl ConverterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with the JSON payload converters: raw bytes and text holding
    /// a JSON document convert to `Value`
    pub fn with_json_defaults() -> Self {
        let manager = Self::new();
        manager.add_converter(|bytes: Vec<u8>| Ok(serde_json::from_slice::<Value>(&bytes)?));
        manager.add_converter(|text: String| Ok(serde_json::from_str::<Value>(&text)?));
        manager
    }

    pub fn add_converter<S, D, F>(&self, convert: F)
    where
        S: 'static,
        D: 'static,
        F: Fn(S) -> Result<D, BindError> + Send + Sync + 'static,
    {
        let converter: Converter<S, D> = Arc::new(convert);
        self.converters
            .insert((TypeId::of::<S>(), TypeId::of::<D>()), Arc::new(converter));
    }

    /// Register the serde conversion of a record type to `Value`
    pub fn add_record<T>(&self)
    where
        T: Serialize + 'static,
    {
        self.add_converter(|item: T| Ok(serde_json::to_value(item)?));
    }

    pub fn get_converter<S: 'static, D: 'static>(&self) -> Option<Converter<S, D>> {
        self.converters
            .get(&(TypeId::of::<S>(), TypeId::of::<D>()))
            .and_then(|entry| entry.value().downcast_ref::<Converter<S, D>>().cloned())
    }

    /// Like [`get_converter`](Self::get_converter), failing with `NoConverterFound`
    pub fn require<S: 'static, D: 'static>(&self) -> Result<Converter<S, D>, BindError> {
        self.get_converter::<S, D>()
            .ok_or(BindError::NoConverterFound {
                from: type_name::<S>(),
                to: type_name::<D>(),
            })
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl std::fmt::Debug for ConverterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterManager")
            .field("converters", &self.converters.len())
            .finish()
    }
}
