//! Parameter descriptors and erased argument values
//!
//! A parameter's declared shape is an explicit [`ParamType`] built by the
//! function author. Element types are described at runtime by [`ItemType`],
//! which carries a per-type operation table: the registration-time dispatch
//! that mints lookup values, typed tables, queries and collectors for the
//! concrete `T`.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::collector::{bind_collector, CollectorBuilder, CollectorShape, ConverterManager};
use crate::error::BindError;
use crate::store::{Query, TableHandle, TypedTable};

// ═══════════════════════════════════════════════════════════════
// Argument
// ═══════════════════════════════════════════════════════════════

/// A value handed to (and returned by) a function body
pub struct Argument {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Argument").field(&self.type_name).finish()
    }
}

impl Argument {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any>(self) -> Result<T, BindError> {
        let actual = self.type_name;
        self.value
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| mismatch::<T>(actual))
    }

    pub fn downcast_ref<T: Any>(&self) -> Result<&T, BindError> {
        self.value
            .downcast_ref::<T>()
            .ok_or_else(|| mismatch::<T>(self.type_name))
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Result<&mut T, BindError> {
        let actual = self.type_name;
        self.value
            .downcast_mut::<T>()
            .ok_or_else(|| mismatch::<T>(actual))
    }
}

fn mismatch<T>(actual: &'static str) -> BindError {
    BindError::TypeMismatch {
        actual,
        expected: type_name::<T>(),
    }
}

// ═══════════════════════════════════════════════════════════════
// Item types
// ═══════════════════════════════════════════════════════════════

/// A serde record type with an identity field
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Identity field name. `None` makes the type unusable for lookups,
    /// queries and typed tables.
    const ID_FIELD: Option<&'static str> = Some("id");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Schemaless JSON (`serde_json::Value`)
    Json,
    Record { id_field: Option<&'static str> },
    /// Raw payload bytes, written only through a converter
    Bytes,
    /// Raw payload text, written only through a converter
    Text,
}

/// Runtime descriptor of a parameter's element type
#[derive(Clone)]
pub struct ItemType {
    name: &'static str,
    type_id: TypeId,
    kind: ItemKind,
    ops: Arc<dyn ItemOps>,
}

impl fmt::Debug for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for ItemType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.kind == other.kind
    }
}

impl ItemType {
    fn of<T>(kind: ItemKind) -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            name: short_type_name(type_name::<T>()),
            type_id: TypeId::of::<T>(),
            kind,
            ops: Arc::new(TypedOps::<T> {
                serde_messages: matches!(kind, ItemKind::Record { .. }),
                _item: PhantomData,
            }),
        }
    }

    pub fn record<T: Record>() -> Self {
        Self::of::<T>(ItemKind::Record {
            id_field: T::ID_FIELD,
        })
    }

    pub fn json() -> Self {
        Self::of::<Value>(ItemKind::Json)
    }

    pub fn bytes() -> Self {
        Self::of::<Vec<u8>>(ItemKind::Bytes)
    }

    pub fn text() -> Self {
        Self::of::<String>(ItemKind::Text)
    }

    /// Short type name; also the implied collection of record types
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Identity field used for lookups and the identity-change check
    pub fn id_field(&self) -> Option<&'static str> {
        match self.kind {
            ItemKind::Json => Some("id"),
            ItemKind::Record { id_field } => id_field,
            ItemKind::Bytes | ItemKind::Text => None,
        }
    }

    pub(crate) fn ops(&self) -> &dyn ItemOps {
        self.ops.as_ref()
    }
}

/// `my_crate::model::Order<u8>` → `Order`
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Operations specialized for one element type
pub(crate) trait ItemOps: Send + Sync {
    /// Decode a fetched record into `Option<T>`, plus the JSON snapshot of
    /// what was decoded
    fn lookup_value(&self, fetched: Option<Value>) -> Result<(Argument, Option<Value>), BindError>;

    /// JSON form of the `Option<T>` a function handed back
    fn returned_value(&self, argument: &Argument) -> Result<Option<Value>, BindError>;

    /// `Vec<T>` from query results
    fn records(&self, values: Vec<Value>) -> Result<Argument, BindError>;

    fn typed_table(&self, table: TableHandle) -> Argument;

    fn query(&self, query: Query<Value>) -> Argument;

    fn collector(
        &self,
        shape: CollectorShape,
        converters: &ConverterManager,
    ) -> Result<Arc<dyn CollectorBuilder<Value>>, BindError>;
}

struct TypedOps<T> {
    /// Record types convert to backend messages through serde unless a
    /// converter is registered for them
    serde_messages: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T> ItemOps for TypedOps<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn lookup_value(&self, fetched: Option<Value>) -> Result<(Argument, Option<Value>), BindError> {
        let Some(value) = fetched else {
            return Ok((Argument::new(None::<T>), None));
        };
        let item: T = serde_json::from_value(value)?;
        let snapshot = serde_json::to_value(&item)?;
        Ok((Argument::new(Some(item)), Some(snapshot)))
    }

    fn returned_value(&self, argument: &Argument) -> Result<Option<Value>, BindError> {
        match argument.downcast_ref::<Option<T>>()? {
            Some(item) => Ok(Some(serde_json::to_value(item)?)),
            None => Ok(None),
        }
    }

    fn records(&self, values: Vec<Value>) -> Result<Argument, BindError> {
        let items = values
            .into_iter()
            .map(serde_json::from_value::<T>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Argument::new(items))
    }

    fn typed_table(&self, table: TableHandle) -> Argument {
        Argument::new(TypedTable::<T>::new(table))
    }

    fn query(&self, query: Query<Value>) -> Argument {
        Argument::new(query.typed::<T>())
    }

    fn collector(
        &self,
        shape: CollectorShape,
        converters: &ConverterManager,
    ) -> Result<Arc<dyn CollectorBuilder<Value>>, BindError> {
        if self.serde_messages && converters.get_converter::<T, Value>().is_none() {
            converters.add_record::<T>();
        }
        bind_collector::<T, Value>(shape, converters)
    }
}

// ═══════════════════════════════════════════════════════════════
// Parameter types
// ═══════════════════════════════════════════════════════════════

/// Declared shape of a bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    /// `Option<T>`: looked up before, diffed and updated after
    Item(ItemType),
    /// `Vec<T>`: query results
    Array(ItemType),
    /// `Out<T>`
    Out(ItemType),
    /// `Out<Vec<T>>`
    OutArray(ItemType),
    /// `Collector<T>`
    Collector(ItemType),
    /// `AsyncCollectorHandle<T>`
    AsyncCollector(ItemType),
    /// `Query<T>`
    Query(ItemType),
    /// `TypedTable<T>`
    Table(ItemType),
    /// `TableHandle`
    RawTable,
    /// `Arc<dyn StoreClient>`
    Client,
}

impl ParamType {
    /// Element type, for shapes that have one
    pub fn element(&self) -> Option<&ItemType> {
        match self {
            ParamType::Item(t)
            | ParamType::Array(t)
            | ParamType::Out(t)
            | ParamType::OutArray(t)
            | ParamType::Collector(t)
            | ParamType::AsyncCollector(t)
            | ParamType::Query(t)
            | ParamType::Table(t) => Some(t),
            ParamType::RawTable | ParamType::Client => None,
        }
    }

    pub fn collector_shape(&self) -> Option<CollectorShape> {
        match self {
            ParamType::Out(_) => Some(CollectorShape::Out),
            ParamType::OutArray(_) => Some(CollectorShape::OutArray),
            ParamType::Collector(_) => Some(CollectorShape::Collector),
            ParamType::AsyncCollector(_) => Some(CollectorShape::AsyncCollector),
            _ => None,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            ParamType::Out(_) => Direction::Out,
            ParamType::OutArray(_) => Direction::OutArray,
            ParamType::Collector(_) | ParamType::AsyncCollector(_) => Direction::Collector,
            _ => Direction::In,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Item(t) => write!(f, "Option<{}>", t.name()),
            ParamType::Array(t) => write!(f, "Vec<{}>", t.name()),
            ParamType::Out(t) => write!(f, "Out<{}>", t.name()),
            ParamType::OutArray(t) => write!(f, "Out<Vec<{}>>", t.name()),
            ParamType::Collector(t) => write!(f, "Collector<{}>", t.name()),
            ParamType::AsyncCollector(t) => write!(f, "AsyncCollector<{}>", t.name()),
            ParamType::Query(t) => write!(f, "Query<{}>", t.name()),
            ParamType::Table(t) => write!(f, "TypedTable<{}>", t.name()),
            ParamType::RawTable => f.write_str("TableHandle"),
            ParamType::Client => f.write_str("Client"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    OutArray,
    Collector,
}

/// A function parameter as declared at registration
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub param_type: ParamType,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }

    pub fn direction(&self) -> Direction {
        self.param_type.direction()
    }

    /// Registration error for this parameter
    pub(crate) fn reject(&self, reason: impl Into<String>) -> BindError {
        BindError::shape(&self.name, &self.param_type, reason)
    }
}
