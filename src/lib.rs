//! Rulebind - attribute-driven parameter binding for job hosts
//!
//! A function declares its I/O as typed attributes on parameters. At
//! registration each parameter is matched to exactly one binding rule; on
//! every invocation the rule produces the value before the body runs and
//! persists or flushes it afterwards.

pub mod attribute;
pub mod binding;
pub mod collector;
pub mod config;
pub mod context;
pub mod error;
pub mod extension;
pub mod host;
pub mod jsonpath;
pub mod param;
pub mod registry;
pub mod rules;
pub mod store;

pub use attribute::{
    AttributeCloner, BindingAttribute, DocumentAttribute, EnvNameResolver, MapNameResolver,
    NameResolver, StoreAttribute, TableAttribute,
};
pub use binding::{BindingData, BindingTemplate, ParameterizedQuery, SqlParameter};
pub use collector::{AsyncCollector, AsyncCollectorHandle, Collector, ConverterManager, Out};
pub use config::{BindingOptions, ConnectionOptions};
pub use context::InvocationContext;
pub use error::{BackendError, BindError, FixSuggestion};
pub use extension::StoreExtension;
pub use host::{Arguments, BindingHost, FunctionBindings, FunctionBuilder};
pub use param::{Argument, ItemType, ParamType, ParameterDescriptor, Record};
pub use registry::{ParameterBinding, RuleBinding, RuleRegistry};
pub use rules::{BindingRule, RuleBinder, RulePrecedence};
pub use store::{
    ClientCache, ConnectionIdentity, MemoryStore, MemoryStoreFactory, Query, StoreClient,
    StoreClientFactory, TableHandle, TypedTable,
};
