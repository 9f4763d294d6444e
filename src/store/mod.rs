//! Store backends - the capability interface rules bind against
//!
//! - `client`: connection identity and the [`StoreClient`] capability trait
//! - `cache`: process-scoped get-or-create client cache
//! - `context`: per-invocation resolved context (client + target ids)
//! - `table`: untyped/typed table handles and query builders handed to functions
//! - `collector`: the backend's native buffered collector
//! - `memory`: in-process backend

mod cache;
mod client;
mod collector;
mod context;
mod memory;
mod table;

pub use cache::ClientCache;
pub use client::{
    CollectionOptions, ConnectionIdentity, QuerySpec, StoreClient, StoreClientFactory, WriteMode,
};
pub use collector::StoreCollector;
pub use context::{StoreContext, StoreContextFactory};
pub use memory::{MemoryStore, MemoryStoreFactory, StoreCall};
pub use table::{Query, TableHandle, TypedTable};
