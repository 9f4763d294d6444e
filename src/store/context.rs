//! Per-invocation store context
//!
//! Connection precedence, per attribute kind:
//!
//! ```text
//! attribute setting  →  BindingOptions.<kind>  →  default setting via NameResolver
//! ```
//!
//! API keys follow the same order, except that an attribute key set to the
//! empty string means "no key" and stops the search.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::cache::ClientCache;
use super::client::{CollectionOptions, ConnectionIdentity, StoreClient, WriteMode};
use super::collector::StoreCollector;
use super::table::TableHandle;
use crate::attribute::{NameResolver, StoreAttribute};
use crate::binding::ParameterizedQuery;
use crate::config::BindingOptions;
use crate::context::InvocationContext;
use crate::error::BindError;

/// Resolves connection identities and builds per-invocation contexts
#[derive(Clone)]
pub struct StoreContextFactory {
    options: Arc<BindingOptions>,
    resolver: Arc<dyn NameResolver>,
    clients: ClientCache,
}

impl fmt::Debug for StoreContextFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContextFactory")
            .field("clients", &self.clients)
            .finish()
    }
}

impl StoreContextFactory {
    pub fn new(
        options: BindingOptions,
        resolver: Arc<dyn NameResolver>,
        clients: ClientCache,
    ) -> Self {
        Self {
            options: Arc::new(options),
            resolver,
            clients,
        }
    }

    pub fn clients(&self) -> &ClientCache {
        &self.clients
    }

    pub fn options(&self) -> &BindingOptions {
        &self.options
    }

    /// Connection identity for an attribute.
    ///
    /// Attribute connection and key fields name settings; their values are
    /// looked up here and only ever live inside the identity.
    pub fn resolve_identity<A: StoreAttribute>(
        &self,
        attribute: &A,
    ) -> Result<ConnectionIdentity, BindError> {
        let options = A::options(&self.options);

        let connection = match attribute.connection().filter(|c| !c.is_empty()) {
            Some(setting) => Some(self.setting_value::<A>(setting)?),
            None => options
                .connection
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| self.resolver.resolve(A::DEFAULT_CONNECTION_SETTING)),
        };
        let connection = connection.ok_or_else(|| BindError::ConfigurationMissing {
            setting: A::DEFAULT_CONNECTION_SETTING.to_string(),
            reason: format!(
                "no connection for {} binding: set it on the attribute, \
                 in the binding options, or in the environment",
                A::KIND
            ),
        })?;

        let api_key = match attribute.api_key() {
            Some("") => None,
            Some(setting) => Some(self.setting_value::<A>(setting)?),
            None => options
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .or_else(|| {
                    A::DEFAULT_API_KEY_SETTING.and_then(|setting| self.resolver.resolve(setting))
                }),
        };

        A::identity(connection, api_key)
    }

    fn setting_value<A: StoreAttribute>(&self, setting: &str) -> Result<String, BindError> {
        let setting = setting.trim_matches('%');
        self.resolver
            .resolve(setting)
            .ok_or_else(|| BindError::ConfigurationMissing {
                setting: setting.to_string(),
                reason: format!("connection setting of {} binding is not defined", A::KIND),
            })
    }

    /// Resolve the client and target ids for one invocation.
    ///
    /// `default_collection` applies when the attribute names no collection
    /// (a record type implies its own).
    pub fn create_context<A: StoreAttribute>(
        &self,
        attribute: &A,
        default_collection: Option<&str>,
        cx: &InvocationContext,
    ) -> Result<StoreContext, BindError> {
        cx.check()?;

        let identity = self.resolve_identity(attribute)?;
        let client = self.clients.get_or_create(&identity)?;
        let collection = attribute
            .collection()
            .or_else(|| default_collection.map(str::to_string));

        let create = attribute.create_if_not_exists().then(|| CollectionOptions {
            partition_key: attribute.partition().map(str::to_string),
            throughput: attribute.throughput().filter(|t| *t > 0),
        });

        debug!(
            kind = A::KIND,
            endpoint = %identity,
            collection = collection.as_deref().unwrap_or("-"),
            "Resolved store context"
        );

        Ok(StoreContext {
            client,
            collection,
            record_id: attribute.record_id().map(str::to_string),
            partition_key: attribute.partition().map(str::to_string),
            write_mode: attribute.write_mode(),
            create,
            query: attribute.query(),
            cancellation: cx.cancellation().clone(),
        })
    }
}

/// Resolved binding target for one invocation of one parameter
pub struct StoreContext {
    pub client: Arc<dyn StoreClient>,
    pub collection: Option<String>,
    pub record_id: Option<String>,
    pub partition_key: Option<String>,
    pub write_mode: WriteMode,
    pub create: Option<CollectionOptions>,
    pub query: Option<ParameterizedQuery>,
    pub cancellation: CancellationToken,
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("collection", &self.collection)
            .field("record_id", &self.record_id)
            .field("partition_key", &self.partition_key)
            .field("write_mode", &self.write_mode)
            .finish()
    }
}

impl StoreContext {
    pub fn collection(&self) -> Result<&str, BindError> {
        self.collection
            .as_deref()
            .ok_or_else(|| BindError::ConfigurationMissing {
                setting: "collection".to_string(),
                reason: "no table or collection name after resolution".to_string(),
            })
    }

    pub fn table(&self) -> Result<TableHandle, BindError> {
        Ok(TableHandle::new(
            Arc::clone(&self.client),
            self.collection()?,
            self.cancellation.clone(),
        )
        .with_partition_key(self.partition_key.clone()))
    }

    pub fn collector(&self) -> Result<StoreCollector, BindError> {
        Ok(StoreCollector::new(
            Arc::clone(&self.client),
            self.collection()?,
            self.write_mode,
            self.create.clone(),
            self.cancellation.clone(),
        ))
    }
}
