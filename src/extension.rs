//! Store extension - wires the store rule set into a host
//!
//! Owns the process-scoped state every store binding shares: the client
//! cache (one client per connection identity), the connection resolution
//! context, and the converter table.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::attribute::{DocumentAttribute, NameResolver, StoreAttribute, TableAttribute};
use crate::collector::ConverterManager;
use crate::config::BindingOptions;
use crate::error::BindError;
use crate::host::BindingHost;
use crate::registry::RuleRegistry;
use crate::rules::{
    BindingRule, ClientRule, ItemRule, OutputRule, QueryRule, TableRule, TypedTableRule,
};
use crate::store::{ClientCache, StoreClientFactory, StoreContextFactory};

#[derive(Clone)]
pub struct StoreExtension {
    contexts: StoreContextFactory,
    converters: ConverterManager,
    resolver: Arc<dyn NameResolver>,
}

impl fmt::Debug for StoreExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreExtension")
            .field("contexts", &self.contexts)
            .field("converters", &self.converters)
            .finish()
    }
}

impl StoreExtension {
    pub fn new(
        options: BindingOptions,
        factory: Arc<dyn StoreClientFactory>,
        resolver: Arc<dyn NameResolver>,
    ) -> Self {
        Self {
            contexts: StoreContextFactory::new(
                options,
                Arc::clone(&resolver),
                ClientCache::new(factory),
            ),
            converters: ConverterManager::with_json_defaults(),
            resolver,
        }
    }

    /// Replace the converter table (defaults: JSON bytes and text)
    pub fn with_converters(mut self, converters: ConverterManager) -> Self {
        self.converters = converters;
        self
    }

    pub fn converters(&self) -> &ConverterManager {
        &self.converters
    }

    pub fn client_cache(&self) -> &ClientCache {
        self.contexts.clients()
    }

    pub fn contexts(&self) -> &StoreContextFactory {
        &self.contexts
    }

    /// The store rule set for attribute kind `A`, in registration order
    pub fn rules<A: StoreAttribute>(&self) -> Vec<Arc<dyn BindingRule<A>>> {
        vec![
            Arc::new(OutputRule::new(self.contexts.clone(), self.converters.clone())),
            Arc::new(QueryRule::new(self.contexts.clone())),
            Arc::new(TableRule::new(self.contexts.clone())),
            Arc::new(TypedTableRule::new(self.contexts.clone())),
            Arc::new(ClientRule::new(self.contexts.clone())),
            Arc::new(ItemRule::new(self.contexts.clone())),
        ]
    }

    pub fn registry<A: StoreAttribute>(&self) -> Result<RuleRegistry<A>, BindError> {
        let mut registry = RuleRegistry::new(Arc::clone(&self.resolver));
        for rule in self.rules::<A>() {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Register the table and document rule sets
    pub fn register(&self, host: &mut BindingHost) -> Result<(), BindError> {
        host.add_registry(self.registry::<TableAttribute>()?);
        host.add_registry(self.registry::<DocumentAttribute>()?);
        info!("Store bindings registered for Table and Document attributes");
        Ok(())
    }
}
