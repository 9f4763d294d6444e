//! Process-scoped backend client cache
//!
//! One client per connection identity, created on first use and kept for the
//! lifetime of the process. Concurrent first calls for the same identity
//! collapse to a single construction.
//!
//! Each identity owns a `OnceCell` slot. The map's shard lock is only held
//! while the slot is fetched, so construction blocks callers of that identity
//! and nothing else.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::info;

use super::client::{ConnectionIdentity, StoreClient, StoreClientFactory};
use crate::error::BindError;

type ClientSlot = Arc<OnceCell<Arc<dyn StoreClient>>>;

#[derive(Clone)]
pub struct ClientCache {
    clients: Arc<DashMap<ConnectionIdentity, ClientSlot>>,
    factory: Arc<dyn StoreClientFactory>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("clients", &self.len())
            .finish()
    }
}

impl ClientCache {
    pub fn new(factory: Arc<dyn StoreClientFactory>) -> Self {
        Self {
            clients: Arc::new(DashMap::new()),
            factory,
        }
    }

    /// Get the client for `identity`, creating it on first use
    pub fn get_or_create(
        &self,
        identity: &ConnectionIdentity,
    ) -> Result<Arc<dyn StoreClient>, BindError> {
        let slot: ClientSlot = {
            let entry = self.clients.entry(identity.clone()).or_default();
            Arc::clone(entry.value())
        };

        // racing callers for this identity wait on the cell, not the shard
        let created = slot.get_or_try_init(|| {
            let client = self.factory.create_client(identity)?;
            info!(endpoint = %identity, "Created store client");
            Ok::<_, BindError>(client)
        });

        match created {
            Ok(client) => Ok(Arc::clone(client)),
            Err(e) => {
                self.clients
                    .remove_if(identity, |_, s| Arc::ptr_eq(s, &slot) && s.get().is_none());
                Err(e)
            }
        }
    }

    /// Number of constructed clients
    pub fn len(&self) -> usize {
        self.clients
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
