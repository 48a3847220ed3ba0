//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Connection registry
//!
//! The registry is the single owner of every live [`Client`]. It is shared
//! by the accept loop, every worker and the dispatcher, so it is backed by
//! a lock-free concurrent map. Only the accept loop adds entries.

use crate::{Client, ClientId, ClientInfo, Result, ServiceError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Bounded table of live clients keyed by id
pub struct ConnectionRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
    capacity: usize,
}

impl ConnectionRegistry {
    /// Create an empty registry holding at most `capacity` clients
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: DashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Register a client
    pub fn add(&self, client: Arc<Client>) -> Result<()> {
        if self.clients.len() >= self.capacity {
            return Err(ServiceError::RegistryFull(self.capacity));
        }
        match self.clients.entry(client.id()) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateClient(client.id())),
            Entry::Vacant(slot) => {
                slot.insert(client);
                Ok(())
            }
        }
    }

    /// Remove a client, returning it if it was still registered
    ///
    /// Removing an id that is not present is a no-op.
    pub fn remove_by_id(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.remove(&id).map(|(_, client)| client)
    }

    /// Get a client by id
    pub fn get(&self, id: ClientId) -> Option<Arc<Client>> {
        self.clients.get(&id).map(|entry| entry.value().clone())
    }

    /// Check whether an id is registered
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Visit every registered client
    ///
    /// The visitor runs while a shard lock is held and must not touch the
    /// registry itself. Use [`ConnectionRegistry::clients`] to work on a
    /// snapshot instead.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<Client>),
    {
        for entry in self.clients.iter() {
            visit(entry.value());
        }
    }

    /// Snapshot of every registered client
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Ids of every registered client
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    /// Info snapshots of every registered client
    pub fn infos(&self) -> Vec<ClientInfo> {
        self.clients.iter().map(|entry| entry.value().info()).collect()
    }

    /// Number of registered clients
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Check whether no client is registered
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Maximum number of registered clients
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn client(id: u64) -> Arc<Client> {
        Arc::new(Client::new(
            ClientId::new(id),
            "127.0.0.1:40000".parse().unwrap(),
            tokio::io::sink(),
        ))
    }

    #[test]
    fn test_add_and_get() {
        let registry = ConnectionRegistry::new(4);
        assert!(registry.is_empty());

        registry.add(client(10)).unwrap();
        registry.add(client(11)).unwrap();
        assert_eq!(registry.count(), 2);
        assert!(registry.contains(ClientId::new(10)));
        assert_eq!(registry.get(ClientId::new(11)).unwrap().id(), ClientId::new(11));
        assert!(registry.get(ClientId::new(12)).is_none());

        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec![ClientId::new(10), ClientId::new(11)]);
        assert_eq!(registry.infos().len(), 2);
    }

    #[test]
    fn test_capacity_and_duplicates() {
        let registry = ConnectionRegistry::new(2);
        registry.add(client(10)).unwrap();

        assert!(matches!(
            registry.add(client(10)),
            Err(ServiceError::DuplicateClient(id)) if id == ClientId::new(10)
        ));

        registry.add(client(11)).unwrap();
        assert!(matches!(
            registry.add(client(12)),
            Err(ServiceError::RegistryFull(2))
        ));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ConnectionRegistry::new(4);
        registry.add(client(10)).unwrap();

        assert!(registry.remove_by_id(ClientId::new(10)).is_some());
        assert!(registry.remove_by_id(ClientId::new(10)).is_none());
        assert!(registry.remove_by_id(ClientId::new(99)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_for_each_visits_all() {
        let registry = ConnectionRegistry::new(8);
        for id in 10..15 {
            registry.add(client(id)).unwrap();
        }
        let mut seen = HashSet::new();
        registry.for_each(|client| {
            seen.insert(client.id().as_u64());
        });
        assert_eq!(seen, (10..15).collect());
    }

    proptest! {
        #[test]
        fn count_tracks_adds_and_removes(ops in prop::collection::vec((any::<bool>(), 0u64..16), 0..64)) {
            let registry = ConnectionRegistry::new(8);
            let mut model = HashSet::new();

            for (add, id) in ops {
                if add {
                    let expected_ok = model.len() < 8 && !model.contains(&id);
                    prop_assert_eq!(registry.add(client(id)).is_ok(), expected_ok);
                    if expected_ok {
                        model.insert(id);
                    }
                } else {
                    prop_assert_eq!(
                        registry.remove_by_id(ClientId::new(id)).is_some(),
                        model.remove(&id)
                    );
                }
                prop_assert_eq!(registry.count(), model.len());
                prop_assert!(registry.count() <= registry.capacity());
            }
        }
    }
}
