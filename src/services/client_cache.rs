//! Lazily built upstream clients, one per provider.
//!
//! The cache map is an immutable snapshot behind [`ArcSwap`]. A registry
//! reload builds a replacement map to the side and swaps it in, keeping
//! clients (and their key pools) whose provider config did not change.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::error::AppError;
use crate::core::registry::ProviderRegistry;
use crate::services::key_pool::KeyPoolStats;
use crate::services::upstream_client::UpstreamClient;

type ClientMap = HashMap<String, Arc<UpstreamClient>>;

pub struct ClientCache {
    registry: Arc<ProviderRegistry>,
    http: reqwest::Client,
    clients: ArcSwap<ClientMap>,
}

impl ClientCache {
    pub fn new(registry: Arc<ProviderRegistry>, http: reqwest::Client) -> Self {
        Self {
            registry,
            http,
            clients: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Client for `name`, building it on first use.
    pub fn client_for(&self, name: &str) -> Result<Arc<UpstreamClient>, AppError> {
        let name = name.to_ascii_lowercase();
        let provider = self
            .registry
            .lookup(&name)
            .ok_or_else(|| AppError::ProviderUnconfigured(name.clone()))?;

        if let Some(client) = self.clients.load().get(&name) {
            if client.provider().as_ref() == provider.as_ref() {
                return Ok(client.clone());
            }
        }

        let built = Arc::new(UpstreamClient::new(provider.clone(), self.http.clone())?);
        self.clients.rcu(|current| {
            let mut next = ClientMap::clone(current);
            let stale = next
                .get(&name)
                .map(|c| c.provider().as_ref() != provider.as_ref())
                .unwrap_or(true);
            if stale {
                next.insert(name.clone(), built.clone());
            }
            next
        });

        // A concurrent insert for the same config may have won the race
        Ok(self
            .clients
            .load()
            .get(&name)
            .cloned()
            .unwrap_or(built))
    }

    /// Rebuild the map against the current registry snapshot.
    pub fn invalidate(&self) {
        let snapshot = self.registry.snapshot();
        self.clients.rcu(|current| {
            current
                .iter()
                .filter(|(name, client)| {
                    snapshot
                        .providers
                        .get(*name)
                        .is_some_and(|p| p.as_ref() == client.provider().as_ref())
                })
                .map(|(name, client)| (name.clone(), client.clone()))
                .collect::<ClientMap>()
        });
        tracing::info!(
            version = snapshot.version,
            kept_clients = self.len(),
            "Client cache invalidated"
        );
    }

    /// Invalidate the cache whenever the registry changes.
    pub fn spawn_invalidation_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut rx = self.registry.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                cache.invalidate();
            }
            tracing::debug!("Registry closed, stopping client cache listener");
        })
    }

    /// Pool state of a provider that has been used at least once.
    pub fn pool_stats(&self, name: &str) -> Option<KeyPoolStats> {
        self.clients
            .load()
            .get(&name.to_ascii_lowercase())
            .map(|c| c.pool().stats())
    }

    /// Reset a provider's pool; false if no client exists for it.
    pub fn reset_pool(&self, name: &str) -> bool {
        match self.clients.load().get(&name.to_ascii_lowercase()) {
            Some(client) => {
                client.pool().reset();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
