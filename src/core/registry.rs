//! Provider registry with lock-free hot swapping.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::core::config::ProviderConfig;

/// Immutable view of the registered providers.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub providers: HashMap<String, Arc<ProviderConfig>>,
    pub version: u64,
}

impl RegistrySnapshot {
    fn build(providers: Vec<ProviderConfig>, version: u64) -> Self {
        let providers = providers
            .into_iter()
            .map(|p| (p.name.to_ascii_lowercase(), Arc::new(p)))
            .collect();
        Self { providers, version }
    }

    /// Providers sorted by name.
    pub fn sorted(&self) -> Vec<Arc<ProviderConfig>> {
        let mut providers: Vec<_> = self.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.name.cmp(&b.name));
        providers
    }
}

/// Name → provider mapping that can be replaced at runtime.
///
/// Readers get a consistent snapshot without locking; every replacement
/// bumps the version and is announced on a watch channel.
pub struct ProviderRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    tx: watch::Sender<u64>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        let (tx, _rx) = watch::channel(1);
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::build(providers, 1)),
            tx,
        }
    }

    /// Case-insensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<Arc<ProviderConfig>> {
        self.snapshot
            .load()
            .providers
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Swap in a new provider set and notify subscribers.
    pub fn replace(&self, providers: Vec<ProviderConfig>) -> u64 {
        let version = self.version() + 1;
        let count = providers.len();
        self.snapshot
            .store(Arc::new(RegistrySnapshot::build(providers, version)));
        self.tx.send_replace(version);
        tracing::info!(version = version, providers = count, "Provider registry reloaded");
        version
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}
