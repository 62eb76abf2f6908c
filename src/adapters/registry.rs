//! Adapter Registry - Live adapter instances keyed by platform name

use crate::core::traits::PlatformAdapter;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared table of registered adapters
///
/// Readers clone `Arc` handles out of the table and release the lock before
/// doing any adapter work.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<BTreeMap<String, Arc<dyn PlatformAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the adapter's own name; returns the replaced instance
    pub async fn insert(&self, adapter: Arc<dyn PlatformAdapter>) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters
            .write()
            .await
            .insert(adapter.name().to_string(), adapter)
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.write().await.remove(name)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.adapters.read().await.contains_key(name)
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        self.adapters.read().await.keys().cloned().collect()
    }

    /// Handles to every adapter, sorted by name
    pub async fn snapshot(&self) -> Vec<Arc<dyn PlatformAdapter>> {
        self.adapters.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.adapters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.adapters.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryAdapter;

    #[tokio::test]
    async fn test_insert_and_replace() {
        let registry = AdapterRegistry::new();

        assert!(registry.insert(Arc::new(MemoryAdapter::new("b"))).await.is_none());
        assert!(registry.insert(Arc::new(MemoryAdapter::new("a"))).await.is_none());
        assert!(registry.insert(Arc::new(MemoryAdapter::new("a"))).await.is_some());

        assert_eq!(registry.names().await, vec!["a", "b"]);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = AdapterRegistry::new();
        registry.insert(Arc::new(MemoryAdapter::new("a"))).await;

        assert!(registry.remove("a").await.is_some());
        assert!(registry.remove("a").await.is_none());
        assert!(!registry.contains("a").await);
        assert!(registry.is_empty().await);
    }
}
