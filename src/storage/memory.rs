use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{AuxiliaryStore, StorageError};
use crate::element::{CacheElement, CacheKey, CacheValue};

/// Auxiliary store backed by a concurrent map.
pub struct InMemoryStore<K: CacheKey, V: CacheValue> {
    name: String,
    data: DashMap<K, CacheElement<K, V>>,
}

impl<K: CacheKey, V: CacheValue> InMemoryStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.data.contains_key(key)
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl<K: CacheKey, V: CacheValue> Default for InMemoryStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> AuxiliaryStore<K, V> for InMemoryStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, element: &CacheElement<K, V>) -> Result<(), StorageError> {
        self.data.insert(element.key().clone(), element.clone());
        Ok(())
    }

    async fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn remove(&self, key: &K) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn remove_all(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }
}
