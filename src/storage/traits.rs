use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{CacheElement, CacheKey, CacheValue};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

/// A slower store that receives elements spooled out of memory.
///
/// Regions only ever write to an auxiliary store through their waterfall,
/// one element at a time.
#[async_trait]
pub trait AuxiliaryStore<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Short name used in logs and statistics.
    fn name(&self) -> &str;

    async fn store(&self, element: &CacheElement<K, V>) -> Result<(), StorageError>;

    /// Stores that cannot be read back return `Ok(None)`.
    async fn get(&self, _key: &K) -> Result<Option<CacheElement<K, V>>, StorageError> {
        Ok(None)
    }

    async fn remove(&self, key: &K) -> Result<bool, StorageError>;

    async fn remove_all(&self) -> Result<(), StorageError>;

    async fn dispose(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
