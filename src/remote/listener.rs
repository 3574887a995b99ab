// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! A [`RemoteCacheListener`] that mirrors server changes into a local region.
//!
//! Changes are applied with the `local_*` operations so a mirrored change is
//! never sent back out through the region's replicas.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::region::Region;

use super::server::RemoteCacheListener;

pub struct RegionListener<K: CacheKey, V: CacheValue> {
    id: u64,
    region: Arc<Region<K, V>>,
}

impl<K: CacheKey, V: CacheValue> RegionListener<K, V> {
    /// `id` should be the requester id this peer's clients send with, so the
    /// server does not echo the peer's own changes back to it.
    #[must_use]
    pub fn new(id: u64, region: Arc<Region<K, V>>) -> Self {
        Self { id, region }
    }

    #[must_use]
    pub fn region(&self) -> &Arc<Region<K, V>> {
        &self.region
    }

    fn check_name(&self, cache_name: &str) -> Result<(), CacheError> {
        if cache_name != self.region.name() {
            return Err(CacheError::RegionMismatch {
                expected: self.region.name().to_string(),
                actual: cache_name.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> RemoteCacheListener<K, V> for RegionListener<K, V> {
    fn listener_id(&self) -> u64 {
        self.id
    }

    async fn handle_put(&self, element: &CacheElement<K, V>) -> Result<(), CacheError> {
        self.region.local_update(element.clone())
    }

    async fn handle_remove(&self, cache_name: &str, key: &K) -> Result<(), CacheError> {
        self.check_name(cache_name)?;
        let removed = self.region.local_remove(key).await?;
        debug!(region = %cache_name, key = %key, removed, "Mirrored remote remove");
        Ok(())
    }

    async fn handle_remove_all(&self, cache_name: &str) -> Result<(), CacheError> {
        self.check_name(cache_name)?;
        self.region.local_remove_all().await.map(|_| ())
    }

    async fn handle_dispose(&self, cache_name: &str) -> Result<(), CacheError> {
        self.check_name(cache_name)?;
        self.region.dispose().await.map(|_| ())
    }
}
