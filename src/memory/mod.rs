//! Region memory caches.
//!
//! A region's primary store is a [`MemoryCache`]. The implementation is
//! chosen by [`EvictionPolicyKind`]:
//!
//! | Policy          | Update       | Get                 | Freed first        |
//! |-----------------|--------------|---------------------|--------------------|
//! | `Lru`           | insert head  | move to head        | least recently used|
//! | `Fifo`          | insert head  | no change           | oldest insert      |
//! | `Mru`           | insert head  | move to tail        | most recently used |
//! | `SoftReference` | map + window | re-enter window     | nothing (reclaimed)|
//!
//! Anything a memory cache evicts goes to its [`SpoolTarget`].

pub mod linked;
pub mod list;
pub mod policy;
pub mod soft;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use linked::LinkedMemoryCache;
pub use list::{DescriptorList, SlotId};
pub use policy::{Fifo, ListPolicy, Lru, Mru};
pub use soft::SoftReferenceMemoryCache;

use crate::config::{EvictionPolicyKind, RegionConfig};
use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::stats::Stats;

/// Receives elements a memory cache evicts.
pub trait SpoolTarget<K: CacheKey, V: CacheValue>: Send + Sync {
    fn spool(&self, element: CacheElement<K, V>);
}

pub trait MemoryCache<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Look up a key, update its access time and reorder per policy.
    ///
    /// The returned clone carries the attributes as they were before this
    /// access, so callers can check idle expiry against it.
    fn get(&self, key: &K) -> Option<CacheElement<K, V>>;

    /// Look up a key without touching order or access time.
    fn get_quiet(&self, key: &K) -> Option<CacheElement<K, V>>;

    /// Present entries only.
    fn get_multiple(&self, keys: &[K]) -> HashMap<K, CacheElement<K, V>> {
        keys.iter()
            .filter_map(|k| self.get(k).map(|e| (k.clone(), e)))
            .collect()
    }

    /// Insert or replace. May spool elements if the cache overflows.
    fn update(&self, element: CacheElement<K, V>);

    /// Remove a key. A string key ending in `:` removes every key with that prefix.
    fn remove(&self, key: &K) -> bool;

    fn remove_all(&self);

    /// Evict up to `n` elements to the spool target; returns how many went.
    fn free_elements(&self, n: usize) -> usize;

    fn key_set(&self) -> HashSet<K>;

    fn size(&self) -> usize;

    fn statistics(&self) -> Stats;

    fn policy(&self) -> EvictionPolicyKind;

    /// Drop everything without spooling.
    fn dispose(&self);

    /// Drop elements nothing keeps alive. Only reference-based caches reclaim.
    fn reclaim_unreferenced(&self) -> usize {
        0
    }

    /// Check that the key map and the eviction structure agree.
    fn check_invariants(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Build the memory cache for a region.
pub fn create<K: CacheKey, V: CacheValue>(
    region: &str,
    config: &RegionConfig,
    spool: Arc<dyn SpoolTarget<K, V>>,
) -> Box<dyn MemoryCache<K, V>> {
    match config.eviction_policy {
        EvictionPolicyKind::Lru => Box::new(LinkedMemoryCache::<K, V, Lru>::new(region, config, spool)),
        EvictionPolicyKind::Fifo => Box::new(LinkedMemoryCache::<K, V, Fifo>::new(region, config, spool)),
        EvictionPolicyKind::Mru => Box::new(LinkedMemoryCache::<K, V, Mru>::new(region, config, spool)),
        EvictionPolicyKind::SoftReference => {
            Box::new(SoftReferenceMemoryCache::new(region, config, spool))
        }
    }
}

/// Keys matched by hierarchical removal, or `None` if `key` is not a prefix key.
pub(crate) fn hierarchical_matches<'a, K, I>(key: &K, keys: I) -> Option<Vec<K>>
where
    K: CacheKey,
    I: Iterator<Item = &'a K>,
{
    let prefix = key.as_str_key().filter(|s| s.ends_with(':'))?;
    Some(
        keys.filter(|k| k.as_str_key().is_some_and(|s| s.starts_with(prefix)))
            .cloned()
            .collect(),
    )
}
