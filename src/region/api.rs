//! Region read and write operations.
//!
//! The `local_*` variants change only this region and its auxiliary store.
//! The remote server uses them so that a request it applies is never sent
//! back out to the replicas it came from.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::element::{now_millis, CacheElement, CacheKey, CacheValue, ElementAttributes, ExpiryReason};
use crate::error::CacheError;
use crate::event_log::{FREE_ELEMENTS_EVENT, REMOVE_ALL_EVENT, REMOVE_EVENT, UPDATE_EVENT};

use super::types::{expiry_event, HitTier};
use super::Region;

impl<K: CacheKey, V: CacheValue> Region<K, V> {
    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get an element, falling through memory, purgatory, the auxiliary
    /// store and the replicas in that order.
    ///
    /// Elements found below memory are promoted back into memory. An
    /// expired element is removed and reported as a miss.
    #[tracing::instrument(skip(self), fields(region = %self.name))]
    pub async fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>, CacheError> {
        self.ensure_alive()?;
        let start = Instant::now();
        let found = self.lookup(key).await;
        crate::metrics::record_latency(&self.name, "get", start.elapsed());

        match found {
            Some((element, tier)) => {
                self.record_hit(tier);
                debug!(key = %key, tier = tier.as_str(), "Cache hit");
                Ok(Some(element))
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_miss(&self.name);
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Look up a key in memory only, without touching order or access time.
    #[must_use]
    pub fn get_quiet(&self, key: &K) -> Option<CacheElement<K, V>> {
        let _guard = self.structure.read();
        self.memory.get_quiet(key)
    }

    /// Get several keys. Only present entries are returned.
    pub async fn get_multiple(&self, keys: &[K]) -> Result<HashMap<K, CacheElement<K, V>>, CacheError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(element) = self.get(key).await? {
                found.insert(key.clone(), element);
            }
        }
        Ok(found)
    }

    /// Get every element whose key matches `pattern` in full.
    ///
    /// Candidates are the keys held in memory and in purgatory. Only keys
    /// with a canonical string form can match.
    #[tracing::instrument(skip(self), fields(region = %self.name))]
    pub async fn get_matching(&self, pattern: &str) -> Result<HashMap<K, CacheElement<K, V>>, CacheError> {
        let candidates = self.key_set()?;
        let matched = self
            .matcher
            .matching_keys(pattern, &mut candidates.into_iter())?;
        let keys: Vec<K> = matched.into_iter().collect();
        self.get_multiple(&keys).await
    }

    /// Keys held in memory and in purgatory.
    pub fn key_set(&self) -> Result<HashSet<K>, CacheError> {
        self.ensure_alive()?;
        let _guard = self.structure.read();
        let mut keys = self.memory.key_set();
        keys.extend(self.waterfall.purgatory_keys());
        Ok(keys)
    }

    /// Number of elements in memory.
    #[must_use]
    pub fn size(&self) -> usize {
        self.memory.size()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cache `value` under `key` with the region's default attributes.
    pub async fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        let attributes = ElementAttributes::from_defaults(&self.config.element_defaults);
        self.update(CacheElement::with_attributes(self.name.clone(), key, value, attributes))
            .await
    }

    /// Insert or replace an element, then send it to the replicas if it is
    /// marked remote.
    #[tracing::instrument(skip(self, element), fields(region = %self.name, key = %element.key()))]
    pub async fn update(&self, element: CacheElement<K, V>) -> Result<(), CacheError> {
        let replicate = (element.attributes.is_remote && !self.replicas.is_empty())
            .then(|| element.clone());
        self.local_update(element)?;

        if let Some(element) = replicate {
            for replica in &self.replicas {
                if let Err(e) = replica.store(&element).await {
                    self.replica_failed(replica.name(), UPDATE_EVENT, &e);
                }
            }
        }
        Ok(())
    }

    /// Insert or replace an element in this region only.
    pub fn local_update(&self, element: CacheElement<K, V>) -> Result<(), CacheError> {
        self.ensure_alive()?;
        if element.region() != self.name {
            return Err(CacheError::RegionMismatch {
                expected: self.name.clone(),
                actual: element.region().to_string(),
            });
        }

        let start = Instant::now();
        self.log_event(UPDATE_EVENT, Some(element.key().to_string()), "");
        {
            let _guard = self.structure.read();
            self.memory.update(element);
        }
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_operation(&self.name, "update", "success");
        crate::metrics::record_latency(&self.name, "update", start.elapsed());
        crate::metrics::set_memory_items(&self.name, self.memory.size());
        Ok(())
    }

    /// Remove a key from every tier and from the replicas.
    ///
    /// A string key ending in `:` removes every key with that prefix from
    /// memory and purgatory. Returns true if anything was removed locally.
    #[tracing::instrument(skip(self), fields(region = %self.name))]
    pub async fn remove(&self, key: &K) -> Result<bool, CacheError> {
        let removed = self.local_remove(key).await?;
        for replica in &self.replicas {
            if let Err(e) = replica.remove(key).await {
                self.replica_failed(replica.name(), REMOVE_EVENT, &e);
            }
        }
        Ok(removed)
    }

    /// Remove a key from this region and its auxiliary store only.
    pub async fn local_remove(&self, key: &K) -> Result<bool, CacheError> {
        self.ensure_alive()?;
        self.log_event(REMOVE_EVENT, Some(key.to_string()), "");

        let (in_memory, in_purgatory) = {
            let _guard = self.structure.read();
            (self.memory.remove(key), self.waterfall.purgatory_remove_matching(key))
        };

        let mut in_auxiliary = false;
        if let Some(aux) = self.waterfall.auxiliary() {
            match aux.remove(key).await {
                Ok(removed) => in_auxiliary = removed,
                Err(e) => {
                    warn!(region = %self.name, key = %key, store = %aux.name(), error = %e,
                        "Auxiliary remove failed");
                    self.logger.log_error(&self.name, REMOVE_EVENT, &format!("{}: {}", key, e));
                }
            }
        }

        let removed = in_memory || in_purgatory || in_auxiliary;
        if removed {
            self.counters.removes.fetch_add(1, Ordering::Relaxed);
        }
        crate::metrics::record_operation(&self.name, "remove", if removed { "success" } else { "absent" });
        crate::metrics::set_memory_items(&self.name, self.memory.size());
        Ok(removed)
    }

    /// Clear every tier and the replicas.
    ///
    /// Returns false, changing nothing, when the region does not allow it.
    #[tracing::instrument(skip(self), fields(region = %self.name))]
    pub async fn remove_all(&self) -> Result<bool, CacheError> {
        if !self.local_remove_all().await? {
            return Ok(false);
        }
        for replica in &self.replicas {
            if let Err(e) = replica.remove_all().await {
                self.replica_failed(replica.name(), REMOVE_ALL_EVENT, &e);
            }
        }
        Ok(true)
    }

    /// Clear this region and its auxiliary store only.
    pub async fn local_remove_all(&self) -> Result<bool, CacheError> {
        self.ensure_alive()?;
        if !self.config.allow_remove_all {
            info!(region = %self.name, "remove_all is disabled for this region, ignoring");
            crate::metrics::record_operation(&self.name, "remove_all", "rejected");
            return Ok(false);
        }

        self.log_event(REMOVE_ALL_EVENT, None, "");
        {
            let _guard = self.structure.write();
            self.memory.remove_all();
            self.waterfall.purgatory_clear();
        }

        if let Some(aux) = self.waterfall.auxiliary() {
            if let Err(e) = aux.remove_all().await {
                warn!(region = %self.name, store = %aux.name(), error = %e, "Auxiliary remove_all failed");
                self.logger.log_error(&self.name, REMOVE_ALL_EVENT, &e.to_string());
            }
        }

        crate::metrics::record_operation(&self.name, "remove_all", "success");
        crate::metrics::set_memory_items(&self.name, 0);
        info!(region = %self.name, "Region cleared");
        Ok(true)
    }

    /// Evict up to `n` elements from memory to the waterfall.
    pub fn free_elements(&self, n: usize) -> usize {
        let freed = {
            let _guard = self.structure.read();
            self.memory.free_elements(n)
        };
        self.log_event(FREE_ELEMENTS_EVENT, None, &format!("requested={} freed={}", n, freed));
        freed
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Internals
    // ═══════════════════════════════════════════════════════════════════════════

    async fn lookup(&self, key: &K) -> Option<(CacheElement<K, V>, HitTier)> {
        let cached = {
            let _guard = self.structure.read();
            self.memory.get(key)
        };
        if let Some(mut element) = cached {
            let now = now_millis();
            if let Some(reason) = element.attributes.is_expired(now) {
                self.expire_on_request(&element, reason).await;
                return None;
            }
            element.attributes.touch(now);
            return Some((element, HitTier::Memory));
        }

        if let Some(element) = self.waterfall.purgatory_get(key) {
            return self.promote(element, HitTier::Purgatory).await;
        }

        if let Some(aux) = self.waterfall.auxiliary() {
            match aux.get(key).await {
                Ok(Some(element)) => return self.promote(element, HitTier::Auxiliary).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(region = %self.name, key = %key, store = %aux.name(), error = %e,
                        "Auxiliary get failed, treating as miss");
                }
            }
        }

        for replica in &self.replicas {
            match replica.get(key).await {
                Ok(Some(element)) => return self.promote(element, HitTier::Replica).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(region = %self.name, key = %key, replica = %replica.name(), error = %e,
                        "Replica get failed");
                }
            }
        }
        None
    }

    /// Put an element found below memory back into memory, unless it expired.
    async fn promote(
        &self,
        mut element: CacheElement<K, V>,
        tier: HitTier,
    ) -> Option<(CacheElement<K, V>, HitTier)> {
        let now = now_millis();
        if let Some(reason) = element.attributes.is_expired(now) {
            self.expire_on_request(&element, reason).await;
            return None;
        }
        element.attributes.touch(now);
        {
            let _guard = self.structure.read();
            self.memory.update(element.clone());
        }
        Some((element, tier))
    }

    async fn expire_on_request(&self, element: &CacheElement<K, V>, reason: ExpiryReason) {
        let key = element.key();
        {
            let _guard = self.structure.read();
            self.memory.remove(key);
            self.waterfall.purgatory_remove(key);
        }
        if let Some(aux) = self.waterfall.auxiliary() {
            if let Err(e) = aux.remove(key).await {
                warn!(region = %self.name, key = %key, error = %e, "Failed to remove expired element from auxiliary");
            }
        }
        self.counters.expired.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_expired(&self.name, 1);
        debug!(region = %self.name, key = %key, ?reason, "Element expired on request");
        self.events.raise(element, expiry_event(reason, false));
    }

    fn record_hit(&self, tier: HitTier) {
        let counter = match tier {
            HitTier::Memory => &self.counters.memory_hits,
            HitTier::Purgatory => &self.counters.purgatory_hits,
            HitTier::Auxiliary => &self.counters.auxiliary_hits,
            HitTier::Replica => &self.counters.replica_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_hit(&self.name, tier.as_str());
    }

    fn replica_failed(&self, replica: &str, event_name: &str, error: &crate::storage::StorageError) {
        warn!(region = %self.name, replica, error = %error, "Replica {} failed", event_name);
        self.logger.log_error(&self.name, event_name, &format!("replica {}: {}", replica, error));
    }
}
