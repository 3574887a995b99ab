// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! List-ordered memory cache (LRU, FIFO, MRU).
//!
//! A key map points into a [`DescriptorList`]; both sit behind one mutex so
//! they can never be observed out of step. Evicted elements are collected
//! under the lock and handed to the spool target after it is released.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::list::{DescriptorList, SlotId};
use super::policy::ListPolicy;
use super::{hierarchical_matches, MemoryCache, SpoolTarget};
use crate::config::{EvictionPolicyKind, RegionConfig};
use crate::element::{now_millis, CacheElement, CacheKey, CacheValue};
use crate::stats::Stats;

struct Inner<K, V> {
    map: HashMap<K, SlotId>,
    list: DescriptorList<CacheElement<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Inner<K, V> {
    fn remove_key(&mut self, key: &K) -> bool {
        match self.map.remove(key) {
            Some(id) => {
                self.list.remove(id);
                true
            }
            None => false,
        }
    }

    fn pop_tail(&mut self, n: usize) -> Vec<CacheElement<K, V>> {
        let mut evicted = Vec::with_capacity(n);
        for _ in 0..n {
            let Some(element) = self.list.pop_back() else {
                break;
            };
            self.map.remove(element.key());
            evicted.push(element);
        }
        evicted
    }
}

pub struct LinkedMemoryCache<K, V, P> {
    region: String,
    max_objects: usize,
    spool_chunk_size: usize,
    inner: Mutex<Inner<K, V>>,
    spool: Arc<dyn SpoolTarget<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    _policy: PhantomData<P>,
}

impl<K: CacheKey, V: CacheValue, P: ListPolicy> LinkedMemoryCache<K, V, P> {
    pub fn new(region: &str, config: &RegionConfig, spool: Arc<dyn SpoolTarget<K, V>>) -> Self {
        Self {
            region: region.to_string(),
            max_objects: config.max_objects,
            spool_chunk_size: config.spool_chunk_size.max(1),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                list: DescriptorList::with_capacity(config.max_objects.min(1 << 16)),
            }),
            spool,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            _policy: PhantomData,
        }
    }

    /// Keys from head to tail, for inspecting eviction order.
    #[must_use]
    pub fn keys_in_order(&self) -> Vec<K> {
        let inner = self.inner.lock();
        inner.list.iter().map(|e| e.key().clone()).collect()
    }

    fn spool_all(&self, evicted: Vec<CacheElement<K, V>>) {
        if evicted.is_empty() {
            return;
        }
        crate::metrics::record_eviction(&self.region, evicted.len());
        for element in evicted {
            self.spool.spool(element);
        }
    }
}

impl<K: CacheKey, V: CacheValue, P: ListPolicy> MemoryCache<K, V> for LinkedMemoryCache<K, V, P> {
    fn get(&self, key: &K) -> Option<CacheElement<K, V>> {
        let mut inner = self.inner.lock();
        let Some(&id) = inner.map.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let element = inner.list.get_mut(id)?;
        let snapshot = element.clone();
        element.attributes.touch(now_millis());
        P::adjust_on_get(&mut inner.list, id);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(snapshot)
    }

    fn get_quiet(&self, key: &K) -> Option<CacheElement<K, V>> {
        let inner = self.inner.lock();
        let id = *inner.map.get(key)?;
        inner.list.get(id).cloned()
    }

    fn update(&self, element: CacheElement<K, V>) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let evicted = {
            let mut inner = self.inner.lock();
            let key = element.key().clone();
            let id = P::place_on_update(&mut inner.list, element);
            if let Some(old) = inner.map.insert(key, id) {
                inner.list.remove(old);
            }
            debug_assert_eq!(inner.map.len(), inner.list.len(), "key map and list diverged");

            let size = inner.map.len();
            if size > self.max_objects {
                let chunk = self.spool_chunk_size.min(size);
                debug!(region = %self.region, size, chunk, "Memory cache over capacity, spooling from tail");
                inner.pop_tail(chunk)
            } else {
                Vec::new()
            }
        };
        self.spool_all(evicted);
    }

    fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        if let Some(matched) = hierarchical_matches(key, inner.map.keys()) {
            let mut removed = false;
            for k in matched {
                removed |= inner.remove_key(&k);
            }
            return removed;
        }
        inner.remove_key(key)
    }

    fn remove_all(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.list.clear();
    }

    fn free_elements(&self, n: usize) -> usize {
        let evicted = self.inner.lock().pop_tail(n);
        let freed = evicted.len();
        self.spool_all(evicted);
        freed
    }

    fn key_set(&self) -> HashSet<K> {
        self.inner.lock().map.keys().cloned().collect()
    }

    fn size(&self) -> usize {
        self.inner.lock().map.len()
    }

    fn statistics(&self) -> Stats {
        let (map_size, list_size) = {
            let inner = self.inner.lock();
            (inner.map.len(), inner.list.len())
        };
        Stats::new(P::NAME)
            .with("List Size", list_size)
            .with("Map Size", map_size)
            .with("Max Objects", self.max_objects)
            .with("Put Count", self.puts.load(Ordering::Relaxed))
            .with("Hit Count", self.hits.load(Ordering::Relaxed))
            .with("Miss Count", self.misses.load(Ordering::Relaxed))
    }

    fn policy(&self) -> EvictionPolicyKind {
        P::KIND
    }

    fn dispose(&self) {
        self.remove_all();
    }

    fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.lock();
        inner.list.validate()?;
        if inner.map.len() != inner.list.len() {
            return Err(format!(
                "map has {} keys, list has {} nodes",
                inner.map.len(),
                inner.list.len()
            ));
        }
        for (key, id) in &inner.map {
            match inner.list.get(*id) {
                Some(element) if element.key() == key => {}
                Some(element) => {
                    return Err(format!("key {} points at node holding {}", key, element.key()))
                }
                None => return Err(format!("key {} points at a freed node", key)),
            }
        }
        Ok(())
    }
}
