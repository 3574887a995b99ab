// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reclaimable memory cache.
//!
//! Elements live in slots that can be emptied by [`reclaim_unreferenced`].
//! A bounded FIFO window of strong references (capacity `max_objects`)
//! pins the most recently touched elements so they survive reclamation.
//!
//! ```text
//!   map:    k1 ─► Slot { referent: Some(e1), strong_refs: 0 }   ◄─ reclaimable
//!           k2 ─► Slot { referent: Some(e2), strong_refs: 1 }
//!           k3 ─► Slot { referent: Some(e3), strong_refs: 2 }
//!
//!   window: front [k2, k3, k3] back        (len <= max_objects)
//! ```
//!
//! Every put or hit pushes the key onto the back of the window. When the
//! window overflows, entries fall off the front; an element whose last
//! window entry falls off is spooled and becomes reclaimable. It stays
//! readable until reclaimed.
//!
//! [`reclaim_unreferenced`]: super::MemoryCache::reclaim_unreferenced

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{hierarchical_matches, MemoryCache, SpoolTarget};
use crate::config::{EvictionPolicyKind, RegionConfig};
use crate::element::{now_millis, CacheElement, CacheKey, CacheValue};
use crate::stats::Stats;

struct SoftSlot<K, V> {
    referent: Option<CacheElement<K, V>>,
    strong_refs: usize,
    generation: u64,
}

struct SoftInner<K, V> {
    map: HashMap<K, SoftSlot<K, V>>,
    window: VecDeque<(K, u64)>,
    next_generation: u64,
}

impl<K: CacheKey, V: CacheValue> SoftInner<K, V> {
    /// Drop window entries beyond `capacity`, returning elements that lost their last pin.
    fn trim(&mut self, capacity: usize) -> Vec<CacheElement<K, V>> {
        let mut unpinned = Vec::new();
        while self.window.len() > capacity {
            let Some((key, generation)) = self.window.pop_front() else {
                break;
            };
            // Entries for replaced or removed slots are stale
            let Some(slot) = self.map.get_mut(&key) else {
                continue;
            };
            if slot.generation != generation {
                continue;
            }
            slot.strong_refs = slot.strong_refs.saturating_sub(1);
            if slot.strong_refs == 0 {
                if let Some(element) = &slot.referent {
                    unpinned.push(element.clone());
                }
            }
        }
        unpinned
    }
}

pub struct SoftReferenceMemoryCache<K, V> {
    region: String,
    max_objects: usize,
    inner: Mutex<SoftInner<K, V>>,
    spool: Arc<dyn SpoolTarget<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    reclaimed: AtomicU64,
}

impl<K: CacheKey, V: CacheValue> SoftReferenceMemoryCache<K, V> {
    pub fn new(region: &str, config: &RegionConfig, spool: Arc<dyn SpoolTarget<K, V>>) -> Self {
        Self {
            region: region.to_string(),
            max_objects: config.max_objects,
            inner: Mutex::new(SoftInner {
                map: HashMap::new(),
                window: VecDeque::new(),
                next_generation: 0,
            }),
            spool,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    fn spool_all(&self, elements: Vec<CacheElement<K, V>>) {
        if elements.is_empty() {
            return;
        }
        crate::metrics::record_eviction(&self.region, elements.len());
        for element in elements {
            self.spool.spool(element);
        }
    }
}

impl<K: CacheKey, V: CacheValue> MemoryCache<K, V> for SoftReferenceMemoryCache<K, V> {
    fn get(&self, key: &K) -> Option<CacheElement<K, V>> {
        let (snapshot, unpinned) = {
            let mut inner = self.inner.lock();
            let inner = &mut *inner;
            let Some(slot) = inner.map.get_mut(key) else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };
            let Some(element) = slot.referent.as_mut() else {
                inner.map.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            };
            let snapshot = element.clone();
            element.attributes.touch(now_millis());
            slot.strong_refs += 1;
            let generation = slot.generation;
            inner.window.push_back((key.clone(), generation));
            (snapshot, inner.trim(self.max_objects))
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.spool_all(unpinned);
        Some(snapshot)
    }

    fn get_quiet(&self, key: &K) -> Option<CacheElement<K, V>> {
        let inner = self.inner.lock();
        inner.map.get(key).and_then(|s| s.referent.clone())
    }

    fn update(&self, element: CacheElement<K, V>) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let unpinned = {
            let mut inner = self.inner.lock();
            let generation = inner.next_generation;
            inner.next_generation += 1;
            let key = element.key().clone();
            inner.map.insert(
                key.clone(),
                SoftSlot {
                    referent: Some(element),
                    strong_refs: 1,
                    generation,
                },
            );
            inner.window.push_back((key, generation));
            inner.trim(self.max_objects)
        };
        self.spool_all(unpinned);
    }

    fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        if let Some(matched) = hierarchical_matches(key, inner.map.keys()) {
            let mut removed = false;
            for k in matched {
                removed |= inner.map.remove(&k).is_some_and(|s| s.referent.is_some());
            }
            return removed;
        }
        inner.map.remove(key).is_some_and(|s| s.referent.is_some())
    }

    fn remove_all(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.window.clear();
    }

    /// Reclamation, not eviction, empties this cache.
    fn free_elements(&self, _n: usize) -> usize {
        0
    }

    fn key_set(&self) -> HashSet<K> {
        let inner = self.inner.lock();
        inner
            .map
            .iter()
            .filter(|(_, s)| s.referent.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn size(&self) -> usize {
        let inner = self.inner.lock();
        inner.map.values().filter(|s| s.referent.is_some()).count()
    }

    fn statistics(&self) -> Stats {
        let (map_size, live, window) = {
            let inner = self.inner.lock();
            let live = inner.map.values().filter(|s| s.referent.is_some()).count();
            (inner.map.len(), live, inner.window.len())
        };
        Stats::new("SoftReference Memory Cache")
            .with("Map Size", map_size)
            .with("Live Elements", live)
            .with("Empty References", map_size - live)
            .with("Strong References", window)
            .with("Max Objects", self.max_objects)
            .with("Put Count", self.puts.load(Ordering::Relaxed))
            .with("Hit Count", self.hits.load(Ordering::Relaxed))
            .with("Miss Count", self.misses.load(Ordering::Relaxed))
            .with("Reclaimed Count", self.reclaimed.load(Ordering::Relaxed))
    }

    fn policy(&self) -> EvictionPolicyKind {
        EvictionPolicyKind::SoftReference
    }

    fn dispose(&self) {
        self.remove_all();
    }

    /// Empty every slot that no window entry pins. Returns how many were reclaimed.
    fn reclaim_unreferenced(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for slot in inner.map.values_mut() {
            if slot.strong_refs == 0 && slot.referent.take().is_some() {
                count += 1;
            }
        }
        drop(inner);
        if count > 0 {
            self.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
            debug!(region = %self.region, reclaimed = count, "Reclaimed unpinned elements");
        }
        count
    }

    fn check_invariants(&self) -> Result<(), String> {
        let inner = self.inner.lock();
        if inner.window.len() > self.max_objects {
            return Err(format!(
                "strong window holds {} entries, capacity {}",
                inner.window.len(),
                self.max_objects
            ));
        }
        let mut pins: HashMap<&K, usize> = HashMap::new();
        for (key, generation) in &inner.window {
            if inner.map.get(key).is_some_and(|s| s.generation == *generation) {
                *pins.entry(key).or_default() += 1;
            }
        }
        for (key, slot) in &inner.map {
            let expected = pins.get(key).copied().unwrap_or(0);
            if slot.strong_refs != expected {
                return Err(format!(
                    "key {} records {} pins, window holds {}",
                    key, slot.strong_refs, expected
                ));
            }
        }
        Ok(())
    }
}
