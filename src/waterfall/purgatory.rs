// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Holding area for elements on their way to the auxiliary store.
//!
//! Entries are kept in arrival order so that a bounded purgatory can find
//! its oldest entry in O(1). Each insert is stamped with a sequence number;
//! the spool worker only writes an entry whose sequence still matches, so a
//! removed or replaced entry is never written.
//!
//! Not synchronized; the waterfall owns it behind a mutex.

use std::collections::HashMap;
use std::time::Instant;

use crate::config::PurgatoryOverflow;
use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::memory::{DescriptorList, SlotId};
use crate::stats::Stats;

#[derive(Debug, Clone)]
pub struct PurgatoryEntry<K, V> {
    pub element: CacheElement<K, V>,
    pub spool_start: Instant,
    seq: u64,
}

/// Result of staging an element.
#[derive(Debug)]
pub enum InsertOutcome<K, V> {
    Inserted { seq: u64 },
    /// Purgatory was full; the oldest entry was dropped to make room.
    Displaced { seq: u64, evicted: CacheElement<K, V> },
    /// Purgatory was full and the overflow policy keeps what is staged.
    Rejected,
}

pub struct Purgatory<K, V> {
    index: HashMap<K, SlotId>,
    order: DescriptorList<PurgatoryEntry<K, V>>,
    max_size: Option<usize>,
    overflow: PurgatoryOverflow,
    next_seq: u64,
    hits: u64,
    displaced: u64,
    rejected: u64,
}

impl<K: CacheKey, V: CacheValue> Purgatory<K, V> {
    #[must_use]
    pub fn new(max_size: Option<usize>, overflow: PurgatoryOverflow) -> Self {
        Self {
            index: HashMap::new(),
            order: DescriptorList::new(),
            max_size,
            overflow,
            next_seq: 0,
            hits: 0,
            displaced: 0,
            rejected: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Stage an element. Re-staging a key replaces its entry in place of a new slot.
    pub fn insert(&mut self, element: CacheElement<K, V>) -> InsertOutcome<K, V> {
        let key = element.key().clone();
        let mut evicted = None;

        if let Some(old) = self.index.remove(&key) {
            self.order.remove(old);
        } else if self.max_size.is_some_and(|max| self.index.len() >= max) {
            match self.overflow {
                PurgatoryOverflow::RejectNew => {
                    self.rejected += 1;
                    return InsertOutcome::Rejected;
                }
                PurgatoryOverflow::EvictOldest => {
                    if let Some(oldest) = self.order.pop_back() {
                        self.index.remove(oldest.element.key());
                        self.displaced += 1;
                        evicted = Some(oldest.element);
                    }
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.order.push_front(PurgatoryEntry {
            element,
            spool_start: Instant::now(),
            seq,
        });
        self.index.insert(key, id);

        match evicted {
            Some(evicted) => InsertOutcome::Displaced { seq, evicted },
            None => InsertOutcome::Inserted { seq },
        }
    }

    /// Read a staged element. Counts a purgatory hit; never removes.
    pub fn get(&mut self, key: &K) -> Option<CacheElement<K, V>> {
        let id = *self.index.get(key)?;
        let entry = self.order.get(id)?;
        self.hits += 1;
        Some(entry.element.clone())
    }

    /// The staged element if its entry still carries `seq`.
    #[must_use]
    pub fn spoolable(&self, key: &K, seq: u64) -> Option<CacheElement<K, V>> {
        let id = *self.index.get(key)?;
        self.order
            .get(id)
            .filter(|e| e.seq == seq)
            .map(|e| e.element.clone())
    }

    pub fn remove(&mut self, key: &K) -> Option<CacheElement<K, V>> {
        let id = self.index.remove(key)?;
        self.order.remove(id).map(|e| e.element)
    }

    /// Remove only if the entry still carries `seq`.
    pub fn remove_if_seq(&mut self, key: &K, seq: u64) -> bool {
        let Some(&id) = self.index.get(key) else {
            return false;
        };
        if self.order.get(id).map(|e| e.seq) != Some(seq) {
            return false;
        }
        self.index.remove(key);
        self.order.remove(id);
        true
    }

    /// Keys staged longest first.
    #[must_use]
    pub fn keys_oldest_first(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.order.iter().map(|e| e.element.key().clone()).collect();
        keys.reverse();
        keys
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    #[must_use]
    pub fn statistics(&self) -> Stats {
        let oldest_ms = self
            .order
            .back()
            .map(|e| e.spool_start.elapsed().as_millis())
            .unwrap_or(0);
        Stats::new("Purgatory")
            .with("Purgatory Size", self.len())
            .with(
                "Max Purgatory Size",
                self.max_size.map_or_else(|| "unbounded".to_string(), |m| m.to_string()),
            )
            .with("Purgatory Hits", self.hits)
            .with("Purgatory Displaced", self.displaced)
            .with("Purgatory Rejected", self.rejected)
            .with("Oldest Entry Age Ms", oldest_ms)
    }
}
