// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Composite cache region.
//!
//! A [`Region`] is the top-level namespace that ties together:
//! - a [`MemoryCache`] chosen by the region's eviction policy
//! - the [`Waterfall`] (purgatory + spool worker) to an optional auxiliary store
//! - optional replicas (remote caches) that receive updates and removals
//! - the region's [`ElementEventQueue`]
//!
//! # Read path
//!
//! ```text
//! get(key) → memory → purgatory → auxiliary → replicas → miss
//!              │          │           │           │
//!              └──────────┴───── promote to memory ┘
//! ```
//!
//! Expired elements found on any tier count as misses and are removed.
//!
//! # Example
//!
//! ```rust,no_run
//! use region_cache::{Region, RegionConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), region_cache::CacheError> {
//! let region = Region::<String, String>::builder("users")
//!     .config(RegionConfig { max_objects: 1_000, ..Default::default() })
//!     .build()?;
//!
//! region.put("alice".to_string(), "admin".to_string()).await?;
//! assert_eq!(region.get(&"alice".to_string()).await?.map(|e| e.value), Some("admin".into()));
//!
//! region.dispose().await?;
//! # Ok(())
//! # }
//! ```

mod api;
mod lifecycle;
mod types;

pub use types::{RegionStatus, ShrinkReport, ShutdownReport};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::RegionConfig;
use crate::element::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::event::ElementEventQueue;
use crate::event_log::{CacheEventLogger, TracingEventLogger};
use crate::matcher::{KeyMatcher, RegexKeyMatcher};
use crate::memory::{self, MemoryCache, SpoolTarget};
use crate::storage::AuxiliaryStore;
use crate::waterfall::Waterfall;

use types::RegionCounters;

/// A named cache region.
///
/// # Thread Safety
///
/// `Region` is `Send + Sync` and meant to be shared behind an `Arc`.
/// Every structural mutation of memory and purgatory runs under the
/// region's structure lock; `remove_all` takes it exclusively so that a
/// concurrent get or update never sees a half-cleared region.
pub struct Region<K: CacheKey, V: CacheValue> {
    pub(super) name: String,
    pub(super) config: RegionConfig,

    /// Primary store
    pub(super) memory: Box<dyn MemoryCache<K, V>>,

    /// Overflow path to the auxiliary store
    pub(super) waterfall: Arc<Waterfall<K, V>>,

    pub(super) events: Arc<ElementEventQueue>,

    /// Remote caches kept in step with this region
    pub(super) replicas: Vec<Arc<dyn AuxiliaryStore<K, V>>>,

    pub(super) matcher: Arc<dyn KeyMatcher<K>>,
    pub(super) logger: Arc<dyn CacheEventLogger>,

    /// Shared for get/update/remove, exclusive for remove_all
    pub(super) structure: RwLock<()>,

    pub(super) alive: AtomicBool,
    pub(super) shrinker: Mutex<Option<JoinHandle<()>>>,
    pub(super) counters: RegionCounters,
}

/// Builder for [`Region`].
pub struct RegionBuilder<K: CacheKey, V: CacheValue> {
    name: String,
    config: RegionConfig,
    auxiliary: Option<Arc<dyn AuxiliaryStore<K, V>>>,
    replicas: Vec<Arc<dyn AuxiliaryStore<K, V>>>,
    matcher: Option<Arc<dyn KeyMatcher<K>>>,
    logger: Option<Arc<dyn CacheEventLogger>>,
}

impl<K: CacheKey, V: CacheValue> RegionBuilder<K, V> {
    #[must_use]
    pub fn config(mut self, config: RegionConfig) -> Self {
        self.config = config;
        self
    }

    /// The store evicted elements are spooled to.
    #[must_use]
    pub fn auxiliary(mut self, store: Arc<dyn AuxiliaryStore<K, V>>) -> Self {
        self.auxiliary = Some(store);
        self
    }

    /// A remote cache that receives this region's updates and removals.
    #[must_use]
    pub fn replica(mut self, store: Arc<dyn AuxiliaryStore<K, V>>) -> Self {
        self.replicas.push(store);
        self
    }

    #[must_use]
    pub fn matcher(mut self, matcher: Arc<dyn KeyMatcher<K>>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn CacheEventLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Validate the config and assemble the region.
    ///
    /// Must be called inside a tokio runtime: the event queue, the spool
    /// worker and the optional shrinker are spawned here.
    pub fn build(self) -> Result<Arc<Region<K, V>>, CacheError> {
        self.config.validate()?;

        let logger = self
            .logger
            .unwrap_or_else(|| Arc::new(TracingEventLogger) as Arc<dyn CacheEventLogger>);
        let matcher = self
            .matcher
            .unwrap_or_else(|| Arc::new(RegexKeyMatcher) as Arc<dyn KeyMatcher<K>>);

        let events = Arc::new(ElementEventQueue::new(self.name.clone())?);
        let waterfall = Arc::new(Waterfall::new(
            &self.name,
            &self.config,
            self.auxiliary,
            events.clone(),
            logger.clone(),
        )?);
        let spool: Arc<dyn SpoolTarget<K, V>> = waterfall.clone();
        let memory = memory::create(&self.name, &self.config, spool);

        let region = Arc::new(Region {
            name: self.name,
            config: self.config,
            memory,
            waterfall,
            events,
            replicas: self.replicas,
            matcher,
            logger,
            structure: RwLock::new(()),
            alive: AtomicBool::new(true),
            shrinker: Mutex::new(None),
            counters: RegionCounters::default(),
        });

        if region.config.use_memory_shrinker {
            region.start_shrinker();
        }

        tracing::info!(
            region = %region.name,
            policy = %region.config.eviction_policy,
            max_objects = region.config.max_objects,
            auxiliary = region.waterfall.auxiliary().map(|a| a.name()).unwrap_or("none"),
            replicas = region.replicas.len(),
            "Region created"
        );
        Ok(region)
    }
}

impl<K: CacheKey, V: CacheValue> Region<K, V> {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RegionBuilder<K, V> {
        RegionBuilder {
            name: name.into(),
            config: RegionConfig::default(),
            auxiliary: None,
            replicas: Vec::new(),
            matcher: None,
            logger: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// The region's element event queue.
    #[must_use]
    pub fn events(&self) -> &Arc<ElementEventQueue> {
        &self.events
    }

    /// Number of elements staged for the auxiliary store.
    #[must_use]
    pub fn purgatory_size(&self) -> usize {
        self.waterfall.pending()
    }

    /// Drop memory elements that nothing keeps alive (reference policy only).
    pub fn reclaim_unreferenced(&self) -> usize {
        self.memory.reclaim_unreferenced()
    }

    pub(super) fn ensure_alive(&self) -> Result<(), CacheError> {
        if self.alive.load(std::sync::atomic::Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::Disposed(self.name.clone()))
        }
    }

    pub(super) fn log_event(&self, event_name: &str, key: Option<String>, details: &str) {
        let event = self
            .logger
            .create_event("region", &self.name, event_name, details, key);
        self.logger.log_event(&event);
    }
}

impl<K: CacheKey, V: CacheValue> Drop for Region<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.shrinker.get_mut().take() {
            handle.abort();
        }
    }
}
