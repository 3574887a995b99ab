// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Region registry.
//!
//! A [`CacheManager`] owns every region of one key/value type. Regions are
//! created on first access with the configuration resolved for their name
//! and live until they are disposed through the manager.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::config::{CacheManagerConfig, RegionConfig};
use crate::element::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::event_log::{CacheEventLogger, TracingEventLogger};
use crate::matcher::{KeyMatcher, RegexKeyMatcher};
use crate::region::{Region, RegionStatus, ShutdownReport};
use crate::stats::Stats;
use crate::storage::AuxiliaryStore;

/// Supplies the auxiliary store for a newly created region.
pub trait AuxiliaryFactory<K: CacheKey, V: CacheValue>: Send + Sync {
    fn create(&self, region: &str, config: &RegionConfig) -> Option<Arc<dyn AuxiliaryStore<K, V>>>;
}

impl<K, V, F> AuxiliaryFactory<K, V> for F
where
    K: CacheKey,
    V: CacheValue,
    F: Fn(&str, &RegionConfig) -> Option<Arc<dyn AuxiliaryStore<K, V>>> + Send + Sync,
{
    fn create(&self, region: &str, config: &RegionConfig) -> Option<Arc<dyn AuxiliaryStore<K, V>>> {
        self(region, config)
    }
}

pub struct CacheManager<K: CacheKey, V: CacheValue> {
    config: CacheManagerConfig,
    regions: DashMap<String, Arc<Region<K, V>>>,
    logger: Arc<dyn CacheEventLogger>,
    matcher: Arc<dyn KeyMatcher<K>>,
    auxiliary: Option<Arc<dyn AuxiliaryFactory<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> CacheManager<K, V> {
    /// Create a manager. The configuration is validated up front so that
    /// region creation cannot fail on bad settings later.
    pub fn new(config: CacheManagerConfig) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self {
            config,
            regions: DashMap::new(),
            logger: Arc::new(TracingEventLogger),
            matcher: Arc::new(RegexKeyMatcher),
            auxiliary: None,
        })
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn CacheEventLogger>) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn KeyMatcher<K>>) -> Self {
        self.matcher = matcher;
        self
    }

    #[must_use]
    pub fn with_auxiliary_factory(mut self, factory: impl AuxiliaryFactory<K, V> + 'static) -> Self {
        self.auxiliary = Some(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<dyn CacheEventLogger> {
        &self.logger
    }

    /// Get a region, creating it on first access.
    ///
    /// A region that was disposed behind the manager's back is replaced.
    pub fn region(&self, name: &str) -> Result<Arc<Region<K, V>>, CacheError> {
        let region = match self.regions.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status() == RegionStatus::Alive {
                    return Ok(entry.get().clone());
                }
                let region = self.build_region(name)?;
                entry.insert(region.clone());
                region
            }
            Entry::Vacant(entry) => {
                let region = self.build_region(name)?;
                entry.insert(region.clone());
                region
            }
        };
        crate::metrics::set_region_count(self.regions.len());
        Ok(region)
    }

    /// An existing region, without creating one.
    #[must_use]
    pub fn get_region(&self, name: &str) -> Option<Arc<Region<K, V>>> {
        self.regions.get(name).map(|r| r.clone())
    }

    #[must_use]
    pub fn region_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regions.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Remove a region from the registry and dispose it.
    ///
    /// Returns `None` if there was no live region under that name.
    pub async fn dispose_region(&self, name: &str) -> Result<Option<ShutdownReport>, CacheError> {
        let Some((_, region)) = self.regions.remove(name) else {
            return Ok(None);
        };
        crate::metrics::set_region_count(self.regions.len());
        match region.dispose().await {
            Ok(report) => Ok(Some(report)),
            Err(CacheError::Disposed(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Dispose every region.
    pub async fn shutdown(&self) -> HashMap<String, ShutdownReport> {
        let names = self.region_names();
        info!(regions = names.len(), "Cache manager shutting down");

        let mut reports = HashMap::with_capacity(names.len());
        for name in names {
            if let Ok(Some(report)) = self.dispose_region(&name).await {
                reports.insert(name, report);
            }
        }
        info!("Cache manager shut down");
        reports
    }

    #[must_use]
    pub fn statistics(&self) -> Stats {
        let mut stats = Stats::new("Cache Manager").with("Regions", self.regions.len());
        for name in self.region_names() {
            if let Some(region) = self.get_region(&name) {
                stats = stats.with_child(region.statistics());
            }
        }
        stats
    }

    fn build_region(&self, name: &str) -> Result<Arc<Region<K, V>>, CacheError> {
        let config = self.config.region_config(name);
        let mut builder = Region::builder(name)
            .logger(self.logger.clone())
            .matcher(self.matcher.clone());
        if let Some(store) = self.auxiliary.as_ref().and_then(|f| f.create(name, &config)) {
            builder = builder.auxiliary(store);
        }
        builder.config(config).build()
    }
}
