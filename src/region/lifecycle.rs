//! Region lifecycle: dispose, the memory shrinker, status and statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::element::{now_millis, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::event_log::DISPOSE_EVENT;
use crate::memory::SpoolTarget;
use crate::stats::Stats;

use super::types::{expiry_event, RegionStatus, ShrinkReport, ShutdownReport};
use super::Region;

impl<K: CacheKey, V: CacheValue> Region<K, V> {
    #[must_use]
    pub fn status(&self) -> RegionStatus {
        if self.alive.load(Ordering::Acquire) {
            RegionStatus::Alive
        } else {
            RegionStatus::Disposed
        }
    }

    /// Shut the region down.
    ///
    /// With an auxiliary store, spoolable memory elements are flushed to it
    /// first. Then purgatory gets up to `shutdown_spool_time_limit_secs` to
    /// drain; whatever is left is abandoned and reported.
    #[tracing::instrument(skip(self), fields(region = %self.name))]
    pub async fn dispose(&self) -> Result<ShutdownReport, CacheError> {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return Err(CacheError::Disposed(self.name.clone()));
        }
        info!(region = %self.name, "Disposing region");

        if let Some(handle) = self.shrinker.lock().take() {
            handle.abort();
        }

        if self.waterfall.auxiliary().is_some() {
            let flushed = self.flush_memory();
            debug!(region = %self.name, flushed, "Flushed memory to auxiliary");
        }

        let limit = self.config.shutdown_spool_time_limit();
        let report = self.waterfall.shutdown(limit).await;
        if report.timed_out {
            warn!(region = %self.name, abandoned = report.abandoned, "Region disposed with unsaved elements");
        }

        if !self.events.dispose(limit).await {
            warn!(region = %self.name, "Element event queue did not drain in time");
        }
        self.memory.dispose();

        if let Some(aux) = self.waterfall.auxiliary() {
            if let Err(e) = aux.dispose().await {
                warn!(region = %self.name, store = %aux.name(), error = %e, "Auxiliary dispose failed");
            }
        }
        for replica in &self.replicas {
            if let Err(e) = replica.dispose().await {
                warn!(region = %self.name, replica = %replica.name(), error = %e, "Replica dispose failed");
            }
        }

        self.log_event(
            DISPOSE_EVENT,
            None,
            &format!("drained={} abandoned={}", report.drained, report.abandoned),
        );
        crate::metrics::set_memory_items(&self.name, 0);
        info!(region = %self.name, drained = report.drained, abandoned = report.abandoned, "Region disposed");
        Ok(report)
    }

    /// Hand every spoolable memory element to the waterfall.
    fn flush_memory(&self) -> usize {
        let _guard = self.structure.write();
        let mut flushed = 0;
        for key in self.memory.key_set() {
            if let Some(element) = self.memory.get_quiet(&key) {
                if element.attributes.is_spool {
                    self.waterfall.spool(element);
                    flushed += 1;
                }
            }
        }
        flushed
    }

    /// One shrinker pass over memory.
    ///
    /// Expired elements are removed and reported with the `*_BACKGROUND`
    /// events. Elements idle in memory longer than `max_memory_idle_secs`
    /// are moved to the waterfall.
    pub fn shrink(&self) -> ShrinkReport {
        let mut report = ShrinkReport::default();
        if self.status() == RegionStatus::Disposed {
            return report;
        }

        let now = now_millis();
        let max_idle = self.config.max_memory_idle_secs;
        for key in self.memory.key_set() {
            let Some(element) = self.memory.get_quiet(&key) else {
                continue;
            };

            if let Some(reason) = element.attributes.is_expired(now) {
                let removed = {
                    let _guard = self.structure.read();
                    self.memory.remove(&key)
                };
                if removed {
                    report.expired += 1;
                    self.events.raise(&element, expiry_event(reason, true));
                }
                continue;
            }

            if let Some(limit) = element.attributes.limit_ms(max_idle) {
                if element.attributes.idle_ms(now) > limit {
                    let removed = {
                        let _guard = self.structure.read();
                        self.memory.remove(&key)
                    };
                    if removed {
                        report.spooled += 1;
                        self.waterfall.spool(element);
                    }
                }
            }
        }

        if report.expired > 0 {
            self.counters.expired.fetch_add(report.expired as u64, Ordering::Relaxed);
            crate::metrics::record_expired(&self.name, report.expired);
        }
        if report.expired > 0 || report.spooled > 0 {
            crate::metrics::set_memory_items(&self.name, self.memory.size());
            debug!(region = %self.name, expired = report.expired, spooled = report.spooled, "Shrinker pass");
        }
        report
    }

    /// Spawn the background shrinker. It holds only a weak reference and
    /// stops once the region is disposed or dropped.
    pub(super) fn start_shrinker(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.config.shrinker_interval();
        let name = self.name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(region) = weak.upgrade() else {
                    break;
                };
                if region.status() == RegionStatus::Disposed {
                    break;
                }
                region.shrink();
            }
            debug!(region = %name, "Memory shrinker stopped");
        });

        *self.shrinker.lock() = Some(handle);
        info!(region = %self.name, interval_secs = interval.as_secs(), "Memory shrinker started");
    }

    /// Counters for this region with memory, waterfall and event queue
    /// statistics as children.
    #[must_use]
    pub fn statistics(&self) -> Stats {
        let c = &self.counters;
        Stats::new("Region")
            .with("Region", &self.name)
            .with("Status", self.status())
            .with("Policy", self.config.eviction_policy)
            .with("Memory Size", self.memory.size())
            .with("Memory Hits", c.memory_hits.load(Ordering::Relaxed))
            .with("Purgatory Hits", c.purgatory_hits.load(Ordering::Relaxed))
            .with("Auxiliary Hits", c.auxiliary_hits.load(Ordering::Relaxed))
            .with("Replica Hits", c.replica_hits.load(Ordering::Relaxed))
            .with("Misses", c.misses.load(Ordering::Relaxed))
            .with("Expired", c.expired.load(Ordering::Relaxed))
            .with("Updates", c.updates.load(Ordering::Relaxed))
            .with("Removes", c.removes.load(Ordering::Relaxed))
            .with("Replicas", self.replicas.len())
            .with_child(self.memory.statistics())
            .with_child(self.waterfall.statistics())
            .with_child(self.events.statistics())
    }

    /// Verify that memory's key map and eviction structure agree.
    pub fn check_invariants(&self) -> Result<(), CacheError> {
        let _guard = self.structure.read();
        self.memory.check_invariants().map_err(CacheError::Invariant)
    }
}
