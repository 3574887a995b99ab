// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The overflow path from memory to the auxiliary store.
//!
//! ```text
//!   memory cache ──spool()──► purgatory ──job──► spool worker ──► AuxiliaryStore::store
//!                    │                                 │
//!                    │ not spoolable / no store        │ ok or failed
//!                    ▼                                 ▼
//!               element event               remove purgatory entry
//! ```
//!
//! A single worker writes staged elements one at a time. Failures are
//! logged, reported as `SPOOLED_DISK_NOT_AVAILABLE` and dropped; nothing
//! is retried. On shutdown the waterfall waits for purgatory to drain,
//! up to the region's time limit, and abandons whatever is left.

pub mod purgatory;

pub use purgatory::{InsertOutcome, Purgatory, PurgatoryEntry};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RegionConfig;
use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::event::{ElementEventQueue, ElementEventType};
use crate::event_log::{CacheEventLogger, SPOOL_EVENT};
use crate::memory::SpoolTarget;
use crate::stats::Stats;
use crate::storage::{AuxiliaryStore, StorageError};

/// How a waterfall shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Elements that left purgatory while shutdown waited
    pub drained: usize,
    /// Elements still staged when the time limit ran out
    pub abandoned: usize,
    pub timed_out: bool,
}

struct SpoolJob<K> {
    key: K,
    seq: u64,
}

#[derive(Default)]
struct SpoolCounters {
    staged: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
    not_allowed: AtomicU64,
    no_store: AtomicU64,
    displaced: AtomicU64,
    rejected: AtomicU64,
    skipped: AtomicU64,
}

struct SpoolContext<K: CacheKey, V: CacheValue> {
    region: String,
    purgatory: Arc<Mutex<Purgatory<K, V>>>,
    aux: Arc<dyn AuxiliaryStore<K, V>>,
    events: Arc<ElementEventQueue>,
    logger: Arc<dyn CacheEventLogger>,
    counters: Arc<SpoolCounters>,
    spool_timeout: Duration,
}

pub struct Waterfall<K: CacheKey, V: CacheValue> {
    region: String,
    purgatory: Arc<Mutex<Purgatory<K, V>>>,
    aux: Option<Arc<dyn AuxiliaryStore<K, V>>>,
    events: Arc<ElementEventQueue>,
    jobs: Mutex<Option<mpsc::UnboundedSender<SpoolJob<K>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<SpoolCounters>,
}

impl<K: CacheKey, V: CacheValue> Waterfall<K, V> {
    /// Build the waterfall. With an auxiliary store, starts the spool worker
    /// on the current tokio runtime.
    pub fn new(
        region: &str,
        config: &RegionConfig,
        aux: Option<Arc<dyn AuxiliaryStore<K, V>>>,
        events: Arc<ElementEventQueue>,
        logger: Arc<dyn CacheEventLogger>,
    ) -> Result<Self, CacheError> {
        let purgatory = Arc::new(Mutex::new(Purgatory::new(
            config.max_purgatory_size,
            config.purgatory_overflow,
        )));
        let counters = Arc::new(SpoolCounters::default());

        let (jobs, worker) = match &aux {
            Some(store) => {
                let handle = tokio::runtime::Handle::try_current()
                    .map_err(|_| CacheError::RuntimeUnavailable)?;
                let (tx, rx) = mpsc::unbounded_channel();
                let ctx = SpoolContext {
                    region: region.to_string(),
                    purgatory: purgatory.clone(),
                    aux: store.clone(),
                    events: events.clone(),
                    logger,
                    counters: counters.clone(),
                    spool_timeout: config.spool_timeout(),
                };
                info!(region = %region, store = %store.name(), "Spool worker started");
                (Some(tx), Some(handle.spawn(run_spool_worker(ctx, rx))))
            }
            None => (None, None),
        };

        Ok(Self {
            region: region.to_string(),
            purgatory,
            aux,
            events,
            jobs: Mutex::new(jobs),
            worker: Mutex::new(worker),
            counters,
        })
    }

    #[must_use]
    pub fn auxiliary(&self) -> Option<&Arc<dyn AuxiliaryStore<K, V>>> {
        self.aux.as_ref()
    }

    /// Read from purgatory, counting a hit.
    pub fn purgatory_get(&self, key: &K) -> Option<CacheElement<K, V>> {
        self.purgatory.lock().get(key)
    }

    /// Drop a staged element so it is never written.
    pub fn purgatory_remove(&self, key: &K) -> bool {
        let mut p = self.purgatory.lock();
        let removed = p.remove(key).is_some();
        crate::metrics::set_purgatory_size(&self.region, p.len());
        removed
    }

    /// Drop every staged element whose key `key` hierarchically covers.
    pub fn purgatory_remove_matching(&self, key: &K) -> bool {
        let mut p = self.purgatory.lock();
        let staged = p.keys_oldest_first();
        let removed = match crate::memory::hierarchical_matches(key, staged.iter()) {
            Some(matched) => matched.iter().fold(false, |acc, k| p.remove(k).is_some() | acc),
            None => p.remove(key).is_some(),
        };
        crate::metrics::set_purgatory_size(&self.region, p.len());
        removed
    }

    #[must_use]
    pub fn purgatory_keys(&self) -> Vec<K> {
        self.purgatory.lock().keys_oldest_first()
    }

    pub fn purgatory_clear(&self) {
        self.purgatory.lock().clear();
        crate::metrics::set_purgatory_size(&self.region, 0);
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.purgatory.lock().len()
    }

    /// Wait for purgatory to drain up to `limit`, then stop the worker.
    pub async fn shutdown(&self, limit: Duration) -> ShutdownReport {
        let start = Instant::now();
        let initial = self.pending();

        loop {
            let pending = self.pending();
            if pending == 0 {
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= limit {
                break;
            }
            let remaining = limit - elapsed;
            tokio::time::sleep(remaining.min(Duration::from_millis(100))).await;
        }

        drop(self.jobs.lock().take());
        let abandoned = self.pending();
        if abandoned > 0 {
            warn!(region = %self.region, abandoned, limit_secs = limit.as_secs(),
                "Shutdown spool time limit reached, abandoning staged elements");
            self.purgatory_clear();
        }

        let worker = self.worker.lock().take();
        if let Some(mut handle) = worker {
            let grace = limit.saturating_sub(start.elapsed()).max(Duration::from_millis(100));
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        let report = ShutdownReport {
            drained: initial.saturating_sub(abandoned),
            abandoned,
            timed_out: abandoned > 0,
        };
        crate::metrics::record_shutdown(&self.region, report.drained, report.abandoned);
        info!(region = %self.region, drained = report.drained, abandoned = report.abandoned,
            "Waterfall shut down");
        report
    }

    #[must_use]
    pub fn statistics(&self) -> Stats {
        let c = &self.counters;
        let spool = Stats::new("Waterfall")
            .with(
                "Auxiliary",
                self.aux.as_ref().map_or_else(|| "none".to_string(), |a| a.name().to_string()),
            )
            .with("Staged", c.staged.load(Ordering::Relaxed))
            .with("Stored", c.stored.load(Ordering::Relaxed))
            .with("Failed", c.failed.load(Ordering::Relaxed))
            .with("Skipped", c.skipped.load(Ordering::Relaxed))
            .with("Not Allowed", c.not_allowed.load(Ordering::Relaxed))
            .with("No Store", c.no_store.load(Ordering::Relaxed))
            .with("Displaced", c.displaced.load(Ordering::Relaxed))
            .with("Rejected", c.rejected.load(Ordering::Relaxed));
        spool.with_child(self.purgatory.lock().statistics())
    }
}

impl<K: CacheKey, V: CacheValue> SpoolTarget<K, V> for Waterfall<K, V> {
    fn spool(&self, element: CacheElement<K, V>) {
        if !element.attributes.is_spool {
            self.counters.not_allowed.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_spool(&self.region, "not_allowed");
            debug!(region = %self.region, key = %element.key(), "Element not spoolable, dropping");
            self.events.raise(&element, ElementEventType::SpooledNotAllowed);
            return;
        }

        let jobs = self.jobs.lock();
        let Some(tx) = jobs.as_ref() else {
            self.counters.no_store.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_spool(&self.region, "no_store");
            debug!(region = %self.region, key = %element.key(), "No auxiliary store, dropping element");
            self.events.raise(&element, ElementEventType::SpooledDiskNotAvailable);
            return;
        };

        // Staged under the jobs lock so shutdown cannot slip between stage and send
        let key = element.key().clone();
        let handlers_view = element.clone();
        let (outcome, size) = {
            let mut p = self.purgatory.lock();
            let outcome = p.insert(element);
            (outcome, p.len())
        };
        crate::metrics::set_purgatory_size(&self.region, size);

        let seq = match outcome {
            InsertOutcome::Inserted { seq } => seq,
            InsertOutcome::Displaced { seq, evicted } => {
                self.counters.displaced.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_spool(&self.region, "displaced");
                warn!(region = %self.region, displaced = %evicted.key(), "Purgatory full, dropped oldest staged element");
                self.events.raise(&evicted, ElementEventType::SpooledDiskNotAvailable);
                seq
            }
            InsertOutcome::Rejected => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_spool(&self.region, "rejected");
                warn!(region = %self.region, key = %key, "Purgatory full, rejected element");
                self.events.raise(&handlers_view, ElementEventType::SpooledDiskNotAvailable);
                return;
            }
        };

        self.counters.staged.fetch_add(1, Ordering::Relaxed);
        self.events.raise(&handlers_view, ElementEventType::SpooledDiskAvailable);
        if tx.send(SpoolJob { key: key.clone(), seq }).is_err() {
            self.purgatory.lock().remove_if_seq(&key, seq);
            warn!(region = %self.region, key = %key, "Spool worker gone, element dropped");
        }
    }
}

impl<K: CacheKey, V: CacheValue> Drop for Waterfall<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_spool_worker<K: CacheKey, V: CacheValue>(
    ctx: SpoolContext<K, V>,
    mut rx: mpsc::UnboundedReceiver<SpoolJob<K>>,
) {
    while let Some(SpoolJob { key, seq }) = rx.recv().await {
        let staged = ctx.purgatory.lock().spoolable(&key, seq);
        let Some(element) = staged else {
            // Removed, replaced or displaced since it was queued
            ctx.counters.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        let start = Instant::now();
        let result = tokio::time::timeout(ctx.spool_timeout, ctx.aux.store(&element))
            .await
            .unwrap_or(Err(StorageError::Timeout(ctx.spool_timeout)));
        crate::metrics::record_spool_latency(&ctx.region, start.elapsed());

        match result {
            Ok(()) => {
                ctx.counters.stored.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_spool(&ctx.region, "stored");
            }
            Err(e) => {
                let outcome = match e {
                    StorageError::Timeout(_) => "timeout",
                    _ => "failed",
                };
                ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_spool(&ctx.region, outcome);
                warn!(region = %ctx.region, key = %key, store = %ctx.aux.name(), error = %e,
                    "Spool to auxiliary store failed, dropping element");
                ctx.logger.log_error(&ctx.region, SPOOL_EVENT, &format!("{}: {}", key, e));
                ctx.events.raise(&element, ElementEventType::SpooledDiskNotAvailable);
            }
        }

        let size = {
            let mut p = ctx.purgatory.lock();
            p.remove_if_seq(&key, seq);
            p.len()
        };
        crate::metrics::set_purgatory_size(&ctx.region, size);
    }
    debug!(region = %ctx.region, "Spool worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PurgatoryOverflow;
    use crate::event::{ElementEvent, ElementEventHandler, EventHandlerError};
    use crate::event_log::RecordingEventLogger;
    use crate::storage::InMemoryStore;
    use async_trait::async_trait;

    #[derive(Default)]
    struct TypeRecorder {
        seen: Mutex<Vec<ElementEventType>>,
    }

    impl ElementEventHandler for TypeRecorder {
        fn handle_element_event(&self, event: &ElementEvent) -> Result<(), EventHandlerError> {
            self.seen.lock().push(event.event_type);
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl AuxiliaryStore<String, u32> for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }
        async fn store(&self, _element: &CacheElement<String, u32>) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disk offline".into()))
        }
        async fn remove(&self, _key: &String) -> Result<bool, StorageError> {
            Ok(false)
        }
        async fn remove_all(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    struct SlowStore;

    #[async_trait]
    impl AuxiliaryStore<String, u32> for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }
        async fn store(&self, _element: &CacheElement<String, u32>) -> Result<(), StorageError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        async fn remove(&self, _key: &String) -> Result<bool, StorageError> {
            Ok(false)
        }
        async fn remove_all(&self) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn watched(key: &str, recorder: &Arc<TypeRecorder>) -> CacheElement<String, u32> {
        let attrs = crate::element::ElementAttributes::new().with_handler(recorder.clone());
        CacheElement::with_attributes("test", key.to_string(), 1, attrs)
    }

    fn waterfall(
        aux: Option<Arc<dyn AuxiliaryStore<String, u32>>>,
        config: &RegionConfig,
    ) -> (Waterfall<String, u32>, Arc<ElementEventQueue>, Arc<RecordingEventLogger>) {
        let events = Arc::new(ElementEventQueue::new("test").unwrap());
        let logger = Arc::new(RecordingEventLogger::new());
        let w = Waterfall::new("test", config, aux, events.clone(), logger.clone()).unwrap();
        (w, events, logger)
    }

    #[tokio::test]
    async fn test_spooled_element_reaches_store_and_leaves_purgatory() {
        let store = Arc::new(InMemoryStore::<String, u32>::new());
        let (w, events, _) = waterfall(Some(store.clone()), &RegionConfig::default());
        let recorder = Arc::new(TypeRecorder::default());

        w.spool(watched("a", &recorder));
        let report = w.shutdown(Duration::from_secs(5)).await;

        assert!(store.contains(&"a".to_string()));
        assert_eq!(w.pending(), 0);
        assert_eq!(report.abandoned, 0);
        assert!(events.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(*recorder.seen.lock(), vec![ElementEventType::SpooledDiskAvailable]);
    }

    #[tokio::test]
    async fn test_no_store_raises_not_available() {
        let (w, events, _) = waterfall(None, &RegionConfig::default());
        let recorder = Arc::new(TypeRecorder::default());
        w.spool(watched("a", &recorder));

        assert_eq!(w.pending(), 0);
        assert!(events.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(*recorder.seen.lock(), vec![ElementEventType::SpooledDiskNotAvailable]);
    }

    #[tokio::test]
    async fn test_not_spoolable_raises_not_allowed() {
        let store = Arc::new(InMemoryStore::<String, u32>::new());
        let (w, events, _) = waterfall(Some(store.clone()), &RegionConfig::default());
        let recorder = Arc::new(TypeRecorder::default());
        let mut e = watched("a", &recorder);
        e.attributes.is_spool = false;

        w.spool(e);
        w.shutdown(Duration::from_secs(1)).await;
        assert!(store.is_empty());
        assert!(events.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(*recorder.seen.lock(), vec![ElementEventType::SpooledNotAllowed]);
    }

    #[tokio::test]
    async fn test_store_failure_is_logged_and_dropped() {
        let (w, events, logger) = waterfall(Some(Arc::new(FailingStore)), &RegionConfig::default());
        let recorder = Arc::new(TypeRecorder::default());
        w.spool(watched("a", &recorder));

        let report = w.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.abandoned, 0);
        assert_eq!(w.pending(), 0);
        assert!(events.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(
            *recorder.seen.lock(),
            vec![ElementEventType::SpooledDiskAvailable, ElementEventType::SpooledDiskNotAvailable]
        );
        assert_eq!(logger.errors().len(), 1);
        assert_eq!(w.statistics().get("Failed"), Some("1"));
    }

    #[tokio::test]
    async fn test_store_timeout_reports_timeout_error() {
        let config = RegionConfig { spool_timeout_ms: 20, ..Default::default() };
        let (w, _events, logger) = waterfall(Some(Arc::new(SlowStore)), &config);
        let recorder = Arc::new(TypeRecorder::default());
        w.spool(watched("a", &recorder));

        let report = w.shutdown(Duration::from_secs(5)).await;
        assert_eq!(report.abandoned, 0);
        assert_eq!(w.statistics().get("Failed"), Some("1"));

        let errors = logger.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, SPOOL_EVENT);
        let expected = StorageError::Timeout(Duration::from_millis(20)).to_string();
        assert!(errors[0].1.ends_with(&expected), "unexpected message {}", errors[0].1);
    }

    #[tokio::test]
    async fn test_removed_before_write_is_never_stored() {
        let store = Arc::new(InMemoryStore::<String, u32>::new());
        let (w, _events, _) = waterfall(Some(store.clone()), &RegionConfig::default());
        let recorder = Arc::new(TypeRecorder::default());

        // The worker cannot run before the first await on this runtime
        w.spool(watched("a", &recorder));
        assert!(w.purgatory_remove(&"a".to_string()));
        w.shutdown(Duration::from_secs(5)).await;

        assert!(!store.contains(&"a".to_string()));
        assert_eq!(w.statistics().get("Skipped"), Some("1"));
    }

    #[tokio::test]
    async fn test_reject_new_overflow() {
        let store = Arc::new(InMemoryStore::<String, u32>::new());
        let config = RegionConfig {
            max_purgatory_size: Some(1),
            purgatory_overflow: PurgatoryOverflow::RejectNew,
            ..Default::default()
        };
        let (w, events, _) = waterfall(Some(store.clone()), &config);
        let recorder = Arc::new(TypeRecorder::default());

        w.spool(watched("a", &recorder));
        w.spool(watched("b", &recorder));
        assert_eq!(w.pending(), 1);
        w.shutdown(Duration::from_secs(5)).await;

        assert!(store.contains(&"a".to_string()));
        assert!(!store.contains(&"b".to_string()));
        assert_eq!(w.statistics().get("Rejected"), Some("1"));
        assert!(events.wait_idle(Duration::from_secs(5)).await);
        assert!(recorder.seen.lock().contains(&ElementEventType::SpooledDiskNotAvailable));
    }

    #[tokio::test]
    async fn test_evict_oldest_overflow() {
        let store = Arc::new(InMemoryStore::<String, u32>::new());
        let config = RegionConfig {
            max_purgatory_size: Some(1),
            purgatory_overflow: PurgatoryOverflow::EvictOldest,
            ..Default::default()
        };
        let (w, _events, _) = waterfall(Some(store.clone()), &config);
        let recorder = Arc::new(TypeRecorder::default());

        w.spool(watched("a", &recorder));
        w.spool(watched("b", &recorder));
        w.shutdown(Duration::from_secs(5)).await;

        assert!(!store.contains(&"a".to_string()));
        assert!(store.contains(&"b".to_string()));
        assert_eq!(w.statistics().get("Displaced"), Some("1"));
    }
}
