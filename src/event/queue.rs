// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ordered per-region delivery of element events.
//!
//! ```text
//! add_element_event ──► mpsc (unbounded) ──► worker ──► spawn_blocking(handler)
//!                                               │
//!                                         strictly FIFO
//! ```
//!
//! Disposing the queue closes the channel; the worker drains what was
//! already queued and exits. If draining outlives the timeout the worker
//! is aborted and the remainder is lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ElementEvent, ElementEventHandler, ElementEventType};
use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::stats::Stats;

struct QueuedEvent {
    handler: Arc<dyn ElementEventHandler>,
    event: ElementEvent,
}

#[derive(Default)]
struct QueueCounters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueCounters {
    fn processed(&self) -> u64 {
        self.delivered.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire)
    }
}

pub struct ElementEventQueue {
    region: String,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<QueueCounters>,
}

impl ElementEventQueue {
    /// Create the queue and start its worker on the current tokio runtime.
    pub fn new(region: impl Into<String>) -> Result<Self, CacheError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| CacheError::RuntimeUnavailable)?;
        let region = region.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(QueueCounters::default());
        let worker = handle.spawn(run_event_worker(region.clone(), rx, counters.clone()));

        debug!(region = %region, "Element event queue started");
        Ok(Self {
            region,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            counters,
        })
    }

    /// Enqueue an event for one handler. Returns false if the event was dropped.
    pub fn add_element_event(&self, handler: Arc<dyn ElementEventHandler>, event: ElementEvent) -> bool {
        let event_type = event.event_type;
        let guard = self.sender.lock();
        let Some(tx) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_element_event(&self.region, event_type.as_str(), "dropped");
            debug!(region = %self.region, event = %event_type, "Event queue disposed, dropping event");
            return false;
        };
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        if tx.send(QueuedEvent { handler, event }).is_err() {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(region = %self.region, event = %event_type, "Event worker gone, dropping event");
            return false;
        }
        true
    }

    /// Raise an event for every handler registered on the element.
    pub fn raise<K: CacheKey, V: CacheValue>(&self, element: &CacheElement<K, V>, event_type: ElementEventType) {
        let handlers = element.attributes.handlers();
        if handlers.is_empty() {
            return;
        }
        let key = element.key().to_string();
        for handler in handlers {
            let event = ElementEvent::new(event_type, element.region(), key.clone());
            self.add_element_event(handler.clone(), event);
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Events accepted but not yet delivered or failed.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.counters
            .queued
            .load(Ordering::Acquire)
            .saturating_sub(self.counters.processed())
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// Wait until every accepted event has been handled. Returns false on timeout.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let start = Instant::now();
        while self.pending() > 0 {
            if start.elapsed() >= limit {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Stop accepting events and drain what is queued, bounded by `limit`.
    ///
    /// Returns true if the worker finished draining in time.
    pub async fn dispose(&self, limit: Duration) -> bool {
        // Dropping the sender closes the channel once the worker empties it
        drop(self.sender.lock().take());
        let handle = self.worker.lock().take();
        let Some(mut handle) = handle else {
            return true;
        };

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(_) => {
                info!(region = %self.region, delivered = self.counters.delivered.load(Ordering::Relaxed),
                    "Element event queue drained");
                true
            }
            Err(_) => {
                handle.abort();
                warn!(region = %self.region, pending = self.pending(),
                    "Element event queue did not drain in time, abandoning remaining events");
                false
            }
        }
    }

    #[must_use]
    pub fn statistics(&self) -> Stats {
        Stats::new("Element Event Queue")
            .with("Alive", self.is_alive())
            .with("Events Queued", self.counters.queued.load(Ordering::Relaxed))
            .with("Events Delivered", self.counters.delivered.load(Ordering::Relaxed))
            .with("Events Failed", self.counters.failed.load(Ordering::Relaxed))
            .with("Events Dropped", self.counters.dropped.load(Ordering::Relaxed))
    }
}

impl Drop for ElementEventQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_event_worker(
    region: String,
    mut rx: mpsc::UnboundedReceiver<QueuedEvent>,
    counters: Arc<QueueCounters>,
) {
    while let Some(QueuedEvent { handler, event }) = rx.recv().await {
        let event_type = event.event_type;
        let outcome = tokio::task::spawn_blocking(move || handler.handle_element_event(&event)).await;
        match outcome {
            Ok(Ok(())) => {
                counters.delivered.fetch_add(1, Ordering::AcqRel);
                crate::metrics::record_element_event(&region, event_type.as_str(), "delivered");
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::AcqRel);
                crate::metrics::record_element_event(&region, event_type.as_str(), "failed");
                warn!(region = %region, event = %event_type, error = %e, "Element event handler failed");
            }
            Err(join_err) => {
                counters.failed.fetch_add(1, Ordering::AcqRel);
                crate::metrics::record_element_event(&region, event_type.as_str(), "panicked");
                warn!(region = %region, event = %event_type, error = %join_err, "Element event handler panicked");
            }
        }
    }
    debug!(region = %region, "Element event worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventHandlerError;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ElementEventHandler for Recorder {
        fn handle_element_event(&self, event: &ElementEvent) -> Result<(), EventHandlerError> {
            if event.key == "boom" {
                panic!("handler blew up");
            }
            if event.key == "fail" {
                return Err(EventHandlerError("refused".into()));
            }
            self.seen.lock().push(event.key.clone());
            Ok(())
        }
    }

    fn event(key: &str) -> ElementEvent {
        ElementEvent::new(ElementEventType::SpooledDiskAvailable, "test", key)
    }

    #[tokio::test]
    async fn test_delivers_in_enqueue_order() {
        let queue = ElementEventQueue::new("test").unwrap();
        let recorder = Arc::new(Recorder::default());
        for i in 0..50 {
            assert!(queue.add_element_event(recorder.clone(), event(&i.to_string())));
        }
        assert!(queue.wait_idle(Duration::from_secs(5)).await);

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(*recorder.seen.lock(), expected);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_later_events() {
        let queue = ElementEventQueue::new("test").unwrap();
        let recorder = Arc::new(Recorder::default());
        queue.add_element_event(recorder.clone(), event("a"));
        queue.add_element_event(recorder.clone(), event("boom"));
        queue.add_element_event(recorder.clone(), event("fail"));
        queue.add_element_event(recorder.clone(), event("b"));
        assert!(queue.wait_idle(Duration::from_secs(5)).await);

        assert_eq!(*recorder.seen.lock(), vec!["a".to_string(), "b".to_string()]);
        let stats = queue.statistics();
        assert_eq!(stats.get("Events Failed"), Some("2"));
        assert_eq!(stats.get("Events Delivered"), Some("2"));
    }

    #[tokio::test]
    async fn test_events_after_dispose_are_dropped() {
        let queue = ElementEventQueue::new("test").unwrap();
        let recorder = Arc::new(Recorder::default());
        queue.add_element_event(recorder.clone(), event("before"));
        assert!(queue.dispose(Duration::from_secs(5)).await);

        assert!(!queue.add_element_event(recorder.clone(), event("after")));
        assert_eq!(queue.dropped(), 1);
        assert_eq!(*recorder.seen.lock(), vec!["before".to_string()]);
        assert!(!queue.is_alive());
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(
            ElementEventQueue::new("no-runtime"),
            Err(CacheError::RuntimeUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_raise_fans_out_to_element_handlers() {
        let queue = ElementEventQueue::new("test").unwrap();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let attrs = crate::element::ElementAttributes::new()
            .with_handler(first.clone())
            .with_handler(second.clone());
        let elem = CacheElement::with_attributes("test", "k1".to_string(), 1u8, attrs);

        queue.raise(&elem, ElementEventType::SpooledNotAllowed);
        assert!(queue.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(*first.seen.lock(), vec!["k1".to_string()]);
        assert_eq!(*second.seen.lock(), vec!["k1".to_string()]);
    }
}
