// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for region-cache.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `region_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `region`: cache region name
//! - `operation`: get, update, remove, remove_all, get_matching, ...
//! - `status`: success, error, rejected
//! - `tier`: memory, purgatory, auxiliary, replica

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a region operation outcome
pub fn record_operation(region: &str, operation: &str, status: &str) {
    counter!(
        "region_cache_operations_total",
        "region" => region.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(region: &str, operation: &str, duration: Duration) {
    histogram!(
        "region_cache_operation_seconds",
        "region" => region.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a get served from a tier
pub fn record_hit(region: &str, tier: &str) {
    counter!(
        "region_cache_hits_total",
        "region" => region.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);
}

/// Record a get that no tier could serve
pub fn record_miss(region: &str) {
    counter!("region_cache_misses_total", "region" => region.to_string()).increment(1);
}

/// Record elements evicted from memory
pub fn record_eviction(region: &str, count: usize) {
    counter!("region_cache_evictions_total", "region" => region.to_string()).increment(count as u64);
}

/// Record elements removed because they expired
pub fn record_expired(region: &str, count: usize) {
    counter!("region_cache_expired_total", "region" => region.to_string()).increment(count as u64);
}

/// Record a spool outcome (stored, failed, timeout, not_allowed, no_store, displaced, rejected)
pub fn record_spool(region: &str, outcome: &str) {
    counter!(
        "region_cache_spool_total",
        "region" => region.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record auxiliary write latency
pub fn record_spool_latency(region: &str, duration: Duration) {
    histogram!("region_cache_spool_seconds", "region" => region.to_string())
        .record(duration.as_secs_f64());
}

/// Set current purgatory size
pub fn set_purgatory_size(region: &str, size: usize) {
    gauge!("region_cache_purgatory_items", "region" => region.to_string()).set(size as f64);
}

/// Set current memory item count
pub fn set_memory_items(region: &str, count: usize) {
    gauge!("region_cache_memory_items", "region" => region.to_string()).set(count as f64);
}

/// Record an element event delivery outcome (delivered, failed, panicked, dropped)
pub fn record_element_event(region: &str, event_type: &str, outcome: &str) {
    counter!(
        "region_cache_element_events_total",
        "region" => region.to_string(),
        "event" => event_type.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a processed remote request
pub fn record_remote_request(request_type: &str, status: &str) {
    counter!(
        "region_cache_remote_requests_total",
        "request" => request_type.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record shutdown drain result
pub fn record_shutdown(region: &str, drained: usize, abandoned: usize) {
    counter!("region_cache_shutdown_drained_total", "region" => region.to_string())
        .increment(drained as u64);
    counter!("region_cache_shutdown_abandoned_total", "region" => region.to_string())
        .increment(abandoned as u64);
}

/// Set number of live regions
pub fn set_region_count(count: usize) {
    gauge!("region_cache_regions").set(count as f64);
}
