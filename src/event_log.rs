// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache event logging.
//!
//! Regions and the remote server report every mutating operation and every
//! remote request to a [`CacheEventLogger`]. Loggers are side-effect only:
//! they return nothing and cannot fail the operation they describe.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use crate::element::now_millis;

pub const UPDATE_EVENT: &str = "update";
pub const GET_EVENT: &str = "get";
pub const GET_MULTIPLE_EVENT: &str = "getMultiple";
pub const GET_MATCHING_EVENT: &str = "getMatching";
pub const GET_KEYSET_EVENT: &str = "getKeySet";
pub const REMOVE_EVENT: &str = "remove";
pub const REMOVE_ALL_EVENT: &str = "removeAll";
pub const DISPOSE_EVENT: &str = "dispose";
pub const ALIVE_CHECK_EVENT: &str = "aliveCheck";
pub const SPOOL_EVENT: &str = "spool";
pub const FREE_ELEMENTS_EVENT: &str = "freeElements";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEvent {
    pub source: String,
    pub region: String,
    pub event_name: String,
    pub optional_details: String,
    pub key: Option<String>,
    pub created_at_ms: u64,
}

pub trait CacheEventLogger: Send + Sync {
    fn create_event(
        &self,
        source: &str,
        region: &str,
        event_name: &str,
        optional_details: &str,
        key: Option<String>,
    ) -> CacheEvent {
        CacheEvent {
            source: source.to_string(),
            region: region.to_string(),
            event_name: event_name.to_string(),
            optional_details: optional_details.to_string(),
            key,
            created_at_ms: now_millis(),
        }
    }

    fn log_event(&self, event: &CacheEvent);

    fn log_error(&self, source: &str, event_name: &str, message: &str);

    fn log_application_event(&self, source: &str, event_name: &str, details: &str);
}

/// Writes cache events through `tracing` under the `region_cache::events` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLogger;

impl CacheEventLogger for TracingEventLogger {
    fn log_event(&self, event: &CacheEvent) {
        info!(
            target: "region_cache::events",
            source = %event.source,
            region = %event.region,
            event = %event.event_name,
            key = event.key.as_deref().unwrap_or(""),
            details = %event.optional_details,
            "cache event"
        );
    }

    fn log_error(&self, source: &str, event_name: &str, message: &str) {
        error!(target: "region_cache::events", source, event = event_name, error = message, "cache error");
    }

    fn log_application_event(&self, source: &str, event_name: &str, details: &str) {
        info!(target: "region_cache::events", source, event = event_name, details, "application event");
    }
}

/// What a [`RecordingEventLogger`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggedEntry {
    Event(CacheEvent),
    Error { source: String, event_name: String, message: String },
    Application { source: String, event_name: String, details: String },
}

/// Keeps every logged entry in memory, for audits and tests.
#[derive(Debug, Default)]
pub struct RecordingEventLogger {
    entries: Mutex<Vec<LoggedEntry>>,
}

impl RecordingEventLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LoggedEntry> {
        self.entries.lock().clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<CacheEvent> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                LoggedEntry::Event(ev) => Some(ev.clone()),
                _ => None,
            })
            .collect()
    }

    /// (event_name, message) pairs for every logged error.
    #[must_use]
    pub fn errors(&self) -> Vec<(String, String)> {
        self.entries
            .lock()
            .iter()
            .filter_map(|e| match e {
                LoggedEntry::Error { event_name, message, .. } => {
                    Some((event_name.clone(), message.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl CacheEventLogger for RecordingEventLogger {
    fn log_event(&self, event: &CacheEvent) {
        self.entries.lock().push(LoggedEntry::Event(event.clone()));
    }

    fn log_error(&self, source: &str, event_name: &str, message: &str) {
        self.entries.lock().push(LoggedEntry::Error {
            source: source.to_string(),
            event_name: event_name.to_string(),
            message: message.to_string(),
        });
    }

    fn log_application_event(&self, source: &str, event_name: &str, details: &str) {
        self.entries.lock().push(LoggedEntry::Application {
            source: source.to_string(),
            event_name: event_name.to_string(),
            details: details.to_string(),
        });
    }
}
