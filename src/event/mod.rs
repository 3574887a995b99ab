// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Element lifecycle events.
//!
//! Handlers are attached to individual elements through their
//! [`ElementAttributes`](crate::ElementAttributes). When something happens
//! to the element (it expires, is spooled, or could not be spooled) the
//! region enqueues one [`ElementEvent`] per handler on its
//! [`ElementEventQueue`], which delivers them in order on a worker task.

mod queue;

pub use queue::ElementEventQueue;

use serde::Serialize;
use thiserror::Error;

use crate::element::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementEventType {
    /// Max life exceeded, found by the background shrinker
    ExceededMaxlifeBackground,
    /// Max life exceeded, found on a get
    ExceededMaxlifeOnRequest,
    /// Idle time exceeded, found by the background shrinker
    ExceededIdletimeBackground,
    /// Idle time exceeded, found on a get
    ExceededIdletimeOnRequest,
    /// Handed to the auxiliary store
    SpooledDiskAvailable,
    /// No auxiliary store, or the store failed; the element is gone
    SpooledDiskNotAvailable,
    /// The element's attributes forbid spooling
    SpooledNotAllowed,
}

impl ElementEventType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExceededMaxlifeBackground => "EXCEEDED_MAXLIFE_BACKGROUND",
            Self::ExceededMaxlifeOnRequest => "EXCEEDED_MAXLIFE_ONREQUEST",
            Self::ExceededIdletimeBackground => "EXCEEDED_IDLETIME_BACKGROUND",
            Self::ExceededIdletimeOnRequest => "EXCEEDED_IDLETIME_ONREQUEST",
            Self::SpooledDiskAvailable => "SPOOLED_DISK_AVAILABLE",
            Self::SpooledDiskNotAvailable => "SPOOLED_DISK_NOT_AVAILABLE",
            Self::SpooledNotAllowed => "SPOOLED_NOT_ALLOWED",
        }
    }
}

impl std::fmt::Display for ElementEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed lifecycle event for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementEvent {
    pub event_type: ElementEventType,
    pub region: String,
    /// Display form of the element's key
    pub key: String,
    pub occurred_at_ms: u64,
}

impl ElementEvent {
    pub fn new(event_type: ElementEventType, region: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_type,
            region: region.into(),
            key: key.into(),
            occurred_at_ms: now_millis(),
        }
    }
}

#[derive(Error, Debug)]
#[error("Element event handler failed: {0}")]
pub struct EventHandlerError(pub String);

/// Receives element events on the region's event worker.
///
/// Handlers run on a blocking thread, one event at a time. A failing or
/// panicking handler is counted and skipped.
pub trait ElementEventHandler: Send + Sync {
    fn handle_element_event(&self, event: &ElementEvent) -> Result<(), EventHandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_display() {
        assert_eq!(
            ElementEventType::SpooledDiskNotAvailable.to_string(),
            "SPOOLED_DISK_NOT_AVAILABLE"
        );
        assert_eq!(
            ElementEventType::ExceededIdletimeOnRequest.to_string(),
            "EXCEEDED_IDLETIME_ONREQUEST"
        );
    }

    #[test]
    fn test_event_serializes_type_name() {
        let event = ElementEvent::new(ElementEventType::SpooledNotAllowed, "r", "k");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "SPOOLED_NOT_ALLOWED");
        assert_eq!(json["region"], "r");
    }
}
