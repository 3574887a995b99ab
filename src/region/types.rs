//! Public types for cache regions.

use std::sync::atomic::AtomicU64;

use crate::element::ExpiryReason;
use crate::event::ElementEventType;

pub use crate::waterfall::ShutdownReport;

/// Region lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionStatus {
    /// Accepting operations
    Alive,
    /// Disposed; every operation fails with [`crate::CacheError::Disposed`]
    Disposed,
}

impl std::fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "ALIVE"),
            Self::Disposed => write!(f, "DISPOSED"),
        }
    }
}

/// Result of one shrinker pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShrinkReport {
    /// Elements removed because they expired
    pub expired: usize,
    /// Elements spooled because they sat idle in memory too long
    pub spooled: usize,
}

/// Which tier served a get.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HitTier {
    Memory,
    Purgatory,
    Auxiliary,
    Replica,
}

impl HitTier {
    pub(super) fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Purgatory => "purgatory",
            Self::Auxiliary => "auxiliary",
            Self::Replica => "replica",
        }
    }
}

/// The element event reported when an element is found expired.
pub(super) fn expiry_event(reason: ExpiryReason, background: bool) -> ElementEventType {
    match (reason, background) {
        (ExpiryReason::MaxLife, false) => ElementEventType::ExceededMaxlifeOnRequest,
        (ExpiryReason::MaxLife, true) => ElementEventType::ExceededMaxlifeBackground,
        (ExpiryReason::IdleTime, false) => ElementEventType::ExceededIdletimeOnRequest,
        (ExpiryReason::IdleTime, true) => ElementEventType::ExceededIdletimeBackground,
    }
}

#[derive(Default)]
pub(super) struct RegionCounters {
    pub(super) memory_hits: AtomicU64,
    pub(super) purgatory_hits: AtomicU64,
    pub(super) auxiliary_hits: AtomicU64,
    pub(super) replica_hits: AtomicU64,
    pub(super) misses: AtomicU64,
    pub(super) expired: AtomicU64,
    pub(super) updates: AtomicU64,
    pub(super) removes: AtomicU64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_status_display() {
        assert_eq!(RegionStatus::Alive.to_string(), "ALIVE");
        assert_eq!(RegionStatus::Disposed.to_string(), "DISPOSED");
    }

    #[test]
    fn test_hit_tier_labels() {
        assert_eq!(HitTier::Memory.as_str(), "memory");
        assert_eq!(HitTier::Replica.as_str(), "replica");
    }

    #[test]
    fn test_expiry_event_mapping() {
        assert_eq!(
            expiry_event(ExpiryReason::MaxLife, false),
            ElementEventType::ExceededMaxlifeOnRequest
        );
        assert_eq!(
            expiry_event(ExpiryReason::IdleTime, true),
            ElementEventType::ExceededIdletimeBackground
        );
    }
}
