//! Configuration for cache regions and the cache manager.
//!
//! # Example
//!
//! ```
//! use region_cache::{RegionConfig, EvictionPolicyKind};
//!
//! // Minimal config (uses defaults)
//! let config = RegionConfig::default();
//! assert_eq!(config.max_objects, 100);
//! assert_eq!(config.max_purgatory_size, Some(5000));
//!
//! // FIFO region that never spools more than one element per overflow
//! let config = RegionConfig {
//!     max_objects: 1_000,
//!     eviction_policy: EvictionPolicyKind::Fifo,
//!     spool_chunk_size: 1,
//!     ..Default::default()
//! };
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CacheError;

/// Which memory cache implementation backs a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicyKind {
    /// Insert at head, move to head on access, free from tail.
    #[default]
    Lru,
    /// Insert at head, never reorder, free from tail (oldest first).
    Fifo,
    /// Insert at head, move to tail on access, free from tail (hottest first).
    Mru,
    /// No ordering; a bounded strong-reference window protects hot elements.
    SoftReference,
}

impl std::fmt::Display for EvictionPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lru => write!(f, "lru"),
            Self::Fifo => write!(f, "fifo"),
            Self::Mru => write!(f, "mru"),
            Self::SoftReference => write!(f, "soft_reference"),
        }
    }
}

/// What happens when purgatory is full and another element is spooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgatoryOverflow {
    /// Drop the oldest staged element (it is never written) and accept the new one.
    #[default]
    EvictOldest,
    /// Keep what is staged and drop the incoming element.
    RejectNew,
}

/// Attribute defaults applied to elements that are put without explicit attributes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElementDefaults {
    /// Maximum life in seconds (-1 = unlimited)
    #[serde(default = "default_unlimited")]
    pub max_life_secs: i64,

    /// Maximum idle time in seconds (-1 = unlimited)
    #[serde(default = "default_unlimited")]
    pub idle_time_secs: i64,

    /// Eternal elements never expire, whatever their life settings
    #[serde(default = "default_true")]
    pub is_eternal: bool,

    /// May the element be spooled to an auxiliary store
    #[serde(default = "default_true")]
    pub is_spool: bool,

    /// May the element be sent to a remote cache
    #[serde(default = "default_true")]
    pub is_remote: bool,

    /// May the element be distributed laterally
    #[serde(default = "default_true")]
    pub is_lateral: bool,
}

fn default_unlimited() -> i64 { -1 }
fn default_true() -> bool { true }

impl Default for ElementDefaults {
    fn default() -> Self {
        Self {
            max_life_secs: default_unlimited(),
            idle_time_secs: default_unlimited(),
            is_eternal: default_true(),
            is_spool: default_true(),
            is_remote: default_true(),
            is_lateral: default_true(),
        }
    }
}

/// Configuration for a single cache region.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionConfig {
    /// Maximum number of elements held in memory (default: 100)
    #[serde(default = "default_max_objects")]
    pub max_objects: usize,

    /// Memory cache implementation
    #[serde(default)]
    pub eviction_policy: EvictionPolicyKind,

    /// Elements spooled per overflow once `max_objects` is exceeded
    #[serde(default = "default_spool_chunk_size")]
    pub spool_chunk_size: usize,

    /// Purgatory bound (`None` = unbounded, default: 5000)
    #[serde(default = "default_max_purgatory_size")]
    pub max_purgatory_size: Option<usize>,

    /// Purgatory overflow handling
    #[serde(default)]
    pub purgatory_overflow: PurgatoryOverflow,

    /// How long dispose waits for purgatory to drain (default: 60s)
    #[serde(default = "default_shutdown_spool_time_limit_secs")]
    pub shutdown_spool_time_limit_secs: u64,

    /// Per-element bound on a single auxiliary write (default: 30s)
    #[serde(default = "default_spool_timeout_ms")]
    pub spool_timeout_ms: u64,

    /// When false, `remove_all` is a logged no-op
    #[serde(default = "default_true")]
    pub allow_remove_all: bool,

    /// Run a background task that removes expired elements
    #[serde(default)]
    pub use_memory_shrinker: bool,

    /// Interval between shrinker passes (default: 30s)
    #[serde(default = "default_shrinker_interval_secs")]
    pub shrinker_interval_secs: u64,

    /// Shrinker spools elements idle in memory longer than this (-1 = never, default: 7200)
    #[serde(default = "default_max_memory_idle_secs")]
    pub max_memory_idle_secs: i64,

    /// Attribute defaults for new elements
    #[serde(default)]
    pub element_defaults: ElementDefaults,
}

fn default_max_objects() -> usize { 100 }
fn default_spool_chunk_size() -> usize { 2 }
fn default_max_purgatory_size() -> Option<usize> { Some(5000) }
fn default_shutdown_spool_time_limit_secs() -> u64 { 60 }
fn default_spool_timeout_ms() -> u64 { 30_000 }
fn default_shrinker_interval_secs() -> u64 { 30 }
fn default_max_memory_idle_secs() -> i64 { 7200 }

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            max_objects: default_max_objects(),
            eviction_policy: EvictionPolicyKind::default(),
            spool_chunk_size: default_spool_chunk_size(),
            max_purgatory_size: default_max_purgatory_size(),
            purgatory_overflow: PurgatoryOverflow::default(),
            shutdown_spool_time_limit_secs: default_shutdown_spool_time_limit_secs(),
            spool_timeout_ms: default_spool_timeout_ms(),
            allow_remove_all: default_true(),
            use_memory_shrinker: false,
            shrinker_interval_secs: default_shrinker_interval_secs(),
            max_memory_idle_secs: default_max_memory_idle_secs(),
            element_defaults: ElementDefaults::default(),
        }
    }
}

impl RegionConfig {
    #[must_use]
    pub fn shutdown_spool_time_limit(&self) -> Duration {
        Duration::from_secs(self.shutdown_spool_time_limit_secs)
    }

    #[must_use]
    pub fn spool_timeout(&self) -> Duration {
        Duration::from_millis(self.spool_timeout_ms)
    }

    #[must_use]
    pub fn shrinker_interval(&self) -> Duration {
        Duration::from_secs(self.shrinker_interval_secs.max(1))
    }

    /// Reject settings that would make the region unusable.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_purgatory_size == Some(0) {
            return Err(CacheError::Config(
                "max_purgatory_size must be positive (use null for unbounded)".into(),
            ));
        }
        if self.spool_timeout_ms == 0 {
            return Err(CacheError::Config("spool_timeout_ms must be positive".into()));
        }
        if self.use_memory_shrinker && self.shrinker_interval_secs == 0 {
            return Err(CacheError::Config("shrinker_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration for a [`crate::CacheManager`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheManagerConfig {
    /// Settings for regions without an explicit entry
    #[serde(default)]
    pub default_region: RegionConfig,

    /// Per-region overrides, keyed by region name
    #[serde(default)]
    pub regions: HashMap<String, RegionConfig>,
}

impl CacheManagerConfig {
    /// Resolve the configuration for a named region.
    #[must_use]
    pub fn region_config(&self, name: &str) -> RegionConfig {
        self.regions
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_region.clone())
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        self.default_region.validate()?;
        for (name, region) in &self.regions {
            region
                .validate()
                .map_err(|e| CacheError::Config(format!("region '{}': {}", name, e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RegionConfig::default();
        assert_eq!(cfg.max_objects, 100);
        assert_eq!(cfg.spool_chunk_size, 2);
        assert_eq!(cfg.max_purgatory_size, Some(5000));
        assert_eq!(cfg.shutdown_spool_time_limit(), Duration::from_secs(60));
        assert_eq!(cfg.eviction_policy, EvictionPolicyKind::Lru);
        assert_eq!(cfg.purgatory_overflow, PurgatoryOverflow::EvictOldest);
        assert!(cfg.allow_remove_all);
        assert!(cfg.element_defaults.is_eternal);
        assert_eq!(cfg.element_defaults.max_life_secs, -1);
    }

    #[test]
    fn test_deserialize_partial() {
        let cfg: RegionConfig = serde_json::from_value(serde_json::json!({
            "max_objects": 5,
            "eviction_policy": "mru",
            "max_purgatory_size": null,
            "purgatory_overflow": "reject_new",
            "element_defaults": { "is_spool": false }
        }))
        .unwrap();

        assert_eq!(cfg.max_objects, 5);
        assert_eq!(cfg.eviction_policy, EvictionPolicyKind::Mru);
        assert_eq!(cfg.max_purgatory_size, None);
        assert_eq!(cfg.purgatory_overflow, PurgatoryOverflow::RejectNew);
        assert!(!cfg.element_defaults.is_spool);
        assert!(cfg.element_defaults.is_remote);
        assert_eq!(cfg.spool_chunk_size, 2);
    }

    #[test]
    fn test_validate_rejects_zero_purgatory() {
        let cfg = RegionConfig { max_purgatory_size: Some(0), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(CacheError::Config(_))));
        assert!(RegionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_manager_region_override() {
        let mut cfg = CacheManagerConfig::default();
        cfg.regions.insert(
            "sessions".into(),
            RegionConfig { max_objects: 7, ..Default::default() },
        );
        assert_eq!(cfg.region_config("sessions").max_objects, 7);
        assert_eq!(cfg.region_config("other").max_objects, 100);
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(EvictionPolicyKind::SoftReference.to_string(), "soft_reference");
        assert_eq!(EvictionPolicyKind::Fifo.to_string(), "fifo");
    }
}
