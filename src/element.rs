//! Cache elements and their per-element attributes.
//!
//! A [`CacheElement`] binds a key and a value to the region that owns it.
//! The region name and key never change after construction; the value and
//! [`ElementAttributes`] are only mutated by the owning memory cache.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ElementDefaults;
use crate::event::ElementEventHandler;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Requirements for a cache key.
///
/// Keys need a canonical string form to take part in pattern matching and
/// hierarchical removal. Only string keys provide one; every other key type
/// is invisible to `GET_MATCHING` and to prefix removal.
pub trait CacheKey:
    Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The strict string form of the key, if it has one.
    fn as_str_key(&self) -> Option<&str> {
        None
    }
}

impl CacheKey for String {
    fn as_str_key(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

macro_rules! impl_numeric_key {
    ($($t:ty),*) => {
        $(impl CacheKey for $t {})*
    };
}

impl_numeric_key!(u16, u32, u64, u128, usize, i16, i32, i64, i128, isize);

/// Cache values are opaque: anything cloneable and serializable.
///
/// Values are cloned out on every read, so large payloads should be
/// wrapped in an `Arc`.
pub trait CacheValue: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Why an element is considered expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    MaxLife,
    IdleTime,
}

/// Mutable per-element attributes.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElementAttributes {
    /// May be spooled to an auxiliary store
    pub is_spool: bool,
    /// May be distributed laterally
    pub is_lateral: bool,
    /// May be sent to a remote cache
    pub is_remote: bool,
    /// Never expires, regardless of `max_life_secs` and `idle_time_secs`
    pub is_eternal: bool,
    /// Maximum life in "seconds" (-1 = unlimited)
    pub max_life_secs: i64,
    /// Maximum idle time in "seconds" (-1 = unlimited)
    pub idle_time_secs: i64,
    /// Caller-supplied size hint, in bytes
    pub size: usize,
    pub create_time_ms: u64,
    pub last_access_time_ms: u64,
    /// Length of one "second" in milliseconds (default 1000)
    pub time_factor_ms: u64,
    #[serde(skip)]
    handlers: Vec<Arc<dyn ElementEventHandler>>,
}

impl ElementAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::from_defaults(&ElementDefaults::default())
    }

    /// Build attributes from a region's configured defaults.
    #[must_use]
    pub fn from_defaults(defaults: &ElementDefaults) -> Self {
        let now = now_millis();
        Self {
            is_spool: defaults.is_spool,
            is_lateral: defaults.is_lateral,
            is_remote: defaults.is_remote,
            is_eternal: defaults.is_eternal,
            max_life_secs: defaults.max_life_secs,
            idle_time_secs: defaults.idle_time_secs,
            size: 0,
            create_time_ms: now,
            last_access_time_ms: now,
            time_factor_ms: 1000,
            handlers: Vec::new(),
        }
    }

    /// Set a maximum life. This also makes the element non-eternal.
    #[must_use]
    pub fn with_max_life(mut self, secs: i64) -> Self {
        self.max_life_secs = secs;
        self.is_eternal = false;
        self
    }

    /// Set a maximum idle time. This also makes the element non-eternal.
    #[must_use]
    pub fn with_idle_time(mut self, secs: i64) -> Self {
        self.idle_time_secs = secs;
        self.is_eternal = false;
        self
    }

    #[must_use]
    pub fn with_spool(mut self, is_spool: bool) -> Self {
        self.is_spool = is_spool;
        self
    }

    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ElementEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn add_handler(&mut self, handler: Arc<dyn ElementEventHandler>) {
        self.handlers.push(handler);
    }

    #[must_use]
    pub fn handlers(&self) -> &[Arc<dyn ElementEventHandler>] {
        &self.handlers
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_access_time_ms = now_ms;
    }

    /// Milliseconds since creation.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.create_time_ms)
    }

    #[must_use]
    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_access_time_ms)
    }

    /// `secs` scaled by this element's time factor, or `None` when unlimited.
    ///
    /// Saturates at `u64::MAX`, which no age or idle time can exceed.
    #[must_use]
    pub fn limit_ms(&self, secs: i64) -> Option<u64> {
        u64::try_from(secs)
            .ok()
            .map(|secs| secs.saturating_mul(self.time_factor_ms))
    }

    /// Check expiry at `now_ms`. Max life is checked before idle time.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> Option<ExpiryReason> {
        if self.is_eternal {
            return None;
        }
        if let Some(limit) = self.limit_ms(self.max_life_secs) {
            if self.age_ms(now_ms) > limit {
                return Some(ExpiryReason::MaxLife);
            }
        }
        if let Some(limit) = self.limit_ms(self.idle_time_secs) {
            if self.idle_ms(now_ms) > limit {
                return Some(ExpiryReason::IdleTime);
            }
        }
        None
    }
}

impl Default for ElementAttributes {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ElementAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementAttributes")
            .field("is_spool", &self.is_spool)
            .field("is_lateral", &self.is_lateral)
            .field("is_remote", &self.is_remote)
            .field("is_eternal", &self.is_eternal)
            .field("max_life_secs", &self.max_life_secs)
            .field("idle_time_secs", &self.idle_time_secs)
            .field("size", &self.size)
            .field("create_time_ms", &self.create_time_ms)
            .field("last_access_time_ms", &self.last_access_time_ms)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// A value cached under a key in a named region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheElement<K, V> {
    region: String,
    key: K,
    pub value: V,
    pub attributes: ElementAttributes,
}

impl<K: CacheKey, V: CacheValue> CacheElement<K, V> {
    pub fn new(region: impl Into<String>, key: K, value: V) -> Self {
        Self::with_attributes(region, key, value, ElementAttributes::new())
    }

    pub fn with_attributes(
        region: impl Into<String>,
        key: K,
        value: V,
        attributes: ElementAttributes,
    ) -> Self {
        Self {
            region: region.into(),
            key,
            value,
            attributes,
        }
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_have_canonical_form() {
        assert_eq!("abc".to_string().as_str_key(), Some("abc"));
        assert_eq!(42u64.as_str_key(), None);
    }

    #[test]
    fn test_eternal_never_expires() {
        let mut attrs = ElementAttributes::new();
        attrs.max_life_secs = 0;
        attrs.create_time_ms = 0;
        assert!(attrs.is_eternal);
        assert_eq!(attrs.is_expired(now_millis()), None);
    }

    #[test]
    fn test_max_life_checked_before_idle() {
        let mut attrs = ElementAttributes::new().with_max_life(1).with_idle_time(1);
        attrs.create_time_ms = 1_000;
        attrs.last_access_time_ms = 1_000;
        assert_eq!(attrs.is_expired(2_000), None);
        assert_eq!(attrs.is_expired(2_001), Some(ExpiryReason::MaxLife));
    }

    #[test]
    fn test_idle_expiry() {
        let mut attrs = ElementAttributes::new().with_idle_time(5);
        attrs.create_time_ms = 0;
        attrs.last_access_time_ms = 10_000;
        assert_eq!(attrs.is_expired(14_000), None);
        assert_eq!(attrs.is_expired(15_001), Some(ExpiryReason::IdleTime));
        attrs.touch(15_001);
        assert_eq!(attrs.is_expired(15_002), None);
    }

    #[test]
    fn test_time_factor_scales_limits() {
        let mut attrs = ElementAttributes::new().with_max_life(3);
        attrs.time_factor_ms = 1;
        attrs.create_time_ms = 100;
        assert_eq!(attrs.is_expired(103), None);
        assert_eq!(attrs.is_expired(104), Some(ExpiryReason::MaxLife));
    }

    #[test]
    fn test_huge_limits_never_expire() {
        let mut attrs = ElementAttributes::new().with_max_life(i64::MAX).with_idle_time(i64::MAX);
        attrs.time_factor_ms = u64::MAX;
        attrs.create_time_ms = 0;
        attrs.last_access_time_ms = 0;
        assert_eq!(attrs.limit_ms(i64::MAX), Some(u64::MAX));
        assert_eq!(attrs.is_expired(now_millis()), None);
        assert_eq!(attrs.is_expired(u64::MAX), None);
        assert_eq!(attrs.limit_ms(-1), None);
    }

    #[test]
    fn test_defaults_applied() {
        let defaults = ElementDefaults { is_spool: false, ..Default::default() };
        let attrs = ElementAttributes::from_defaults(&defaults);
        assert!(!attrs.is_spool);
        assert!(attrs.is_remote);
        assert_eq!(attrs.max_life_secs, -1);
    }

    #[test]
    fn test_element_serde_skips_handlers() {
        let elem = CacheElement::new("r", "k".to_string(), 7u32);
        let json = serde_json::to_string(&elem).unwrap();
        let back: CacheElement<String, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.region(), "r");
        assert_eq!(back.key(), "k");
        assert_eq!(back.value, 7);
        assert!(back.attributes.handlers().is_empty());
    }
}
