//! Remote cache requests and the factory that builds them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::event_log::{
    ALIVE_CHECK_EVENT, DISPOSE_EVENT, GET_EVENT, GET_KEYSET_EVENT, GET_MATCHING_EVENT,
    GET_MULTIPLE_EVENT, REMOVE_ALL_EVENT, REMOVE_EVENT, UPDATE_EVENT,
};

/// The closed set of remote operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteRequestType {
    Get,
    GetMatching,
    GetMultiple,
    GetKeyset,
    Remove,
    RemoveAll,
    Update,
    Dispose,
    AliveCheck,
}

impl RemoteRequestType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::GetMatching => "GET_MATCHING",
            Self::GetMultiple => "GET_MULTIPLE",
            Self::GetKeyset => "GET_KEYSET",
            Self::Remove => "REMOVE",
            Self::RemoveAll => "REMOVE_ALL",
            Self::Update => "UPDATE",
            Self::Dispose => "DISPOSE",
            Self::AliveCheck => "ALIVE_CHECK",
        }
    }

    /// Name reported to the cache event logger.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Get => GET_EVENT,
            Self::GetMatching => GET_MATCHING_EVENT,
            Self::GetMultiple => GET_MULTIPLE_EVENT,
            Self::GetKeyset => GET_KEYSET_EVENT,
            Self::Remove => REMOVE_EVENT,
            Self::RemoveAll => REMOVE_ALL_EVENT,
            Self::Update => UPDATE_EVENT,
            Self::Dispose => DISPOSE_EVENT,
            Self::AliveCheck => ALIVE_CHECK_EVENT,
        }
    }

    /// Whether the request changes the target region.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Remove | Self::RemoveAll | Self::Update | Self::Dispose)
    }
}

impl std::fmt::Display for RemoteRequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request to a remote cache server. Immutable once built.
///
/// Which optional fields must be present depends on the request type; the
/// server rejects requests that lack them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: CacheKey, V: CacheValue",
    deserialize = "K: CacheKey, V: CacheValue"
))]
pub struct RemoteCacheRequest<K, V> {
    pub(crate) cache_name: String,
    pub(crate) request_type: RemoteRequestType,
    pub(crate) requester_id: u64,
    #[serde(default)]
    pub(crate) key: Option<K>,
    #[serde(default)]
    pub(crate) key_set: Option<HashSet<K>>,
    #[serde(default)]
    pub(crate) pattern: Option<String>,
    #[serde(default)]
    pub(crate) element: Option<CacheElement<K, V>>,
}

impl<K: CacheKey, V: CacheValue> RemoteCacheRequest<K, V> {
    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    #[must_use]
    pub fn request_type(&self) -> RemoteRequestType {
        self.request_type
    }

    /// Id of the listener that sent the request. The server never sends a
    /// change back to this listener.
    #[must_use]
    pub fn requester_id(&self) -> u64 {
        self.requester_id
    }

    #[must_use]
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn key_set(&self) -> Option<&HashSet<K>> {
        self.key_set.as_ref()
    }

    #[must_use]
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    #[must_use]
    pub fn element(&self) -> Option<&CacheElement<K, V>> {
        self.element.as_ref()
    }
}

/// Builds requests stamped with one requester id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteRequestFactory {
    requester_id: u64,
}

impl RemoteRequestFactory {
    #[must_use]
    pub fn new(requester_id: u64) -> Self {
        Self { requester_id }
    }

    #[must_use]
    pub fn requester_id(&self) -> u64 {
        self.requester_id
    }

    /// Build any request. The typed constructors below fill in exactly the
    /// fields their request type needs.
    #[must_use]
    pub fn create_request<K: CacheKey, V: CacheValue>(
        &self,
        cache_name: &str,
        request_type: RemoteRequestType,
        key: Option<K>,
        key_set: Option<HashSet<K>>,
        pattern: Option<String>,
        element: Option<CacheElement<K, V>>,
    ) -> RemoteCacheRequest<K, V> {
        debug!(cache = cache_name, request = %request_type, requester = self.requester_id, "Created remote request");
        RemoteCacheRequest {
            cache_name: cache_name.to_string(),
            request_type,
            requester_id: self.requester_id,
            key,
            key_set,
            pattern,
            element,
        }
    }

    #[must_use]
    pub fn create_get_request<K: CacheKey, V: CacheValue>(&self, cache_name: &str, key: K) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::Get, Some(key), None, None, None)
    }

    #[must_use]
    pub fn create_get_matching_request<K: CacheKey, V: CacheValue>(
        &self,
        cache_name: &str,
        pattern: &str,
    ) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::GetMatching, None, None, Some(pattern.to_string()), None)
    }

    #[must_use]
    pub fn create_get_multiple_request<K: CacheKey, V: CacheValue>(
        &self,
        cache_name: &str,
        keys: HashSet<K>,
    ) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::GetMultiple, None, Some(keys), None, None)
    }

    #[must_use]
    pub fn create_get_keyset_request<K: CacheKey, V: CacheValue>(&self, cache_name: &str) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::GetKeyset, None, None, None, None)
    }

    #[must_use]
    pub fn create_remove_request<K: CacheKey, V: CacheValue>(&self, cache_name: &str, key: K) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::Remove, Some(key), None, None, None)
    }

    #[must_use]
    pub fn create_remove_all_request<K: CacheKey, V: CacheValue>(&self, cache_name: &str) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::RemoveAll, None, None, None, None)
    }

    /// The target region is the element's own region.
    #[must_use]
    pub fn create_update_request<K: CacheKey, V: CacheValue>(
        &self,
        element: CacheElement<K, V>,
    ) -> RemoteCacheRequest<K, V> {
        let cache_name = element.region().to_string();
        self.create_request(&cache_name, RemoteRequestType::Update, None, None, None, Some(element))
    }

    #[must_use]
    pub fn create_dispose_request<K: CacheKey, V: CacheValue>(&self, cache_name: &str) -> RemoteCacheRequest<K, V> {
        self.create_request(cache_name, RemoteRequestType::Dispose, None, None, None, None)
    }

    #[must_use]
    pub fn create_alive_check_request<K: CacheKey, V: CacheValue>(&self) -> RemoteCacheRequest<K, V> {
        self.create_request("", RemoteRequestType::AliveCheck, None, None, None, None)
    }
}
