// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Server side of the remote protocol.
//!
//! The server applies each request to the regions of its [`CacheManager`]
//! using the `local_*` region operations, then forwards changes to the
//! region's registered listeners, skipping the listener that sent them.
//!
//! | Request      | Needs       | Result                       |
//! |--------------|-------------|------------------------------|
//! | GET          | name, key   | element or nothing           |
//! | GET_MATCHING | name, pattern | matching elements          |
//! | GET_MULTIPLE | name, keys  | present elements             |
//! | GET_KEYSET   | name        | keys                         |
//! | REMOVE       | name, key   | whether anything was removed |
//! | REMOVE_ALL   | name        | whether the region allowed it|
//! | UPDATE       | element     | ack                          |
//! | DISPOSE      | name        | ack, region torn down        |
//! | ALIVE_CHECK  | nothing     | ack                          |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::event_log::CacheEventLogger;
use crate::manager::CacheManager;
use crate::region::Region;

use super::codec;
use super::request::{RemoteCacheRequest, RemoteRequestType};
use super::response::{RemoteCacheResponse, ResponsePayload};
use super::transport::TransportError;

const EVENT_SOURCE: &str = "remote_cache_server";

/// Receives the changes a server applies to one region.
#[async_trait]
pub trait RemoteCacheListener<K: CacheKey, V: CacheValue>: Send + Sync {
    /// Compared against a request's requester id to avoid echoing changes.
    fn listener_id(&self) -> u64;

    async fn handle_put(&self, element: &CacheElement<K, V>) -> Result<(), CacheError>;

    async fn handle_remove(&self, cache_name: &str, key: &K) -> Result<(), CacheError>;

    async fn handle_remove_all(&self, cache_name: &str) -> Result<(), CacheError>;

    async fn handle_dispose(&self, cache_name: &str) -> Result<(), CacheError>;
}

enum Change<'a, K, V> {
    Put(&'a CacheElement<K, V>),
    Remove(&'a K),
    RemoveAll,
    Dispose,
}

pub struct RemoteCacheServer<K: CacheKey, V: CacheValue> {
    manager: Arc<CacheManager<K, V>>,
    logger: Arc<dyn CacheEventLogger>,
    listeners: DashMap<String, Vec<Arc<dyn RemoteCacheListener<K, V>>>>,
    puts: AtomicU64,
    mutations: AtomicU64,
}

impl<K: CacheKey, V: CacheValue> RemoteCacheServer<K, V> {
    /// The server reports to the manager's event logger.
    #[must_use]
    pub fn new(manager: Arc<CacheManager<K, V>>) -> Self {
        let logger = manager.logger().clone();
        Self {
            manager,
            logger,
            listeners: DashMap::new(),
            puts: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<CacheManager<K, V>> {
        &self.manager
    }

    pub fn add_listener(&self, cache_name: &str, listener: Arc<dyn RemoteCacheListener<K, V>>) {
        info!(cache = cache_name, listener = listener.listener_id(), "Remote listener registered");
        self.listeners.entry(cache_name.to_string()).or_default().push(listener);
    }

    pub fn remove_listener(&self, cache_name: &str, listener_id: u64) -> bool {
        let Some(mut listeners) = self.listeners.get_mut(cache_name) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.listener_id() != listener_id);
        before != listeners.len()
    }

    #[must_use]
    pub fn listener_count(&self, cache_name: &str) -> usize {
        self.listeners.get(cache_name).map_or(0, |l| l.len())
    }

    /// Total UPDATE requests applied.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Successful UPDATE, REMOVE, REMOVE_ALL and DISPOSE requests.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::Relaxed)
    }

    /// Apply one request. Failures come back as unsuccessful responses and
    /// are reported to the event logger.
    #[tracing::instrument(skip(self, request), fields(request = %request.request_type(), cache = %request.cache_name()))]
    pub async fn process_request(&self, request: RemoteCacheRequest<K, V>) -> RemoteCacheResponse<K, V> {
        let request_type = request.request_type();
        let start = Instant::now();

        let key = request.key().map(|k| k.to_string());
        let event = self.logger.create_event(
            EVENT_SOURCE,
            request.cache_name(),
            request_type.event_name(),
            &format!("requester={}", request.requester_id()),
            key,
        );
        self.logger.log_event(&event);

        let result = self.apply(&request).await;
        crate::metrics::record_latency(request.cache_name(), request_type.as_str(), start.elapsed());

        match result {
            Ok(payload) => {
                crate::metrics::record_remote_request(request_type.as_str(), "success");
                if request_type.is_mutation() {
                    self.mutations.fetch_add(1, Ordering::Relaxed);
                    debug!(request = %request_type, cache = %request.cache_name(), "Remote change applied");
                } else {
                    trace!(request = %request_type, cache = %request.cache_name(), "Remote read served");
                }
                RemoteCacheResponse::ok(payload)
            }
            Err(e) => {
                crate::metrics::record_remote_request(request_type.as_str(), e.kind());
                warn!(request = %request_type, cache = %request.cache_name(), error = %e, "Remote request failed");
                self.logger.log_error(EVENT_SOURCE, request_type.event_name(), &e.to_string());
                RemoteCacheResponse::failure(e.to_string())
            }
        }
    }

    /// Decode, apply and encode. Only undecodable input is an error.
    pub async fn process_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
        let request = codec::decode_request(bytes).map_err(|e| {
            self.logger.log_error(EVENT_SOURCE, "decode", &e.to_string());
            e
        })?;
        let response = self.process_request(request).await;
        codec::encode_response(&response)
    }

    async fn apply(&self, request: &RemoteCacheRequest<K, V>) -> Result<ResponsePayload<K, V>, CacheError> {
        let request_type = request.request_type();
        match request_type {
            RemoteRequestType::AliveCheck => Ok(ResponsePayload::Ack),

            RemoteRequestType::Update => {
                let element = request
                    .element()
                    .ok_or_else(|| malformed(request_type, "missing cache element"))?;
                let region = self.manager.region(element.region())?;
                region.local_update(element.clone())?;

                let puts = self.puts.fetch_add(1, Ordering::Relaxed) + 1;
                if puts % 100 == 0 {
                    debug!(puts, "Remote puts applied");
                }
                self.notify(request, Change::Put(element)).await;
                Ok(ResponsePayload::Ack)
            }

            RemoteRequestType::Get => {
                let key = required_key(request)?;
                let region = self.region_for(request)?;
                Ok(ResponsePayload::Element(region.get(key).await?))
            }

            RemoteRequestType::GetMatching => {
                let pattern = request
                    .pattern()
                    .ok_or_else(|| malformed(request_type, "missing pattern"))?;
                let region = self.region_for(request)?;
                let matched = region.get_matching(pattern).await?;
                Ok(ResponsePayload::Elements(matched.into_values().collect()))
            }

            RemoteRequestType::GetMultiple => {
                let keys = request
                    .key_set()
                    .ok_or_else(|| malformed(request_type, "missing key set"))?;
                let region = self.region_for(request)?;
                let keys: Vec<K> = keys.iter().cloned().collect();
                let found = region.get_multiple(&keys).await?;
                Ok(ResponsePayload::Elements(found.into_values().collect()))
            }

            RemoteRequestType::GetKeyset => {
                let region = self.region_for(request)?;
                Ok(ResponsePayload::Keys(region.key_set()?))
            }

            RemoteRequestType::Remove => {
                let key = required_key(request)?;
                let region = self.region_for(request)?;
                let removed = region.local_remove(key).await?;
                self.notify(request, Change::Remove(key)).await;
                Ok(ResponsePayload::Removed(removed))
            }

            RemoteRequestType::RemoveAll => {
                let region = self.region_for(request)?;
                let cleared = region.local_remove_all().await?;
                if cleared {
                    self.notify(request, Change::RemoveAll).await;
                }
                Ok(ResponsePayload::Removed(cleared))
            }

            RemoteRequestType::Dispose => {
                require_name(request)?;
                let report = self.manager.dispose_region(request.cache_name()).await?;
                if let Some(report) = report {
                    info!(cache = %request.cache_name(), drained = report.drained,
                        abandoned = report.abandoned, "Region disposed by remote request");
                }
                self.notify(request, Change::Dispose).await;
                Ok(ResponsePayload::Ack)
            }
        }
    }

    fn region_for(&self, request: &RemoteCacheRequest<K, V>) -> Result<Arc<Region<K, V>>, CacheError> {
        require_name(request)?;
        self.manager.region(request.cache_name())
    }

    async fn notify(&self, request: &RemoteCacheRequest<K, V>, change: Change<'_, K, V>) {
        let cache_name = match &change {
            Change::Put(element) => element.region().to_string(),
            _ => request.cache_name().to_string(),
        };
        let targets: Vec<_> = match self.listeners.get(&cache_name) {
            Some(listeners) => listeners
                .iter()
                .filter(|l| l.listener_id() != request.requester_id())
                .cloned()
                .collect(),
            None => return,
        };

        for listener in targets {
            let result = match &change {
                Change::Put(element) => listener.handle_put(element).await,
                Change::Remove(key) => listener.handle_remove(&cache_name, key).await,
                Change::RemoveAll => listener.handle_remove_all(&cache_name).await,
                Change::Dispose => listener.handle_dispose(&cache_name).await,
            };
            if let Err(e) = result {
                warn!(cache = %cache_name, listener = listener.listener_id(), error = %e,
                    "Remote listener failed");
                self.logger.log_error(EVENT_SOURCE, request.request_type().event_name(), &e.to_string());
            }
        }
    }
}

fn malformed(request_type: RemoteRequestType, reason: &str) -> CacheError {
    CacheError::MalformedRequest {
        request_type: request_type.as_str().to_string(),
        reason: reason.to_string(),
    }
}

fn require_name<K: CacheKey, V: CacheValue>(request: &RemoteCacheRequest<K, V>) -> Result<(), CacheError> {
    if request.cache_name().is_empty() {
        return Err(malformed(request.request_type(), "missing cache name"));
    }
    Ok(())
}

fn required_key<K: CacheKey, V: CacheValue>(request: &RemoteCacheRequest<K, V>) -> Result<&K, CacheError> {
    request
        .key()
        .ok_or_else(|| malformed(request.request_type(), "missing key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheManagerConfig;
    use crate::event_log::{RecordingEventLogger, UPDATE_EVENT};
    use crate::remote::request::RemoteRequestFactory;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        id: u64,
        puts: Mutex<Vec<String>>,
        removes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RemoteCacheListener<String, u32> for RecordingListener {
        fn listener_id(&self) -> u64 {
            self.id
        }
        async fn handle_put(&self, element: &CacheElement<String, u32>) -> Result<(), CacheError> {
            self.puts.lock().push(element.key().clone());
            Ok(())
        }
        async fn handle_remove(&self, _cache_name: &str, key: &String) -> Result<(), CacheError> {
            self.removes.lock().push(key.clone());
            Ok(())
        }
        async fn handle_remove_all(&self, _cache_name: &str) -> Result<(), CacheError> {
            Ok(())
        }
        async fn handle_dispose(&self, _cache_name: &str) -> Result<(), CacheError> {
            Ok(())
        }
    }

    fn server() -> (RemoteCacheServer<String, u32>, Arc<RecordingEventLogger>) {
        let logger = Arc::new(RecordingEventLogger::new());
        let manager = CacheManager::new(CacheManagerConfig::default())
            .unwrap()
            .with_logger(logger.clone());
        (RemoteCacheServer::new(Arc::new(manager)), logger)
    }

    #[tokio::test]
    async fn test_update_then_get() {
        let (server, _) = server();
        let factory = RemoteRequestFactory::new(1);
        let resp = server
            .process_request(factory.create_update_request(CacheElement::new("users", "a".to_string(), 5)))
            .await;
        assert!(resp.success);

        let resp = server.process_request(factory.create_get_request("users", "a".to_string())).await;
        match resp.payload {
            ResponsePayload::Element(Some(e)) => assert_eq!(e.value, 5),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(server.put_count(), 1);
    }

    #[tokio::test]
    async fn test_update_without_element_is_rejected() {
        let (server, logger) = server();
        let factory = RemoteRequestFactory::new(1);
        server
            .process_request(factory.create_update_request(CacheElement::new("users", "a".to_string(), 1)))
            .await;

        let bad: RemoteCacheRequest<String, u32> =
            factory.create_request("users", RemoteRequestType::Update, None, None, None, None);
        let resp = server.process_request(bad).await;
        assert!(!resp.success);
        assert!(resp.error_message.unwrap().contains("missing cache element"));

        let errors = logger.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, UPDATE_EVENT);

        let keys = server.manager().region("users").unwrap().key_set().unwrap();
        assert_eq!(keys, ["a".to_string()].into_iter().collect());
    }

    #[tokio::test]
    async fn test_get_matching_over_keys() {
        let (server, _) = server();
        let factory = RemoteRequestFactory::new(1);
        for key in ["foo1", "foo2", "bar"] {
            server
                .process_request(factory.create_update_request(CacheElement::new("r", key.to_string(), 0)))
                .await;
        }
        let resp = server.process_request(factory.create_get_matching_request("r", "foo.*")).await;
        let ResponsePayload::Elements(elements) = resp.payload else {
            panic!("expected elements");
        };
        let mut keys: Vec<_> = elements.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        assert_eq!(keys, vec!["foo1".to_string(), "foo2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_fields_are_malformed() {
        let (server, _) = server();
        let factory = RemoteRequestFactory::new(1);
        let no_key: RemoteCacheRequest<String, u32> =
            factory.create_request("r", RemoteRequestType::Get, None, None, None, None);
        assert!(!server.process_request(no_key).await.success);

        let no_name: RemoteCacheRequest<String, u32> = factory.create_get_keyset_request("");
        assert!(!server.process_request(no_name).await.success);
        assert!(server.manager().region_names().is_empty());
    }

    #[tokio::test]
    async fn test_listeners_skip_requester() {
        let (server, _) = server();
        let origin = Arc::new(RecordingListener { id: 1, ..Default::default() });
        let other = Arc::new(RecordingListener { id: 2, ..Default::default() });
        server.add_listener("r", origin.clone());
        server.add_listener("r", other.clone());

        let factory = RemoteRequestFactory::new(1);
        server
            .process_request(factory.create_update_request(CacheElement::new("r", "k".to_string(), 1)))
            .await;
        server.process_request(factory.create_remove_request("r", "k".to_string())).await;

        assert!(origin.puts.lock().is_empty());
        assert_eq!(*other.puts.lock(), vec!["k".to_string()]);
        assert_eq!(*other.removes.lock(), vec!["k".to_string()]);

        assert!(server.remove_listener("r", 2));
        assert_eq!(server.listener_count("r"), 1);
    }

    #[tokio::test]
    async fn test_dispose_tears_down_region() {
        let (server, _) = server();
        let factory = RemoteRequestFactory::new(1);
        server
            .process_request(factory.create_update_request(CacheElement::new("r", "k".to_string(), 1)))
            .await;
        let resp = server.process_request(factory.create_dispose_request("r")).await;
        assert!(resp.success);
        assert!(server.manager().get_region("r").is_none());
    }

    #[tokio::test]
    async fn test_every_request_is_logged() {
        let (server, logger) = server();
        let factory = RemoteRequestFactory::new(9);
        server.process_request(factory.create_alive_check_request()).await;
        server.process_request(factory.create_get_keyset_request("r")).await;
        let names: Vec<_> = logger.events().into_iter().map(|e| e.event_name).collect();
        assert_eq!(names, vec!["aliveCheck".to_string(), "getKeySet".to_string()]);
    }

    #[tokio::test]
    async fn test_only_successful_changes_count_as_mutations() {
        let (server, _) = server();
        let factory = RemoteRequestFactory::new(1);
        server
            .process_request(factory.create_update_request(CacheElement::new("r", "k".to_string(), 1)))
            .await;
        server.process_request(factory.create_get_request("r", "k".to_string())).await;
        server.process_request(factory.create_get_keyset_request("r")).await;
        server.process_request(factory.create_alive_check_request()).await;
        assert_eq!(server.mutation_count(), 1);

        server.process_request(factory.create_remove_request("r", "k".to_string())).await;
        let bad: RemoteCacheRequest<String, u32> =
            factory.create_request("r", RemoteRequestType::Remove, None, None, None, None);
        assert!(!server.process_request(bad).await.success);
        server.process_request(factory.create_remove_all_request("r")).await;
        server.process_request(factory.create_dispose_request("r")).await;
        assert_eq!(server.mutation_count(), 4);
    }

    #[tokio::test]
    async fn test_process_bytes_rejects_garbage() {
        let (server, logger) = server();
        assert!(matches!(server.process_bytes(b"not json").await, Err(TransportError::Codec(_))));
        assert_eq!(logger.errors().len(), 1);
    }
}
