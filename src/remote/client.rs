// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Client side of the remote protocol.
//!
//! A [`RemoteCacheClient`] talks to one named region on a remote server.
//! It also implements [`AuxiliaryStore`], so a region can use it as a
//! replica.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::element::{CacheElement, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::storage::{AuxiliaryStore, StorageError};

use super::request::{RemoteCacheRequest, RemoteRequestFactory};
use super::response::ResponsePayload;
use super::transport::RemoteTransport;

pub struct RemoteCacheClient<K: CacheKey, V: CacheValue> {
    cache_name: String,
    name: String,
    factory: RemoteRequestFactory,
    transport: Arc<dyn RemoteTransport<K, V>>,
}

impl<K: CacheKey, V: CacheValue> RemoteCacheClient<K, V> {
    /// `requester_id` should match the id of the listener this process
    /// registers with the server, so that its own changes are not echoed.
    #[must_use]
    pub fn new(cache_name: &str, requester_id: u64, transport: Arc<dyn RemoteTransport<K, V>>) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            name: format!("remote:{}", cache_name),
            factory: RemoteRequestFactory::new(requester_id),
            transport,
        }
    }

    #[must_use]
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// True if the server answered. Transport failures count as not alive.
    pub async fn alive_check(&self) -> bool {
        match self.send(self.factory.create_alive_check_request()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(cache = %self.cache_name, error = %e, "Remote alive check failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>, CacheError> {
        let request = self.factory.create_get_request(&self.cache_name, key.clone());
        match self.send(request).await? {
            ResponsePayload::Element(element) => Ok(element),
            other => Err(unexpected("GET", &other)),
        }
    }

    pub async fn get_matching(&self, pattern: &str) -> Result<HashMap<K, CacheElement<K, V>>, CacheError> {
        let request = self.factory.create_get_matching_request(&self.cache_name, pattern);
        match self.send(request).await? {
            ResponsePayload::Elements(elements) => Ok(by_key(elements)),
            other => Err(unexpected("GET_MATCHING", &other)),
        }
    }

    pub async fn get_multiple(&self, keys: HashSet<K>) -> Result<HashMap<K, CacheElement<K, V>>, CacheError> {
        let request = self.factory.create_get_multiple_request(&self.cache_name, keys);
        match self.send(request).await? {
            ResponsePayload::Elements(elements) => Ok(by_key(elements)),
            other => Err(unexpected("GET_MULTIPLE", &other)),
        }
    }

    pub async fn get_key_set(&self) -> Result<HashSet<K>, CacheError> {
        let request = self.factory.create_get_keyset_request(&self.cache_name);
        match self.send(request).await? {
            ResponsePayload::Keys(keys) => Ok(keys),
            other => Err(unexpected("GET_KEYSET", &other)),
        }
    }

    /// Send an element. It lands in the region named by the element.
    pub async fn update(&self, element: CacheElement<K, V>) -> Result<(), CacheError> {
        self.send(self.factory.create_update_request(element)).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &K) -> Result<bool, CacheError> {
        let request = self.factory.create_remove_request(&self.cache_name, key.clone());
        match self.send(request).await? {
            ResponsePayload::Removed(removed) => Ok(removed),
            other => Err(unexpected("REMOVE", &other)),
        }
    }

    /// False if the remote region does not allow clearing.
    pub async fn remove_all(&self) -> Result<bool, CacheError> {
        let request = self.factory.create_remove_all_request(&self.cache_name);
        match self.send(request).await? {
            ResponsePayload::Removed(cleared) => Ok(cleared),
            other => Err(unexpected("REMOVE_ALL", &other)),
        }
    }

    /// Tear down the region on the server.
    pub async fn dispose_remote(&self) -> Result<(), CacheError> {
        self.send(self.factory.create_dispose_request(&self.cache_name)).await?;
        Ok(())
    }

    async fn send(&self, request: RemoteCacheRequest<K, V>) -> Result<ResponsePayload<K, V>, CacheError> {
        let request_type = request.request_type();
        let response = self.transport.send(request).await?;
        if !response.success {
            let message = response.error_message.unwrap_or_default();
            warn!(cache = %self.cache_name, request = %request_type, error = %message, "Remote request rejected");
            return Err(CacheError::Remote(message));
        }
        Ok(response.payload)
    }
}

fn by_key<K: CacheKey, V: CacheValue>(elements: Vec<CacheElement<K, V>>) -> HashMap<K, CacheElement<K, V>> {
    elements.into_iter().map(|e| (e.key().clone(), e)).collect()
}

fn unexpected<K: CacheKey, V: CacheValue>(request: &str, payload: &ResponsePayload<K, V>) -> CacheError {
    CacheError::Remote(format!("unexpected {} response: {:?}", request, payload))
}

fn unavailable(e: CacheError) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> AuxiliaryStore<K, V> for RemoteCacheClient<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, element: &CacheElement<K, V>) -> Result<(), StorageError> {
        self.update(element.clone()).await.map_err(unavailable)
    }

    async fn get(&self, key: &K) -> Result<Option<CacheElement<K, V>>, StorageError> {
        RemoteCacheClient::get(self, key).await.map_err(unavailable)
    }

    async fn remove(&self, key: &K) -> Result<bool, StorageError> {
        RemoteCacheClient::remove(self, key).await.map_err(unavailable)
    }

    async fn remove_all(&self) -> Result<(), StorageError> {
        RemoteCacheClient::remove_all(self).await.map(|_| ()).map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheManagerConfig;
    use crate::manager::CacheManager;
    use crate::remote::server::RemoteCacheServer;
    use crate::remote::transport::LocalTransport;

    fn setup() -> (Arc<LocalTransport<String, u32>>, RemoteCacheClient<String, u32>) {
        let manager = Arc::new(CacheManager::new(CacheManagerConfig::default()).unwrap());
        let transport = Arc::new(LocalTransport::new(Arc::new(RemoteCacheServer::new(manager))));
        let client = RemoteCacheClient::new("users", 11, transport.clone());
        (transport, client)
    }

    #[tokio::test]
    async fn test_update_get_remove() {
        let (_, client) = setup();
        assert!(client.alive_check().await);

        client.update(CacheElement::new("users", "a".to_string(), 1)).await.unwrap();
        client.update(CacheElement::new("users", "b".to_string(), 2)).await.unwrap();

        assert_eq!(client.get(&"a".to_string()).await.unwrap().unwrap().value, 1);
        assert_eq!(client.get_key_set().await.unwrap().len(), 2);

        let found = client
            .get_multiple(["a".to_string(), "zz".to_string()].into_iter().collect())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert!(client.remove(&"a".to_string()).await.unwrap());
        assert!(client.get(&"a".to_string()).await.unwrap().is_none());
        assert!(client.remove_all().await.unwrap());
        assert!(client.get_key_set().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_failure_becomes_remote_error() {
        let (_, client) = setup();
        let err = client.get_matching("(").await.unwrap_err();
        assert!(matches!(err, CacheError::Remote(msg) if msg.contains("Invalid key pattern")));
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (transport, client) = setup();
        transport.close();
        assert!(!client.alive_check().await);
        assert!(matches!(client.get_key_set().await, Err(CacheError::Transport(_))));

        let store: &dyn AuxiliaryStore<String, u32> = &client;
        let err = store.store(&CacheElement::new("users", "a".to_string(), 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert_eq!(store.name(), "remote:users");
    }
}
