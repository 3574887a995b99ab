// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request/response transport to a remote cache server.
//!
//! Network transports live outside this crate; they implement
//! [`RemoteTransport`]. [`LocalTransport`] connects a client to a server
//! in the same process and still runs every message through the codec.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{CacheKey, CacheValue};

use super::codec;
use super::request::RemoteCacheRequest;
use super::response::RemoteCacheResponse;
use super::server::RemoteCacheServer;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Remote cache unreachable: {0}")]
    Unreachable(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Transport closed")]
    Closed,
}

#[async_trait]
pub trait RemoteTransport<K: CacheKey, V: CacheValue>: Send + Sync {
    async fn send(&self, request: RemoteCacheRequest<K, V>) -> Result<RemoteCacheResponse<K, V>, TransportError>;
}

/// In-process transport to a [`RemoteCacheServer`].
pub struct LocalTransport<K: CacheKey, V: CacheValue> {
    server: Arc<RemoteCacheServer<K, V>>,
    closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> LocalTransport<K, V> {
    #[must_use]
    pub fn new(server: Arc<RemoteCacheServer<K, V>>) -> Self {
        Self {
            server,
            closed: AtomicBool::new(false),
        }
    }

    /// Fail every later send with [`TransportError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> RemoteTransport<K, V> for LocalTransport<K, V> {
    async fn send(&self, request: RemoteCacheRequest<K, V>) -> Result<RemoteCacheResponse<K, V>, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let bytes = codec::encode_request(&request)?;
        let reply = self.server.process_bytes(&bytes).await?;
        codec::decode_response(&reply)
    }
}
