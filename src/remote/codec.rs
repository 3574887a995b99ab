//! JSON wire format for requests and responses.
//!
//! Decoding never panics: malformed input yields [`TransportError::Codec`].

use crate::element::{CacheKey, CacheValue};

use super::request::RemoteCacheRequest;
use super::response::RemoteCacheResponse;
use super::transport::TransportError;

pub fn encode_request<K: CacheKey, V: CacheValue>(
    request: &RemoteCacheRequest<K, V>,
) -> Result<Vec<u8>, TransportError> {
    Ok(serde_json::to_vec(request)?)
}

pub fn decode_request<K: CacheKey, V: CacheValue>(
    bytes: &[u8],
) -> Result<RemoteCacheRequest<K, V>, TransportError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_response<K: CacheKey, V: CacheValue>(
    response: &RemoteCacheResponse<K, V>,
) -> Result<Vec<u8>, TransportError> {
    Ok(serde_json::to_vec(response)?)
}

pub fn decode_response<K: CacheKey, V: CacheValue>(
    bytes: &[u8],
) -> Result<RemoteCacheResponse<K, V>, TransportError> {
    Ok(serde_json::from_slice(bytes)?)
}
