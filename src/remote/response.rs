//! Remote cache responses.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::element::{CacheElement, CacheKey, CacheValue};

/// What a successful request returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: CacheKey, V: CacheValue",
    deserialize = "K: CacheKey, V: CacheValue"
))]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ResponsePayload<K, V> {
    /// GET
    Element(Option<CacheElement<K, V>>),
    /// GET_MATCHING and GET_MULTIPLE
    Elements(Vec<CacheElement<K, V>>),
    /// GET_KEYSET
    Keys(HashSet<K>),
    /// REMOVE and REMOVE_ALL
    Removed(bool),
    /// UPDATE, DISPOSE and ALIVE_CHECK
    Ack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: CacheKey, V: CacheValue",
    deserialize = "K: CacheKey, V: CacheValue"
))]
pub struct RemoteCacheResponse<K, V> {
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    pub payload: ResponsePayload<K, V>,
}

impl<K: CacheKey, V: CacheValue> RemoteCacheResponse<K, V> {
    #[must_use]
    pub fn ok(payload: ResponsePayload<K, V>) -> Self {
        Self {
            success: true,
            error_message: None,
            payload,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            payload: ResponsePayload::Ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_message() {
        let resp = RemoteCacheResponse::<String, u32>::failure("missing cache element");
        assert!(!resp.success);
        assert_eq!(resp.error_message.as_deref(), Some("missing cache element"));
        assert!(matches!(resp.payload, ResponsePayload::Ack));
    }

    #[test]
    fn test_payload_json_shape() {
        let resp = RemoteCacheResponse::<String, u32>::ok(ResponsePayload::Removed(true));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["payload"]["kind"], "removed");
        assert_eq!(json["payload"]["data"], true);
    }
}
