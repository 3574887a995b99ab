//! Integration Tests for Region Cache
//!
//! End-to-end scenarios across the public API: regions built by a
//! manager, spooling into an auxiliary store, and the remote protocol
//! running over the in-process transport (every message goes through the
//! JSON codec).
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: eviction order, spooling, remote round trips
//! - `failure_*` - Rejected requests and misbehaving peers

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use region_cache::{
    AuxiliaryStore, CacheElement, CacheError, CacheManager, CacheManagerConfig, EvictionPolicyKind,
    InMemoryStore, LocalTransport, RecordingEventLogger, Region, RegionConfig, RegionListener,
    RegionStatus, RemoteCacheClient, RemoteCacheServer, RemoteRequestType, ResponsePayload,
};
use region_cache::remote::codec;

// =============================================================================
// Helpers
// =============================================================================

fn key(s: &str) -> String {
    s.to_string()
}

fn remote_stack() -> (
    Arc<RemoteCacheServer<String, u32>>,
    Arc<LocalTransport<String, u32>>,
    Arc<RecordingEventLogger>,
) {
    let logger = Arc::new(RecordingEventLogger::new());
    let manager = CacheManager::new(CacheManagerConfig::default())
        .unwrap()
        .with_logger(logger.clone());
    let server = Arc::new(RemoteCacheServer::new(Arc::new(manager)));
    let transport = Arc::new(LocalTransport::new(server.clone()));
    (server, transport, logger)
}

/// Poll until `check` holds or the deadline passes.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn happy_lru_spools_least_recently_used() {
    let store = Arc::new(InMemoryStore::<String, u32>::new());
    let region = Region::<String, u32>::builder("lru")
        .config(RegionConfig { max_objects: 3, spool_chunk_size: 1, ..Default::default() })
        .auxiliary(store.clone())
        .build()
        .unwrap();

    for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
        region.put(key(k), v).await.unwrap();
    }
    region.get(&key("a")).await.unwrap();
    region.put(key("d"), 4).await.unwrap();

    assert_eq!(region.size(), 3);
    assert!(region.get_quiet(&key("b")).is_none());
    assert!(region.get_quiet(&key("a")).is_some());
    assert!(eventually(|| store.contains(&key("b"))).await);

    // Read back from the store and promoted into memory
    assert_eq!(region.get(&key("b")).await.unwrap().map(|e| e.value), Some(2));
    assert!(region.get_quiet(&key("b")).is_some());
    region.dispose().await.unwrap();
}

#[tokio::test]
async fn happy_fifo_ignores_access_order() {
    let region = Region::<String, u32>::builder("fifo")
        .config(RegionConfig {
            max_objects: 2,
            spool_chunk_size: 1,
            eviction_policy: EvictionPolicyKind::Fifo,
            ..Default::default()
        })
        .build()
        .unwrap();

    region.put(key("a"), 1).await.unwrap();
    region.put(key("b"), 2).await.unwrap();
    region.get(&key("a")).await.unwrap();
    region.put(key("c"), 3).await.unwrap();

    let keys = region.key_set().unwrap();
    assert_eq!(keys, [key("b"), key("c")].into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn happy_soft_window_keeps_recent_elements_pinned() {
    let region = Region::<String, u32>::builder("soft")
        .config(RegionConfig {
            max_objects: 2,
            eviction_policy: EvictionPolicyKind::SoftReference,
            ..Default::default()
        })
        .build()
        .unwrap();

    for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
        region.put(key(k), v).await.unwrap();
    }

    // Unpinned but still readable until reclaimed
    assert!(region.get_quiet(&key("a")).is_some());
    assert_eq!(region.reclaim_unreferenced(), 1);
    assert!(region.get_quiet(&key("a")).is_none());
    assert!(region.get_quiet(&key("b")).is_some());
    assert!(region.get_quiet(&key("c")).is_some());
}

#[tokio::test]
async fn happy_manager_config_from_json() {
    let config: CacheManagerConfig = serde_json::from_str(
        r#"{
            "default_region": { "max_objects": 10 },
            "regions": {
                "sessions": { "max_objects": 1, "eviction_policy": "mru", "allow_remove_all": false }
            }
        }"#,
    )
    .unwrap();
    let manager = CacheManager::<String, u32>::new(config).unwrap();

    let sessions = manager.region("sessions").unwrap();
    assert_eq!(sessions.config().eviction_policy, EvictionPolicyKind::Mru);
    assert!(!sessions.remove_all().await.unwrap());
    assert_eq!(manager.region("other").unwrap().config().max_objects, 10);

    let stats = manager.statistics();
    assert_eq!(stats.get("Regions"), Some("2"));
    manager.shutdown().await;
    assert!(manager.region_names().is_empty());
}

#[tokio::test]
async fn happy_remote_round_trip() {
    let (server, transport, logger) = remote_stack();
    let client = RemoteCacheClient::new("users", 1, transport);
    assert!(client.alive_check().await);

    for (k, v) in [("foo1", 1), ("foo2", 2), ("bar", 3)] {
        client.update(CacheElement::new("users", key(k), v)).await.unwrap();
    }

    let matched = client.get_matching("foo.*").await.unwrap();
    assert_eq!(matched.len(), 2);
    assert_eq!(matched[&key("foo2")].value, 2);

    assert!(client.remove(&key("bar")).await.unwrap());
    assert_eq!(
        client.get_key_set().await.unwrap(),
        [key("foo1"), key("foo2")].into_iter().collect::<HashSet<_>>()
    );

    client.dispose_remote().await.unwrap();
    assert!(server.manager().get_region("users").is_none());

    // Every request, including the alive check, reached the event log
    let names: Vec<_> = logger
        .events()
        .into_iter()
        .filter(|e| e.source == "remote_cache_server")
        .map(|e| e.event_name)
        .collect();
    assert_eq!(names.first().map(String::as_str), Some("aliveCheck"));
    assert_eq!(names.last().map(String::as_str), Some("dispose"));
}

#[tokio::test]
async fn happy_region_replicates_through_remote_client() {
    let (server, transport, _) = remote_stack();
    let replica: Arc<dyn AuxiliaryStore<String, u32>> =
        Arc::new(RemoteCacheClient::new("orders", 5, transport));
    let region = Region::<String, u32>::builder("orders").replica(replica).build().unwrap();

    region.put(key("o1"), 100).await.unwrap();
    let remote = server.manager().region("orders").unwrap();
    assert_eq!(remote.get_quiet(&key("o1")).map(|e| e.value), Some(100));

    region.remove(&key("o1")).await.unwrap();
    assert!(remote.get_quiet(&key("o1")).is_none());
}

#[tokio::test]
async fn happy_listeners_skip_requester() {
    let (server, transport, _) = remote_stack();
    let peer_region = || Region::<String, u32>::builder("users").build().unwrap();
    let sender = Arc::new(RegionListener::new(1, peer_region()));
    let peer = Arc::new(RegionListener::new(2, peer_region()));
    server.add_listener("users", sender.clone());
    server.add_listener("users", peer.clone());

    let client = RemoteCacheClient::new("users", 1, transport);
    client.update(CacheElement::new("users", key("a"), 1)).await.unwrap();
    client.update(CacheElement::new("users", key("b"), 2)).await.unwrap();
    assert_eq!(peer.region().get_quiet(&key("b")).map(|e| e.value), Some(2));

    client.remove(&key("a")).await.unwrap();
    assert!(peer.region().get_quiet(&key("a")).is_none());
    assert_eq!(peer.region().size(), 1);

    client.remove_all().await.unwrap();
    assert_eq!(peer.region().size(), 0);

    client.dispose_remote().await.unwrap();
    assert_eq!(peer.region().status(), RegionStatus::Disposed);

    // The sender's own copy never hears its changes echoed back
    assert_eq!(sender.region().size(), 0);
    assert_eq!(sender.region().status(), RegionStatus::Alive);
    assert!(server.manager().get_region("users").is_none());
}

#[tokio::test]
async fn happy_huge_expiry_limits_survive_the_wire() {
    let (_, transport, _) = remote_stack();
    let client = RemoteCacheClient::new("users", 1, transport);

    let mut element = CacheElement::new("users", key("forever"), 9);
    element.attributes = element.attributes.with_max_life(i64::MAX).with_idle_time(i64::MAX);
    element.attributes.time_factor_ms = u64::MAX;
    client.update(element).await.unwrap();

    let got = client.get(&key("forever")).await.unwrap().unwrap();
    assert_eq!(got.value, 9);
    assert!(!got.attributes.is_eternal);
    assert_eq!(got.attributes.max_life_secs, i64::MAX);
}

// =============================================================================
// Failure scenarios
// =============================================================================

#[tokio::test]
async fn failure_update_without_element_is_rejected() {
    let (server, transport, logger) = remote_stack();
    let client = RemoteCacheClient::new("users", 1, transport);
    client.update(CacheElement::new("users", key("kept"), 1)).await.unwrap();

    // Hand-built wire message: an UPDATE that carries no element
    let bytes = br#"{"cache_name":"users","request_type":"UPDATE","requester_id":1}"#;
    let reply = server.process_bytes(bytes).await.unwrap();
    let response = codec::decode_response::<String, u32>(&reply).unwrap();

    assert!(!response.success);
    assert!(response.error_message.unwrap().contains("missing cache element"));
    assert!(matches!(response.payload, ResponsePayload::Ack));
    assert_eq!(logger.errors().len(), 1);
    assert_eq!(
        client.get_key_set().await.unwrap(),
        [key("kept")].into_iter().collect::<HashSet<_>>()
    );
}

#[tokio::test]
async fn failure_malformed_bytes_do_not_reach_regions() {
    let (server, _, logger) = remote_stack();
    assert!(server.process_bytes(b"\x00\x01garbage").await.is_err());
    assert!(server.manager().region_names().is_empty());
    assert_eq!(logger.errors().len(), 1);
}

#[tokio::test]
async fn failure_invalid_pattern_is_reported_to_client() {
    let (_, transport, _) = remote_stack();
    let client = RemoteCacheClient::new("users", 1, transport);
    let err = client.get_matching("[unclosed").await.unwrap_err();
    assert!(matches!(err, CacheError::Remote(_)));
    assert_eq!(RemoteRequestType::GetMatching.as_str(), "GET_MATCHING");
}

#[tokio::test]
async fn failure_closed_transport_degrades_replica_to_warning() {
    let (_, transport, _) = remote_stack();
    let logger = Arc::new(RecordingEventLogger::new());
    let replica: Arc<dyn AuxiliaryStore<String, u32>> =
        Arc::new(RemoteCacheClient::new("orders", 5, transport.clone()));
    let region = Region::<String, u32>::builder("orders")
        .replica(replica)
        .logger(logger.clone())
        .build()
        .unwrap();

    transport.close();
    region.put(key("o1"), 1).await.unwrap();
    assert!(region.get_quiet(&key("o1")).is_some());
    assert_eq!(logger.errors().len(), 1);
}
