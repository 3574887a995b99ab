// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic region-cache usage example.
//!
//! Demonstrates:
//! 1. A manager whose regions spool into an in-memory auxiliary store
//! 2. Overflowing a small LRU region and reading spooled elements back
//! 3. Pattern lookups and hierarchical removal
//! 4. Talking to the same manager through the remote protocol
//! 5. Statistics and captured metrics
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=region_cache=debug cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use region_cache::{
    AuxiliaryStore, CacheElement, CacheManager, CacheManagerConfig, InMemoryStore, LocalTransport,
    RegionConfig, RemoteCacheClient, RemoteCacheServer,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           region-cache: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Manager with a shared auxiliary store
    // ─────────────────────────────────────────────────────────────────────────
    let store = Arc::new(InMemoryStore::<String, String>::named("demo-store"));
    let shared = store.clone();

    let mut config = CacheManagerConfig::default();
    config.regions.insert(
        "users".into(),
        RegionConfig { max_objects: 3, spool_chunk_size: 1, ..Default::default() },
    );

    let manager = Arc::new(
        CacheManager::new(config)?.with_auxiliary_factory(move |_name: &str, _config: &RegionConfig| {
            Some(shared.clone() as Arc<dyn AuxiliaryStore<String, String>>)
        }),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Overflow a 3-slot LRU region
    // ─────────────────────────────────────────────────────────────────────────
    println!("📝 Writing 5 users into a 3-slot region...");
    let users = manager.region("users")?;
    for (id, role) in [
        ("user:alice", "admin"),
        ("user:bob", "user"),
        ("user:carol", "user"),
        ("user:dave", "auditor"),
        ("user:erin", "user"),
    ] {
        users.put(id.to_string(), role.to_string()).await?;
        println!("   └─ put {} → {}", id, role);
    }
    println!("   Memory holds {} elements, {} staged for the store", users.size(), users.purgatory_size());

    println!("\n📖 Reading everything back...");
    for id in ["user:alice", "user:bob", "user:erin", "user:nobody"] {
        match users.get(&id.to_string()).await? {
            Some(element) => println!("   └─ {} → {}", id, element.value),
            None => println!("   └─ {} → NOT FOUND", id),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Pattern lookup and hierarchical removal
    // ─────────────────────────────────────────────────────────────────────────
    let matched = users.get_matching("user:(alice|bob)").await?;
    println!("\n🔍 get_matching(\"user:(alice|bob)\") → {} elements", matched.len());

    users.remove(&"user:".to_string()).await?;
    println!("🧹 remove(\"user:\") → memory now holds {} elements", users.size());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Remote protocol over the in-process transport
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🌐 Remote client → server → manager...");
    let server = Arc::new(RemoteCacheServer::new(manager.clone()));
    let client = RemoteCacheClient::new("sessions", 42, Arc::new(LocalTransport::new(server)));
    println!("   └─ alive: {}", client.alive_check().await);

    client
        .update(CacheElement::new("sessions", "s-1".to_string(), "token-abc".to_string()))
        .await?;
    let keys = client.get_key_set().await?;
    println!("   └─ sessions keys: {:?}", keys);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Statistics and metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Statistics:");
    println!("{}", serde_json::to_string_pretty(&manager.statistics().to_json())?);

    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    for (region, report) in manager.shutdown().await {
        println!("   └─ {}: drained={} abandoned={}", region, report.drained, report.abandoned);
    }
    println!("   Store holds {} elements", store.len());

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let value = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{{{}}} = {}", key.name(), labels.join(","), value)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
