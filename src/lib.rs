//! # Region Cache
//!
//! A tiered, region-partitioned object cache.
//!
//! ## Architecture
//!
//! Every region owns a bounded memory cache. Elements it evicts fall
//! through a staging area (purgatory) into an optional auxiliary store.
//! Regions can also be mirrored to remote caches over a small
//! request/response protocol.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CacheManager                         │
//! │  • Creates regions on first access                         │
//! │  • Resolves per-region configuration                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Region: MemoryCache                     │
//! │  • LRU / FIFO / MRU over an arena descriptor list          │
//! │  • Soft-reference cache with a strong window               │
//! │  • Expiry on request and by the background shrinker        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                     (evicted elements spool)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Waterfall: Purgatory + worker              │
//! │  • Staged elements stay readable until written             │
//! │  • Single worker writes to the auxiliary store             │
//! │  • Bounded drain on shutdown                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AuxiliaryStore                         │
//! │  • In-memory store, remote cache client, or your own       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use region_cache::{CacheManager, CacheManagerConfig, InMemoryStore, RegionConfig, AuxiliaryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), region_cache::CacheError> {
//!     let store = Arc::new(InMemoryStore::<String, String>::new());
//!     let manager = CacheManager::new(CacheManagerConfig::default())?
//!         .with_auxiliary_factory(move |_name: &str, _config: &RegionConfig| {
//!             Some(store.clone() as Arc<dyn AuxiliaryStore<String, String>>)
//!         });
//!
//!     let users = manager.region("users")?;
//!     users.put("alice".into(), "admin".into()).await?;
//!
//!     // memory → purgatory → auxiliary
//!     if let Some(element) = users.get(&"alice".to_string()).await? {
//!         println!("Found: {}", element.value);
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`region`]: The [`Region`] tying memory, waterfall and replicas together
//! - [`manager`]: [`CacheManager`], the region registry
//! - [`memory`]: Memory caches and the descriptor list
//! - [`waterfall`]: Purgatory and the spool worker
//! - [`event`]: Element events and the per-region event queue
//! - [`remote`]: Remote request protocol, server and client
//! - [`storage`]: Auxiliary store trait and the in-memory store
//! - [`matcher`]: Key pattern matching
//! - [`event_log`]: Cache event logging

pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod event_log;
pub mod manager;
pub mod matcher;
pub mod memory;
pub mod metrics;
pub mod region;
pub mod remote;
pub mod stats;
pub mod storage;
pub mod waterfall;

pub use config::{CacheManagerConfig, ElementDefaults, EvictionPolicyKind, PurgatoryOverflow, RegionConfig};
pub use element::{CacheElement, CacheKey, CacheValue, ElementAttributes, ExpiryReason};
pub use error::CacheError;
pub use event::{ElementEvent, ElementEventHandler, ElementEventQueue, ElementEventType, EventHandlerError};
pub use event_log::{CacheEvent, CacheEventLogger, RecordingEventLogger, TracingEventLogger};
pub use manager::{AuxiliaryFactory, CacheManager};
pub use matcher::{KeyMatcher, RegexKeyMatcher};
pub use memory::{DescriptorList, MemoryCache};
pub use region::{Region, RegionBuilder, RegionStatus, ShrinkReport, ShutdownReport};
pub use remote::{
    LocalTransport, RegionListener, RemoteCacheClient, RemoteCacheListener, RemoteCacheRequest, RemoteCacheResponse,
    RemoteCacheServer, RemoteRequestFactory, RemoteRequestType, RemoteTransport, ResponsePayload,
    TransportError,
};
pub use stats::Stats;
pub use storage::{AuxiliaryStore, InMemoryStore, StorageError};
