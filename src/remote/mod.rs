// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote cache protocol.
//!
//! ```text
//! RemoteCacheClient ──► RemoteTransport ──► codec ──► RemoteCacheServer ──► CacheManager
//!        ▲                                                   │
//!        └──────────────── RemoteCacheResponse ◄─────────────┤
//!                                                            ▼
//!                                              RemoteCacheListener (other peers)
//! ```
//!
//! Requests are built by a [`RemoteRequestFactory`] stamped with the
//! sender's requester id and travel as JSON. The server applies them with
//! the region's `local_*` operations and notifies every listener except the
//! sender. A [`RegionListener`] mirrors those notifications into a peer's
//! own region.

pub mod client;
pub mod codec;
pub mod listener;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use client::RemoteCacheClient;
pub use listener::RegionListener;
pub use request::{RemoteCacheRequest, RemoteRequestFactory, RemoteRequestType};
pub use response::{RemoteCacheResponse, ResponsePayload};
pub use server::{RemoteCacheListener, RemoteCacheServer};
pub use transport::{LocalTransport, RemoteTransport, TransportError};
