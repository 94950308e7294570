// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL caches: a generic store plus the group-metadata cache.
//!
//! The group cache fronts on-demand metadata fetch: a `get` miss triggers a
//! fire-and-forget background refetch and returns immediately, so callers
//! get an eventually-consistent read and never block on the network.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

use atendo_core::traits::transport::GroupLookup;
use atendo_core::types::GroupMetadata;

/// A get/set/delete/flush cache where entries expire after a fixed TTL.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value if present and fresh; expired entries are
    /// dropped on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some((value, stored_at)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: K, value: V) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(key, (value, Instant::now()));
    }

    pub fn del(&self, key: &K) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.remove(key);
    }

    pub fn flush(&self) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fetches fresh group metadata from the network; `None` on failure.
pub type GroupFetcher =
    Arc<dyn Fn(String) -> BoxFuture<'static, Option<GroupMetadata>> + Send + Sync>;

/// Short-TTL cache fronting on-demand group-metadata fetch.
///
/// The fetcher is attached after the transport exists; until then misses
/// simply return `None`.
pub struct GroupMetadataCache {
    inner: Arc<TtlCache<String, GroupMetadata>>,
    fetcher: RwLock<Option<GroupFetcher>>,
}

impl GroupMetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(TtlCache::new(ttl)),
            fetcher: RwLock::new(None),
        }
    }

    /// Attach the network fetcher once the transport is available.
    pub fn set_fetcher(&self, fetcher: GroupFetcher) {
        *self.fetcher.write().expect("fetcher lock poisoned") = Some(fetcher);
    }

    /// Cached metadata for a group. A miss triggers an asynchronous
    /// background refetch and returns `None` immediately.
    pub fn get(&self, jid: &str) -> Option<GroupMetadata> {
        if let Some(metadata) = self.inner.get(&jid.to_string()) {
            return Some(metadata);
        }

        debug!(jid, "group cache miss, scheduling background refetch");
        let fetcher = self
            .fetcher
            .read()
            .expect("fetcher lock poisoned")
            .clone();
        if let Some(fetcher) = fetcher {
            let cache = Arc::clone(&self.inner);
            let jid = jid.to_string();
            tokio::spawn(async move {
                if let Some(metadata) = fetcher(jid.clone()).await {
                    cache.set(jid, metadata);
                }
            });
        }
        None
    }

    pub fn set(&self, jid: String, metadata: GroupMetadata) {
        self.inner.set(jid, metadata);
    }

    pub fn del(&self, jid: &str) {
        self.inner.del(&jid.to_string());
    }

    pub fn flush(&self) {
        self.inner.flush();
    }
}

#[async_trait]
impl GroupLookup for GroupMetadataCache {
    async fn get(&self, jid: &str) -> Option<GroupMetadata> {
        // The transport-facing lookup reads the cache only; refetch is
        // driven by the event handlers.
        self.inner.get(&jid.to_string())
    }
}
