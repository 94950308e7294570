// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol version resolution with a single-flight TTL cache.
//!
//! The preferred version is fetched remotely at most once per TTL window,
//! with graceful fallback to the bundled default on any failure. The
//! candidate and the bundled version are compared component-wise and the
//! greater one wins.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use atendo_config::model::VersionConfig;

/// Protocol version shipped with this build; the floor for any resolved
/// version.
pub const BUNDLED_VERSION: [u32; 3] = [2, 3000, 1025190524];

/// Component-wise comparison; missing components count as 0, ties keep `a`.
pub fn greater_version(a: &[u32], b: &[u32]) -> Vec<u32> {
    for i in 0..a.len().max(b.len()) {
        let num_a = a.get(i).copied().unwrap_or(0);
        let num_b = b.get(i).copied().unwrap_or(0);
        if num_a > num_b {
            return a.to_vec();
        }
        if num_a < num_b {
            return b.to_vec();
        }
    }
    a.to_vec()
}

/// Single-flight, TTL-cached protocol version resolver.
pub struct VersionResolver {
    endpoint: Option<String>,
    ttl: Duration,
    http: reqwest::Client,
    /// The mutex doubles as the single-flight guard: concurrent callers
    /// queue here and all but the first hit the refreshed cache.
    cache: Mutex<Option<(Vec<u32>, Instant)>>,
}

impl VersionResolver {
    pub fn new(config: &VersionConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            ttl: Duration::from_secs(config.ttl_hours * 60 * 60),
            http: reqwest::Client::new(),
            cache: Mutex::new(None),
        }
    }

    /// The version to present to the remote service.
    ///
    /// Never fails: any fetch problem falls back to [`BUNDLED_VERSION`].
    pub async fn resolve(&self) -> Vec<u32> {
        let mut cache = self.cache.lock().await;

        if let Some((version, fetched_at)) = cache.as_ref()
            && fetched_at.elapsed() < self.ttl
        {
            return version.clone();
        }

        let candidate = self
            .fetch_remote()
            .await
            .unwrap_or_else(|| BUNDLED_VERSION.to_vec());
        let version = greater_version(&candidate, &BUNDLED_VERSION);
        info!(version = ?version, "resolved protocol version");

        *cache = Some((version.clone(), Instant::now()));
        version
    }

    async fn fetch_remote(&self) -> Option<Vec<u32>> {
        let endpoint = self.endpoint.as_deref()?;
        let result = async {
            let response = self.http.get(endpoint).send().await?;
            response.error_for_status()?.json::<Vec<u32>>().await
        }
        .await;

        match result {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(error = %e, "failed to fetch preferred protocol version");
                None
            }
        }
    }
}
