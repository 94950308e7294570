// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque background job queue (campaign dispatch and friends).

use std::time::Duration;

use async_trait::async_trait;

/// Fire-and-forget job enqueueing. The core never waits on job results.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job, optionally delayed.
    async fn enqueue(&self, job_type: &str, payload: serde_json::Value, delay: Option<Duration>);
}
