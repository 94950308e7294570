// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activity-schedule collaborator for out-of-hours gating.

use async_trait::async_trait;

/// Reports whether the tenant (or one of its queues) is inside its
/// configured activity window.
#[async_trait]
pub trait Schedules: Send + Sync {
    /// `None` means no schedule is configured for the given scope;
    /// `Some(false)` means the current time falls outside every window.
    async fn in_activity(&self, tenant_id: i64, queue_id: Option<i64>) -> Option<bool>;
}
