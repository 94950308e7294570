// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant settings collaborator.

use async_trait::async_trait;

/// Per-tenant key/value settings.
///
/// Every call is a potential suspension point; the core never assumes the
/// implementation caches.
#[async_trait]
pub trait Settings: Send + Sync {
    /// Returns the setting value, or `default` when unset.
    async fn get(&self, tenant_id: i64, key: &str, default: &str) -> String;
}
