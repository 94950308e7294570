// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential persistence for protocol sessions.

use async_trait::async_trait;

use crate::error::AtendoError;

/// Persists per-connection cryptographic session material.
///
/// `save` must be atomic: no partial credential write may ever be
/// observable by a subsequent `load`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, connection_id: i64) -> Result<Option<serde_json::Value>, AtendoError>;

    async fn save(
        &self,
        connection_id: i64,
        credentials: &serde_json::Value,
    ) -> Result<(), AtendoError>;

    /// Removes stored credentials (logout, auth rejection, QR cap).
    async fn wipe(&self, connection_id: i64) -> Result<(), AtendoError>;
}
