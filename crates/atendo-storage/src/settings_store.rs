// SPDX-FileCopyrightText: 2026 Atendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the per-tenant settings collaborator.

use async_trait::async_trait;
use tracing::warn;

use atendo_core::traits::Settings;

use crate::database::Database;
use crate::queries::settings as settings_queries;

/// Settings reads backed by the `settings` table.
///
/// Read failures degrade to the caller-provided default: a broken settings
/// row must never take an inbound message handler down.
#[derive(Clone)]
pub struct SqliteSettings {
    db: Database,
}

impl SqliteSettings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Settings for SqliteSettings {
    async fn get(&self, tenant_id: i64, key: &str, default: &str) -> String {
        match settings_queries::get_setting(&self.db, tenant_id, key).await {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(tenant_id, key, error = %e, "settings read failed, using default");
                default.to_string()
            }
        }
    }
}
